//! EventBridge: turns raw engine events into subscriber notifications.
//!
//! For every event the bridge forwards a [`Notification::Event`].  After a
//! lifecycle event (see [`EngineEvent::triggers_state_query`]) it asks the
//! engine for its current state and forwards a
//! [`Notification::StateChanged`].  This query is the only way the session
//! learns what the engine thinks its state is.
//!
//! # Coalescing state queries
//!
//! Events are forwarded in arrival order, but state queries may complete out
//! of order.  The bridge therefore keeps at most one query in flight and
//! numbers every request.  A request that is overtaken by a newer one,
//! either while waiting for the in-flight query or while its own query is
//! running, delivers nothing; only the newest request's result reaches the
//! subscriber.
//!
//! ```text
//! request #1 ──► query ─────────────► (superseded, dropped)
//! request #2 ──► wait ──► (superseded, never issued)
//! request #3 ──► wait ─────────────────► query ──► StateChanged
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use scan_core::{Command, EngineEvent, Notification, ScanError, SessionState};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

use crate::application::engine::EngineContext;

/// Where notifications go.  `None` drops them.
#[derive(Debug, Default)]
pub enum NotificationSink {
    #[default]
    None,
    Channel(mpsc::UnboundedSender<Notification>),
}

impl NotificationSink {
    /// Creates a channel sink and the receiver the subscriber reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (NotificationSink::Channel(tx), rx)
    }

    fn deliver(&self, notification: Notification) {
        match self {
            NotificationSink::None => {}
            NotificationSink::Channel(tx) => {
                if tx.send(notification).is_err() {
                    debug!("notification subscriber dropped");
                }
            }
        }
    }
}

/// Forwards engine events and runs coalesced state queries.
pub struct EventBridge {
    engine: EngineContext,
    sink: NotificationSink,
    /// Number of the newest state-query request.
    latest_request: AtomicU64,
    /// Held for the duration of a state query.
    in_flight: Mutex<()>,
}

impl EventBridge {
    pub fn new(engine: EngineContext, sink: NotificationSink) -> Self {
        Self {
            engine,
            sink,
            latest_request: AtomicU64::new(0),
            in_flight: Mutex::new(()),
        }
    }

    /// Forwards `event` and, for lifecycle events, refreshes the state.
    ///
    /// Returns the delivered state, or `None` when no query was needed or
    /// the query was coalesced into a newer one.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::EngineCallFailed`] if the (non-superseded) state
    /// query fails.  The event itself has already been forwarded.
    pub async fn process(&self, event: EngineEvent) -> Result<Option<SessionState>, ScanError> {
        let query = event.triggers_state_query();
        self.forward(event);
        if query {
            self.refresh_state().await
        } else {
            Ok(None)
        }
    }

    /// Forwards an event without querying state.
    pub fn forward(&self, event: EngineEvent) {
        debug!("forwarding engine event {}", event.name());
        self.sink.deliver(Notification::Event(event));
    }

    /// Queries the engine state, coalescing with concurrent requests.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::EngineCallFailed`] labeled
    /// [`Command::QueryState`] if the delivered query fails.
    pub async fn refresh_state(&self) -> Result<Option<SessionState>, ScanError> {
        let ticket = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = self.in_flight.lock().await;

        if self.latest_request.load(Ordering::SeqCst) != ticket {
            debug!("state query #{ticket} coalesced before it was issued");
            return Ok(None);
        }

        let result = self.engine.get().current_state().await;

        if self.latest_request.load(Ordering::SeqCst) != ticket {
            debug!("state query #{ticket} superseded while in flight; result dropped");
            return Ok(None);
        }

        let state = result.map_err(|source| {
            error!("state query failed: {source}");
            ScanError::engine(Command::QueryState, source)
        })?;
        self.sink.deliver(Notification::StateChanged(state));
        Ok(Some(state))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
