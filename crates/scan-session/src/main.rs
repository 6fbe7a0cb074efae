//! scan-session binary entry point.
//!
//! Runs one scripted scanning session against the simulated engine and
//! prints every subscriber notification as a JSON line on stdout.  Logs go
//! to stderr through `tracing`.
//!
//! # Script
//!
//! ```text
//! load config ─► apply CLI overrides ─► init logging
//!  └─ set role (if any)
//!  └─ visualizerReady ×2          (second one is swallowed by the ready latch)
//!  └─ standalone / scanner: initialize ─► preview
//!     mirror:               initialize(network) ─► hostDiscovered ─► connect
//!  └─ unit size ─► start scan ─► stop scan ─► wait for generateMesh
//!  └─ cleanup pipeline ─► save ─► list store ─► uninitialize
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use scan_core::{CaptureSource, DeviceRole, EngineEvent, SessionState};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scan_session::application::engine::EngineContext;
use scan_session::application::event_bridge::NotificationSink;
use scan_session::application::network_roles::RoleCoordinator;
use scan_session::application::session_machine::{ReadyAction, ScanSession};
use scan_session::infrastructure::engine::SimulatedEngine;
use scan_session::infrastructure::network::UdpProbeResolver;
use scan_session::infrastructure::storage::config::{self, AppConfig, ConfigError};

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    Mirror,
    Scanner,
}

impl From<RoleArg> for DeviceRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Mirror => DeviceRole::Mirror,
            RoleArg::Scanner => DeviceRole::Scanner,
        }
    }
}

/// Scripted 3D-scanning session over a simulated capture engine.
#[derive(Debug, Parser)]
#[command(
    name = "scan-session",
    about = "Drive a scan session and print its notifications as JSON lines",
    version
)]
struct Cli {
    /// Config file.  Defaults to the platform config directory.
    #[arg(long, env = "SCAN_SESSION_CONFIG")]
    config: Option<PathBuf>,

    /// Device role for a two-device session.  Overrides `[network] role`.
    #[arg(long, value_enum, env = "SCAN_SESSION_ROLE")]
    role: Option<RoleArg>,

    /// Directory saved meshes are written under.  Overrides `[storage] root`.
    #[arg(long, env = "SCAN_SESSION_STORE_ROOT")]
    store_root: Option<PathBuf>,

    /// Unit size in the scanning mode's display unit.  Overrides `[scan] unit_size`.
    #[arg(long, env = "SCAN_SESSION_UNIT_SIZE")]
    unit_size: Option<f64>,

    /// Scanner address announced to a mirror.
    #[arg(long, default_value = "10.0.0.5", env = "SCAN_SESSION_PEER")]
    peer: String,
}

impl Cli {
    /// Loads the config file and applies the command-line overrides.
    fn load_config(&self) -> anyhow::Result<(AppConfig, Option<ConfigError>)> {
        let loaded = match &self.config {
            Some(path) => config::load_config_from(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => match config::load_config() {
                Ok(cfg) => cfg,
                // Reported once logging is up.
                Err(e @ ConfigError::NoPlatformConfigDir) => {
                    return Ok((self.apply_overrides(AppConfig::default()), Some(e)))
                }
                Err(e) => return Err(e).context("loading platform config"),
            },
        };
        Ok((self.apply_overrides(loaded), None))
    }

    fn apply_overrides(&self, mut cfg: AppConfig) -> AppConfig {
        if let Some(role) = self.role {
            cfg.network.role = Some(role.into());
        }
        if let Some(root) = &self.store_root {
            cfg.storage.root = root.clone();
        }
        if let Some(size) = self.unit_size {
            cfg.scan.unit_size = size;
        }
        cfg
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (cfg, config_warning) = cli.load_config()?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.session.log_level)),
        )
        .init();

    if let Some(e) = config_warning {
        warn!("{e}; using defaults");
    }
    info!("scan-session starting");

    // ── Engine, session and subscriber ────────────────────────────────────────
    let (engine, mut engine_events) = SimulatedEngine::new();
    let engine = Arc::new(engine);
    let (sink, mut notifications) = NotificationSink::channel();

    let role = cfg.network.role;
    let mut options = cfg.session_options();
    if role == Some(DeviceRole::Mirror) {
        // A mirror previews only after connecting to a scanner.
        options.ready_action = ReadyAction::Notify;
        options.capture_source = CaptureSource::NetworkMirror;
    }
    let ready_action = options.ready_action;
    let mut session = ScanSession::new(EngineContext::new(engine.clone()), options, sink);
    info!("session {} created", session.id());

    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match serde_json::to_string(&notification) {
                Ok(line) => println!("{line}"),
                Err(e) => error!("failed to encode notification: {e}"),
            }
        }
    });

    let mut coordinator = RoleCoordinator::new(Box::new(UdpProbeResolver::default()));

    // ── Script ────────────────────────────────────────────────────────────────
    if let Some(role) = role {
        coordinator
            .set_role(&mut session, role)
            .await
            .context("applying device role")?;
    }

    engine.emit(EngineEvent::VisualizerReady);
    engine.emit(EngineEvent::VisualizerReady);
    drain(&mut engine_events, &mut session, &mut coordinator).await?;

    if role == Some(DeviceRole::Mirror) {
        session.initialize_scanner(None).await?;
        engine.emit(EngineEvent::HostDiscovered {
            host: cli.peer.clone(),
        });
        drain(&mut engine_events, &mut session, &mut coordinator).await?;
        coordinator
            .connect_to_host(&mut session, &cli.peer)
            .await
            .with_context(|| format!("connecting to {}", cli.peer))?;
    } else if ready_action == ReadyAction::Notify {
        session.initialize_scanner(None).await?;
        session.start_preview().await?;
    }
    drain(&mut engine_events, &mut session, &mut coordinator).await?;

    session.set_scan_parameters(cfg.scan.unit_size).await?;
    info!(
        "unit size {} ({})",
        session.parameters().display_label(),
        session.scanning_mode_version()
    );
    session.start_scan().await?;
    engine.emit(EngineEvent::VolumeMemoryUpdate { percent_full: 42.0 });
    drain(&mut engine_events, &mut session, &mut coordinator).await?;

    session.stop_scan().await?;
    drain(&mut engine_events, &mut session, &mut coordinator).await?;
    if session.state() != SessionState::Viewing {
        anyhow::bail!("mesh was not generated; session is {}", session.state());
    }

    let pipeline = cfg.pipeline();
    if !pipeline.is_empty() {
        let report = pipeline.run(&mut session).await?;
        info!("pipeline applied {} step(s)", report.completed.len());
        session.apply_viewport_edits(true).await?;
    }

    let store = cfg.mesh_store();
    let path = store.next_path();
    session.save_scan(&path).await?;
    drain(&mut engine_events, &mut session, &mut coordinator).await?;
    for stored in store.list()? {
        info!("stored mesh {} at {}", stored.name, stored.path.display());
    }

    session.uninitialize_scanner().await?;
    drain(&mut engine_events, &mut session, &mut coordinator).await?;

    // Dropping the session closes the notification channel.
    drop(session);
    printer.await.context("notification printer")?;
    info!("scan-session finished");
    Ok(())
}

/// Feeds every pending engine event to the coordinator and the session.
async fn drain(
    events: &mut UnboundedReceiver<EngineEvent>,
    session: &mut ScanSession,
    coordinator: &mut RoleCoordinator,
) -> anyhow::Result<()> {
    while let Ok(event) = events.try_recv() {
        coordinator.observe(&event);
        session.handle_event(event).await?;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
