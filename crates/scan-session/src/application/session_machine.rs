//! ScanSession: the single source of truth for the session phase.
//!
//! Every command is validated against the current [`SessionState`] before
//! the engine is called.  A command issued from a state that does not allow
//! it fails with [`ScanError::InvalidStateTransition`] and the engine is not
//! touched.  A command whose engine call fails returns
//! [`ScanError::EngineCallFailed`] and the state is left as it was.
//!
//! # Transitions
//!
//! ```text
//! Uninitialized --initialize_scanner--> Initialized
//! Initialized   --start_preview-------> Previewing
//! Previewing    --start_scan----------> Scanning
//! Scanning      --stop_scan--> (mesh requested) --GenerateMesh event--> Viewing
//! Viewing       --start_preview-------> Previewing
//! Viewing       --load_mesh-----------> Viewing (artifact replaced)
//! any           --uninitialize_scanner--> Uninitialized
//! ```
//!
//! `stop_scan` returns as soon as the engine accepted the request; the
//! session stays in `Scanning` until the engine's `GenerateMesh` event is
//! handled.  There is no timeout.
//!
//! # One command at a time
//!
//! All state-mutating commands take `&mut self`, so a caller cannot issue a
//! second command while one is still awaiting the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scan_core::{
    CaptureSource, Command, EngineError, EngineEvent, MeshArtifact, PipelineOperation, ScanError,
    ScanParameters, ScanningModeVersion, SessionState, StreamConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::engine::EngineContext;
use crate::application::event_bridge::{EventBridge, NotificationSink};

/// What the session does when the visualizer first reports ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyAction {
    /// Only forward the event; the application drives setup itself.
    #[default]
    Notify,
    /// Run `initialize_scanner` followed by `start_preview`.
    InitializeAndPreview,
}

/// Construction-time settings for a [`ScanSession`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub ready_action: ReadyAction,
    pub capture_source: CaptureSource,
    pub parameters: ScanParameters,
}

/// Progress of mesh generation while in `Scanning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MeshPhase {
    Capturing,
    /// Capture stopped but the mesh request has not been accepted.
    Stopped,
    /// Waiting for the `GenerateMesh` event.
    Requested,
}

/// Admits the first `VisualizerReady` of a mount.
///
/// Repeats that arrive while the session is still `Uninitialized` are
/// refused.  Re-armed whenever the session returns to `Uninitialized`.
#[derive(Debug, Default)]
struct ReadyLatch {
    seen: bool,
}

impl ReadyLatch {
    fn admit(&mut self, state: SessionState) -> bool {
        if self.seen && state == SessionState::Uninitialized {
            return false;
        }
        self.seen = true;
        true
    }

    fn rearm(&mut self) {
        self.seen = false;
    }
}

const ALL_STATES: [SessionState; 5] = [
    SessionState::Uninitialized,
    SessionState::Initialized,
    SessionState::Previewing,
    SessionState::Scanning,
    SessionState::Viewing,
];

/// The states from which `command` may be issued.
pub fn valid_states(command: Command) -> &'static [SessionState] {
    use SessionState::{Initialized, Previewing, Scanning, Uninitialized, Viewing};

    match command {
        Command::InitializeScanner | Command::ConfigureStreams => &[Uninitialized],
        Command::UninitializeScanner
        | Command::ClearCommandHosts
        | Command::AddCommandHost
        | Command::SetServerHost
        | Command::QueryState => &ALL_STATES,
        Command::StartPreview => &[Initialized, Viewing],
        Command::StartScan => &[Previewing],
        Command::StopScan | Command::GenerateMesh => &[Scanning],
        Command::SaveScan | Command::ApplyMeshOperation | Command::ApplyViewportEdits => &[Viewing],
        Command::LoadMesh => &[Initialized, Viewing],
        Command::SetScanParameters | Command::SetScanningModeVersion => &[Initialized, Previewing],
    }
}

/// One scanning session over one engine.
pub struct ScanSession {
    id: Uuid,
    engine: EngineContext,
    bridge: Arc<EventBridge>,
    ready_action: ReadyAction,
    capture_source: CaptureSource,
    state: SessionState,
    params: ScanParameters,
    artifact: Option<MeshArtifact>,
    mesh_phase: MeshPhase,
    ready_latch: ReadyLatch,
}

impl ScanSession {
    /// Creates an `Uninitialized` session.  Notifications go to `sink`.
    pub fn new(engine: EngineContext, options: SessionOptions, sink: NotificationSink) -> Self {
        let bridge = Arc::new(EventBridge::new(engine.clone(), sink));
        let id = Uuid::new_v4();
        debug!("session {id} created");
        Self {
            id,
            engine,
            bridge,
            ready_action: options.ready_action,
            capture_source: options.capture_source,
            state: SessionState::Uninitialized,
            params: options.parameters,
            artifact: None,
            mesh_phase: MeshPhase::Capturing,
            ready_latch: ReadyLatch::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn parameters(&self) -> ScanParameters {
        self.params
    }

    pub fn scanning_mode_version(&self) -> ScanningModeVersion {
        self.params.mode
    }

    /// The mesh currently displayed, if any.  Only `Some` while `Viewing`.
    pub fn active_artifact(&self) -> Option<&MeshArtifact> {
        self.artifact.as_ref()
    }

    /// Shared handle to the event bridge, for out-of-band state refreshes.
    pub fn bridge(&self) -> Arc<EventBridge> {
        Arc::clone(&self.bridge)
    }

    /// Fails with `InvalidStateTransition` unless `command` is allowed now.
    pub fn check(&self, command: Command) -> Result<(), ScanError> {
        if valid_states(command).contains(&self.state) {
            Ok(())
        } else {
            Err(self.refuse(command))
        }
    }

    // ── Lifecycle commands ────────────────────────────────────────────────────

    /// Opens the scanner.  `source` defaults to the configured capture source.
    ///
    /// The session's scanning mode is sent right after the engine opens, so
    /// unit sizes are interpreted in the mode the session reports.  If the
    /// mode cannot be applied the scanner is released again and the session
    /// stays `Uninitialized`.
    pub async fn initialize_scanner(
        &mut self,
        source: Option<CaptureSource>,
    ) -> Result<(), ScanError> {
        self.check(Command::InitializeScanner)?;
        let source = source.unwrap_or(self.capture_source);
        self.engine
            .get()
            .initialize_scanner(source)
            .await
            .map_err(|e| self.engine_failed(Command::InitializeScanner, e))?;
        let mode = self.params.mode;
        if let Err(e) = self.engine.get().set_v2_scanning(mode.is_v2()).await {
            let err = self.engine_failed(Command::SetScanningModeVersion, e);
            if let Err(release) = self.engine.get().uninitialize_scanner().await {
                warn!("session {}: scanner not released after mode failure: {release}", self.id);
            }
            return Err(err);
        }
        debug!("session {}: scanning mode {mode} applied", self.id);
        self.capture_source = source;
        self.enter(SessionState::Initialized);
        Ok(())
    }

    /// Releases the scanner from any state and drops the active mesh.
    pub async fn uninitialize_scanner(&mut self) -> Result<(), ScanError> {
        self.engine
            .get()
            .uninitialize_scanner()
            .await
            .map_err(|e| self.engine_failed(Command::UninitializeScanner, e))?;
        self.enter(SessionState::Uninitialized);
        Ok(())
    }

    /// Starts (or, from `Viewing`, restarts) the depth preview.
    pub async fn start_preview(&mut self) -> Result<(), ScanError> {
        self.check(Command::StartPreview)?;
        self.engine
            .get()
            .start_preview()
            .await
            .map_err(|e| self.engine_failed(Command::StartPreview, e))?;
        self.enter(SessionState::Previewing);
        Ok(())
    }

    pub async fn start_scan(&mut self) -> Result<(), ScanError> {
        self.check(Command::StartScan)?;
        self.engine
            .get()
            .start_scan()
            .await
            .map_err(|e| self.engine_failed(Command::StartScan, e))?;
        self.enter(SessionState::Scanning);
        Ok(())
    }

    /// Stops live meshing and requests the final mesh.
    ///
    /// The session stays in `Scanning`; it moves to `Viewing` only when the
    /// `GenerateMesh` event is handled.  If the mesh request itself fails,
    /// capture is already stopped and [`generate_mesh`](Self::generate_mesh)
    /// can retry it.
    pub async fn stop_scan(&mut self) -> Result<(), ScanError> {
        self.check(Command::StopScan)?;
        if self.mesh_phase != MeshPhase::Capturing {
            return Err(self.refuse(Command::StopScan));
        }
        self.engine
            .get()
            .stop_scan()
            .await
            .map_err(|e| self.engine_failed(Command::StopScan, e))?;
        self.mesh_phase = MeshPhase::Stopped;
        info!("session {}: capture stopped", self.id);
        self.request_mesh().await
    }

    /// Re-requests mesh generation after a failed request.
    pub async fn generate_mesh(&mut self) -> Result<(), ScanError> {
        self.check(Command::GenerateMesh)?;
        if self.mesh_phase != MeshPhase::Stopped {
            return Err(self.refuse(Command::GenerateMesh));
        }
        self.request_mesh().await
    }

    async fn request_mesh(&mut self) -> Result<(), ScanError> {
        self.engine
            .get()
            .generate_mesh()
            .await
            .map_err(|e| self.engine_failed(Command::GenerateMesh, e))?;
        self.mesh_phase = MeshPhase::Requested;
        info!("session {}: mesh requested; waiting for generateMesh", self.id);
        Ok(())
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    /// Saves the active mesh to `path`, creating parent directories.
    pub async fn save_scan(&mut self, path: impl AsRef<Path>) -> Result<(), ScanError> {
        let path = path.as_ref();
        self.check(Command::SaveScan)?;
        if self.artifact.is_none() {
            return Err(ScanError::NoActiveArtifact);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ScanError::Storage {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        self.engine
            .get()
            .save_mesh(path)
            .await
            .map_err(|e| self.engine_failed(Command::SaveScan, e))?;
        if let Some(artifact) = self.artifact.as_mut() {
            artifact.mark_saved(path);
        }
        info!("session {}: mesh saved to {}", self.id, path.display());
        Ok(())
    }

    /// Overwrites the file the active mesh was last saved to (or loaded from).
    pub async fn resave_scan(&mut self) -> Result<PathBuf, ScanError> {
        self.check(Command::SaveScan)?;
        let path = self
            .artifact
            .as_ref()
            .and_then(|a| a.path())
            .map(Path::to_path_buf)
            .ok_or(ScanError::NotSaved)?;
        self.save_scan(&path).await?;
        Ok(path)
    }

    /// Loads a stored mesh for viewing and editing.
    ///
    /// Loading must not happen while a capture session is open.  From
    /// `Viewing` the scanner is uninitialized and initialized again before
    /// the load, and the displayed mesh is dropped by that reset.  A failure
    /// after the reset started leaves the session where the reset got to:
    ///
    /// - uninitialize failed: still `Viewing` with the old mesh;
    /// - initialize failed: `Uninitialized`, no mesh;
    /// - engine load failed: `Initialized`, no mesh.
    pub async fn load_mesh(&mut self, path: impl AsRef<Path>) -> Result<(), ScanError> {
        let path = path.as_ref();
        self.check(Command::LoadMesh)?;

        if self.state == SessionState::Viewing {
            info!("session {}: resetting scanner before loading {}", self.id, path.display());
            self.uninitialize_scanner().await?;
            self.initialize_scanner(None).await?;
        }

        self.engine
            .get()
            .load_mesh(path)
            .await
            .map_err(|e| self.engine_failed(Command::LoadMesh, e))?;
        let artifact = MeshArtifact::loaded(path);
        info!("session {}: loaded mesh {} from {}", self.id, artifact.id(), path.display());
        self.artifact = Some(artifact);
        self.enter(SessionState::Viewing);
        Ok(())
    }

    // ── Scan parameters ───────────────────────────────────────────────────────

    /// Sets the unit size in the current mode's display unit.
    pub async fn set_scan_parameters(&mut self, unit_size: f64) -> Result<(), ScanError> {
        self.check(Command::SetScanParameters)?;
        ScanParameters::validate_unit_size(unit_size).map_err(ScanError::InvalidParameter)?;

        let next = ScanParameters {
            unit_size,
            ..self.params
        };
        self.engine
            .get()
            .set_voxel_size(next.engine_unit_size())
            .await
            .map_err(|e| self.engine_failed(Command::SetScanParameters, e))?;
        self.params = next;
        info!(
            "session {}: unit size {} ({}), engine value {}",
            self.id,
            next.display_label(),
            next.mode,
            next.engine_unit_size()
        );
        Ok(())
    }

    /// Switches scanning mode.  The stored unit size is not re-sent.
    pub async fn set_scanning_mode_version(
        &mut self,
        mode: ScanningModeVersion,
    ) -> Result<(), ScanError> {
        self.check(Command::SetScanningModeVersion)?;
        self.engine
            .get()
            .set_v2_scanning(mode.is_v2())
            .await
            .map_err(|e| self.engine_failed(Command::SetScanningModeVersion, e))?;
        self.params.mode = mode;
        info!("session {}: scanning mode {mode}", self.id);
        Ok(())
    }

    // ── Network bindings ──────────────────────────────────────────────────────

    /// Applies a stream-direction preset.  Only before initialization.
    pub async fn configure_streams(&mut self, config: StreamConfig) -> Result<(), ScanError> {
        self.check(Command::ConfigureStreams)?;
        self.engine
            .get()
            .configure_streams(config)
            .await
            .map_err(|e| self.engine_failed(Command::ConfigureStreams, e))?;
        debug!("session {}: streams configured {config:?}", self.id);
        Ok(())
    }

    pub async fn clear_command_hosts(&mut self) -> Result<(), ScanError> {
        self.engine
            .get()
            .clear_command_hosts()
            .await
            .map_err(|e| self.engine_failed(Command::ClearCommandHosts, e))
    }

    pub async fn add_command_host(&mut self, address: &str) -> Result<(), ScanError> {
        self.engine
            .get()
            .add_command_host(address)
            .await
            .map_err(|e| self.engine_failed(Command::AddCommandHost, e))
    }

    pub async fn set_server_host(&mut self, address: &str) -> Result<(), ScanError> {
        self.engine
            .get()
            .set_server_host(address)
            .await
            .map_err(|e| self.engine_failed(Command::SetServerHost, e))?;
        info!("session {}: server host {address}", self.id);
        Ok(())
    }

    // ── Mesh editing ──────────────────────────────────────────────────────────

    /// Applies one cleanup step to the active mesh and records it.
    pub async fn apply_mesh_operation(&mut self, op: PipelineOperation) -> Result<(), ScanError> {
        self.check(Command::ApplyMeshOperation)?;
        op.validate().map_err(ScanError::InvalidParameter)?;
        self.engine
            .get()
            .apply_mesh_operation(op)
            .await
            .map_err(|e| self.engine_failed(Command::ApplyMeshOperation, e))?;
        if let Some(artifact) = self.artifact.as_mut() {
            artifact.record_operation(op);
        }
        debug!("session {}: applied {op}", self.id);
        Ok(())
    }

    pub async fn decimate(&mut self, ratio: f64) -> Result<(), ScanError> {
        self.apply_mesh_operation(PipelineOperation::Decimate { ratio }).await
    }

    pub async fn smooth(&mut self, iterations: u32) -> Result<(), ScanError> {
        self.apply_mesh_operation(PipelineOperation::Smooth { iterations }).await
    }

    pub async fn fill_holes(&mut self, max_size: f64) -> Result<(), ScanError> {
        self.apply_mesh_operation(PipelineOperation::FillHoles { max_size }).await
    }

    pub async fn extract_largest_surface(&mut self, min_percent: f64) -> Result<(), ScanError> {
        self.apply_mesh_operation(PipelineOperation::ExtractLargestSurface { min_percent })
            .await
    }

    pub async fn make_watertight(&mut self, depth: u32) -> Result<(), ScanError> {
        self.apply_mesh_operation(PipelineOperation::MakeWatertight { depth }).await
    }

    pub async fn optimize_size(&mut self, max_size: f64) -> Result<(), ScanError> {
        self.apply_mesh_operation(PipelineOperation::OptimizeSize { max_size }).await
    }

    /// Commits or discards edits made in the viewport.
    pub async fn apply_viewport_edits(&mut self, commit: bool) -> Result<(), ScanError> {
        self.check(Command::ApplyViewportEdits)?;
        self.engine
            .get()
            .apply_viewport_edits(commit)
            .await
            .map_err(|e| self.engine_failed(Command::ApplyViewportEdits, e))
    }

    // ── Events ────────────────────────────────────────────────────────────────

    /// Handles one engine event: applies its local effect, forwards it
    /// through the bridge, and adopts the reported state.
    ///
    /// # Errors
    ///
    /// Returns the state query failure, or the failure of the ready setup
    /// when [`ReadyAction::InitializeAndPreview`] is configured.
    pub async fn handle_event(&mut self, event: EngineEvent) -> Result<(), ScanError> {
        let mut run_ready_setup = false;

        match &event {
            EngineEvent::VisualizerReady => {
                if !self.ready_latch.admit(self.state) {
                    debug!("session {}: repeated visualizerReady ignored", self.id);
                    return Ok(());
                }
                run_ready_setup = self.state == SessionState::Uninitialized
                    && self.ready_action == ReadyAction::InitializeAndPreview;
            }
            EngineEvent::GenerateMesh => self.on_mesh_generated(),
            EngineEvent::Error { message } => {
                error!("session {}: engine reported error: {message}", self.id)
            }
            _ => {}
        }

        if let Some(reported) = self.bridge.process(event).await? {
            self.reconcile(reported);
        }

        if run_ready_setup {
            info!("session {}: visualizer ready; initializing and starting preview", self.id);
            self.initialize_scanner(None).await?;
            self.start_preview().await?;
        }
        Ok(())
    }

    /// Queries the engine state now and adopts it.
    pub async fn sync_state(&mut self) -> Result<SessionState, ScanError> {
        if let Some(reported) = self.bridge.refresh_state().await? {
            self.reconcile(reported);
        }
        Ok(self.state)
    }

    fn on_mesh_generated(&mut self) {
        if self.state != SessionState::Scanning {
            warn!("session {}: generateMesh while {}; ignored", self.id, self.state);
            return;
        }
        let artifact = MeshArtifact::generated();
        info!("session {}: mesh {} generated", self.id, artifact.id());
        self.artifact = Some(artifact);
        self.enter(SessionState::Viewing);
    }

    /// Adopts an engine-reported state.  `Viewing` is only reachable through
    /// `GenerateMesh` or `load_mesh`, so it is refused without an artifact.
    fn reconcile(&mut self, reported: SessionState) {
        if reported == self.state {
            return;
        }
        if reported == SessionState::Viewing && self.artifact.is_none() {
            warn!(
                "session {}: engine reports viewing but no mesh exists; staying {}",
                self.id, self.state
            );
            return;
        }
        info!("session {}: adopting engine state {reported}", self.id);
        self.enter(reported);
    }

    fn enter(&mut self, next: SessionState) {
        let from = self.state;
        if next != SessionState::Viewing {
            self.artifact = None;
        }
        if next == SessionState::Scanning && from != SessionState::Scanning {
            self.mesh_phase = MeshPhase::Capturing;
        }
        if next == SessionState::Uninitialized {
            self.ready_latch.rearm();
        }
        self.state = next;
        if from != next {
            info!("session {}: {from} -> {next}", self.id);
        }
    }

    fn refuse(&self, command: Command) -> ScanError {
        warn!("session {}: {command} refused while {}", self.id, self.state);
        ScanError::invalid_transition(command, self.state)
    }

    fn engine_failed(&self, operation: Command, source: EngineError) -> ScanError {
        error!("session {}: engine call {operation} failed: {source}", self.id);
        ScanError::engine(operation, source)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
