//! In-process stand-in for the native capture engine.
//!
//! `SimulatedEngine` tracks its own session state, emits the lifecycle event
//! that matches each successful command, and records every call it receives
//! so tests can assert on exact call sequences.
//!
//! # Test controls
//!
//! - [`SimulatedEngine::fail_next`] makes the next call of one operation fail.
//! - [`SimulatedEngine::suppress_generate_mesh`] accepts mesh requests but
//!   never emits `generateMesh`.
//! - [`SimulatedEngine::gate_state_queries`] holds every state query until a
//!   permit is added to the returned semaphore.
//! - [`SimulatedEngine::emit`] injects an arbitrary event (visualizer ready,
//!   host discovered, …).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use scan_core::{
    CaptureSource, Command, EngineError, EngineEvent, PipelineOperation, SessionState,
    StreamConfig,
};
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

use crate::application::engine::ScanEngine;

const PLY_STUB: &str = "ply\n\
format ascii 1.0\n\
comment scan-session simulated mesh\n\
element vertex 0\n\
element face 0\n\
end_header\n";

/// One call received by the simulated engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    InitializeScanner(CaptureSource),
    UninitializeScanner,
    StartPreview,
    StartScan,
    StopScan,
    GenerateMesh,
    SaveMesh(PathBuf),
    LoadMesh(PathBuf),
    SetVoxelSize(f64),
    SetV2Scanning(bool),
    CurrentState,
    ConfigureStreams(StreamConfig),
    ClearCommandHosts,
    AddCommandHost(String),
    SetServerHost(String),
    ApplyMeshOperation(PipelineOperation),
    ApplyViewportEdits(bool),
}

#[derive(Debug, Default)]
struct EngineState {
    state: SessionState,
    calls: Vec<EngineCall>,
    failures: HashMap<Command, EngineError>,
    suppress_generate_mesh: bool,
    query_gate: Option<Arc<Semaphore>>,
    streams: Option<StreamConfig>,
    command_hosts: Vec<String>,
    server_host: Option<String>,
    voxel_size: Option<f64>,
    v2_scanning: bool,
}

pub struct SimulatedEngine {
    inner: Mutex<EngineState>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl SimulatedEngine {
    /// Creates the engine and the receiving end of its event stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            inner: Mutex::new(EngineState {
                v2_scanning: true,
                ..EngineState::default()
            }),
            events,
        };
        (engine, rx)
    }

    /// Makes the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Command, error: EngineError) {
        self.lock().failures.insert(operation, error);
    }

    /// While `true`, mesh requests succeed but `generateMesh` is never emitted.
    pub fn suppress_generate_mesh(&self, suppress: bool) {
        self.lock().suppress_generate_mesh = suppress;
    }

    /// Holds state queries until permits are added; each permit releases one query.
    pub fn gate_state_queries(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.lock().query_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Pushes `event` onto the event stream.
    pub fn emit(&self, event: EngineEvent) {
        debug!("simulated engine emits {}", event.name());
        if self.events.send(event).is_err() {
            debug!("engine event receiver dropped");
        }
    }

    /// Forces the reported state, as if the engine changed on its own.
    pub fn set_state(&self, state: SessionState) {
        self.lock().state = state;
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn streams(&self) -> Option<StreamConfig> {
        self.lock().streams
    }

    pub fn command_hosts(&self) -> Vec<String> {
        self.lock().command_hosts.clone()
    }

    pub fn server_host(&self) -> Option<String> {
        self.lock().server_host.clone()
    }

    pub fn voxel_size(&self) -> Option<f64> {
        self.lock().voxel_size
    }

    pub fn v2_scanning(&self) -> bool {
        self.lock().v2_scanning
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `call` and consumes an injected failure for `operation`.
    fn begin(&self, call: EngineCall, operation: Command) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.calls.push(call);
        match inner.failures.remove(&operation) {
            Some(err) => {
                debug!("simulated engine fails {operation}: {err}");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn transition(&self, state: SessionState, event: Option<EngineEvent>) {
        self.lock().state = state;
        if let Some(event) = event {
            self.emit(event);
        }
    }
}

#[async_trait]
impl ScanEngine for SimulatedEngine {
    async fn initialize_scanner(&self, source: CaptureSource) -> Result<(), EngineError> {
        self.begin(EngineCall::InitializeScanner(source), Command::InitializeScanner)?;
        self.transition(SessionState::Initialized, None);
        Ok(())
    }

    async fn uninitialize_scanner(&self) -> Result<(), EngineError> {
        self.begin(EngineCall::UninitializeScanner, Command::UninitializeScanner)?;
        self.transition(SessionState::Uninitialized, None);
        Ok(())
    }

    async fn start_preview(&self) -> Result<(), EngineError> {
        self.begin(EngineCall::StartPreview, Command::StartPreview)?;
        self.transition(SessionState::Previewing, Some(EngineEvent::PreviewStart));
        Ok(())
    }

    async fn start_scan(&self) -> Result<(), EngineError> {
        self.begin(EngineCall::StartScan, Command::StartScan)?;
        self.transition(SessionState::Scanning, Some(EngineEvent::ScannerStart));
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), EngineError> {
        self.begin(EngineCall::StopScan, Command::StopScan)?;
        // Meshing continues in the background; the engine stays in Scanning.
        self.emit(EngineEvent::ScannerStop);
        Ok(())
    }

    async fn generate_mesh(&self) -> Result<(), EngineError> {
        self.begin(EngineCall::GenerateMesh, Command::GenerateMesh)?;
        if self.lock().suppress_generate_mesh {
            debug!("generateMesh suppressed");
            return Ok(());
        }
        self.transition(SessionState::Viewing, Some(EngineEvent::GenerateMesh));
        Ok(())
    }

    async fn save_mesh(&self, path: &Path) -> Result<(), EngineError> {
        self.begin(EngineCall::SaveMesh(path.to_path_buf()), Command::SaveScan)?;
        tokio::fs::write(path, PLY_STUB)
            .await
            .map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))?;
        self.emit(EngineEvent::SaveMesh);
        Ok(())
    }

    async fn load_mesh(&self, path: &Path) -> Result<(), EngineError> {
        self.begin(EngineCall::LoadMesh(path.to_path_buf()), Command::LoadMesh)?;
        let header = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))?;
        if !header.starts_with("ply") {
            return Err(EngineError::Rejected(format!(
                "{} is not a PLY file",
                path.display()
            )));
        }
        self.transition(SessionState::Viewing, Some(EngineEvent::LoadMesh));
        Ok(())
    }

    async fn set_voxel_size(&self, engine_units: f64) -> Result<(), EngineError> {
        self.begin(EngineCall::SetVoxelSize(engine_units), Command::SetScanParameters)?;
        self.lock().voxel_size = Some(engine_units);
        self.emit(EngineEvent::VoxelSizeChanged { size: engine_units });
        Ok(())
    }

    async fn set_v2_scanning(&self, enabled: bool) -> Result<(), EngineError> {
        self.begin(EngineCall::SetV2Scanning(enabled), Command::SetScanningModeVersion)?;
        self.lock().v2_scanning = enabled;
        Ok(())
    }

    async fn current_state(&self) -> Result<SessionState, EngineError> {
        self.begin(EngineCall::CurrentState, Command::QueryState)?;
        let gate = self.lock().query_gate.clone();
        if let Some(gate) = gate {
            let permit = gate.acquire().await.map_err(|_| EngineError::Unavailable)?;
            permit.forget();
        }
        Ok(self.state())
    }

    async fn configure_streams(&self, config: StreamConfig) -> Result<(), EngineError> {
        self.begin(EngineCall::ConfigureStreams(config), Command::ConfigureStreams)?;
        self.lock().streams = Some(config);
        Ok(())
    }

    async fn clear_command_hosts(&self) -> Result<(), EngineError> {
        self.begin(EngineCall::ClearCommandHosts, Command::ClearCommandHosts)?;
        self.lock().command_hosts.clear();
        Ok(())
    }

    async fn add_command_host(&self, address: &str) -> Result<(), EngineError> {
        self.begin(
            EngineCall::AddCommandHost(address.to_string()),
            Command::AddCommandHost,
        )?;
        self.lock().command_hosts.push(address.to_string());
        Ok(())
    }

    async fn set_server_host(&self, address: &str) -> Result<(), EngineError> {
        self.begin(
            EngineCall::SetServerHost(address.to_string()),
            Command::SetServerHost,
        )?;
        self.lock().server_host = Some(address.to_string());
        Ok(())
    }

    async fn apply_mesh_operation(&self, op: PipelineOperation) -> Result<(), EngineError> {
        self.begin(EngineCall::ApplyMeshOperation(op), Command::ApplyMeshOperation)
    }

    async fn apply_viewport_edits(&self, commit: bool) -> Result<(), EngineError> {
        self.begin(EngineCall::ApplyViewportEdits(commit), Command::ApplyViewportEdits)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lifecycle_emits_matching_events() {
        // Arrange
        let (engine, mut events) = SimulatedEngine::new();

        // Act
        engine.initialize_scanner(CaptureSource::DepthCamera).await.unwrap();
        engine.start_preview().await.unwrap();
        engine.start_scan().await.unwrap();
        engine.stop_scan().await.unwrap();
        engine.generate_mesh().await.unwrap();

        // Assert
        assert_eq!(events.recv().await, Some(EngineEvent::PreviewStart));
        assert_eq!(events.recv().await, Some(EngineEvent::ScannerStart));
        assert_eq!(events.recv().await, Some(EngineEvent::ScannerStop));
        assert_eq!(events.recv().await, Some(EngineEvent::GenerateMesh));
        assert_eq!(engine.current_state().await, Ok(SessionState::Viewing));
    }

    #[tokio::test]
    async fn test_injected_failure_applies_once() {
        let (engine, _events) = SimulatedEngine::new();
        engine.fail_next(Command::StartPreview, EngineError::Unavailable);

        let first = engine.start_preview().await;
        let second = engine.start_preview().await;

        assert_eq!(first, Err(EngineError::Unavailable));
        assert!(second.is_ok());
        assert_eq!(
            engine.calls(),
            vec![EngineCall::StartPreview, EngineCall::StartPreview]
        );
    }

    #[tokio::test]
    async fn test_suppressed_generate_mesh_emits_nothing() {
        let (engine, mut events) = SimulatedEngine::new();
        engine.suppress_generate_mesh(true);

        engine.generate_mesh().await.unwrap();

        assert!(events.try_recv().is_err());
        assert_eq!(engine.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips_through_file() {
        // Arrange
        let (engine, _events) = SimulatedEngine::new();
        let path = std::env::temp_dir().join(format!("scansession-{}.ply", uuid::Uuid::new_v4()));

        // Act
        engine.save_mesh(&path).await.unwrap();
        let loaded = engine.load_mesh(&path).await;

        // Assert
        assert!(loaded.is_ok());
        assert_eq!(engine.state(), SessionState::Viewing);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_loading_missing_file_is_io_error() {
        let (engine, _events) = SimulatedEngine::new();

        let result = engine
            .load_mesh(Path::new("/nonexistent/scansession/scan.ply"))
            .await;

        assert!(matches!(result, Err(EngineError::Io(_))));
    }

    #[tokio::test]
    async fn test_gated_query_waits_for_permit() {
        // Arrange
        let (engine, _events) = SimulatedEngine::new();
        let engine = Arc::new(engine);
        let gate = engine.gate_state_queries();
        let query = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.current_state().await }
        });
        tokio::task::yield_now().await;
        assert!(!query.is_finished());

        // Act
        gate.add_permits(1);

        // Assert
        let state = query.await.unwrap();
        assert_eq!(state, Ok(SessionState::Uninitialized));
    }
}
