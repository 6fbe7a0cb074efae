//! Facade over the native capture engine.
//!
//! The engine is a black box with an async command surface and an async
//! event stream.  Implementations live in the infrastructure layer (the
//! simulated engine) or wrap a platform SDK; the session only ever sees this
//! trait, held inside an [`EngineContext`] that is passed explicitly to
//! whoever needs it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use scan_core::{CaptureSource, EngineError, PipelineOperation, SessionState, StreamConfig};

/// Async command surface of a native capture engine.
///
/// Every call may suspend and every call fails independently.  Lifecycle
/// results (preview started, mesh generated, …) arrive later as
/// [`scan_core::EngineEvent`]s on the engine's event stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScanEngine: Send + Sync {
    async fn initialize_scanner(&self, source: CaptureSource) -> Result<(), EngineError>;
    async fn uninitialize_scanner(&self) -> Result<(), EngineError>;
    async fn start_preview(&self) -> Result<(), EngineError>;
    async fn start_scan(&self) -> Result<(), EngineError>;
    async fn stop_scan(&self) -> Result<(), EngineError>;

    /// Requests mesh generation.  Completion is signalled by a `GenerateMesh` event.
    async fn generate_mesh(&self) -> Result<(), EngineError>;

    async fn save_mesh(&self, path: &Path) -> Result<(), EngineError>;
    async fn load_mesh(&self, path: &Path) -> Result<(), EngineError>;

    /// Sets the voxel size, already converted to engine units (meters).
    async fn set_voxel_size(&self, engine_units: f64) -> Result<(), EngineError>;
    async fn set_v2_scanning(&self, enabled: bool) -> Result<(), EngineError>;

    /// The engine's authoritative session state.
    async fn current_state(&self) -> Result<SessionState, EngineError>;

    async fn configure_streams(&self, config: StreamConfig) -> Result<(), EngineError>;
    async fn clear_command_hosts(&self) -> Result<(), EngineError>;
    async fn add_command_host(&self, address: &str) -> Result<(), EngineError>;
    async fn set_server_host(&self, address: &str) -> Result<(), EngineError>;

    /// Applies one destructive cleanup step to the engine's in-memory mesh.
    async fn apply_mesh_operation(&self, op: PipelineOperation) -> Result<(), EngineError>;

    /// Commits (`true`) or discards (`false`) pending viewport edits.
    async fn apply_viewport_edits(&self, commit: bool) -> Result<(), EngineError>;
}

/// Owned handle to the one engine instance of a process.
///
/// Cloning shares the same engine; dropping the last clone releases it.
#[derive(Clone)]
pub struct EngineContext {
    engine: Arc<dyn ScanEngine>,
}

impl EngineContext {
    pub fn new(engine: Arc<dyn ScanEngine>) -> Self {
        Self { engine }
    }

    pub fn get(&self) -> &dyn ScanEngine {
        self.engine.as_ref()
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext").finish_non_exhaustive()
    }
}
