//! Engine events and subscriber notifications.
//!
//! [`EngineEvent`] is the closed set of lifecycle signals a capture engine
//! emits.  [`Notification`] is what the session hands to its subscriber:
//! every forwarded engine event, plus a `StateChanged` for every state query
//! the event bridge delivers.

use serde::{Deserialize, Serialize};

use crate::domain::session::SessionState;

/// A raw event emitted by the native capture engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    /// The engine reported a problem outside any command call.
    Error { message: String },
    /// The render surface has a valid context.  May fire more than once per mount.
    VisualizerReady,
    PreviewStart,
    ScannerStart,
    ScannerReady,
    ScannerStop,
    /// Mesh generation finished; the mesh is now displayed.
    GenerateMesh,
    SaveMesh,
    LoadMesh,
    ExportVolumetricVideo,
    /// A remote device connected to this one.
    ClientConnected { host: String },
    /// A scanner announced itself on the local network.
    HostDiscovered { host: String },
    /// Fraction of the meshing volume in use, 0–100.
    VolumeMemoryUpdate { percent_full: f64 },
    VideoSaved,
    VoxelSizeChanged { size: f64 },
}

impl EngineEvent {
    /// Lifecycle events after which the bridge re-queries the engine's state.
    pub fn triggers_state_query(&self) -> bool {
        matches!(
            self,
            EngineEvent::VisualizerReady
                | EngineEvent::PreviewStart
                | EngineEvent::ScannerStart
                | EngineEvent::ScannerReady
                | EngineEvent::ScannerStop
                | EngineEvent::GenerateMesh
                | EngineEvent::SaveMesh
                | EngineEvent::LoadMesh
                | EngineEvent::ExportVolumetricVideo
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Error { .. } => "error",
            EngineEvent::VisualizerReady => "visualizerReady",
            EngineEvent::PreviewStart => "previewStart",
            EngineEvent::ScannerStart => "scannerStart",
            EngineEvent::ScannerReady => "scannerReady",
            EngineEvent::ScannerStop => "scannerStop",
            EngineEvent::GenerateMesh => "generateMesh",
            EngineEvent::SaveMesh => "saveMesh",
            EngineEvent::LoadMesh => "loadMesh",
            EngineEvent::ExportVolumetricVideo => "exportVolumetricVideo",
            EngineEvent::ClientConnected { .. } => "clientConnected",
            EngineEvent::HostDiscovered { .. } => "hostDiscovered",
            EngineEvent::VolumeMemoryUpdate { .. } => "volumeMemoryUpdate",
            EngineEvent::VideoSaved => "videoSaved",
            EngineEvent::VoxelSizeChanged { .. } => "voxelSizeChanged",
        }
    }
}

/// Delivered to the session's subscriber, in the order the bridge produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum Notification {
    /// An engine event, forwarded as received.
    Event(EngineEvent),
    /// The engine's authoritative state after a lifecycle event.
    StateChanged(SessionState),
}
