//! Error taxonomy for scan session coordination.
//!
//! Every failure is returned to the caller as a labeled value; nothing here
//! is retried automatically.  A failed command leaves the last valid state
//! and artifact unchanged, with one exception: [`ScanError::PipelineStepFailed`]
//! keeps the results of the steps that ran before it.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::mesh::PipelineOperation;
use crate::domain::role::DeviceRole;
use crate::domain::session::SessionState;

/// Names of the commands the session accepts, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    InitializeScanner,
    UninitializeScanner,
    StartPreview,
    StartScan,
    StopScan,
    GenerateMesh,
    SaveScan,
    LoadMesh,
    SetScanParameters,
    SetScanningModeVersion,
    ConfigureStreams,
    ClearCommandHosts,
    AddCommandHost,
    SetServerHost,
    ApplyMeshOperation,
    ApplyViewportEdits,
    QueryState,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::InitializeScanner => "initializeScanner",
            Command::UninitializeScanner => "uninitializeScanner",
            Command::StartPreview => "startPreview",
            Command::StartScan => "startScan",
            Command::StopScan => "stopScan",
            Command::GenerateMesh => "generateMesh",
            Command::SaveScan => "saveScan",
            Command::LoadMesh => "loadMesh",
            Command::SetScanParameters => "setScanParameters",
            Command::SetScanningModeVersion => "setScanningModeVersion",
            Command::ConfigureStreams => "configureStreams",
            Command::ClearCommandHosts => "clearCommandHosts",
            Command::AddCommandHost => "addCommandHost",
            Command::SetServerHost => "setServerHost",
            Command::ApplyMeshOperation => "applyMeshOperation",
            Command::ApplyViewportEdits => "applyViewportEdits",
            Command::QueryState => "getCurrentScanState",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by the native engine for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine refused or failed the request.
    #[error("engine rejected the request: {0}")]
    Rejected(String),
    /// The engine is not mounted or has been torn down.
    #[error("engine unavailable")]
    Unavailable,
    /// The engine could not read or write a mesh file.
    #[error("engine I/O failure: {0}")]
    Io(String),
}

/// Every failure a session, coordinator, or pipeline call can return.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The command is not valid from the current state; nothing was changed.
    #[error("{command} is not valid while {from}")]
    InvalidStateTransition { command: Command, from: SessionState },

    /// The engine failed the call; the session stays in its prior state.
    #[error("engine call {operation} failed: {source}")]
    EngineCallFailed {
        operation: Command,
        #[source]
        source: EngineError,
    },

    /// The device has no local network address (Mirror setup).
    #[error("no local network address available")]
    NoNetworkAddress,

    /// Binding or previewing from a discovered peer failed.
    #[error("connection to {peer} failed: {source}")]
    ConnectionFailed {
        peer: String,
        #[source]
        source: Box<ScanError>,
    },

    /// One cleanup step failed; steps before it remain applied.
    #[error("pipeline step {step} ({operation}) failed: {source}")]
    PipelineStepFailed {
        step: usize,
        operation: PipelineOperation,
        #[source]
        source: Box<ScanError>,
    },

    /// A parameter was rejected before reaching the engine.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The device role is fixed until the coordinator is reset.
    #[error("device role already set to {current}; reset the session to change it")]
    RoleLocked { current: DeviceRole },

    /// A connection needs the Mirror role.
    #[error("operation requires the mirror role")]
    NotMirror,

    /// The address was never discovered (or the set was cleared).
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// Viewing-only operation without a mesh artifact.
    #[error("no active mesh artifact")]
    NoActiveArtifact,

    /// Re-save requested for a mesh that has no file yet.
    #[error("mesh has not been saved yet")]
    NotSaved,

    /// The mesh store could not prepare or enumerate a path.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    pub fn engine(operation: Command, source: EngineError) -> Self {
        ScanError::EngineCallFailed { operation, source }
    }

    pub fn invalid_transition(command: Command, from: SessionState) -> Self {
        ScanError::InvalidStateTransition { command, from }
    }
}
