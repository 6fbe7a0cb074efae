//! Session phase and capture source.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The single active phase of a scanning session.
///
/// ```text
/// Uninitialized ──► Initialized ──► Previewing ──► Scanning ──► Viewing
///       ▲                               ▲                          │
///       └──────── uninitialize ─────────┴──── start_preview ───────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No scanner resources are held.
    #[default]
    Uninitialized,
    /// The scanner is set up but not streaming.
    Initialized,
    /// Depth preview is streaming to the visualizer.
    Previewing,
    /// Live meshing is running (or a mesh has been requested after stopping).
    Scanning,
    /// A finished mesh is displayed and can be cleaned up and saved.
    Viewing,
}

impl SessionState {
    /// Returns `true` while the camera is capturing, i.e. while loading a
    /// stored mesh would corrupt the session.
    pub fn is_capturing(self) -> bool {
        matches!(self, SessionState::Previewing | SessionState::Scanning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initialized => "initialized",
            SessionState::Previewing => "previewing",
            SessionState::Scanning => "scanning",
            SessionState::Viewing => "viewing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an engine reports a state name this crate does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scan state: {0:?}")]
pub struct ParseStateError(pub String);

impl FromStr for SessionState {
    type Err = ParseStateError;

    /// Parses the state names native engines report.  Matching is
    /// case-insensitive and accepts both `PREVIEW` and `PREVIEWING` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uninitialized" => Ok(SessionState::Uninitialized),
            "initialized" => Ok(SessionState::Initialized),
            "preview" | "previewing" => Ok(SessionState::Previewing),
            "scanning" => Ok(SessionState::Scanning),
            "viewing" => Ok(SessionState::Viewing),
            _ => Err(ParseStateError(s.to_string())),
        }
    }
}

/// Which capture source `initialize_scanner` should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    /// The device's own depth camera.
    #[default]
    DepthCamera,
    /// Frames streamed from a paired scanner device.
    NetworkMirror,
}
