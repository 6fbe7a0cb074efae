//! # scan-core
//!
//! Shared domain vocabulary for coordinating a 3D-scanning session: the
//! session phases, device roles and their stream presets, scan parameters,
//! the mesh artifact and its cleanup operations, discovered network peers,
//! the closed union of engine events, and the error taxonomy.
//!
//! This crate has no async runtime, no sockets, and no file-system access.
//! Everything that talks to the capture engine or the network lives in
//! `scan-session`.
//!
//! # Architecture overview
//!
//! A scanning session drives a native capture engine through
//! `Uninitialized → Initialized → Previewing → Scanning → Viewing`.  The
//! engine answers asynchronously with lifecycle events; `scan-session`
//! normalizes those events into [`Notification`]s and state transitions.
//!
//! - **`domain`** – plain data types and their invariants.
//! - **`events`** – [`EngineEvent`] (what the engine emits) and
//!   [`Notification`] (what subscribers receive).
//! - **`error`** – [`ScanError`], [`EngineError`], and the [`Command`] names
//!   used to label failures.

pub mod domain;
pub mod error;
pub mod events;

pub use domain::mesh::{ArtifactOrigin, MeshArtifact, PipelineOperation};
pub use domain::params::{ScanParameters, ScanningModeVersion};
pub use domain::peer::{NetworkPeer, PeerSet};
pub use domain::role::{DeviceRole, StreamConfig};
pub use domain::session::{CaptureSource, ParseStateError, SessionState};
pub use error::{Command, EngineError, ScanError};
pub use events::{EngineEvent, Notification};
