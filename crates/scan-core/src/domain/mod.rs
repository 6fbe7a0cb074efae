//! Domain entities for scan session coordination.
//!
//! Nothing in here performs I/O.  The types carry the invariants the
//! session state machine relies on (e.g. only role presets produce a
//! [`role::StreamConfig`], a [`mesh::MeshArtifact`] records the cleanup
//! operations applied to it) so they can be tested without an engine.

pub mod mesh;
pub mod params;
pub mod peer;
pub mod role;
pub mod session;
