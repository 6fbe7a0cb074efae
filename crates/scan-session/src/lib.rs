//! scan-session library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does scan-session do?
//!
//! It sits between an application and a native 3D-capture engine:
//!
//! 1. The application issues commands (`start_preview`, `start_scan`, …) to
//!    the [`application::session_machine::ScanSession`], which validates them
//!    against the current phase before calling the engine.
//! 2. The engine answers asynchronously with lifecycle events.  The
//!    [`application::event_bridge::EventBridge`] forwards each one to the
//!    subscriber and, for lifecycle events, asks the engine for its
//!    authoritative state.
//! 3. For two-device sessions the
//!    [`application::network_roles::RoleCoordinator`] configures this device as
//!    Mirror or Scanner and manages discovered peers.
//! 4. After scanning, a [`application::mesh_pipeline::MeshPipeline`] applies
//!    cleanup steps to the mesh before it is saved.

/// Application layer: use cases that depend only on the engine trait.
pub mod application;

/// Infrastructure layer: simulated engine, address probing, config, mesh store.
pub mod infrastructure;
