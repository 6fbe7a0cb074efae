//! Application layer use cases for scan sessions.
//!
//! Use cases in this layer orchestrate domain types from `scan_core` and
//! depend only on the [`engine::ScanEngine`] trait, never on a concrete
//! engine, socket, or file format.
//!
//! # Sub-modules
//!
//! - **`engine`** – The facade trait over the native capture engine and the
//!   explicit [`engine::EngineContext`] that owns it.
//!
//! - **`event_bridge`** – Forwards raw engine events to the subscriber and
//!   issues coalesced state queries after lifecycle events.
//!
//! - **`session_machine`** – The single source of truth for the session
//!   phase.  Validates every command against the current state.
//!
//! - **`network_roles`** – Mirror/Scanner configuration, peer discovery, and
//!   connecting to a discovered scanner.
//!
//! - **`mesh_pipeline`** – Ordered, non-transactional mesh cleanup.

pub mod engine;
pub mod event_bridge;
pub mod mesh_pipeline;
pub mod network_roles;
pub mod session_machine;
