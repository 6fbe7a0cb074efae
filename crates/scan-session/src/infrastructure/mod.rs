//! Infrastructure layer for scan sessions.
//!
//! Contains the adapters the application layer is written against: a
//! simulated capture engine, the local-address probe used for Mirror setup,
//! TOML configuration, and the on-disk mesh store.
//!
//! **Dependency rule**: this layer may depend on `application` and `scan_core`,
//! but MUST NOT be imported by the `application` or domain layers.

pub mod engine;
pub mod network;
pub mod storage;
