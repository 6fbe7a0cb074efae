//! Storage infrastructure: configuration file and stored meshes.
//!
//! - `config` reads and writes the TOML configuration from the platform
//!   config directory, falling back to defaults on first run.
//! - `mesh_store` names, prepares and enumerates `.ply` files under a
//!   store root.

pub mod config;
pub mod mesh_store;
