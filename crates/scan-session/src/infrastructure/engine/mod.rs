//! Engine adapters.
//!
//! Only the simulated engine lives here.  A platform SDK binding would sit
//! next to it and implement the same `ScanEngine` trait.

pub mod simulated;

pub use simulated::{EngineCall, SimulatedEngine};
