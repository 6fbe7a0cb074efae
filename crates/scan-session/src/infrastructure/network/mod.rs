//! Network infrastructure: local address resolution for Mirror setup.

pub mod local_address;

pub use local_address::{StaticAddressResolver, UdpProbeResolver};
