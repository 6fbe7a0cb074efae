//! Local network address resolution.
//!
//! [`UdpProbeResolver`] asks the OS routing table which interface would be
//! used to reach a public address.  Connecting a UDP socket only selects a
//! route; no datagram is sent, so the probe works without connectivity to
//! the target as long as a route exists.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use tracing::debug;

use crate::application::network_roles::AddressResolver;

/// Default probe target.  Any routable address works.
const DEFAULT_PROBE_TARGET: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);

/// Resolves the address of the interface that routes to `target`.
#[derive(Debug, Clone)]
pub struct UdpProbeResolver {
    target: SocketAddr,
}

impl UdpProbeResolver {
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }

    fn probe(&self) -> std::io::Result<IpAddr> {
        let bind: SocketAddr = match self.target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind)?;
        socket.connect(self.target)?;
        Ok(socket.local_addr()?.ip())
    }
}

impl Default for UdpProbeResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TARGET)
    }
}

impl AddressResolver for UdpProbeResolver {
    fn local_address(&self) -> Option<IpAddr> {
        match self.probe() {
            Ok(ip) if is_usable(ip) => Some(ip),
            Ok(ip) => {
                debug!("route probe returned unusable address {ip}");
                None
            }
            Err(e) => {
                debug!("route probe to {} failed: {e}", self.target);
                None
            }
        }
    }
}

/// A fixed answer, for configured addresses and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAddressResolver(pub Option<IpAddr>);

impl AddressResolver for StaticAddressResolver {
    fn local_address(&self) -> Option<IpAddr> {
        self.0
    }
}

/// Peers cannot reach a loopback or unspecified address.
fn is_usable(ip: IpAddr) -> bool {
    !ip.is_loopback() && !ip.is_unspecified()
}
