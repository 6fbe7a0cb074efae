//! RoleCoordinator: pairs a Mirror device with a Scanner device.
//!
//! The Scanner streams rendered depth data and accepts remote commands; the
//! Mirror receives the render stream and issues the commands.  The role is
//! applied once, before the scanner is initialized, and stays fixed until
//! [`RoleCoordinator::reset`].
//!
//! A Mirror accumulates `hostDiscovered` announcements in a [`PeerSet`] and
//! connects to one of them with [`RoleCoordinator::connect_to_host`].  All
//! engine access goes through the [`ScanSession`] command surface.

use std::net::IpAddr;
use std::time::SystemTime;

use scan_core::{Command, DeviceRole, EngineEvent, NetworkPeer, PeerSet, ScanError};
use tracing::{debug, info, warn};

use crate::application::session_machine::ScanSession;

/// Source of the device's local network address.
#[cfg_attr(test, mockall::automock)]
pub trait AddressResolver: Send + Sync {
    /// The address other devices on the local network can reach, if any.
    fn local_address(&self) -> Option<IpAddr>;
}

/// Role selection, peer discovery and connection handshake.
pub struct RoleCoordinator {
    resolver: Box<dyn AddressResolver>,
    role: Option<DeviceRole>,
    local_address: Option<IpAddr>,
    peers: PeerSet,
    server_host: Option<String>,
}

impl RoleCoordinator {
    pub fn new(resolver: Box<dyn AddressResolver>) -> Self {
        Self {
            resolver,
            role: None,
            local_address: None,
            peers: PeerSet::new(),
            server_host: None,
        }
    }

    pub fn role(&self) -> Option<DeviceRole> {
        self.role
    }

    /// Local address resolved when the role was applied.
    pub fn local_address(&self) -> Option<IpAddr> {
        self.local_address
    }

    pub fn server_host(&self) -> Option<&str> {
        self.server_host.as_deref()
    }

    /// Applies `role`'s stream directions to the engine.
    ///
    /// Must run while the session is still uninitialized.  Setting the same
    /// role again does nothing; a different role fails with `RoleLocked`.
    ///
    /// # Errors
    ///
    /// - `NoNetworkAddress` if the Mirror role is requested and the device
    ///   has no local address.  No role is applied.
    /// - `InvalidStateTransition` if the session is already initialized.
    pub async fn set_role(
        &mut self,
        session: &mut ScanSession,
        role: DeviceRole,
    ) -> Result<(), ScanError> {
        match self.role {
            Some(current) if current == role => {
                debug!("role already {role}");
                return Ok(());
            }
            Some(current) => return Err(ScanError::RoleLocked { current }),
            None => {}
        }
        session.check(Command::ConfigureStreams)?;

        let local_address = self.resolver.local_address();
        if role == DeviceRole::Mirror && local_address.is_none() {
            warn!("mirror setup aborted: no local network address");
            return Err(ScanError::NoNetworkAddress);
        }

        session.configure_streams(role.stream_config()).await?;
        self.role = Some(role);
        self.local_address = local_address;
        match local_address {
            Some(addr) => info!("device role {role} at {addr}"),
            None => info!("device role {role} (no local address)"),
        }
        Ok(())
    }

    /// Updates the peer set from a network event.  Other events are ignored.
    ///
    /// Returns `true` if the peer set changed.
    pub fn observe(&mut self, event: &EngineEvent) -> bool {
        match event {
            EngineEvent::HostDiscovered { host } => {
                if self.role != Some(DeviceRole::Mirror) {
                    debug!("hostDiscovered {host} ignored: not a mirror");
                    return false;
                }
                let added = self.peers.insert_discovered(host, SystemTime::now());
                if added {
                    info!("discovered host {host} ({} known)", self.peers.len());
                }
                added
            }
            EngineEvent::ClientConnected { host } => {
                self.peers.insert_discovered(host, SystemTime::now());
                self.peers.mark_connected(host);
                info!("client connected: {host}");
                true
            }
            _ => false,
        }
    }

    /// Snapshot of every discovered peer.
    pub fn discovered_hosts(&self) -> Vec<NetworkPeer> {
        self.peers.all()
    }

    pub fn clear_known_hosts(&mut self) {
        debug!("clearing {} known hosts", self.peers.len());
        self.peers.clear();
    }

    /// Binds the engine to a discovered Scanner and starts mirroring its preview.
    ///
    /// Order on the engine: clear command hosts, add `address` as command
    /// host, set it as server host, start preview.  No retries.
    ///
    /// Once the old command hosts are cleared, no peer is marked connected
    /// and [`server_host`](Self::server_host) is `None` until the handshake
    /// completes.
    ///
    /// # Errors
    ///
    /// - `NotMirror` unless the Mirror role is applied.
    /// - `UnknownPeer` if `address` is not in the discovered set.
    /// - `InvalidStateTransition` if preview cannot start from the current
    ///   session state; checked before any engine call.
    /// - `ConnectionFailed` wrapping the failed engine call.
    pub async fn connect_to_host(
        &mut self,
        session: &mut ScanSession,
        address: &str,
    ) -> Result<(), ScanError> {
        if self.role != Some(DeviceRole::Mirror) {
            return Err(ScanError::NotMirror);
        }
        if !self.peers.contains(address) {
            return Err(ScanError::UnknownPeer(address.to_string()));
        }
        session.check(Command::StartPreview)?;

        info!("connecting to {address}");
        let wrap = |source: ScanError| ScanError::ConnectionFailed {
            peer: address.to_string(),
            source: Box::new(source),
        };
        session.clear_command_hosts().await.map_err(wrap)?;
        // The engine no longer has any command host from here on.
        self.peers.disconnect_all();
        self.server_host = None;
        session.add_command_host(address).await.map_err(wrap)?;
        session.set_server_host(address).await.map_err(wrap)?;
        session.start_preview().await.map_err(wrap)?;

        self.server_host = Some(address.to_string());
        self.peers.mark_connected(address);
        info!("connected to {address}");
        Ok(())
    }

    /// Points the engine at `address` without the full handshake.
    pub async fn set_server_host(
        &mut self,
        session: &mut ScanSession,
        address: &str,
    ) -> Result<(), ScanError> {
        session.set_server_host(address).await?;
        self.server_host = Some(address.to_string());
        Ok(())
    }

    /// Uninitializes the session and forgets role, peers and server host.
    pub async fn reset(&mut self, session: &mut ScanSession) -> Result<(), ScanError> {
        session.uninitialize_scanner().await?;
        self.role = None;
        self.local_address = None;
        self.server_host = None;
        self.peers.clear();
        info!("network role reset");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
