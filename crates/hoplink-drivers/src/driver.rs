//! The uniform hop driver contract and per-kind driver lookup.

use std::sync::Arc;

use async_trait::async_trait;

use hoplink_config::{EndpointConfig, LayerKind, SshChainingMethod};
use hoplink_core::{HopError, Transport};
use hoplink_trust::TrustScope;

/// Everything a driver needs to establish one hop: the resolved endpoint
/// plus the layer's identity for logging and trust scoping.
#[derive(Debug, Clone)]
pub struct HopSpec {
    pub chain_id: String,
    pub position: u32,
    pub kind: LayerKind,
    pub endpoint: EndpointConfig,
    /// Only meaningful for ssh layer kinds; drivers fall back to the
    /// kind's default method when unset.
    pub ssh_method: Option<SshChainingMethod>,
    /// Connection this chain is associated with, if any. Determines the
    /// trust scope for identity verification.
    pub connection_id: Option<String>,
}

impl HopSpec {
    /// The trust scope identity checks for this hop resolve against.
    pub fn trust_scope(&self) -> TrustScope {
        match &self.connection_id {
            Some(id) => TrustScope::Connection(id.clone()),
            None => TrustScope::Global,
        }
    }
}

/// Uniform establish/teardown capability implemented per layer type.
#[async_trait]
pub trait HopDriver: Send + Sync {
    /// Establish this hop's transport over `input`.
    ///
    /// Drivers whose handshake includes certificate or host-key exchange
    /// resolve the identity-trust decision before returning; a final
    /// rejection surfaces as [`HopError::IdentityRejected`].
    async fn establish(&self, spec: &HopSpec, input: Transport) -> Result<Transport, HopError>;

    /// Tear an established transport down, releasing its resources.
    async fn teardown(&self, transport: &Transport);
}

/// Per-kind driver lookup used by the chain executor.
#[derive(Clone)]
pub struct DriverRegistry {
    proxy: Arc<dyn HopDriver>,
    ssh: Arc<dyn HopDriver>,
    vpn: Arc<dyn HopDriver>,
}

impl DriverRegistry {
    pub fn new(
        proxy: Arc<dyn HopDriver>,
        ssh: Arc<dyn HopDriver>,
        vpn: Arc<dyn HopDriver>,
    ) -> Self {
        Self { proxy, ssh, vpn }
    }

    pub fn driver_for(&self, kind: LayerKind) -> Arc<dyn HopDriver> {
        match kind {
            LayerKind::Proxy => self.proxy.clone(),
            LayerKind::Openvpn | LayerKind::Wireguard => self.vpn.clone(),
            LayerKind::SshTunnel | LayerKind::SshJump | LayerKind::SshProxycmd => self.ssh.clone(),
        }
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry").finish_non_exhaustive()
    }
}
