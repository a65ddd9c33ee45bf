//! Collaborator traits for the wire-level protocol work.
//!
//! Implementations live in lower-level protocol crates (or test mocks);
//! the drivers only care about the transport handed back and the secured
//! identity observed during the handshake.

use async_trait::async_trait;

use hoplink_config::{EndpointConfig, VpnKind};
use hoplink_core::{HopError, Transport};
use hoplink_trust::ObservedIdentity;

/// Result of a protocol-level establishment.
#[derive(Debug, Clone)]
pub struct Established {
    /// The new transport, layered over the underlying one.
    pub transport: Transport,
    /// Identity presented during the handshake, when the protocol is
    /// secured (TLS certificate, SSH host key). `None` for plaintext
    /// proxies.
    pub identity: Option<ObservedIdentity>,
}

/// Performs SOCKS/HTTP CONNECT handshakes over an underlying transport.
#[async_trait]
pub trait ProxyConnector: Send + Sync {
    async fn handshake(
        &self,
        endpoint: &EndpointConfig,
        underlying: &Transport,
    ) -> Result<Established, HopError>;

    async fn close(&self, transport: &Transport);
}

/// SSH session operations, one per chaining method.
///
/// Every operation performs a host-key exchange and must report the
/// observed key in [`Established::identity`].
#[async_trait]
pub trait SshClient: Send + Sync {
    /// Negotiate a single jump-aware session (ProxyJump).
    async fn jump_session(
        &self,
        endpoint: &EndpointConfig,
        underlying: &Transport,
    ) -> Result<Established, HopError>;

    /// Spawn and stream through an external command.
    async fn proxy_command(
        &self,
        endpoint: &EndpointConfig,
        underlying: &Transport,
    ) -> Result<Established, HopError>;

    /// Open a session within an existing session.
    async fn nested_session(
        &self,
        endpoint: &EndpointConfig,
        underlying: &Transport,
    ) -> Result<Established, HopError>;

    /// Open a local forward and return a transport bound to it.
    async fn local_forward(
        &self,
        endpoint: &EndpointConfig,
        underlying: &Transport,
    ) -> Result<Established, HopError>;

    /// Stand up a SOCKS endpoint over the session.
    async fn dynamic_socks(
        &self,
        endpoint: &EndpointConfig,
        underlying: &Transport,
    ) -> Result<Established, HopError>;

    /// Pipe raw bytes over stdio.
    async fn stdio_pipe(
        &self,
        endpoint: &EndpointConfig,
        underlying: &Transport,
    ) -> Result<Established, HopError>;

    /// Jump session that additionally propagates agent signing capability
    /// to the far end.
    async fn agent_forward(
        &self,
        endpoint: &EndpointConfig,
        underlying: &Transport,
    ) -> Result<Established, HopError>;

    async fn close(&self, transport: &Transport);
}

/// Brings VPN tunnel interfaces up and down.
#[async_trait]
pub trait VpnController: Send + Sync {
    /// Bring the tunnel up. The returned transport must be ambient:
    /// subsequent traffic routes through the OS network stack.
    async fn bring_up(
        &self,
        kind: VpnKind,
        endpoint: &EndpointConfig,
    ) -> Result<Transport, HopError>;

    async fn tear_down(&self, transport: &Transport);
}
