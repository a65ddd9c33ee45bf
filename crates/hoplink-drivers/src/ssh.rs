//! SSH hop driver for the `ssh-tunnel`, `ssh-jump` and `ssh-proxycmd`
//! layer kinds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use hoplink_config::{LayerKind, SshChainingMethod};
use hoplink_core::{HopError, Transport};
use hoplink_trust::IdentityType;

use crate::connectors::{Established, SshClient};
use crate::driver::{HopDriver, HopSpec};
use crate::trust_gate::TrustGate;

/// Establishes SSH hops, branching on the layer's chaining method.
///
/// Host-key verification is mandatory: a connector that fails to report
/// the observed key is treated as a failed handshake.
pub struct SshDriver {
    client: Arc<dyn SshClient>,
    gate: Arc<TrustGate>,
}

impl SshDriver {
    pub fn new(client: Arc<dyn SshClient>, gate: Arc<TrustGate>) -> Self {
        Self { client, gate }
    }

    /// The method an ssh layer uses when none is configured.
    fn default_method(kind: LayerKind) -> SshChainingMethod {
        match kind {
            LayerKind::SshJump => SshChainingMethod::Proxyjump,
            LayerKind::SshProxycmd => SshChainingMethod::Proxycommand,
            // ssh-tunnel and anything unexpected default to a local forward.
            _ => SshChainingMethod::LocalForward,
        }
    }
}

#[async_trait]
impl HopDriver for SshDriver {
    async fn establish(&self, spec: &HopSpec, input: Transport) -> Result<Transport, HopError> {
        let method = spec
            .ssh_method
            .unwrap_or_else(|| Self::default_method(spec.kind));

        debug!(
            chain = %spec.chain_id,
            position = spec.position,
            host = %spec.endpoint.host,
            ?method,
            "establishing ssh hop"
        );

        let established: Established = match method {
            SshChainingMethod::Proxyjump => self.client.jump_session(&spec.endpoint, &input).await,
            SshChainingMethod::Proxycommand => {
                self.client.proxy_command(&spec.endpoint, &input).await
            }
            SshChainingMethod::NestedSsh => {
                self.client.nested_session(&spec.endpoint, &input).await
            }
            SshChainingMethod::LocalForward => {
                self.client.local_forward(&spec.endpoint, &input).await
            }
            SshChainingMethod::DynamicSocks => {
                self.client.dynamic_socks(&spec.endpoint, &input).await
            }
            SshChainingMethod::Stdio => self.client.stdio_pipe(&spec.endpoint, &input).await,
            SshChainingMethod::AgentForward => {
                self.client.agent_forward(&spec.endpoint, &input).await
            }
        }?;

        let identity = established.identity.as_ref().ok_or_else(|| {
            HopError::HandshakeFailed(format!(
                "ssh connector for {} reported no host key",
                spec.endpoint.host
            ))
        })?;

        if let Err(e) = self
            .gate
            .check(
                &spec.endpoint.host,
                spec.endpoint.port,
                IdentityType::Ssh,
                identity,
                spec.connection_id.as_deref(),
            )
            .await
        {
            self.client.close(&established.transport).await;
            return Err(e);
        }

        Ok(established.transport)
    }

    async fn teardown(&self, transport: &Transport) {
        self.client.close(transport).await;
    }
}

impl std::fmt::Debug for SshDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshDriver").finish_non_exhaustive()
    }
}
