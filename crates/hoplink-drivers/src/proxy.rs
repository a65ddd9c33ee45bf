//! Proxy hop driver (SOCKS / HTTP CONNECT).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use hoplink_core::{HopError, Transport};
use hoplink_trust::IdentityType;

use crate::connectors::ProxyConnector;
use crate::driver::{HopDriver, HopSpec};
use crate::trust_gate::TrustGate;

/// Establishes proxy hops by running the protocol handshake over the
/// underlying transport. When the proxy endpoint is secured (e.g. an
/// HTTPS proxy), the observed certificate passes the trust gate before
/// the layered transport is returned.
pub struct ProxyDriver {
    connector: Arc<dyn ProxyConnector>,
    gate: Arc<TrustGate>,
}

impl ProxyDriver {
    pub fn new(connector: Arc<dyn ProxyConnector>, gate: Arc<TrustGate>) -> Self {
        Self { connector, gate }
    }
}

#[async_trait]
impl HopDriver for ProxyDriver {
    async fn establish(&self, spec: &HopSpec, input: Transport) -> Result<Transport, HopError> {
        debug!(
            chain = %spec.chain_id,
            position = spec.position,
            host = %spec.endpoint.host,
            port = spec.endpoint.port,
            "establishing proxy hop"
        );

        let established = self.connector.handshake(&spec.endpoint, &input).await?;

        if let Some(identity) = &established.identity {
            if let Err(e) = self
                .gate
                .check(
                    &spec.endpoint.host,
                    spec.endpoint.port,
                    IdentityType::Tls,
                    identity,
                    spec.connection_id.as_deref(),
                )
                .await
            {
                // The transport is half-established; do not leak it.
                self.connector.close(&established.transport).await;
                return Err(e);
            }
        }

        Ok(established.transport)
    }

    async fn teardown(&self, transport: &Transport) {
        self.connector.close(transport).await;
    }
}

impl std::fmt::Debug for ProxyDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyDriver").finish_non_exhaustive()
    }
}
