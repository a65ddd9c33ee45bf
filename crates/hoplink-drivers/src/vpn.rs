//! VPN hop driver for the `openvpn` and `wireguard` layer kinds.
//!
//! VPN hops do not chain byte-streams: establishing one brings a tunnel
//! interface up and returns an ambient transport, meaning subsequent hops
//! route through the OS network stack.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use hoplink_config::{LayerKind, VpnKind};
use hoplink_core::{HopError, Transport};

use crate::connectors::VpnController;
use crate::driver::{HopDriver, HopSpec};

pub struct VpnDriver {
    controller: Arc<dyn VpnController>,
}

impl VpnDriver {
    pub fn new(controller: Arc<dyn VpnController>) -> Self {
        Self { controller }
    }

    fn vpn_kind(kind: LayerKind) -> Result<VpnKind, HopError> {
        match kind {
            LayerKind::Openvpn => Ok(VpnKind::Openvpn),
            LayerKind::Wireguard => Ok(VpnKind::Wireguard),
            other => Err(HopError::HandshakeFailed(format!(
                "vpn driver cannot establish {other:?} layers"
            ))),
        }
    }
}

#[async_trait]
impl HopDriver for VpnDriver {
    async fn establish(&self, spec: &HopSpec, input: Transport) -> Result<Transport, HopError> {
        let kind = Self::vpn_kind(spec.kind)?;

        debug!(
            chain = %spec.chain_id,
            position = spec.position,
            host = %spec.endpoint.host,
            ?kind,
            "bringing vpn tunnel up"
        );

        // A VPN hop cannot ride a literal byte-stream from a previous hop.
        if !input.is_raw() && !input.is_ambient() {
            warn!(
                chain = %spec.chain_id,
                position = spec.position,
                input = %input,
                "vpn hop cannot consume a stream transport; routing via OS stack"
            );
        }

        let transport = self.controller.bring_up(kind, &spec.endpoint).await?;
        if !transport.is_ambient() {
            self.controller.tear_down(&transport).await;
            return Err(HopError::HandshakeFailed(format!(
                "vpn controller for {} returned a non-ambient transport",
                spec.endpoint.host
            )));
        }
        Ok(transport)
    }

    async fn teardown(&self, transport: &Transport) {
        self.controller.tear_down(transport).await;
    }
}

impl std::fmt::Debug for VpnDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VpnDriver").finish_non_exhaustive()
    }
}
