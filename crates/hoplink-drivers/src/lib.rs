//! Hop drivers: one strategy object per chain layer type.
//!
//! Each driver knows how to establish and tear down its specific
//! transport behind the uniform [`HopDriver`] contract. Wire-level
//! protocol work (SOCKS/HTTP CONNECT handshakes, SSH sessions, VPN
//! interfaces) is delegated to the connector collaborator traits in
//! [`connectors`]; the drivers own layering, method branching, and the
//! identity trust gate that every secured handshake must pass before its
//! transport is returned.

mod connectors;
mod driver;
mod proxy;
mod ssh;
mod trust_gate;
mod vpn;

#[cfg(test)]
mod test_support;

pub use connectors::{Established, ProxyConnector, SshClient, VpnController};
pub use driver::{DriverRegistry, HopDriver, HopSpec};
pub use proxy::ProxyDriver;
pub use ssh::SshDriver;
pub use trust_gate::TrustGate;
pub use vpn::VpnDriver;
