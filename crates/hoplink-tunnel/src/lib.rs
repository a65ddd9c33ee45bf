//! Standalone SSH port-forward management.
//!
//! Tunnels (`local`, `remote`, `dynamic`) ride already-established SSH
//! sessions and live independently of the chain abstraction. The manager
//! owns their lifecycle and the ephemeral local ports they bind.

mod forwarder;
mod manager;
mod ports;
mod types;

pub use forwarder::SshForwarder;
pub use manager::{TunnelEvent, TunnelManager, TunnelSnapshot};
pub use ports::{EphemeralPortAllocator, PortAllocator};
pub use types::{SshTunnel, TunnelKind, TunnelStatus};
