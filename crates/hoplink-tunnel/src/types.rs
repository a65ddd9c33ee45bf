//! Tunnel record shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Forwarding direction of an SSH tunnel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TunnelKind {
    /// Listen locally, forward to `remote_host:remote_port`.
    Local,
    /// Ask the SSH peer to listen on `remote_port` and forward back to
    /// the local `local_port`.
    Remote,
    /// Stand a local SOCKS endpoint up on `local_port`.
    Dynamic,
}

/// A standalone SSH port-forward riding an established SSH session,
/// independent of any chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SshTunnel {
    pub id: String,
    pub name: String,
    /// The SSH session this tunnel rides on.
    pub ssh_connection_id: String,
    pub kind: TunnelKind,
    /// Zero requests an ephemeral port, resolved at connect time.
    #[serde(default)]
    pub local_port: u16,
    /// Absent for `dynamic` tunnels.
    #[serde(default)]
    pub remote_host: Option<String>,
    #[serde(default)]
    pub remote_port: Option<u16>,
}

/// Per-tunnel state machine: `disconnected -> connecting -> connected |
/// error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TunnelStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TunnelStatus::Disconnected => "disconnected",
            TunnelStatus::Connecting => "connecting",
            TunnelStatus::Connected => "connected",
            TunnelStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_deserializes_with_optional_remote() {
        let t: SshTunnel = serde_json::from_str(
            r#"{
                "id": "t1",
                "name": "socks",
                "ssh_connection_id": "conn-1",
                "kind": "dynamic",
                "local_port": 1080
            }"#,
        )
        .unwrap();
        assert_eq!(t.kind, TunnelKind::Dynamic);
        assert!(t.remote_host.is_none());
        assert!(t.remote_port.is_none());
    }
}
