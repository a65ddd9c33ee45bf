//! Collaborator seam to the SSH forwarding implementation.

use async_trait::async_trait;

use hoplink_core::{HopError, Transport};

/// Opens and closes port forwards on an established SSH session.
///
/// The wire-level work (channel open, listener binding) lives behind
/// this trait; the manager only tracks the returned handles.
#[async_trait]
pub trait SshForwarder: Send + Sync {
    /// Listen on `local_port` and forward to `remote_host:remote_port`.
    async fn open_local(
        &self,
        ssh_connection_id: &str,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Transport, HopError>;

    /// Ask the peer to listen on `remote_port` and forward back to the
    /// local `local_port`.
    async fn open_remote(
        &self,
        ssh_connection_id: &str,
        remote_port: u16,
        local_port: u16,
    ) -> Result<Transport, HopError>;

    /// Stand a SOCKS endpoint up on `local_port`.
    async fn open_dynamic(
        &self,
        ssh_connection_id: &str,
        local_port: u16,
    ) -> Result<Transport, HopError>;

    /// Close a previously opened forward.
    async fn close(&self, handle: &Transport);
}
