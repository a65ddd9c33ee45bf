//! Lifecycle management for standalone SSH tunnels.
//!
//! Tunnels connect and disconnect independently of each other and of any
//! chain. An ephemeral local port allocated at connect time is released
//! when the tunnel disconnects or is deleted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use hoplink_core::defaults::{DEFAULT_EVENT_CAPACITY, DEFAULT_TUNNEL_CONNECT_TIMEOUT_MS};
use hoplink_core::{HopError, Transport};

use crate::forwarder::SshForwarder;
use crate::ports::PortAllocator;
use crate::types::{SshTunnel, TunnelKind, TunnelStatus};

/// Status transition on the tunnel event stream.
#[derive(Debug, Clone)]
pub struct TunnelEvent {
    pub tunnel_id: String,
    pub status: TunnelStatus,
}

/// Read-only view of one managed tunnel.
#[derive(Debug, Clone)]
pub struct TunnelSnapshot {
    pub config: SshTunnel,
    pub status: TunnelStatus,
    pub actual_local_port: Option<u16>,
    pub error: Option<String>,
}

struct TunnelEntry {
    config: SshTunnel,
    status: TunnelStatus,
    actual_local_port: Option<u16>,
    ephemeral: bool,
    handle: Option<Transport>,
    error: Option<String>,
}

impl TunnelEntry {
    fn new(config: SshTunnel) -> Self {
        Self {
            config,
            status: TunnelStatus::Disconnected,
            actual_local_port: None,
            ephemeral: false,
            handle: None,
            error: None,
        }
    }

    fn snapshot(&self) -> TunnelSnapshot {
        TunnelSnapshot {
            config: self.config.clone(),
            status: self.status,
            actual_local_port: self.actual_local_port,
            error: self.error.clone(),
        }
    }
}

/// Manages standalone SSH port-forward resources.
pub struct TunnelManager {
    forwarder: Arc<dyn SshForwarder>,
    ports: Arc<dyn PortAllocator>,
    connect_timeout: Duration,
    events: broadcast::Sender<TunnelEvent>,
    tunnels: Mutex<HashMap<String, TunnelEntry>>,
}

impl TunnelManager {
    pub fn new(forwarder: Arc<dyn SshForwarder>, ports: Arc<dyn PortAllocator>) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            forwarder,
            ports,
            connect_timeout: Duration::from_millis(DEFAULT_TUNNEL_CONNECT_TIMEOUT_MS),
            events,
            tunnels: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.events.subscribe()
    }

    /// Register a tunnel. Config updates are ignored while the tunnel is
    /// connecting or connected.
    pub fn create(&self, config: SshTunnel) {
        let mut tunnels = self.tunnels.lock();
        match tunnels.get_mut(&config.id) {
            Some(entry) if entry.status != TunnelStatus::Disconnected => {
                warn!(tunnel = %config.id, "ignoring config update for an active tunnel");
            }
            Some(entry) => entry.config = config,
            None => {
                tunnels.insert(config.id.clone(), TunnelEntry::new(config));
            }
        }
    }

    pub fn list(&self) -> Vec<TunnelSnapshot> {
        let mut out: Vec<TunnelSnapshot> =
            self.tunnels.lock().values().map(TunnelEntry::snapshot).collect();
        out.sort_by(|a, b| a.config.id.cmp(&b.config.id));
        out
    }

    pub fn status(&self, id: &str) -> Option<TunnelStatus> {
        self.tunnels.lock().get(id).map(|e| e.status)
    }

    /// The port the tunnel is actually bound to, once connected.
    pub fn actual_local_port(&self, id: &str) -> Option<u16> {
        self.tunnels.lock().get(id).and_then(|e| e.actual_local_port)
    }

    /// Connect the tunnel, returning the bound local port.
    ///
    /// A `local_port` of zero requests an ephemeral port for `local` and
    /// `dynamic` tunnels; `remote` tunnels must name their local target
    /// explicitly.
    pub async fn connect(&self, id: &str) -> Result<u16, HopError> {
        let config = {
            let mut tunnels = self.tunnels.lock();
            let entry = tunnels
                .get_mut(id)
                .ok_or_else(|| HopError::ProfileNotFound(id.to_string()))?;
            match entry.status {
                TunnelStatus::Connected => {
                    return Ok(entry.actual_local_port.unwrap_or(entry.config.local_port))
                }
                TunnelStatus::Connecting => {
                    return Err(HopError::HandshakeFailed(format!(
                        "tunnel {id} is already connecting"
                    )))
                }
                _ => {}
            }
            entry.status = TunnelStatus::Connecting;
            entry.error = None;
            entry.config.clone()
        };
        self.emit(id, TunnelStatus::Connecting);

        if let Err(e) = validate(&config) {
            self.fail(id, &e);
            return Err(e);
        }

        let (port, ephemeral) = if config.local_port == 0 {
            match self.ports.allocate() {
                Ok(port) => {
                    debug!(tunnel = %id, port, "allocated ephemeral local port");
                    (port, true)
                }
                Err(e) => {
                    self.fail(id, &e);
                    return Err(e);
                }
            }
        } else {
            (config.local_port, false)
        };

        let open = async {
            match config.kind {
                TunnelKind::Local => {
                    let host = config.remote_host.as_deref().unwrap_or_default();
                    let remote_port = config.remote_port.unwrap_or_default();
                    self.forwarder
                        .open_local(&config.ssh_connection_id, port, host, remote_port)
                        .await
                }
                TunnelKind::Remote => {
                    let remote_port = config.remote_port.unwrap_or_default();
                    self.forwarder
                        .open_remote(&config.ssh_connection_id, remote_port, port)
                        .await
                }
                TunnelKind::Dynamic => {
                    self.forwarder
                        .open_dynamic(&config.ssh_connection_id, port)
                        .await
                }
            }
        };

        let handle = match tokio::time::timeout(self.connect_timeout, open).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                if ephemeral {
                    self.ports.release(port);
                }
                self.fail(id, &e);
                return Err(e);
            }
            Err(_) => {
                let e = HopError::Timeout(self.connect_timeout);
                if ephemeral {
                    self.ports.release(port);
                }
                self.fail(id, &e);
                return Err(e);
            }
        };

        {
            let mut tunnels = self.tunnels.lock();
            if let Some(entry) = tunnels.get_mut(id) {
                entry.status = TunnelStatus::Connected;
                entry.actual_local_port = Some(port);
                entry.ephemeral = ephemeral;
                entry.handle = Some(handle);
            }
        }
        info!(tunnel = %id, port, kind = ?config.kind, "tunnel connected");
        self.emit(id, TunnelStatus::Connected);
        Ok(port)
    }

    /// Close the tunnel's forward and release its ephemeral port. A
    /// disconnected tunnel is a no-op.
    pub async fn disconnect(&self, id: &str) -> Result<(), HopError> {
        let (handle, released) = {
            let mut tunnels = self.tunnels.lock();
            let entry = tunnels
                .get_mut(id)
                .ok_or_else(|| HopError::ProfileNotFound(id.to_string()))?;
            if entry.status == TunnelStatus::Disconnected {
                return Ok(());
            }
            entry.status = TunnelStatus::Disconnected;
            let released = entry.ephemeral.then_some(entry.actual_local_port).flatten();
            entry.actual_local_port = None;
            entry.ephemeral = false;
            (entry.handle.take(), released)
        };

        if let Some(handle) = handle {
            self.forwarder.close(&handle).await;
        }
        if let Some(port) = released {
            debug!(tunnel = %id, port, "released ephemeral local port");
            self.ports.release(port);
        }
        self.emit(id, TunnelStatus::Disconnected);
        Ok(())
    }

    /// Disconnect and forget the tunnel.
    pub async fn delete(&self, id: &str) -> Result<(), HopError> {
        self.disconnect(id).await?;
        self.tunnels.lock().remove(id);
        Ok(())
    }

    fn fail(&self, id: &str, error: &HopError) {
        warn!(tunnel = %id, error = %error, "tunnel connect failed");
        {
            let mut tunnels = self.tunnels.lock();
            if let Some(entry) = tunnels.get_mut(id) {
                entry.status = TunnelStatus::Error;
                entry.error = Some(error.to_string());
            }
        }
        self.emit(id, TunnelStatus::Error);
    }

    fn emit(&self, id: &str, status: TunnelStatus) {
        let _ = self.events.send(TunnelEvent {
            tunnel_id: id.to_string(),
            status,
        });
    }
}

impl std::fmt::Debug for TunnelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelManager").finish_non_exhaustive()
    }
}

fn validate(config: &SshTunnel) -> Result<(), HopError> {
    match config.kind {
        TunnelKind::Local => {
            if config.remote_host.is_none() || config.remote_port.is_none() {
                return Err(HopError::HandshakeFailed(format!(
                    "local tunnel {} has no remote endpoint",
                    config.id
                )));
            }
        }
        TunnelKind::Remote => {
            if config.remote_port.is_none() {
                return Err(HopError::HandshakeFailed(format!(
                    "remote tunnel {} has no remote listen port",
                    config.id
                )));
            }
            if config.local_port == 0 {
                return Err(HopError::HandshakeFailed(format!(
                    "remote tunnel {} must name its local target port",
                    config.id
                )));
            }
        }
        TunnelKind::Dynamic => {}
    }
    Ok(())
}
