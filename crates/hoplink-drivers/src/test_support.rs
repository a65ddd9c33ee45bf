//! Shared mocks for driver tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use hoplink_config::{
    EndpointConfig, LayerKind, ProxyProtocol, TrustPolicy, TrustSettings, VpnKind,
};
use hoplink_core::{HopError, Transport};
use hoplink_trust::{
    MemoryBackend, ObservedIdentity, PolicyResolver, PromptAnswer, PromptRequest, TrustPrompter,
    TrustStore,
};

use crate::connectors::{Established, ProxyConnector, SshClient, VpnController};
use crate::driver::HopSpec;
use crate::trust_gate::TrustGate;

pub fn spec(kind: LayerKind) -> HopSpec {
    HopSpec {
        chain_id: "test-chain".into(),
        position: 0,
        kind,
        endpoint: EndpointConfig {
            host: "hop.example.com".into(),
            port: 22,
            protocol: Some(ProxyProtocol::Socks5),
            username: None,
            password: None,
        },
        ssh_method: None,
        connection_id: None,
    }
}

struct RejectPrompter;

#[async_trait]
impl TrustPrompter for RejectPrompter {
    async fn prompt(&self, _request: PromptRequest) -> PromptAnswer {
        PromptAnswer::Reject
    }
}

pub async fn gate_with_policy(policy: TrustPolicy) -> Arc<TrustGate> {
    let store = Arc::new(
        TrustStore::open(Arc::new(MemoryBackend::new()))
            .await
            .unwrap(),
    );
    let resolver = PolicyResolver::new(TrustSettings {
        tls_default: policy,
        ssh_default: policy,
        ..Default::default()
    });
    Arc::new(TrustGate::new(store, resolver, Arc::new(RejectPrompter)))
}

// ── Proxy connector mock ──

pub struct MockProxyConnector {
    identity: Option<ObservedIdentity>,
    fail: bool,
    closed: Mutex<u32>,
}

impl MockProxyConnector {
    pub fn succeeding(identity: Option<ObservedIdentity>) -> Self {
        Self {
            identity,
            fail: false,
            closed: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            identity: None,
            fail: true,
            closed: Mutex::new(0),
        }
    }

    pub fn closed_count(&self) -> u32 {
        *self.closed.lock()
    }
}

#[async_trait]
impl ProxyConnector for MockProxyConnector {
    async fn handshake(
        &self,
        endpoint: &EndpointConfig,
        _underlying: &Transport,
    ) -> Result<Established, HopError> {
        if self.fail {
            return Err(HopError::HandshakeFailed("connection refused".into()));
        }
        Ok(Established {
            transport: Transport::stream(format!("proxy {}:{}", endpoint.host, endpoint.port)),
            identity: self.identity.clone(),
        })
    }

    async fn close(&self, _transport: &Transport) {
        *self.closed.lock() += 1;
    }
}

// ── SSH client mock ──

pub struct MockSshClient {
    with_identity: bool,
    calls: Mutex<Vec<String>>,
    closed: Mutex<u32>,
}

impl MockSshClient {
    pub fn new() -> Self {
        Self {
            with_identity: true,
            calls: Mutex::new(Vec::new()),
            closed: Mutex::new(0),
        }
    }

    pub fn without_identity() -> Self {
        Self {
            with_identity: false,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn closed_count(&self) -> u32 {
        *self.closed.lock()
    }

    fn established(&self, method: &str, endpoint: &EndpointConfig) -> Established {
        self.calls.lock().push(method.to_string());
        let transport = if method == "dynamic_socks" {
            Transport::socks_endpoint(1080, format!("socks via {}", endpoint.host))
        } else {
            Transport::stream(format!("ssh {} {}", method, endpoint.host))
        };
        Established {
            transport,
            identity: self.with_identity.then(|| ObservedIdentity {
                fingerprint: "SHA256:hostkey".into(),
                subject: "ssh-ed25519".into(),
            }),
        }
    }
}

#[async_trait]
impl SshClient for MockSshClient {
    async fn jump_session(
        &self,
        endpoint: &EndpointConfig,
        _underlying: &Transport,
    ) -> Result<Established, HopError> {
        Ok(self.established("jump_session", endpoint))
    }

    async fn proxy_command(
        &self,
        endpoint: &EndpointConfig,
        _underlying: &Transport,
    ) -> Result<Established, HopError> {
        Ok(self.established("proxy_command", endpoint))
    }

    async fn nested_session(
        &self,
        endpoint: &EndpointConfig,
        _underlying: &Transport,
    ) -> Result<Established, HopError> {
        Ok(self.established("nested_session", endpoint))
    }

    async fn local_forward(
        &self,
        endpoint: &EndpointConfig,
        _underlying: &Transport,
    ) -> Result<Established, HopError> {
        Ok(self.established("local_forward", endpoint))
    }

    async fn dynamic_socks(
        &self,
        endpoint: &EndpointConfig,
        _underlying: &Transport,
    ) -> Result<Established, HopError> {
        Ok(self.established("dynamic_socks", endpoint))
    }

    async fn stdio_pipe(
        &self,
        endpoint: &EndpointConfig,
        _underlying: &Transport,
    ) -> Result<Established, HopError> {
        Ok(self.established("stdio_pipe", endpoint))
    }

    async fn agent_forward(
        &self,
        endpoint: &EndpointConfig,
        _underlying: &Transport,
    ) -> Result<Established, HopError> {
        Ok(self.established("agent_forward", endpoint))
    }

    async fn close(&self, _transport: &Transport) {
        *self.closed.lock() += 1;
    }
}

// ── VPN controller mock ──

pub struct MockVpnController {
    ambient: bool,
    torn_down: Mutex<u32>,
}

impl MockVpnController {
    pub fn ambient() -> Self {
        Self {
            ambient: true,
            torn_down: Mutex::new(0),
        }
    }

    /// Misbehaving controller that returns a stream transport.
    pub fn stream() -> Self {
        Self {
            ambient: false,
            torn_down: Mutex::new(0),
        }
    }

    pub fn torn_down(&self) -> u32 {
        *self.torn_down.lock()
    }
}

#[async_trait]
impl VpnController for MockVpnController {
    async fn bring_up(
        &self,
        kind: VpnKind,
        endpoint: &EndpointConfig,
    ) -> Result<Transport, HopError> {
        let descriptor = format!("{kind:?} via {}", endpoint.host);
        Ok(if self.ambient {
            Transport::ambient(descriptor)
        } else {
            Transport::stream(descriptor)
        })
    }

    async fn tear_down(&self, _transport: &Transport) {
        *self.torn_down.lock() += 1;
    }
}
