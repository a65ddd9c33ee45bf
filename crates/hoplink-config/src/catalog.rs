//! Read-only catalog traits the orchestration core uses to look up
//! profiles and chains by id.
//!
//! Editing and persistence of these records belongs to external
//! collaborators; the core only reads, and must tolerate a missing id by
//! returning `None` (the executor turns that into a profile-not-found hop
//! error at resolve time).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::types::{EndpointConfig, ProxyChain, ProxyProfile, VpnProfile};

/// Lookup surface for endpoint profiles.
#[async_trait]
pub trait ProfileCatalog: Send + Sync {
    async fn proxy_profile(&self, id: &str) -> Option<ProxyProfile>;
    async fn vpn_profile(&self, id: &str) -> Option<VpnProfile>;
    /// Named SSH endpoints referenced by ssh layers.
    async fn ssh_endpoint(&self, id: &str) -> Option<EndpointConfig>;
}

/// Lookup surface for chain definitions (used for lazy failover resolution).
#[async_trait]
pub trait ChainCatalog: Send + Sync {
    async fn chain(&self, id: &str) -> Option<ProxyChain>;
}

/// In-memory catalog for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    proxies: RwLock<HashMap<String, ProxyProfile>>,
    vpns: RwLock<HashMap<String, VpnProfile>>,
    ssh: RwLock<HashMap<String, EndpointConfig>>,
    chains: RwLock<HashMap<String, ProxyChain>>,
}

impl InMemoryCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Build a catalog from a loaded configuration document.
    pub fn from_config(config: &crate::types::HoplinkConfig) -> Arc<Self> {
        let catalog = Self::default();
        for p in &config.proxy_profiles {
            catalog.insert_proxy(p.clone());
        }
        for p in &config.vpn_profiles {
            catalog.insert_vpn(p.clone());
        }
        for (id, ep) in &config.ssh_endpoints {
            catalog.insert_ssh(id.clone(), ep.clone());
        }
        for c in &config.chains {
            catalog.insert_chain(c.clone());
        }
        Arc::new(catalog)
    }

    pub fn insert_proxy(&self, profile: ProxyProfile) {
        self.proxies.write().insert(profile.id.clone(), profile);
    }

    pub fn insert_vpn(&self, profile: VpnProfile) {
        self.vpns.write().insert(profile.id.clone(), profile);
    }

    pub fn insert_ssh(&self, id: String, endpoint: EndpointConfig) {
        self.ssh.write().insert(id, endpoint);
    }

    pub fn insert_chain(&self, chain: ProxyChain) {
        self.chains.write().insert(chain.id.clone(), chain);
    }

    pub fn remove_proxy(&self, id: &str) -> Option<ProxyProfile> {
        self.proxies.write().remove(id)
    }

    pub fn remove_chain(&self, id: &str) -> Option<ProxyChain> {
        self.chains.write().remove(id)
    }
}

#[async_trait]
impl ProfileCatalog for InMemoryCatalog {
    async fn proxy_profile(&self, id: &str) -> Option<ProxyProfile> {
        self.proxies.read().get(id).cloned()
    }

    async fn vpn_profile(&self, id: &str) -> Option<VpnProfile> {
        self.vpns.read().get(id).cloned()
    }

    async fn ssh_endpoint(&self, id: &str) -> Option<EndpointConfig> {
        self.ssh.read().get(id).cloned()
    }
}

#[async_trait]
impl ChainCatalog for InMemoryCatalog {
    async fn chain(&self, id: &str) -> Option<ProxyChain> {
        self.chains.read().get(id).cloned()
    }
}
