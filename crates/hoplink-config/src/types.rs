//! Configuration type definitions for profiles, chains, layers, dynamics
//! and trust policy settings.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

// ── Profiles ──

/// Wire protocol spoken by a proxy endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyProtocol {
    Socks5,
    Socks4,
    HttpConnect,
}

/// A reusable, named proxy endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyProfile {
    pub id: String,
    pub name: String,
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// VPN tunnel flavor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VpnKind {
    Openvpn,
    Wireguard,
}

/// A reusable, named VPN endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VpnProfile {
    pub id: String,
    pub name: String,
    pub kind: VpnKind,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Endpoint shape shared by inline layer configs and resolved profiles.
///
/// `protocol` is only meaningful for proxy layers; SSH and VPN endpoints
/// leave it unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Option<ProxyProtocol>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl From<&ProxyProfile> for EndpointConfig {
    fn from(p: &ProxyProfile) -> Self {
        Self {
            host: p.host.clone(),
            port: p.port,
            protocol: Some(p.protocol),
            username: p.username.clone(),
            password: p.password.clone(),
        }
    }
}

impl From<&VpnProfile> for EndpointConfig {
    fn from(p: &VpnProfile) -> Self {
        Self {
            host: p.host.clone(),
            port: p.port,
            protocol: None,
            username: p.username.clone(),
            password: p.password.clone(),
        }
    }
}

// ── Chain layers ──

/// The transport type of one hop in a chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    Proxy,
    Openvpn,
    Wireguard,
    SshTunnel,
    SshJump,
    SshProxycmd,
}

impl LayerKind {
    /// Whether this layer establishes an SSH-based hop.
    pub fn is_ssh(self) -> bool {
        matches!(
            self,
            LayerKind::SshTunnel | LayerKind::SshJump | LayerKind::SshProxycmd
        )
    }

    /// Whether this layer brings up an interface-level VPN.
    pub fn is_vpn(self) -> bool {
        matches!(self, LayerKind::Openvpn | LayerKind::Wireguard)
    }
}

/// How an SSH layer chains onto the transport below it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SshChainingMethod {
    Proxyjump,
    Proxycommand,
    NestedSsh,
    LocalForward,
    DynamicSocks,
    Stdio,
    AgentForward,
}

/// Where a layer's endpoint configuration comes from: a catalog profile
/// reference or an inline config. The enum makes the two mutually
/// exclusive by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LayerSource {
    /// Reference into the profile catalog. A dangling reference resolves
    /// to an error at execution time, not at edit time.
    Profile(String),
    /// Inline endpoint of the matching shape.
    Inline(EndpointConfig),
}

/// Per-hop overrides. Every field is optional and falls back to the
/// chain-level tuning, then to hard-coded baselines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub skip_on_failure: Option<bool>,
    #[serde(default)]
    pub retry_count: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub is_backup: Option<bool>,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// One hop in a chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainLayer {
    /// Hop order from client to final target; unique and contiguous from 0.
    pub position: u32,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    /// `singleton_map` keeps the externally tagged map form
    /// (`source: { profile: ... }`) under serde_yaml 0.9, which otherwise
    /// expects a `!tag` for enum variants.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub source: LayerSource,
    /// Only meaningful when `kind` is one of the ssh variants.
    #[serde(default)]
    pub ssh_chaining_method: Option<SshChainingMethod>,
    #[serde(default)]
    pub node: NodeConfig,
}

// ── Chain dynamics ──

/// Tuning knobs shared by every dynamics strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChainTuning {
    #[serde(default)]
    pub hop_timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries_per_hop: Option<u32>,
    #[serde(default)]
    pub reuse_connections: bool,
    #[serde(default)]
    pub keep_alive_interval_ms: Option<u64>,
}

/// Dynamic routing policy for a chain.
///
/// A closed tagged-variant type: strategy-specific parameters are carried
/// only by the matching variant, so a stale `fallback_chain_ids` under a
/// round-robin strategy is unrepresentable rather than a runtime
/// tolerance rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum ChainDynamics {
    /// Layers in position order; every hop must succeed.
    Strict {
        #[serde(flatten)]
        tuning: ChainTuning,
    },
    /// Position order, but hops marked `skip_on_failure` are skippable.
    Dynamic {
        #[serde(flatten)]
        tuning: ChainTuning,
    },
    /// Shuffled hop order; deterministic when a seed is given.
    Random {
        #[serde(default)]
        random_seed: Option<u64>,
        #[serde(flatten)]
        tuning: ChainTuning,
    },
    /// A cursor over named path variants, advanced per connect.
    RoundRobin {
        #[serde(default)]
        path_weights: BTreeMap<String, f64>,
        #[serde(flatten)]
        tuning: ChainTuning,
    },
    /// Primary plan with fallback chains resolved lazily on failure.
    Failover {
        #[serde(default)]
        fallback_chain_ids: Vec<String>,
        #[serde(flatten)]
        tuning: ChainTuning,
    },
    /// A weighted set of parallel plans; a path is picked per connection.
    LoadBalance {
        #[serde(default)]
        path_weights: BTreeMap<String, f64>,
        #[serde(flatten)]
        tuning: ChainTuning,
    },
}

impl Default for ChainDynamics {
    fn default() -> Self {
        ChainDynamics::Strict {
            tuning: ChainTuning::default(),
        }
    }
}

impl ChainDynamics {
    /// The tuning knobs shared by all strategies.
    pub fn tuning(&self) -> &ChainTuning {
        match self {
            ChainDynamics::Strict { tuning }
            | ChainDynamics::Dynamic { tuning }
            | ChainDynamics::Random { tuning, .. }
            | ChainDynamics::RoundRobin { tuning, .. }
            | ChainDynamics::Failover { tuning, .. }
            | ChainDynamics::LoadBalance { tuning, .. } => tuning,
        }
    }

    /// Strategy name as written in configuration files.
    pub fn strategy_name(&self) -> &'static str {
        match self {
            ChainDynamics::Strict { .. } => "strict",
            ChainDynamics::Dynamic { .. } => "dynamic",
            ChainDynamics::Random { .. } => "random",
            ChainDynamics::RoundRobin { .. } => "round-robin",
            ChainDynamics::Failover { .. } => "failover",
            ChainDynamics::LoadBalance { .. } => "load-balance",
        }
    }
}

/// A named, ordered collection of chain layers plus a dynamics policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyChain {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub layers: Vec<ChainLayer>,
    #[serde(default)]
    pub dynamics: ChainDynamics,
}

// ── Trust policy settings ──

/// Policy applied to identity verification results.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TrustPolicy {
    /// Trust-on-first-use: auto-accept new identities, warn on change.
    #[default]
    Tofu,
    AlwaysAsk,
    AlwaysTrust,
    Strict,
}

/// Per-connection trust policy override. Unset fields fall back to the
/// global default for that identity type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectionTrustOverride {
    #[serde(default)]
    pub tls: Option<TrustPolicy>,
    #[serde(default)]
    pub ssh: Option<TrustPolicy>,
}

/// Trust policy configuration: global defaults per identity type plus
/// per-connection overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrustSettings {
    #[serde(default)]
    pub tls_default: TrustPolicy,
    #[serde(default)]
    pub ssh_default: TrustPolicy,
    #[serde(default)]
    pub connection_overrides: HashMap<String, ConnectionTrustOverride>,
}

// ── Top-level config file ──

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HoplinkConfig {
    #[serde(default)]
    pub proxy_profiles: Vec<ProxyProfile>,
    #[serde(default)]
    pub vpn_profiles: Vec<VpnProfile>,
    /// Named SSH endpoints referenced by ssh layers.
    #[serde(default)]
    pub ssh_endpoints: HashMap<String, EndpointConfig>,
    #[serde(default)]
    pub chains: Vec<ProxyChain>,
    #[serde(default)]
    pub trust: TrustSettings,
}
