//! Configuration model for hoplink.
//!
//! Defines the declarative shapes the orchestration core consumes:
//! reusable endpoint profiles, proxy chains with their layers and dynamics
//! policy, and trust policy settings. Also provides a format-sniffing file
//! loader, structural validation, and the read-only catalog traits the
//! resolver uses to look profiles and chains up by id.

mod catalog;
mod loader;
mod types;
mod validate;

pub use catalog::{
    ChainCatalog, InMemoryCatalog, ProfileCatalog,
};
pub use loader::{load_config, ConfigError};
pub use types::{
    ChainDynamics, ChainLayer, ChainTuning, ConnectionTrustOverride, EndpointConfig,
    HoplinkConfig, LayerKind, LayerSource, NodeConfig, ProxyChain, ProxyProfile, ProxyProtocol,
    SshChainingMethod, TrustPolicy, TrustSettings, VpnKind, VpnProfile,
};
pub use validate::{validate_chain, validate_config, ValidationError, ValidationWarning};
