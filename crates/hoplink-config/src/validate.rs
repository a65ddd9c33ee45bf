//! Structural validation for chains and full configuration documents.
//!
//! Errors are definitions the engine cannot execute; warnings are
//! tolerated shapes worth surfacing (stale methods, VPN hop placement).
//! Dangling profile references are deliberately NOT validated here: a
//! deleted profile must surface at execution time, not at edit time.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::types::{ChainDynamics, HoplinkConfig, LayerSource, ProxyChain};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("chain '{chain}': layer positions must be unique and contiguous from 0, got {got:?}")]
    BadPositions { chain: String, got: Vec<u32> },

    #[error("chain '{chain}' layer {position}: inline proxy endpoint is missing a protocol")]
    MissingProxyProtocol { chain: String, position: u32 },

    #[error("duplicate chain id '{0}'")]
    DuplicateChainId(String),

    #[error("duplicate profile id '{0}'")]
    DuplicateProfileId(String),
}

/// Non-fatal findings surfaced to callers (and logged by them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// `ssh_chaining_method` set on a layer that is not an ssh variant.
    SshMethodOnNonSshLayer { chain: String, position: u32 },
    /// A VPN hop that is not in final-routing position. VPN hops route all
    /// subsequent traffic, so anything after them no longer chains
    /// byte-streams literally.
    VpnHopNotLast { chain: String, position: u32 },
    /// Failover dynamics with an empty fallback list behaves like strict.
    FailoverWithoutFallbacks { chain: String },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::SshMethodOnNonSshLayer { chain, position } => write!(
                f,
                "chain '{chain}' layer {position}: ssh_chaining_method is ignored for non-ssh layers"
            ),
            ValidationWarning::VpnHopNotLast { chain, position } => write!(
                f,
                "chain '{chain}' layer {position}: VPN hop routes all later hops through the OS stack"
            ),
            ValidationWarning::FailoverWithoutFallbacks { chain } => {
                write!(f, "chain '{chain}': failover strategy has no fallback chains")
            }
        }
    }
}

/// Validate a single chain definition.
pub fn validate_chain(chain: &ProxyChain) -> Result<Vec<ValidationWarning>, ValidationError> {
    let mut positions: Vec<u32> = chain.layers.iter().map(|l| l.position).collect();
    positions.sort_unstable();
    let contiguous = positions
        .iter()
        .enumerate()
        .all(|(i, &p)| p as usize == i);
    if !contiguous {
        return Err(ValidationError::BadPositions {
            chain: chain.id.clone(),
            got: positions,
        });
    }

    let mut warnings = Vec::new();
    let last = chain.layers.len().saturating_sub(1) as u32;

    for layer in &chain.layers {
        if layer.ssh_chaining_method.is_some() && !layer.kind.is_ssh() {
            warnings.push(ValidationWarning::SshMethodOnNonSshLayer {
                chain: chain.id.clone(),
                position: layer.position,
            });
        }

        // A VPN hop anywhere but the last two positions leaves stream hops
        // stranded behind it; warn rather than guess stronger semantics.
        if layer.kind.is_vpn() && layer.position + 1 < last {
            warnings.push(ValidationWarning::VpnHopNotLast {
                chain: chain.id.clone(),
                position: layer.position,
            });
        }

        if layer.kind == crate::types::LayerKind::Proxy {
            if let LayerSource::Inline(ep) = &layer.source {
                if ep.protocol.is_none() {
                    return Err(ValidationError::MissingProxyProtocol {
                        chain: chain.id.clone(),
                        position: layer.position,
                    });
                }
            }
        }
    }

    if let ChainDynamics::Failover {
        fallback_chain_ids, ..
    } = &chain.dynamics
    {
        if fallback_chain_ids.is_empty() {
            warnings.push(ValidationWarning::FailoverWithoutFallbacks {
                chain: chain.id.clone(),
            });
        }
    }

    Ok(warnings)
}

/// Validate a whole configuration document: id uniqueness plus every chain.
pub fn validate_config(
    config: &HoplinkConfig,
) -> Result<Vec<ValidationWarning>, ValidationError> {
    let mut chain_ids = HashSet::new();
    for chain in &config.chains {
        if !chain_ids.insert(chain.id.as_str()) {
            return Err(ValidationError::DuplicateChainId(chain.id.clone()));
        }
    }

    let mut profile_ids = HashSet::new();
    for id in config
        .proxy_profiles
        .iter()
        .map(|p| p.id.as_str())
        .chain(config.vpn_profiles.iter().map(|p| p.id.as_str()))
    {
        if !profile_ids.insert(id) {
            return Err(ValidationError::DuplicateProfileId(id.to_string()));
        }
    }

    let mut warnings = Vec::new();
    for chain in &config.chains {
        warnings.extend(validate_chain(chain)?);
    }
    Ok(warnings)
}
