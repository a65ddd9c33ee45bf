//! Turns a declarative chain into a concrete execution plan.
//!
//! The resolver orders (or shuffles, or weights) the chain's layers per
//! its dynamics strategy and assigns every hop an effective timeout and
//! retry budget: `NodeConfig` fields if present, else chain tuning, else
//! the hard-coded baselines in [`hoplink_core::defaults`]. Profile
//! references are resolved here; a dangling reference surfaces as
//! [`HopError::ProfileNotFound`] at resolve time, never at edit time.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use hoplink_config::{
    ChainCatalog, ChainDynamics, ChainLayer, ChainTuning, EndpointConfig, LayerSource,
    ProfileCatalog, ProxyChain,
};
use hoplink_core::defaults::{
    DEFAULT_HOP_RETRIES, DEFAULT_HOP_TIMEOUT_MS, DEFAULT_KEEP_ALIVE_INTERVAL_MS,
};
use hoplink_core::HopError;
use hoplink_drivers::HopSpec;

/// One hop of a resolved plan with its effective budgets.
#[derive(Debug, Clone)]
pub struct PlannedHop {
    pub layer: ChainLayer,
    pub endpoint: EndpointConfig,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the initial attempt (attempts = retries + 1).
    pub retries: u32,
    /// Failure of this hop advances the plan instead of aborting it.
    pub skippable: bool,
    /// Stable key for the connection-reuse cache.
    pub reuse_key: String,
}

impl PlannedHop {
    pub fn position(&self) -> u32 {
        self.layer.position
    }

    /// Build the driver-facing spec for this hop.
    pub fn hop_spec(&self, chain_id: &str, connection_id: Option<&str>) -> HopSpec {
        HopSpec {
            chain_id: chain_id.to_string(),
            position: self.layer.position,
            kind: self.layer.kind,
            endpoint: self.endpoint.clone(),
            ssh_method: self.layer.ssh_chaining_method,
            connection_id: connection_id.map(str::to_string),
        }
    }
}

/// An ordered plan ready for the executor.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub chain_id: String,
    pub strategy: &'static str,
    pub hops: Vec<PlannedHop>,
    pub reuse_connections: bool,
    pub keep_alive_interval: Duration,
    /// Alternate chain ids, resolved lazily by the executor only after
    /// this plan fails. Non-empty only under the failover strategy.
    pub fallback_chain_ids: Vec<String>,
}

/// A plan paired with its load-balance weight.
#[derive(Debug, Clone)]
pub struct WeightedPlan {
    pub weight: f64,
    pub plan: ExecutionPlan,
}

/// Resolver output: a single ordered plan, or a weighted set of parallel
/// plans from which the executor picks one per connection.
#[derive(Debug, Clone)]
pub enum ResolvedRoute {
    Single(ExecutionPlan),
    WeightedSet(Vec<WeightedPlan>),
}

impl ResolvedRoute {
    /// Collapse the route to one plan, picking weighted-randomly from a
    /// set. The resolver never produces an empty set.
    pub fn choose<R: Rng>(self, rng: &mut R) -> ExecutionPlan {
        match self {
            ResolvedRoute::Single(plan) => plan,
            ResolvedRoute::WeightedSet(set) => select_weighted(set, rng),
        }
    }
}

/// Weighted random selection. Non-positive weights never win unless every
/// weight is non-positive, in which case the first plan is taken.
pub fn select_weighted<R: Rng>(mut set: Vec<WeightedPlan>, rng: &mut R) -> ExecutionPlan {
    let total: f64 = set.iter().map(|w| w.weight.max(0.0)).sum();
    if total <= 0.0 {
        return set.remove(0).plan;
    }
    let mut roll = rng.gen_range(0.0..total);
    for entry in &set {
        let w = entry.weight.max(0.0);
        if roll < w {
            return entry.plan.clone();
        }
        roll -= w;
    }
    // Floating-point residue lands on the last entry.
    set.pop().map(|w| w.plan).unwrap_or_else(|| unreachable!())
}

/// Resolves chains into execution plans via the profile and chain
/// catalogs.
pub struct ChainResolver {
    profiles: Arc<dyn ProfileCatalog>,
    chains: Arc<dyn ChainCatalog>,
}

impl ChainResolver {
    pub fn new(profiles: Arc<dyn ProfileCatalog>, chains: Arc<dyn ChainCatalog>) -> Self {
        Self { profiles, chains }
    }

    /// Look a chain definition up by id (used for lazy failover).
    pub async fn lookup_chain(&self, id: &str) -> Option<ProxyChain> {
        self.chains.chain(id).await
    }

    /// Resolve `chain` into a route. `cursor` is the active chain's
    /// connect counter; only the round-robin strategy reads it.
    pub async fn resolve(&self, chain: &ProxyChain, cursor: u64) -> Result<ResolvedRoute, HopError> {
        let tuning = chain.dynamics.tuning().clone();
        let strategy = chain.dynamics.strategy_name();

        match &chain.dynamics {
            ChainDynamics::Strict { .. } => {
                let plan = self
                    .plan_layers(chain, strategy, ordered(chain), &tuning, false, Vec::new())
                    .await?;
                Ok(ResolvedRoute::Single(plan))
            }
            ChainDynamics::Dynamic { .. } => {
                let plan = self
                    .plan_layers(chain, strategy, ordered(chain), &tuning, true, Vec::new())
                    .await?;
                Ok(ResolvedRoute::Single(plan))
            }
            ChainDynamics::Random { random_seed, .. } => {
                let mut layers: Vec<ChainLayer> = ordered(chain)
                    .into_iter()
                    .filter(|l| !l.node.is_backup.unwrap_or(false))
                    .collect();
                let mut rng = match random_seed {
                    Some(seed) => StdRng::seed_from_u64(*seed),
                    None => StdRng::from_entropy(),
                };
                layers.shuffle(&mut rng);
                let plan = self
                    .plan_layers(chain, strategy, layers, &tuning, false, Vec::new())
                    .await?;
                Ok(ResolvedRoute::Single(plan))
            }
            ChainDynamics::RoundRobin { path_weights, .. } => {
                let keys: Vec<&String> = path_weights.keys().collect();
                let layers = if keys.is_empty() {
                    ordered(chain)
                } else {
                    let key = keys[(cursor % keys.len() as u64) as usize];
                    match self.chains.chain(key).await {
                        Some(variant) => {
                            debug!(chain = %chain.id, path = %key, "round-robin cursor selected path");
                            ordered(&variant)
                        }
                        None => {
                            warn!(
                                chain = %chain.id,
                                path = %key,
                                "round-robin path references a missing chain, using own layers"
                            );
                            ordered(chain)
                        }
                    }
                };
                let plan = self
                    .plan_layers(chain, strategy, layers, &tuning, false, Vec::new())
                    .await?;
                Ok(ResolvedRoute::Single(plan))
            }
            ChainDynamics::Failover {
                fallback_chain_ids, ..
            } => {
                // Fallbacks stay unresolved until the primary plan fails.
                let plan = self
                    .plan_layers(
                        chain,
                        strategy,
                        ordered(chain),
                        &tuning,
                        false,
                        fallback_chain_ids.clone(),
                    )
                    .await?;
                Ok(ResolvedRoute::Single(plan))
            }
            ChainDynamics::LoadBalance { path_weights, .. } => {
                let mut set = Vec::new();
                for (key, weight) in path_weights {
                    let Some(variant) = self.chains.chain(key).await else {
                        warn!(
                            chain = %chain.id,
                            path = %key,
                            "load-balance path references a missing chain, skipping"
                        );
                        continue;
                    };
                    let plan = self
                        .plan_layers(chain, strategy, ordered(&variant), &tuning, false, Vec::new())
                        .await?;
                    set.push(WeightedPlan {
                        weight: *weight,
                        plan,
                    });
                }
                if set.is_empty() {
                    let plan = self
                        .plan_layers(chain, strategy, ordered(chain), &tuning, false, Vec::new())
                        .await?;
                    return Ok(ResolvedRoute::Single(plan));
                }
                Ok(ResolvedRoute::WeightedSet(set))
            }
        }
    }

    async fn plan_layers(
        &self,
        chain: &ProxyChain,
        strategy: &'static str,
        layers: Vec<ChainLayer>,
        tuning: &ChainTuning,
        honor_skip: bool,
        fallback_chain_ids: Vec<String>,
    ) -> Result<ExecutionPlan, HopError> {
        let last = layers.iter().map(|l| l.position).max().unwrap_or(0);
        let mut hops = Vec::with_capacity(layers.len());
        for layer in layers {
            // A VPN hop routes everything after it through the OS stack;
            // anywhere but directly before the final hop is suspicious.
            if layer.kind.is_vpn() && layer.position + 1 < last {
                warn!(
                    chain = %chain.id,
                    position = layer.position,
                    "vpn layer is followed by more than one hop"
                );
            }

            let endpoint = self.resolve_endpoint(&layer).await?;
            let timeout_ms = layer
                .node
                .timeout_ms
                .or(tuning.hop_timeout_ms)
                .unwrap_or(DEFAULT_HOP_TIMEOUT_MS);
            let retries = layer
                .node
                .retry_count
                .or(tuning.max_retries_per_hop)
                .unwrap_or(DEFAULT_HOP_RETRIES);
            let skippable = honor_skip && layer.node.skip_on_failure.unwrap_or(false);
            let reuse_key = reuse_key(&layer);

            hops.push(PlannedHop {
                endpoint,
                timeout: Duration::from_millis(timeout_ms),
                retries,
                skippable,
                reuse_key,
                layer,
            });
        }

        Ok(ExecutionPlan {
            chain_id: chain.id.clone(),
            strategy,
            hops,
            reuse_connections: tuning.reuse_connections,
            keep_alive_interval: Duration::from_millis(
                tuning
                    .keep_alive_interval_ms
                    .unwrap_or(DEFAULT_KEEP_ALIVE_INTERVAL_MS),
            ),
            fallback_chain_ids,
        })
    }

    async fn resolve_endpoint(&self, layer: &ChainLayer) -> Result<EndpointConfig, HopError> {
        match &layer.source {
            LayerSource::Inline(endpoint) => Ok(endpoint.clone()),
            LayerSource::Profile(id) => {
                let endpoint = if layer.kind.is_vpn() {
                    self.profiles
                        .vpn_profile(id)
                        .await
                        .map(|p| EndpointConfig::from(&p))
                } else if layer.kind.is_ssh() {
                    self.profiles.ssh_endpoint(id).await
                } else {
                    self.profiles
                        .proxy_profile(id)
                        .await
                        .map(|p| EndpointConfig::from(&p))
                };
                endpoint.ok_or_else(|| HopError::ProfileNotFound(id.clone()))
            }
        }
    }
}

/// Layers in position order.
fn ordered(chain: &ProxyChain) -> Vec<ChainLayer> {
    let mut layers = chain.layers.clone();
    layers.sort_by_key(|l| l.position);
    layers
}

/// Stable reuse-cache key over the layer's type and endpoint identity.
fn reuse_key(layer: &ChainLayer) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{:?}|", layer.kind));
    match &layer.source {
        LayerSource::Profile(id) => hasher.update(format!("profile:{id}")),
        LayerSource::Inline(ep) => {
            hasher.update(format!("inline:{}:{}:{:?}", ep.host, ep.port, ep.protocol))
        }
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

impl std::fmt::Debug for ChainResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use hoplink_config::{InMemoryCatalog, LayerKind, NodeConfig};

    fn inline_layer(position: u32, host: &str) -> ChainLayer {
        ChainLayer {
            position,
            kind: LayerKind::Proxy,
            source: LayerSource::Inline(EndpointConfig {
                host: host.into(),
                port: 1080,
                protocol: Some(hoplink_config::ProxyProtocol::Socks5),
                username: None,
                password: None,
            }),
            ssh_chaining_method: None,
            node: NodeConfig::default(),
        }
    }

    fn chain(id: &str, layers: Vec<ChainLayer>, dynamics: ChainDynamics) -> ProxyChain {
        ProxyChain {
            id: id.into(),
            name: id.into(),
            layers,
            dynamics,
        }
    }

    fn resolver() -> (ChainResolver, Arc<InMemoryCatalog>) {
        let catalog = InMemoryCatalog::new();
        (
            ChainResolver::new(catalog.clone(), catalog.clone()),
            catalog,
        )
    }

    fn positions(plan: &ExecutionPlan) -> Vec<u32> {
        plan.hops.iter().map(|h| h.position()).collect()
    }

    #[tokio::test]
    async fn strict_plan_preserves_layer_count_and_order() {
        let (resolver, _) = resolver();
        let c = chain(
            "c1",
            vec![inline_layer(2, "c"), inline_layer(0, "a"), inline_layer(1, "b")],
            ChainDynamics::default(),
        );
        let plan = match resolver.resolve(&c, 0).await.unwrap() {
            ResolvedRoute::Single(p) => p,
            other => panic!("unexpected route: {other:?}"),
        };
        assert_eq!(positions(&plan), vec![0, 1, 2]);
        assert_eq!(plan.hops.len(), c.layers.len());
    }

    #[tokio::test]
    async fn seeded_random_plan_is_a_deterministic_permutation() {
        let (resolver, _) = resolver();
        let c = chain(
            "c1",
            vec![
                inline_layer(0, "a"),
                inline_layer(1, "b"),
                inline_layer(2, "c"),
                inline_layer(3, "d"),
            ],
            ChainDynamics::Random {
                random_seed: Some(7),
                tuning: ChainTuning::default(),
            },
        );
        let first = resolver.resolve(&c, 0).await.unwrap().choose(&mut StdRng::seed_from_u64(0));
        let second = resolver.resolve(&c, 0).await.unwrap().choose(&mut StdRng::seed_from_u64(0));
        assert_eq!(positions(&first), positions(&second));

        let mut sorted = positions(&first);
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn random_plan_excludes_backup_layers() {
        let (resolver, _) = resolver();
        let mut backup = inline_layer(1, "b");
        backup.node.is_backup = Some(true);
        let c = chain(
            "c1",
            vec![inline_layer(0, "a"), backup, inline_layer(2, "c")],
            ChainDynamics::Random {
                random_seed: Some(1),
                tuning: ChainTuning::default(),
            },
        );
        let plan = resolver
            .resolve(&c, 0)
            .await
            .unwrap()
            .choose(&mut StdRng::seed_from_u64(0));
        let mut got = positions(&plan);
        got.sort_unstable();
        assert_eq!(got, vec![0, 2]);
    }

    #[tokio::test]
    async fn effective_budgets_fall_back_in_layers() {
        let (resolver, _) = resolver();
        let mut tuned = inline_layer(0, "a");
        tuned.node.timeout_ms = Some(1_000);
        tuned.node.retry_count = Some(4);
        let plain = inline_layer(1, "b");
        let c = chain(
            "c1",
            vec![tuned, plain],
            ChainDynamics::Strict {
                tuning: ChainTuning {
                    hop_timeout_ms: Some(5_000),
                    ..Default::default()
                },
            },
        );
        let plan = resolver
            .resolve(&c, 0)
            .await
            .unwrap()
            .choose(&mut StdRng::seed_from_u64(0));

        // Node overrides win.
        assert_eq!(plan.hops[0].timeout, Duration::from_millis(1_000));
        assert_eq!(plan.hops[0].retries, 4);
        // Chain tuning next, then the baseline.
        assert_eq!(plan.hops[1].timeout, Duration::from_millis(5_000));
        assert_eq!(plan.hops[1].retries, DEFAULT_HOP_RETRIES);
    }

    #[tokio::test]
    async fn dynamic_marks_skippable_hops() {
        let (resolver, _) = resolver();
        let mut skippable = inline_layer(0, "a");
        skippable.node.skip_on_failure = Some(true);
        let c = chain(
            "c1",
            vec![skippable.clone(), inline_layer(1, "b")],
            ChainDynamics::Dynamic {
                tuning: ChainTuning::default(),
            },
        );
        let plan = resolver
            .resolve(&c, 0)
            .await
            .unwrap()
            .choose(&mut StdRng::seed_from_u64(0));
        assert!(plan.hops[0].skippable);
        assert!(!plan.hops[1].skippable);

        // skip_on_failure is a dynamic-strategy feature only.
        let strict = chain(
            "c2",
            vec![skippable, inline_layer(1, "b")],
            ChainDynamics::default(),
        );
        let plan = resolver
            .resolve(&strict, 0)
            .await
            .unwrap()
            .choose(&mut StdRng::seed_from_u64(0));
        assert!(!plan.hops[0].skippable);
    }

    #[tokio::test]
    async fn dangling_profile_reference_fails_at_resolve_time() {
        let (resolver, _) = resolver();
        let layer = ChainLayer {
            position: 0,
            kind: LayerKind::Proxy,
            source: LayerSource::Profile("deleted".into()),
            ssh_chaining_method: None,
            node: NodeConfig::default(),
        };
        let c = chain("c1", vec![layer], ChainDynamics::default());
        let err = resolver.resolve(&c, 0).await.unwrap_err();
        assert!(matches!(err, HopError::ProfileNotFound(id) if id == "deleted"));
    }

    #[tokio::test]
    async fn round_robin_cursor_rotates_path_variants() {
        let (resolver, catalog) = resolver();
        catalog.insert_chain(chain(
            "path-a",
            vec![inline_layer(0, "a")],
            ChainDynamics::default(),
        ));
        catalog.insert_chain(chain(
            "path-b",
            vec![inline_layer(0, "b"), inline_layer(1, "b2")],
            ChainDynamics::default(),
        ));

        let mut weights = BTreeMap::new();
        weights.insert("path-a".to_string(), 1.0);
        weights.insert("path-b".to_string(), 1.0);
        let c = chain(
            "rr",
            vec![inline_layer(0, "self")],
            ChainDynamics::RoundRobin {
                path_weights: weights,
                tuning: ChainTuning::default(),
            },
        );

        let mut rng = StdRng::seed_from_u64(0);
        let first = resolver.resolve(&c, 0).await.unwrap().choose(&mut rng);
        let second = resolver.resolve(&c, 1).await.unwrap().choose(&mut rng);
        let third = resolver.resolve(&c, 2).await.unwrap().choose(&mut rng);
        assert_eq!(first.hops.len(), 1);
        assert_eq!(second.hops.len(), 2);
        // The cursor wraps.
        assert_eq!(third.hops.len(), 1);
    }

    #[tokio::test]
    async fn failover_plan_carries_unresolved_fallbacks() {
        let (resolver, _) = resolver();
        let c = chain(
            "primary",
            vec![inline_layer(0, "a")],
            ChainDynamics::Failover {
                fallback_chain_ids: vec!["backup-1".into(), "backup-2".into()],
                tuning: ChainTuning::default(),
            },
        );
        let plan = resolver
            .resolve(&c, 0)
            .await
            .unwrap()
            .choose(&mut StdRng::seed_from_u64(0));
        assert_eq!(plan.fallback_chain_ids, vec!["backup-1", "backup-2"]);
    }

    #[tokio::test]
    async fn load_balance_produces_weighted_set() {
        let (resolver, catalog) = resolver();
        catalog.insert_chain(chain(
            "lb-a",
            vec![inline_layer(0, "a")],
            ChainDynamics::default(),
        ));
        catalog.insert_chain(chain(
            "lb-b",
            vec![inline_layer(0, "b")],
            ChainDynamics::default(),
        ));

        let mut weights = BTreeMap::new();
        weights.insert("lb-a".to_string(), 3.0);
        weights.insert("lb-b".to_string(), 1.0);
        let c = chain(
            "lb",
            vec![],
            ChainDynamics::LoadBalance {
                path_weights: weights,
                tuning: ChainTuning::default(),
            },
        );

        match resolver.resolve(&c, 0).await.unwrap() {
            ResolvedRoute::WeightedSet(set) => {
                assert_eq!(set.len(), 2);
                assert_eq!(set.iter().map(|w| w.weight).sum::<f64>(), 4.0);
            }
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[tokio::test]
    async fn load_balance_with_no_usable_paths_falls_back_to_own_layers() {
        let (resolver, _) = resolver();
        let mut weights = BTreeMap::new();
        weights.insert("gone".to_string(), 1.0);
        let c = chain(
            "lb",
            vec![inline_layer(0, "self")],
            ChainDynamics::LoadBalance {
                path_weights: weights,
                tuning: ChainTuning::default(),
            },
        );
        match resolver.resolve(&c, 0).await.unwrap() {
            ResolvedRoute::Single(plan) => assert_eq!(plan.hops.len(), 1),
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[test]
    fn weighted_selection_respects_weights() {
        let plan = |id: &str| ExecutionPlan {
            chain_id: id.into(),
            strategy: "load-balance",
            hops: vec![],
            reuse_connections: false,
            keep_alive_interval: Duration::ZERO,
            fallback_chain_ids: vec![],
        };
        let set = vec![
            WeightedPlan {
                weight: 0.0,
                plan: plan("never"),
            },
            WeightedPlan {
                weight: 1.0,
                plan: plan("always"),
            },
        ];
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            assert_eq!(select_weighted(set.clone(), &mut rng).chain_id, "always");
        }
    }

    #[test]
    fn reuse_key_is_stable_per_endpoint_identity() {
        let a = reuse_key(&inline_layer(0, "a"));
        let a_again = reuse_key(&inline_layer(5, "a"));
        let b = reuse_key(&inline_layer(0, "b"));
        assert_eq!(a, a_again);
        assert_ne!(a, b);
    }
}
