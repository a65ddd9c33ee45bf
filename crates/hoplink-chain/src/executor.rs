//! Drives resolved execution plans through the hop drivers.
//!
//! Each connect runs as an independent task. At most one connect is in
//! flight per chain id: a duplicate request observes the in-flight result
//! instead of starting a second attempt. Cancellation and disconnection
//! tear established hops down in reverse order so no socket or ephemeral
//! resource outlives its chain.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use hoplink_config::{LayerKind, ProxyChain};
use hoplink_core::{HopError, Transport};
use hoplink_drivers::DriverRegistry;

use crate::events::{ChainEvent, EventBus};
use crate::resolver::{ChainResolver, ExecutionPlan};
use crate::status::{ChainStatus, HopStatus};

/// Final result of one connect request.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    Connected,
    Failed(HopError),
    Cancelled,
}

impl ConnectOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectOutcome::Connected)
    }
}

enum PlanError {
    Cancelled,
    Hop(HopError),
}

/// Runtime record of one chain, created on first connect request.
struct ActiveEntry {
    status: ChainStatus,
    hops: Vec<(u32, HopStatus)>,
    established: Vec<(LayerKind, Transport)>,
    /// Connect counter; doubles as the round-robin cursor.
    connect_count: u64,
    cancel: CancellationToken,
    inflight: Option<watch::Receiver<Option<ConnectOutcome>>>,
}

impl ActiveEntry {
    fn idle() -> Self {
        Self {
            status: ChainStatus::Idle,
            hops: Vec::new(),
            established: Vec::new(),
            connect_count: 0,
            cancel: CancellationToken::new(),
            inflight: None,
        }
    }
}

enum Admission {
    Observe(watch::Receiver<Option<ConnectOutcome>>),
    Run {
        cursor: u64,
        cancel: CancellationToken,
        tx: watch::Sender<Option<ConnectOutcome>>,
        rx: watch::Receiver<Option<ConnectOutcome>>,
    },
}

enum Teardown {
    AwaitCancel(Option<watch::Receiver<Option<ConnectOutcome>>>),
    Reverse,
    None,
}

/// Orchestrates active chains: connect, disconnect, status, events.
pub struct ChainExecutor {
    resolver: ChainResolver,
    drivers: DriverRegistry,
    events: EventBus,
    active: Mutex<HashMap<String, ActiveEntry>>,
    /// Established transports cached for `reuse_connections` chains,
    /// keyed by the planned hop's stable endpoint-identity hash.
    reuse: Mutex<HashMap<String, Transport>>,
}

impl ChainExecutor {
    pub fn new(resolver: ChainResolver, drivers: DriverRegistry, events: EventBus) -> Self {
        Self {
            resolver,
            drivers,
            events,
            active: Mutex::new(HashMap::new()),
            reuse: Mutex::new(HashMap::new()),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    pub fn status(&self, chain_id: &str) -> Option<ChainStatus> {
        self.active.lock().get(chain_id).map(|e| e.status)
    }

    /// Per-hop statuses in plan order. Empty for an unknown chain.
    pub fn hop_statuses(&self, chain_id: &str) -> Vec<(u32, HopStatus)> {
        self.active
            .lock()
            .get(chain_id)
            .map(|e| e.hops.clone())
            .unwrap_or_default()
    }

    /// Connect `chain`, waiting for the outcome. A connect already in
    /// flight for the same id is observed instead of duplicated.
    pub async fn connect(
        self: Arc<Self>,
        chain: ProxyChain,
        connection_id: Option<String>,
    ) -> ConnectOutcome {
        let chain_id = chain.id.clone();
        let (admission, stale) = {
            let mut active = self.active.lock();
            let entry = active
                .entry(chain_id.clone())
                .or_insert_with(ActiveEntry::idle);
            match (entry.status, entry.inflight.clone()) {
                (ChainStatus::Connecting, Some(rx)) => (Admission::Observe(rx), Vec::new()),
                _ => {
                    let (tx, rx) = watch::channel(None);
                    entry.status = ChainStatus::Connecting;
                    entry.hops.clear();
                    let stale = std::mem::take(&mut entry.established);
                    entry.cancel = CancellationToken::new();
                    entry.inflight = Some(rx.clone());
                    let cursor = entry.connect_count;
                    entry.connect_count += 1;
                    (
                        Admission::Run {
                            cursor,
                            cancel: entry.cancel.clone(),
                            tx,
                            rx,
                        },
                        stale,
                    )
                }
            }
        };

        let (cursor, cancel, tx, rx) = match admission {
            Admission::Observe(rx) => {
                debug!(chain = %chain_id, "connect already in flight, observing");
                return observe(rx).await;
            }
            Admission::Run {
                cursor,
                cancel,
                tx,
                rx,
            } => (cursor, cancel, tx, rx),
        };

        self.events.emit(ChainEvent::StatusChanged {
            chain_id: chain_id.clone(),
            status: ChainStatus::Connecting,
        });

        let this = Arc::clone(&self);
        let task_id = chain_id.clone();
        let span = info_span!("chain_connect", chain = %chain_id);
        tokio::spawn(
            async move {
                this.release_stale(stale).await;
                let outcome = this
                    .run_connect(&task_id, chain, connection_id, cursor, &cancel)
                    .await;
                let status = match &outcome {
                    ConnectOutcome::Connected => ChainStatus::Connected,
                    ConnectOutcome::Failed(e) => {
                        warn!(error = %e, "chain connect failed");
                        ChainStatus::Error
                    }
                    ConnectOutcome::Cancelled => ChainStatus::Disconnected,
                };
                {
                    let mut active = this.active.lock();
                    if let Some(entry) = active.get_mut(&task_id) {
                        entry.status = status;
                        entry.inflight = None;
                    }
                }
                this.events.emit(ChainEvent::StatusChanged {
                    chain_id: task_id,
                    status,
                });
                let _ = tx.send(Some(outcome));
            }
            .instrument(span),
        );

        observe(rx).await
    }

    /// Disconnect a chain: cancel an in-flight connect, or tear an
    /// established chain down in reverse hop order. Unknown or already
    /// disconnected chains are a no-op.
    pub async fn disconnect(&self, chain_id: &str) {
        let action = {
            let mut active = self.active.lock();
            let Some(entry) = active.get_mut(chain_id) else {
                return;
            };
            match entry.status {
                ChainStatus::Connecting => {
                    entry.cancel.cancel();
                    Teardown::AwaitCancel(entry.inflight.clone())
                }
                ChainStatus::Connected | ChainStatus::Error => {
                    entry.status = ChainStatus::Disconnecting;
                    Teardown::Reverse
                }
                _ => Teardown::None,
            }
        };

        match action {
            Teardown::AwaitCancel(rx) => {
                // The connect task tears down and reports disconnected.
                if let Some(rx) = rx {
                    let _ = observe(rx).await;
                }
            }
            Teardown::Reverse => {
                self.events.emit(ChainEvent::StatusChanged {
                    chain_id: chain_id.to_string(),
                    status: ChainStatus::Disconnecting,
                });
                self.teardown_established(chain_id).await;
                self.set_status(chain_id, ChainStatus::Disconnected);
            }
            Teardown::None => {}
        }
    }

    async fn run_connect(
        &self,
        active_id: &str,
        chain: ProxyChain,
        connection_id: Option<String>,
        cursor: u64,
        cancel: &CancellationToken,
    ) -> ConnectOutcome {
        let route = match self.resolver.resolve(&chain, cursor).await {
            Ok(route) => route,
            Err(e) => return ConnectOutcome::Failed(e),
        };
        let plan = {
            let mut rng = rand::thread_rng();
            route.choose(&mut rng)
        };
        info!(
            strategy = plan.strategy,
            hops = plan.hops.len(),
            "execution plan resolved"
        );
        if !plan.keep_alive_interval.is_zero() {
            debug!(
                interval = ?plan.keep_alive_interval,
                "keep-alive requested; transports are held open by their drivers"
            );
        }

        let primary_err = match self
            .run_plan(active_id, &plan, connection_id.as_deref(), cancel)
            .await
        {
            Ok(()) => return ConnectOutcome::Connected,
            Err(PlanError::Cancelled) => return ConnectOutcome::Cancelled,
            Err(PlanError::Hop(e)) => e,
        };

        if plan.fallback_chain_ids.is_empty() {
            return ConnectOutcome::Failed(primary_err);
        }

        // Fallback chains are resolved lazily, only now that the primary
        // has failed.
        let mut last = primary_err;
        for fallback_id in &plan.fallback_chain_ids {
            if cancel.is_cancelled() {
                return ConnectOutcome::Cancelled;
            }
            let Some(fallback) = self.resolver.lookup_chain(fallback_id).await else {
                warn!(fallback = %fallback_id, "fallback chain not found, skipping");
                continue;
            };
            info!(fallback = %fallback_id, error = %last, "attempting fallback chain");
            let route = match self.resolver.resolve(&fallback, 0).await {
                Ok(route) => route,
                Err(e) => {
                    last = e;
                    continue;
                }
            };
            let fb_plan = {
                let mut rng = rand::thread_rng();
                route.choose(&mut rng)
            };
            match self
                .run_plan(active_id, &fb_plan, connection_id.as_deref(), cancel)
                .await
            {
                Ok(()) => return ConnectOutcome::Connected,
                Err(PlanError::Cancelled) => return ConnectOutcome::Cancelled,
                Err(PlanError::Hop(e)) => last = e,
            }
        }
        ConnectOutcome::Failed(HopError::AllFallbacksExhausted(Box::new(last)))
    }

    async fn run_plan(
        &self,
        active_id: &str,
        plan: &ExecutionPlan,
        connection_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(), PlanError> {
        // A fallback plan replaces the primary's hop board.
        {
            let mut active = self.active.lock();
            if let Some(entry) = active.get_mut(active_id) {
                entry.hops = plan
                    .hops
                    .iter()
                    .map(|h| (h.position(), HopStatus::Pending))
                    .collect();
            }
        }
        for hop in &plan.hops {
            self.events.emit(ChainEvent::HopStatusChanged {
                chain_id: active_id.to_string(),
                position: hop.position(),
                status: HopStatus::Pending,
            });
        }

        let mut current = Transport::raw();
        for hop in &plan.hops {
            let position = hop.position();
            self.set_hop(active_id, position, HopStatus::Connecting);

            if plan.reuse_connections {
                let cached = self.reuse.lock().get(&hop.reuse_key).cloned();
                if let Some(transport) = cached {
                    debug!(position, transport = %transport, "reusing cached transport");
                    // Adopted transports are tracked like freshly established
                    // ones so disconnect tears them down and purges the cache.
                    {
                        let mut active = self.active.lock();
                        if let Some(entry) = active.get_mut(active_id) {
                            entry.established.push((hop.layer.kind, transport.clone()));
                        }
                    }
                    self.set_hop(active_id, position, HopStatus::Connected);
                    current = transport;
                    continue;
                }
            }

            let driver = self.drivers.driver_for(hop.layer.kind);
            let spec = hop.hop_spec(&plan.chain_id, connection_id);

            let mut attempt = 0u32;
            let outcome = loop {
                attempt += 1;
                let error = tokio::select! {
                    _ = cancel.cancelled() => {
                        self.teardown_established(active_id).await;
                        return Err(PlanError::Cancelled);
                    }
                    r = tokio::time::timeout(hop.timeout, driver.establish(&spec, current.clone())) => {
                        match r {
                            Ok(Ok(transport)) => break Ok(transport),
                            Ok(Err(e)) => e,
                            Err(_) => HopError::Timeout(hop.timeout),
                        }
                    }
                };
                if attempt > hop.retries || !error.is_retryable() {
                    break Err(error);
                }
                debug!(position, attempt, error = %error, "hop attempt failed, retrying");
            };

            match outcome {
                Ok(transport) => {
                    if plan.reuse_connections {
                        self.reuse
                            .lock()
                            .insert(hop.reuse_key.clone(), transport.clone());
                    }
                    {
                        let mut active = self.active.lock();
                        if let Some(entry) = active.get_mut(active_id) {
                            entry.established.push((hop.layer.kind, transport.clone()));
                        }
                    }
                    self.set_hop(active_id, position, HopStatus::Connected);
                    current = transport;
                }
                Err(e) => {
                    self.set_hop(active_id, position, HopStatus::Error(e.clone()));
                    self.events.emit(ChainEvent::HopFailed {
                        chain_id: active_id.to_string(),
                        position,
                        error: e.clone(),
                    });
                    if hop.skippable {
                        warn!(position, error = %e, "skippable hop failed, advancing");
                        continue;
                    }
                    self.teardown_established(active_id).await;
                    return Err(PlanError::Hop(e));
                }
            }
        }
        Ok(())
    }

    /// Tear every established hop of `active_id` down, newest first, and
    /// drop their reuse-cache entries. A transport recorded more than once
    /// (adopted via the reuse cache at several positions) is closed once.
    async fn teardown_established(&self, active_id: &str) {
        let established = {
            let mut active = self.active.lock();
            active
                .get_mut(active_id)
                .map(|e| std::mem::take(&mut e.established))
                .unwrap_or_default()
        };
        if established.is_empty() {
            return;
        }
        {
            let mut reuse = self.reuse.lock();
            reuse.retain(|_, t| !established.iter().any(|(_, e)| e.id() == t.id()));
        }
        let mut closed = std::collections::HashSet::new();
        for (kind, transport) in established.into_iter().rev() {
            if !closed.insert(transport.id()) {
                continue;
            }
            debug!(transport = %transport, "tearing hop down");
            self.drivers.driver_for(kind).teardown(&transport).await;
        }
    }

    /// Release transports left over from a previous run of the same chain.
    /// Transports still present in the reuse cache stay alive so the new
    /// run can adopt them; everything else is torn down in reverse order.
    async fn release_stale(&self, stale: Vec<(LayerKind, Transport)>) {
        if stale.is_empty() {
            return;
        }
        let stale: Vec<_> = {
            let reuse = self.reuse.lock();
            stale
                .into_iter()
                .filter(|(_, t)| !reuse.values().any(|r| r.id() == t.id()))
                .collect()
        };
        for (kind, transport) in stale.into_iter().rev() {
            debug!(transport = %transport, "tearing stale hop down");
            self.drivers.driver_for(kind).teardown(&transport).await;
        }
    }

    fn set_hop(&self, active_id: &str, position: u32, status: HopStatus) {
        {
            let mut active = self.active.lock();
            if let Some(entry) = active.get_mut(active_id) {
                if let Some(slot) = entry.hops.iter_mut().find(|(p, _)| *p == position) {
                    slot.1 = status.clone();
                }
            }
        }
        self.events.emit(ChainEvent::HopStatusChanged {
            chain_id: active_id.to_string(),
            position,
            status,
        });
    }

    fn set_status(&self, chain_id: &str, status: ChainStatus) {
        {
            let mut active = self.active.lock();
            if let Some(entry) = active.get_mut(chain_id) {
                entry.status = status;
            }
        }
        self.events.emit(ChainEvent::StatusChanged {
            chain_id: chain_id.to_string(),
            status,
        });
    }
}

impl std::fmt::Debug for ChainExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainExecutor").finish_non_exhaustive()
    }
}

/// Wait on a connect task's watch channel for its outcome.
async fn observe(mut rx: watch::Receiver<Option<ConnectOutcome>>) -> ConnectOutcome {
    loop {
        let current = rx.borrow().clone();
        if let Some(outcome) = current {
            return outcome;
        }
        if rx.changed().await.is_err() {
            return ConnectOutcome::Failed(HopError::HandshakeFailed(
                "connect task dropped before reporting".into(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use hoplink_config::{
        ChainDynamics, ChainLayer, ChainTuning, EndpointConfig, InMemoryCatalog, LayerSource,
        NodeConfig, ProxyProtocol,
    };
    use hoplink_core::HopErrorKind;
    use hoplink_drivers::{HopDriver, HopSpec};

    use crate::status::HopStatusKind;

    #[derive(Clone, Default)]
    struct Script {
        fail: bool,
        hang: bool,
        gate: Option<Arc<Notify>>,
    }

    /// Driver whose behavior is scripted per endpoint host.
    struct ScriptedDriver {
        scripts: HashMap<String, Script>,
        attempts: Mutex<HashMap<String, u32>>,
        inputs: Mutex<Vec<(String, String)>>,
        torn: Mutex<Vec<String>>,
    }

    impl ScriptedDriver {
        fn new(scripts: Vec<(&str, Script)>) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts
                    .into_iter()
                    .map(|(h, s)| (h.to_string(), s))
                    .collect(),
                attempts: Mutex::new(HashMap::new()),
                inputs: Mutex::new(Vec::new()),
                torn: Mutex::new(Vec::new()),
            })
        }

        fn attempts_for(&self, host: &str) -> u32 {
            self.attempts.lock().get(host).copied().unwrap_or(0)
        }

        fn last_input_for(&self, host: &str) -> Option<String> {
            self.inputs
                .lock()
                .iter()
                .rev()
                .find(|(h, _)| h == host)
                .map(|(_, i)| i.clone())
        }
    }

    #[async_trait]
    impl HopDriver for ScriptedDriver {
        async fn establish(&self, spec: &HopSpec, input: Transport) -> Result<Transport, HopError> {
            let host = spec.endpoint.host.clone();
            *self.attempts.lock().entry(host.clone()).or_insert(0) += 1;
            self.inputs
                .lock()
                .push((host.clone(), input.descriptor().to_string()));

            let script = self.scripts.get(&host).cloned().unwrap_or_default();
            if let Some(gate) = &script.gate {
                gate.notified().await;
            }
            if script.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if script.fail {
                return Err(HopError::HandshakeFailed(format!("{host} refused")));
            }
            Ok(Transport::stream(format!("via {host}")))
        }

        async fn teardown(&self, transport: &Transport) {
            self.torn.lock().push(transport.descriptor().to_string());
        }
    }

    fn layer(position: u32, host: &str) -> ChainLayer {
        ChainLayer {
            position,
            kind: hoplink_config::LayerKind::Proxy,
            source: LayerSource::Inline(EndpointConfig {
                host: host.into(),
                port: 1080,
                protocol: Some(ProxyProtocol::Socks5),
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

    fn executor(
        driver: Arc<ScriptedDriver>,
    ) -> (Arc<ChainExecutor>, Arc<InMemoryCatalog>) {
        let catalog = InMemoryCatalog::new();
        let resolver = ChainResolver::new(catalog.clone(), catalog.clone());
        let drivers = DriverRegistry::new(driver.clone(), driver.clone(), driver);
        (
            Arc::new(ChainExecutor::new(resolver, drivers, EventBus::new(64))),
            catalog,
        )
    }

    fn hop_kind(executor: &ChainExecutor, chain_id: &str, position: u32) -> HopStatusKind {
        executor
            .hop_statuses(chain_id)
            .into_iter()
            .find(|(p, _)| *p == position)
            .map(|(_, s)| s.kind())
            .unwrap_or(HopStatusKind::Pending)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn strict_chain_layers_transports_in_order() {
        let driver = ScriptedDriver::new(vec![]);
        let (exec, _) = executor(driver.clone());
        let c = chain(
            "c1",
            vec![layer(0, "a"), layer(1, "b")],
            ChainDynamics::default(),
        );

        assert!(exec.clone().connect(c, None).await.is_connected());
        assert_eq!(exec.status("c1"), Some(ChainStatus::Connected));
        assert_eq!(hop_kind(&exec, "c1", 0), HopStatusKind::Connected);
        assert_eq!(hop_kind(&exec, "c1", 1), HopStatusKind::Connected);
        // The first hop rides the raw network, the second rides hop 0.
        assert_eq!(driver.last_input_for("a").unwrap(), "raw network");
        assert_eq!(driver.last_input_for("b").unwrap(), "via a");
    }

    #[tokio::test]
    async fn retry_budget_of_two_means_three_attempts() {
        let driver = ScriptedDriver::new(vec![(
            "flaky",
            Script {
                fail: true,
                ..Default::default()
            },
        )]);
        let (exec, _) = executor(driver.clone());
        let mut l = layer(0, "flaky");
        l.node.retry_count = Some(2);
        let c = chain("c1", vec![l], ChainDynamics::default());

        let outcome = exec.clone().connect(c, None).await;
        assert!(matches!(
            outcome,
            ConnectOutcome::Failed(HopError::HandshakeFailed(_))
        ));
        assert_eq!(driver.attempts_for("flaky"), 3);
        assert_eq!(exec.status("c1"), Some(ChainStatus::Error));
    }

    #[tokio::test]
    async fn timed_out_hop_errors_after_retry_and_keeps_earlier_hops_connected() {
        let driver = ScriptedDriver::new(vec![(
            "slow",
            Script {
                hang: true,
                ..Default::default()
            },
        )]);
        let (exec, _) = executor(driver.clone());
        let c = chain(
            "c1",
            vec![layer(0, "a"), layer(1, "slow")],
            ChainDynamics::Strict {
                tuning: ChainTuning {
                    hop_timeout_ms: Some(25),
                    max_retries_per_hop: Some(1),
                    ..Default::default()
                },
            },
        );

        let outcome = exec.clone().connect(c, None).await;
        match outcome {
            ConnectOutcome::Failed(e) => assert_eq!(e.kind(), HopErrorKind::Timeout),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(driver.attempts_for("slow"), 2);
        assert_eq!(exec.status("c1"), Some(ChainStatus::Error));
        assert_eq!(hop_kind(&exec, "c1", 0), HopStatusKind::Connected);
        assert_eq!(hop_kind(&exec, "c1", 1), HopStatusKind::Error);
        // Hop 0 was torn down when the plan aborted.
        assert_eq!(driver.torn.lock().as_slice(), ["via a"]);
    }

    #[tokio::test]
    async fn skippable_hop_failure_advances_with_previous_transport() {
        let driver = ScriptedDriver::new(vec![(
            "down",
            Script {
                fail: true,
                ..Default::default()
            },
        )]);
        let (exec, _) = executor(driver.clone());
        let mut skippable = layer(1, "down");
        skippable.node.skip_on_failure = Some(true);
        skippable.node.retry_count = Some(0);
        let c = chain(
            "c1",
            vec![layer(0, "a"), skippable, layer(2, "c")],
            ChainDynamics::Dynamic {
                tuning: ChainTuning::default(),
            },
        );

        assert!(exec.clone().connect(c, None).await.is_connected());
        assert_eq!(hop_kind(&exec, "c1", 1), HopStatusKind::Error);
        assert_eq!(hop_kind(&exec, "c1", 2), HopStatusKind::Connected);
        // Hop 2 rides hop 0's transport, not the failed hop's.
        assert_eq!(driver.last_input_for("c").unwrap(), "via a");
    }

    #[tokio::test]
    async fn failover_connects_through_fallback_chain() {
        let driver = ScriptedDriver::new(vec![(
            "down",
            Script {
                fail: true,
                ..Default::default()
            },
        )]);
        let (exec, catalog) = executor(driver.clone());
        catalog.insert_chain(chain(
            "backup",
            vec![layer(0, "up")],
            ChainDynamics::default(),
        ));
        let c = chain(
            "primary",
            vec![layer(0, "down")],
            ChainDynamics::Failover {
                fallback_chain_ids: vec!["backup".into()],
                tuning: ChainTuning::default(),
            },
        );

        assert!(exec.clone().connect(c, None).await.is_connected());
        assert_eq!(exec.status("primary"), Some(ChainStatus::Connected));
        assert_eq!(driver.attempts_for("up"), 1);
    }

    #[tokio::test]
    async fn exhausted_fallbacks_surface_aggregate_error() {
        let driver = ScriptedDriver::new(vec![
            (
                "down",
                Script {
                    fail: true,
                    ..Default::default()
                },
            ),
            (
                "also-down",
                Script {
                    fail: true,
                    ..Default::default()
                },
            ),
        ]);
        let (exec, catalog) = executor(driver);
        catalog.insert_chain(chain(
            "backup",
            vec![layer(0, "also-down")],
            ChainDynamics::default(),
        ));
        let c = chain(
            "primary",
            vec![layer(0, "down")],
            ChainDynamics::Failover {
                fallback_chain_ids: vec!["backup".into(), "missing".into()],
                tuning: ChainTuning::default(),
            },
        );

        match exec.clone().connect(c, None).await {
            ConnectOutcome::Failed(e) => {
                assert_eq!(e.kind(), HopErrorKind::AllFallbacksExhausted);
                assert_eq!(e.root().kind(), HopErrorKind::HandshakeFailed);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_connect_observes_inflight_attempt() {
        let gate = Arc::new(Notify::new());
        let driver = ScriptedDriver::new(vec![(
            "a",
            Script {
                gate: Some(gate.clone()),
                ..Default::default()
            },
        )]);
        let (exec, _) = executor(driver.clone());
        let c = chain("c1", vec![layer(0, "a")], ChainDynamics::default());

        let first = tokio::spawn({
            let exec = exec.clone();
            let c = c.clone();
            async move { exec.clone().connect(c, None).await }
        });
        {
            let exec = exec.clone();
            wait_until(move || exec.status("c1") == Some(ChainStatus::Connecting)).await;
        }
        let second = tokio::spawn({
            let exec = exec.clone();
            async move { exec.clone().connect(c, None).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        assert!(first.await.unwrap().is_connected());
        assert!(second.await.unwrap().is_connected());
        assert_eq!(driver.attempts_for("a"), 1);
    }

    #[tokio::test]
    async fn reuse_cache_skips_reestablishment() {
        let driver = ScriptedDriver::new(vec![]);
        let (exec, _) = executor(driver.clone());
        let c = chain(
            "c1",
            vec![layer(0, "a")],
            ChainDynamics::Strict {
                tuning: ChainTuning {
                    reuse_connections: true,
                    ..Default::default()
                },
            },
        );

        assert!(exec.clone().connect(c.clone(), None).await.is_connected());
        assert!(exec.clone().connect(c, None).await.is_connected());
        assert_eq!(driver.attempts_for("a"), 1);
    }

    #[tokio::test]
    async fn reconnect_tears_down_previous_run_transports() {
        let driver = ScriptedDriver::new(vec![]);
        let (exec, _) = executor(driver.clone());
        let c = chain(
            "c1",
            vec![layer(0, "a"), layer(1, "b")],
            ChainDynamics::default(),
        );

        assert!(exec.clone().connect(c.clone(), None).await.is_connected());
        assert!(driver.torn.lock().is_empty());
        assert!(exec.clone().connect(c, None).await.is_connected());

        // The first run's transports were closed, newest first, before the
        // second run started establishing.
        assert_eq!(driver.torn.lock().as_slice(), ["via b", "via a"]);
        assert_eq!(driver.attempts_for("a"), 2);
        assert_eq!(exec.status("c1"), Some(ChainStatus::Connected));
    }

    #[tokio::test]
    async fn disconnect_after_reuse_hit_tears_down_and_purges_cache() {
        let driver = ScriptedDriver::new(vec![]);
        let (exec, _) = executor(driver.clone());
        let c = chain(
            "c1",
            vec![layer(0, "a")],
            ChainDynamics::Strict {
                tuning: ChainTuning {
                    reuse_connections: true,
                    ..Default::default()
                },
            },
        );

        assert!(exec.clone().connect(c.clone(), None).await.is_connected());
        assert!(exec.clone().connect(c.clone(), None).await.is_connected());
        assert_eq!(driver.attempts_for("a"), 1);

        exec.disconnect("c1").await;
        assert_eq!(exec.status("c1"), Some(ChainStatus::Disconnected));
        assert_eq!(driver.torn.lock().as_slice(), ["via a"]);

        // The cache entry went with it: the next connect re-establishes.
        assert!(exec.clone().connect(c, None).await.is_connected());
        assert_eq!(driver.attempts_for("a"), 2);
    }

    #[tokio::test]
    async fn disconnect_tears_down_in_reverse_order() {
        let driver = ScriptedDriver::new(vec![]);
        let (exec, _) = executor(driver.clone());
        let c = chain(
            "c1",
            vec![layer(0, "a"), layer(1, "b")],
            ChainDynamics::default(),
        );

        assert!(exec.clone().connect(c, None).await.is_connected());
        exec.disconnect("c1").await;
        assert_eq!(exec.status("c1"), Some(ChainStatus::Disconnected));
        assert_eq!(driver.torn.lock().as_slice(), ["via b", "via a"]);
    }

    #[tokio::test]
    async fn cancelling_inflight_connect_tears_down_established_hops() {
        let gate = Arc::new(Notify::new());
        let driver = ScriptedDriver::new(vec![(
            "stuck",
            Script {
                gate: Some(gate),
                ..Default::default()
            },
        )]);
        let (exec, _) = executor(driver.clone());
        let c = chain(
            "c1",
            vec![layer(0, "a"), layer(1, "stuck")],
            ChainDynamics::default(),
        );

        let handle = tokio::spawn({
            let exec = exec.clone();
            async move { exec.clone().connect(c, None).await }
        });
        {
            let driver = driver.clone();
            wait_until(move || driver.attempts_for("stuck") >= 1).await;
        }
        exec.disconnect("c1").await;

        assert!(matches!(handle.await.unwrap(), ConnectOutcome::Cancelled));
        assert_eq!(exec.status("c1"), Some(ChainStatus::Disconnected));
        assert_eq!(driver.torn.lock().as_slice(), ["via a"]);
    }

    #[tokio::test]
    async fn dangling_profile_fails_the_connect() {
        let driver = ScriptedDriver::new(vec![]);
        let (exec, _) = executor(driver);
        let mut l = layer(0, "ignored");
        l.source = LayerSource::Profile("deleted".into());
        let c = chain("c1", vec![l], ChainDynamics::default());

        match exec.clone().connect(c, None).await {
            ConnectOutcome::Failed(e) => assert_eq!(e.kind(), HopErrorKind::ProfileNotFound),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(exec.status("c1"), Some(ChainStatus::Error));
    }

    #[tokio::test]
    async fn connect_emits_status_transitions() {
        let driver = ScriptedDriver::new(vec![]);
        let (exec, _) = executor(driver);
        let mut rx = exec.subscribe();
        let c = chain("c1", vec![layer(0, "a")], ChainDynamics::default());

        assert!(exec.clone().connect(c, None).await.is_connected());

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ChainEvent::StatusChanged { status, .. } = event {
                seen.push(status);
            }
        }
        assert_eq!(seen.first(), Some(&ChainStatus::Connecting));
        assert_eq!(seen.last(), Some(&ChainStatus::Connected));
    }
}
