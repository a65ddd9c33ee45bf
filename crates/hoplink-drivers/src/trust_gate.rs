//! The identity trust gate shared by secured drivers.
//!
//! Runs verify → decide → act for an observed identity: auto-trusting
//! policies persist and continue, prompting policies suspend on the
//! injected prompter, strict policy rejects unapproved identities.

use std::sync::Arc;

use tracing::{debug, warn};

use hoplink_core::HopError;
use hoplink_trust::{
    decide, IdentityType, ObservedIdentity, PolicyResolver, PromptAnswer, PromptRequest,
    TrustDecision, TrustError, TrustPrompter, TrustScope, TrustStore,
};

pub struct TrustGate {
    store: Arc<TrustStore>,
    resolver: PolicyResolver,
    prompter: Arc<dyn TrustPrompter>,
}

impl TrustGate {
    pub fn new(
        store: Arc<TrustStore>,
        resolver: PolicyResolver,
        prompter: Arc<dyn TrustPrompter>,
    ) -> Self {
        Self {
            store,
            resolver,
            prompter,
        }
    }

    pub fn store(&self) -> &Arc<TrustStore> {
        &self.store
    }

    /// Resolve the trust decision for an observed identity, blocking on a
    /// prompt when policy demands one.
    pub async fn check(
        &self,
        host: &str,
        port: u16,
        identity_type: IdentityType,
        observed: &ObservedIdentity,
        connection_id: Option<&str>,
    ) -> Result<(), HopError> {
        let scope = match connection_id {
            Some(id) => TrustScope::Connection(id.to_string()),
            None => TrustScope::Global,
        };

        let outcome = self
            .store
            .verify_identity(host, port, identity_type, observed, &scope);
        let approved = self.store.is_approved(host, port, identity_type, &scope);
        let policy = self.resolver.effective(identity_type, connection_id);
        let decision = decide(policy, outcome, approved);

        debug!(
            host,
            port,
            ?identity_type,
            ?outcome,
            ?policy,
            ?decision,
            "identity verified"
        );

        match decision {
            TrustDecision::Proceed => Ok(()),

            TrustDecision::AutoTrust => {
                self.persist(host, port, identity_type, observed, false, scope)
                    .await
            }

            TrustDecision::WarnAndTrust => {
                warn!(
                    host,
                    port,
                    fingerprint = %observed.fingerprint,
                    "identity changed, trusting new identity per policy"
                );
                self.persist(host, port, identity_type, observed, false, scope)
                    .await
            }

            TrustDecision::Prompt => {
                let request = PromptRequest {
                    host: host.to_string(),
                    port,
                    identity_type,
                    scope: scope.clone(),
                    outcome,
                    observed: observed.clone(),
                };
                match self.prompter.prompt(request).await {
                    PromptAnswer::Trust => {
                        self.persist(host, port, identity_type, observed, true, scope)
                            .await
                    }
                    PromptAnswer::Reject => {
                        Err(HopError::IdentityRejected(format!("{host}:{port}")))
                    }
                }
            }

            TrustDecision::Reject => Err(HopError::IdentityRejected(format!("{host}:{port}"))),
        }
    }

    async fn persist(
        &self,
        host: &str,
        port: u16,
        identity_type: IdentityType,
        observed: &ObservedIdentity,
        user_approved: bool,
        scope: TrustScope,
    ) -> Result<(), HopError> {
        self.store
            .trust_identity(host, port, identity_type, observed, user_approved, scope)
            .await
            .map_err(|e: TrustError| {
                HopError::HandshakeFailed(format!("trust store write failed: {e}"))
            })
    }
}

impl std::fmt::Debug for TrustGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustGate").finish_non_exhaustive()
    }
}
