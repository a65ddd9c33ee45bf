//! Trust policy resolution and the verify-result decision table.

use hoplink_config::{TrustPolicy, TrustSettings};

use crate::record::IdentityType;
use crate::store::VerifyOutcome;

/// What a caller must do with a verify result under the effective policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    /// Identity already trusted; continue.
    Proceed,
    /// Trust and persist without involving the user.
    AutoTrust,
    /// Persist the new identity but surface a warning; do not block.
    WarnAndTrust,
    /// Block until a human decides.
    Prompt,
    /// Refuse the hop.
    Reject,
}

/// Resolves the effective policy for a host: per-connection override if
/// configured, else the global default, independently per identity type.
#[derive(Debug, Clone, Default)]
pub struct PolicyResolver {
    settings: TrustSettings,
}

impl PolicyResolver {
    pub fn new(settings: TrustSettings) -> Self {
        Self { settings }
    }

    pub fn effective(
        &self,
        identity_type: IdentityType,
        connection_id: Option<&str>,
    ) -> TrustPolicy {
        let override_policy = connection_id
            .and_then(|id| self.settings.connection_overrides.get(id))
            .and_then(|o| match identity_type {
                IdentityType::Tls => o.tls,
                IdentityType::Ssh => o.ssh,
            });

        override_policy.unwrap_or(match identity_type {
            IdentityType::Tls => self.settings.tls_default,
            IdentityType::Ssh => self.settings.ssh_default,
        })
    }
}

/// The canonical decision table.
///
/// `previously_approved` is the `user_approved` flag of the stored record
/// for the resolved scope (false when no record exists); it only matters
/// under `strict`.
pub fn decide(
    policy: TrustPolicy,
    outcome: VerifyOutcome,
    previously_approved: bool,
) -> TrustDecision {
    match (outcome, policy) {
        (VerifyOutcome::Trusted, _) => TrustDecision::Proceed,

        (VerifyOutcome::FirstUse, TrustPolicy::Tofu) => TrustDecision::AutoTrust,
        (VerifyOutcome::FirstUse, TrustPolicy::AlwaysAsk) => TrustDecision::Prompt,
        (VerifyOutcome::FirstUse, TrustPolicy::AlwaysTrust) => TrustDecision::AutoTrust,

        (VerifyOutcome::Changed, TrustPolicy::Tofu) => TrustDecision::WarnAndTrust,
        (VerifyOutcome::Changed, TrustPolicy::AlwaysAsk) => TrustDecision::Prompt,
        (VerifyOutcome::Changed, TrustPolicy::AlwaysTrust) => TrustDecision::AutoTrust,

        (_, TrustPolicy::Strict) => {
            if previously_approved {
                TrustDecision::Proceed
            } else {
                TrustDecision::Reject
            }
        }
    }
}
