//! Identity trust store for hoplink.
//!
//! Persists TLS certificate and SSH host-key identities keyed by
//! `(host, port, type, scope)` and evaluates observed identities against
//! them. The store itself is policy-agnostic and synchronous on the read
//! path; policy application (TOFU, always-ask, always-trust, strict) is a
//! separate decision table applied by callers, because the decision also
//! depends on whether a human is available to prompt.

mod backend;
mod error;
mod policy;
mod prompt;
mod record;
mod store;

pub use backend::{JsonFileBackend, MemoryBackend, PersistedRecord, TrustBackend};
pub use error::TrustError;
pub use policy::{decide, PolicyResolver, TrustDecision};
pub use prompt::{ChannelPrompter, PendingDecision, PromptAnswer, PromptRequest, TrustPrompter};
pub use record::{
    now_unix, IdentityInfo, IdentityType, ObservedIdentity, SupersededIdentity, TrustRecord,
    TrustScope,
};
pub use store::{TrustKey, TrustStore, VerifyOutcome};

// Policy values are configuration; re-exported here so trust consumers
// need not depend on hoplink-config directly.
pub use hoplink_config::TrustPolicy;
