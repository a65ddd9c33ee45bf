//! Trust record shapes.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Which kind of cryptographic identity a record covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    Tls,
    Ssh,
}

/// Whether a record applies globally or to one specific connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrustScope {
    Global,
    Connection(String),
}

impl fmt::Display for TrustScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustScope::Global => write!(f, "global"),
            TrustScope::Connection(id) => write!(f, "connection:{id}"),
        }
    }
}

/// An identity as observed during a handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservedIdentity {
    /// Certificate or host-key fingerprint (the comparison key).
    pub fingerprint: String,
    /// Human-readable subject (certificate DN, key comment, ...).
    pub subject: String,
}

/// The currently trusted identity for a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityInfo {
    pub fingerprint: String,
    pub subject: String,
    /// Unix seconds when this identity was first seen.
    pub first_seen: u64,
    /// Unix seconds when this identity was last seen.
    pub last_seen: u64,
}

/// A previously trusted identity, kept for audit history.
///
/// Entries are append-only: once superseded they are never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupersededIdentity {
    pub fingerprint: String,
    pub subject: String,
    pub first_seen: u64,
    pub last_seen: u64,
    /// Unix seconds when this identity was replaced.
    pub superseded_at: u64,
}

/// Persisted trust state for one `(host, port, type, scope)` key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrustRecord {
    pub identity: IdentityInfo,
    /// Ordered oldest-to-newest.
    #[serde(default)]
    pub history: Vec<SupersededIdentity>,
    #[serde(default)]
    pub user_approved: bool,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl TrustRecord {
    /// Create a fresh record for a first-seen identity.
    pub fn first_seen(observed: &ObservedIdentity, user_approved: bool, now: u64) -> Self {
        Self {
            identity: IdentityInfo {
                fingerprint: observed.fingerprint.clone(),
                subject: observed.subject.clone(),
                first_seen: now,
                last_seen: now,
            },
            history: Vec::new(),
            user_approved,
            nickname: None,
        }
    }

    /// Replace the current identity, appending the old one to history.
    pub fn supersede(&mut self, observed: &ObservedIdentity, user_approved: bool, now: u64) {
        let old = &self.identity;
        self.history.push(SupersededIdentity {
            fingerprint: old.fingerprint.clone(),
            subject: old.subject.clone(),
            first_seen: old.first_seen,
            last_seen: old.last_seen,
            superseded_at: now,
        });
        self.identity = IdentityInfo {
            fingerprint: observed.fingerprint.clone(),
            subject: observed.subject.clone(),
            first_seen: now,
            last_seen: now,
        };
        self.user_approved = user_approved;
    }
}

/// Current unix timestamp in seconds.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
