//! The trust store: verify, trust, and administer identity records.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::backend::{PersistedRecord, TrustBackend};
use crate::error::TrustError;
use crate::record::{now_unix, IdentityType, ObservedIdentity, TrustRecord, TrustScope};

/// Full key of a trust record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrustKey {
    pub host: String,
    pub port: u16,
    pub identity_type: IdentityType,
    pub scope: TrustScope,
}

impl TrustKey {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        identity_type: IdentityType,
        scope: TrustScope,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            identity_type,
            scope,
        }
    }
}

/// Result of comparing an observed identity against the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Exact fingerprint match.
    Trusted,
    /// No record exists for the resolved scope.
    FirstUse,
    /// A record exists with a different fingerprint.
    Changed,
}

/// Identity trust store.
///
/// The record map is shared mutable state: the outer map is guarded by a
/// read-write lock, each record by its own lock, so two hops racing to
/// establish records for different hosts never serialize against each
/// other. The store is an injected object, not a process-wide singleton.
pub struct TrustStore {
    records: RwLock<HashMap<TrustKey, Arc<RwLock<TrustRecord>>>>,
    backend: Arc<dyn TrustBackend>,
}

impl TrustStore {
    /// Open a store, loading existing records from the backend.
    pub async fn open(backend: Arc<dyn TrustBackend>) -> Result<Self, TrustError> {
        let mut records = HashMap::new();
        for persisted in backend.load_all().await? {
            let key = TrustKey::new(
                persisted.host,
                persisted.port,
                persisted.identity_type,
                persisted.scope,
            );
            records.insert(key, Arc::new(RwLock::new(persisted.record)));
        }
        debug!(count = records.len(), "trust store loaded");
        Ok(Self {
            records: RwLock::new(records),
            backend,
        })
    }

    /// Compare `observed` against the stored record for the resolved scope.
    ///
    /// Side-effect free. A connection scope with no record falls back to
    /// the global scope before reporting first use.
    pub fn verify_identity(
        &self,
        host: &str,
        port: u16,
        identity_type: IdentityType,
        observed: &ObservedIdentity,
        scope: &TrustScope,
    ) -> VerifyOutcome {
        let record = match self.lookup(host, port, identity_type, scope) {
            Some(record) => record,
            None => return VerifyOutcome::FirstUse,
        };

        let record = record.read();
        if record.identity.fingerprint == observed.fingerprint {
            VerifyOutcome::Trusted
        } else {
            VerifyOutcome::Changed
        }
    }

    /// Whether the record for the resolved scope was explicitly approved
    /// by the user. `false` when no record exists.
    pub fn is_approved(
        &self,
        host: &str,
        port: u16,
        identity_type: IdentityType,
        scope: &TrustScope,
    ) -> bool {
        self.lookup(host, port, identity_type, scope)
            .map(|r| r.read().user_approved)
            .unwrap_or(false)
    }

    /// Idempotent upsert: create the record on first use, or append the
    /// prior identity to history and replace the current one on change.
    /// Always refreshes `last_seen`.
    pub async fn trust_identity(
        &self,
        host: &str,
        port: u16,
        identity_type: IdentityType,
        observed: &ObservedIdentity,
        user_approved: bool,
        scope: TrustScope,
    ) -> Result<(), TrustError> {
        let key = TrustKey::new(host, port, identity_type, scope);
        let now = now_unix();

        let entry = {
            let mut map = self.records.write();
            map.entry(key)
                .or_insert_with(|| {
                    Arc::new(RwLock::new(TrustRecord::first_seen(
                        observed,
                        user_approved,
                        now,
                    )))
                })
                .clone()
        };

        {
            let mut record = entry.write();
            if record.identity.fingerprint == observed.fingerprint {
                record.identity.last_seen = now;
                if user_approved {
                    record.user_approved = true;
                }
            } else {
                record.supersede(observed, user_approved, now);
            }
        }

        self.persist().await
    }

    /// Set or clear the nickname on an existing record.
    pub async fn set_nickname(
        &self,
        host: &str,
        port: u16,
        identity_type: IdentityType,
        scope: TrustScope,
        nickname: Option<String>,
    ) -> Result<bool, TrustError> {
        let key = TrustKey::new(host, port, identity_type, scope);
        let entry = self.records.read().get(&key).cloned();
        match entry {
            Some(record) => {
                record.write().nickname = nickname;
                self.persist().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove one record. Returns whether a record existed.
    pub async fn remove_identity(
        &self,
        host: &str,
        port: u16,
        identity_type: IdentityType,
        scope: TrustScope,
    ) -> Result<bool, TrustError> {
        let key = TrustKey::new(host, port, identity_type, scope);
        let removed = self.records.write().remove(&key).is_some();
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Drop every record.
    pub async fn clear_all(&self) -> Result<(), TrustError> {
        self.records.write().clear();
        self.persist().await
    }

    /// Snapshot all records, optionally filtered by scope.
    pub fn list_records(&self, scope: Option<&TrustScope>) -> Vec<(TrustKey, TrustRecord)> {
        let map = self.records.read();
        let mut out: Vec<(TrustKey, TrustRecord)> = map
            .iter()
            .filter(|(key, _)| scope.map_or(true, |s| &key.scope == s))
            .map(|(key, record)| (key.clone(), record.read().clone()))
            .collect();
        out.sort_by(|a, b| {
            (&a.0.host, a.0.port).cmp(&(&b.0.host, b.0.port))
        });
        out
    }

    /// Snapshot a single record for the exact key (no scope fallback).
    pub fn get(
        &self,
        host: &str,
        port: u16,
        identity_type: IdentityType,
        scope: &TrustScope,
    ) -> Option<TrustRecord> {
        let key = TrustKey::new(host, port, identity_type, scope.clone());
        self.records.read().get(&key).map(|r| r.read().clone())
    }

    /// Find the record for a scope, falling back from connection scope to
    /// global when no per-connection record exists.
    fn lookup(
        &self,
        host: &str,
        port: u16,
        identity_type: IdentityType,
        scope: &TrustScope,
    ) -> Option<Arc<RwLock<TrustRecord>>> {
        let map = self.records.read();
        let exact = TrustKey::new(host, port, identity_type, scope.clone());
        if let Some(record) = map.get(&exact) {
            return Some(record.clone());
        }
        if matches!(scope, TrustScope::Connection(_)) {
            let global = TrustKey::new(host, port, identity_type, TrustScope::Global);
            return map.get(&global).cloned();
        }
        None
    }

    async fn persist(&self) -> Result<(), TrustError> {
        let snapshot: Vec<PersistedRecord> = {
            let map = self.records.read();
            map.iter()
                .map(|(key, record)| PersistedRecord {
                    host: key.host.clone(),
                    port: key.port,
                    identity_type: key.identity_type,
                    scope: key.scope.clone(),
                    record: record.read().clone(),
                })
                .collect()
        };
        self.backend.persist_all(&snapshot).await
    }
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore")
            .field("records", &self.records.read().len())
            .finish_non_exhaustive()
    }
}
