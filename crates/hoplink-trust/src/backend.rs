//! Pluggable persistence backends for the trust store.

use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::TrustError;
use crate::record::{IdentityType, TrustRecord, TrustScope};

/// One record with its full key, as written to durable storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedRecord {
    pub host: String,
    pub port: u16,
    pub identity_type: IdentityType,
    pub scope: TrustScope,
    pub record: TrustRecord,
}

/// Data-access trait for trust record persistence.
///
/// The store holds the authoritative in-memory map and writes through on
/// every mutation; backends only need wholesale load/persist.
#[async_trait]
pub trait TrustBackend: Send + Sync {
    async fn load_all(&self) -> Result<Vec<PersistedRecord>, TrustError>;
    async fn persist_all(&self, records: &[PersistedRecord]) -> Result<(), TrustError>;
}

/// In-memory backend for tests and ephemeral stores.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<Vec<PersistedRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the last persisted state, for test assertions.
    pub fn snapshot(&self) -> Vec<PersistedRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl TrustBackend for MemoryBackend {
    async fn load_all(&self) -> Result<Vec<PersistedRecord>, TrustError> {
        Ok(self.records.read().clone())
    }

    async fn persist_all(&self, records: &[PersistedRecord]) -> Result<(), TrustError> {
        *self.records.write() = records.to_vec();
        Ok(())
    }
}

/// JSON-file backend. The whole record set is rewritten on each persist;
/// a missing file loads as empty.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TrustBackend for JsonFileBackend {
    async fn load_all(&self) -> Result<Vec<PersistedRecord>, TrustError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist_all(&self, records: &[PersistedRecord]) -> Result<(), TrustError> {
        let data = serde_json::to_vec_pretty(records)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so a crash mid-write never truncates the store.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
