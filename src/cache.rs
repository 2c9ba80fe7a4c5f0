// ==============================================================================
// cache.rs - Gene Artifact Cache
// ==============================================================================
// Description: Keyed cache of per-sample, per-gene artifacts (memory or SQLite)
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Cache failures are never fatal: the gateway logs them and reports a miss
// (reads) or a skipped write.
// ==============================================================================

use crate::models::{CachePolicy, SampleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache task failed: {0}")]
    Task(String),

    #[error("Cache connection lock poisoned")]
    Poisoned,
}

/// Artifact kind stored per sample and gene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Annotated variant set (loaded plus any merged called variants)
    Variants,
    Coverage,
    /// Joint-caller output unique to the sample
    CalledVariants,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Variants => "variants",
            DataKind::Coverage => "coverage",
            DataKind::CalledVariants => "called_variants",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub sample_id: SampleId,
    pub gene_name: String,
    pub transcript_id: String,
    pub kind: DataKind,
}

impl CacheKey {
    pub fn new(sample_id: &SampleId, gene_name: &str, transcript_id: &str, kind: DataKind) -> Self {
        Self {
            sample_id: sample_id.clone(),
            gene_name: gene_name.to_string(),
            transcript_id: transcript_id.to_string(),
            kind,
        }
    }
}

/// Serialized artifact plus when it was stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: String,
    pub stored_at: DateTime<Utc>,
}

/// Storage backend behind the gateway
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError>;
}

/// In-process cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }
}

/// Persistent cache in a single SQLite table
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Open (or create) a cache database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let conn = Connection::open(path.as_ref())?;
        let cache = Self::init(conn)?;
        info!("Opened cache database {}", path.as_ref().display());
        Ok(cache)
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                sample_id     TEXT NOT NULL,
                gene_name     TEXT NOT NULL,
                transcript_id TEXT NOT NULL,
                data_kind     TEXT NOT NULL,
                payload       TEXT NOT NULL,
                stored_at     INTEGER NOT NULL,
                PRIMARY KEY (sample_id, gene_name, transcript_id, data_kind)
            )",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let conn = Arc::clone(&self.conn);
        let key = key.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<CacheEntry>, CacheError> {
            let conn = conn.lock().map_err(|_| CacheError::Poisoned)?;
            let mut stmt = conn.prepare(
                "SELECT payload, stored_at FROM cache_entries
                 WHERE sample_id = ?1 AND gene_name = ?2 AND transcript_id = ?3 AND data_kind = ?4",
            )?;

            let row = stmt
                .query_row(
                    params![
                        key.sample_id.as_str(),
                        key.gene_name,
                        key.transcript_id,
                        key.kind.as_str()
                    ],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;

            Ok(row.map(|(payload, stored_at)| CacheEntry {
                key,
                payload,
                stored_at: DateTime::from_timestamp_millis(stored_at).unwrap_or_default(),
            }))
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
            let conn = conn.lock().map_err(|_| CacheError::Poisoned)?;
            conn.execute(
                "INSERT OR REPLACE INTO cache_entries
                 (sample_id, gene_name, transcript_id, data_kind, payload, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.key.sample_id.as_str(),
                    entry.key.gene_name,
                    entry.key.transcript_id,
                    entry.key.kind.as_str(),
                    entry.payload,
                    entry.stored_at.timestamp_millis()
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

/// Typed, failure-tolerant access to a cache store
#[derive(Clone)]
pub struct CacheGateway {
    store: Arc<dyn CacheStore>,
}

impl CacheGateway {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Cached value, or None on a miss, a read failure or an undecodable payload
    pub async fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entry = match self.store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(
                    "Cache read failed for {} {} ({}): {}",
                    key.sample_id,
                    key.gene_name,
                    key.kind.as_str(),
                    e
                );
                return None;
            }
        };

        match serde_json::from_str(&entry.payload) {
            Ok(value) => {
                debug!("Cache hit for {} {} ({})", key.sample_id, key.gene_name, key.kind.as_str());
                Some(value)
            }
            Err(e) => {
                warn!(
                    "Discarding undecodable cache entry for {} {}: {}",
                    key.sample_id, key.gene_name, e
                );
                None
            }
        }
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        matches!(self.store.get(key).await, Ok(Some(_)))
    }

    /// Store a value under the policy; returns whether it was written
    pub async fn write<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T, policy: CachePolicy) -> bool {
        if policy == CachePolicy::Skip {
            return false;
        }

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize cache entry for {} {}: {}", key.sample_id, key.gene_name, e);
                return false;
            }
        };

        let entry = CacheEntry {
            key,
            payload,
            stored_at: Utc::now(),
        };
        let (sample_id, gene_name) = (entry.key.sample_id.clone(), entry.key.gene_name.clone());

        match self.store.put(entry).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Cache write failed for {} {}: {}", sample_id, gene_name, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{VariantKey, VariantRecord, VariantSet, Zygosity};
    use tempfile::tempdir;

    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Task("store offline".to_string()))
        }

        async fn put(&self, _entry: CacheEntry) -> Result<(), CacheError> {
            Err(CacheError::Task("store offline".to_string()))
        }
    }

    fn key(kind: DataKind) -> CacheKey {
        CacheKey::new(&SampleId::new("s0"), "TP53", "ENST00000269305", kind)
    }

    fn variant_set() -> VariantSet {
        VariantSet::new(vec![VariantRecord::new(
            VariantKey::point("chr17", 7_577_120, "C", "T"),
            Zygosity::Het,
        )])
    }

    #[tokio::test]
    async fn test_memory_round_trip_and_skip_policy() {
        let gateway = CacheGateway::new(Arc::new(MemoryCache::new()));

        assert!(gateway.read::<VariantSet>(&key(DataKind::Variants)).await.is_none());
        assert!(!gateway.write(key(DataKind::Variants), &variant_set(), CachePolicy::Skip).await);
        assert!(!gateway.contains(&key(DataKind::Variants)).await);

        assert!(gateway.write(key(DataKind::Variants), &variant_set(), CachePolicy::WriteThrough).await);
        let cached: VariantSet = gateway.read(&key(DataKind::Variants)).await.unwrap();
        assert_eq!(cached, variant_set());

        // Kinds are separate entries
        assert!(gateway.read::<VariantSet>(&key(DataKind::CalledVariants)).await.is_none());
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_connections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let gateway = CacheGateway::new(Arc::new(SqliteCache::open(&path).unwrap()));
            assert!(gateway.write(key(DataKind::Variants), &variant_set(), CachePolicy::WriteThrough).await);
        }

        let gateway = CacheGateway::new(Arc::new(SqliteCache::open(&path).unwrap()));
        let cached: VariantSet = gateway.read(&key(DataKind::Variants)).await.unwrap();
        assert_eq!(cached.features.len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_replaces_existing_entry() {
        let store = Arc::new(SqliteCache::in_memory().unwrap());
        let gateway = CacheGateway::new(store);

        gateway.write(key(DataKind::Variants), &variant_set(), CachePolicy::WriteThrough).await;
        gateway.write(key(DataKind::Variants), &VariantSet::default(), CachePolicy::WriteThrough).await;

        let cached: VariantSet = gateway.read(&key(DataKind::Variants)).await.unwrap();
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn test_failures_degrade_to_miss() {
        let gateway = CacheGateway::new(Arc::new(FailingStore));

        assert!(gateway.read::<VariantSet>(&key(DataKind::Variants)).await.is_none());
        assert!(!gateway.write(key(DataKind::Variants), &variant_set(), CachePolicy::WriteThrough).await);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_miss() {
        let store = Arc::new(MemoryCache::new());
        store
            .put(CacheEntry {
                key: key(DataKind::Coverage),
                payload: "not json".to_string(),
                stored_at: Utc::now(),
            })
            .await
            .unwrap();

        let gateway = CacheGateway::new(store);
        assert!(gateway.read::<VariantSet>(&key(DataKind::Coverage)).await.is_none());
    }
}
