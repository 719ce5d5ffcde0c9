/// Snapshot cache for expensive aggregates.
///
/// The statewide rainfall aggregate touches every configured station, so
/// its last result is kept and served while younger than `max_age`. The
/// gateway is storage-agnostic: a `CacheStore` only loads and stores an
/// opaque payload with its timestamp, keyed by name.
///
/// Two stores:
/// - `MemoryCacheStore`: process-local, whole-entry replacement under a
///   `RwLock`. Lost on restart.
/// - `PostgresCacheStore`: one upserted row per key in
///   `hydrowatch.snapshot_cache`. Survives restarts, so a freshly started
///   service can answer immediately from the previous run's snapshot.
///
/// Store failures never fail a request. `get` logs them and reports a miss,
/// which sends the caller down the full pipeline.

use chrono::{DateTime, Duration, Utc};
use postgres::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::db::CACHE_TABLE;

/// Key under which the statewide rainfall aggregate is cached.
pub const STATEWIDE_RAINFALL_KEY: &str = "statewide_rainfall";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(String),
    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Serialized entry as the store sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

/// Typed entry handed back by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

pub trait CacheStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<StoredEntry>, CacheError>;
    fn store(&self, key: &str, entry: StoredEntry) -> Result<(), CacheError>;
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct CacheGateway {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl CacheGateway {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The cached value for `key` if it is no older than `max_age`.
    /// Expired entries, store errors and undecodable payloads are all a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Option<CacheEntry<T>> {
        let stored = match self.store.load(key) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "cache load failed, treating as miss");
                return None;
            }
        };

        let age = self.clock.now() - stored.timestamp;
        if age > max_age {
            debug!(key, age_secs = age.num_seconds(), "cache entry expired");
            return None;
        }

        match serde_json::from_str(&stored.payload) {
            Ok(data) => Some(CacheEntry {
                data,
                timestamp: stored.timestamp,
            }),
            Err(e) => {
                warn!(key, error = %e, "cached payload undecodable, treating as miss");
                None
            }
        }
    }

    /// Replaces the entry for `key`, stamped with the current time.
    pub fn set<T: Serialize>(&self, key: &str, data: &T) -> Result<(), CacheError> {
        let entry = StoredEntry {
            payload: serde_json::to_string(data)?,
            timestamp: self.clock.now(),
        };
        self.store.store(key, entry)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL store
// ---------------------------------------------------------------------------

pub struct PostgresCacheStore {
    client: Mutex<Client>,
}

impl PostgresCacheStore {
    /// Expects the cache table to exist (see `db::ensure_cache_schema`).
    pub fn new(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }
}

impl CacheStore for PostgresCacheStore {
    fn load(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let mut client = self.client.lock().unwrap_or_else(|e| e.into_inner());
        let sql = format!("SELECT payload, stored_at FROM {} WHERE cache_key = $1", CACHE_TABLE);
        let row = client
            .query_opt(sql.as_str(), &[&key])
            .map_err(|e| CacheError::Store(e.to_string()))?;

        Ok(row.map(|row| StoredEntry {
            payload: row.get(0),
            timestamp: row.get(1),
        }))
    }

    fn store(&self, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        let mut client = self.client.lock().unwrap_or_else(|e| e.into_inner());
        let sql = format!(
            "INSERT INTO {} (cache_key, payload, stored_at) VALUES ($1, $2, $3) \
             ON CONFLICT (cache_key) DO UPDATE SET payload = EXCLUDED.payload, stored_at = EXCLUDED.stored_at",
            CACHE_TABLE
        );
        client
            .execute(sql.as_str(), &[&key, &entry.payload, &entry.timestamp])
            .map_err(|e| CacheError::Store(e.to_string()))?;
        Ok(())
    }
}
