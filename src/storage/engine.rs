//! Sharded Keyspace with Lazy Expiry
//!
//! `StorageEngine` is the production implementation of the [`Keyspace`]
//! trait: a map from key to [`Entry`] split across 64 shards, each behind
//! its own `RwLock`.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation touches a single key and holds a single shard lock for
//! its duration. Reads take the shared lock; writes and the eviction path
//! of `get` take the exclusive lock.
//!
//! ## Expiry
//!
//! Expiry is lazy only. An expired entry is removed the next time `get`
//! touches it and stays in memory until then, so keys that expire and are
//! never read again are never reclaimed. `keys` does not check expiry
//! either: it lists every key physically present.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// The only pattern `keys` understands.
pub const MATCH_ALL: &str = "*";

/// Errors returned by keyspace operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("unsupported KEYS pattern '{0}', only '*' is supported")]
    UnsupportedPattern(String),
}

/// A stored value with an optional absolute expiry instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Bytes,
    /// `None` means the entry never expires.
    pub expires_at: Option<SystemTime>,
}

impl Entry {
    pub fn new(value: Bytes, expires_at: Option<SystemTime>) -> Self {
        Self { value, expires_at }
    }

    /// Creates an entry expiring `ttl` from now, or a persistent one.
    ///
    /// A TTL whose deadline isn't representable never expires.
    pub fn with_ttl(value: Bytes, ttl: Option<Duration>) -> Self {
        Self::new(value, ttl.and_then(|ttl| SystemTime::now().checked_add(ttl)))
    }

    /// An entry is live until its expiry instant; at or after it, it's expired.
    #[inline]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }
}

/// The keyspace operations the command dispatcher and snapshot loader need.
///
/// Implementations must be safe to share between connection tasks.
pub trait Keyspace: Send + Sync {
    /// Returns the live value for `key`, evicting it if it has expired.
    fn get(&self, key: &Bytes) -> Option<Bytes>;

    /// Inserts or overwrites `key`. A `ttl` makes it expire that long from
    /// now; `None` clears any previous expiry.
    fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>);

    /// Inserts or overwrites `key` with an absolute expiry instant.
    fn set_with_expiry(&self, key: Bytes, value: Bytes, expires_at: Option<SystemTime>);

    /// Lists keys matching `pattern`. Only `*` is supported.
    fn keys(&self, pattern: &str) -> Result<Vec<Bytes>, StorageError>;
}

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

/// The sharded in-memory keyspace.
///
/// Wrap it in an `Arc` and share it across all connection tasks.
///
/// # Example
///
/// ```
/// use redlite::storage::{Keyspace, StorageEngine};
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("redlite"), None);
/// assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("redlite")));
///
/// engine.set(Bytes::from("session"), Bytes::from("abc123"), Some(Duration::from_secs(60)));
/// assert_eq!(engine.keys("*").unwrap().len(), 2);
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("len", &self.len())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Returns a copy of the stored entry, expired or not, without evicting.
    pub fn entry(&self, key: &Bytes) -> Option<Entry> {
        self.shard(key).data.read().get(key).cloned()
    }

    /// Number of entries physically stored, including expired ones not yet
    /// evicted.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.data.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Keyspace for StorageEngine {
    fn get(&self, key: &Bytes) -> Option<Bytes> {
        let shard = self.shard(key);

        // Fast path: live key under the shared lock.
        {
            let data = shard.data.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: re-check under the exclusive lock, since another writer
        // may have replaced the entry or another reader evicted it.
        let mut data = shard.data.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let entry = Entry::with_ttl(value, ttl);
        self.shard(&key).data.write().insert(key, entry);
    }

    fn set_with_expiry(&self, key: Bytes, value: Bytes, expires_at: Option<SystemTime>) {
        let entry = Entry::new(value, expires_at);
        self.shard(&key).data.write().insert(key, entry);
    }

    fn keys(&self, pattern: &str) -> Result<Vec<Bytes>, StorageError> {
        if pattern != MATCH_ALL {
            return Err(StorageError::UnsupportedPattern(pattern.to_string()));
        }

        let mut result = Vec::new();
        for shard in &self.shards {
            result.extend(shard.data.read().keys().cloned());
        }
        Ok(result)
    }
}
