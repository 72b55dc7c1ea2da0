//! Storage Engine Module
//!
//! The shared keyspace: a thread-safe, sharded key-value map with optional
//! per-key expiry, exposed through the [`Keyspace`] trait so the command
//! dispatcher and the snapshot loader don't depend on the concrete store.
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **Absolute expiry**: Entries carry a wall-clock expiry instant
//! - **Lazy Expiry**: Expired keys are removed when read, never in the
//!   background
//!
//! ## Example
//!
//! ```
//! use redlite::storage::{Keyspace, StorageEngine};
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine: Arc<dyn Keyspace> = Arc::new(StorageEngine::new());
//!
//! engine.set(Bytes::from("name"), Bytes::from("redlite"), None);
//! assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("redlite")));
//!
//! engine.set(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Some(Duration::from_secs(3600)),
//! );
//! ```

pub mod engine;

pub use engine::{Entry, Keyspace, StorageEngine, StorageError, MATCH_ALL};
