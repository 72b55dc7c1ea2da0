//! Snapshot Bootstrap
//!
//! Reads a Redis RDB file once at startup and seeds the keyspace with its
//! string entries, before the listener starts accepting clients.
//!
//! - `rdb`: the binary format decoder
//! - `loader`: resolves the file from the runtime configuration and feeds
//!   decoded entries into the keyspace

pub mod loader;
pub mod rdb;

pub use loader::load_snapshot;
pub use rdb::{DecodeStats, RdbDecoder, SnapshotError};
