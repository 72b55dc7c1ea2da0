//! # redlite - A Small Redis-Compatible Key-Value Server
//!
//! redlite keeps a single in-memory keyspace of string values with optional
//! per-key expiry, speaks a subset of the RESP protocol, and can seed its
//! keyspace from a Redis RDB snapshot at startup.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              redlite                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │──> Config        │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────────┐ │
//! │                     │   RESP      │    │  StorageEngine (Keyspace)    │ │
//! │                     │   Parser    │    │  64 RwLock shards            │ │
//! │                     └─────────────┘    └──────────────────────────────┘ │
//! │                                               ▲                         │
//! │                                               │ once, before accepting  │
//! │                                        ┌──────┴───────┐                 │
//! │                                        │ RDB snapshot │                 │
//! │                                        │   loader     │                 │
//! │                                        └──────────────┘                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use redlite::commands::CommandHandler;
//! use redlite::config::Config;
//! use redlite::connection::{handle_connection, ConnectionStats};
//! use redlite::snapshot::load_snapshot;
//! use redlite::storage::{Keyspace, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::default().with("dir", "/var/lib/redlite"));
//!     let storage: Arc<dyn Keyspace> = Arc::new(StorageEngine::new());
//!     load_snapshot(&config, storage.as_ref())?;
//!
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&config));
//!         tokio::spawn(handle_connection(stream, addr.to_string(), handler, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO message`
//! - `SET key value [PX milliseconds | EX seconds]`
//! - `GET key`
//! - `CONFIG GET parameter` (`dir`, `dbfilename`)
//! - `KEYS *`
//!
//! Anything else gets an `ERR unknown command` reply.
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP value type, serializer and parser
//! - [`storage`]: the `Keyspace` trait and the sharded `StorageEngine`
//! - [`commands`]: command dispatch and per-command semantics
//! - [`connection`]: per-client session loop
//! - [`config`]: read-only runtime configuration
//! - [`snapshot`]: RDB decoder and startup loader
//!
//! ## Lazy Expiry
//!
//! Expired keys are removed only when `GET` touches them. There is no
//! background sweeper, so a key that expires and is never read again stays
//! in memory, and `KEYS *` keeps listing it until then.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod snapshot;
pub mod storage;

pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use snapshot::{load_snapshot, SnapshotError};
pub use storage::{Keyspace, StorageEngine};

/// The default port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
