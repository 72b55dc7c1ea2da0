//! Command Handler Module
//!
//! The command processing layer: receives decoded command frames, executes
//! them against the keyspace and the runtime configuration, and returns the
//! reply to send.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Keyspace      │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `ECHO`
//! - `SET` (with `PX` / `EX`), `GET`
//! - `CONFIG GET`
//! - `KEYS *`

pub mod handler;

pub use handler::CommandHandler;
