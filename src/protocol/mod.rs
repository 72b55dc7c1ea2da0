//! RESP Protocol Implementation
//!
//! The subset of the Redis Serialization Protocol (RESP2) spoken by the
//! server: simple strings, errors, integers, bulk strings and arrays, plus
//! the null bulk string and null array.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum and its serialization
//! - `parser`: incremental parser for incoming frames
//!
//! ## Example
//!
//! ```
//! use redlite::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$4\r\nECHO\r\n$5\r\nhello\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let reply = RespValue::bulk_string(Bytes::from("hello"));
//! assert_eq!(reply.serialize(), b"$5\r\nhello\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
