//! Command Handler
//!
//! Interprets decoded command frames and executes them against the keyspace.
//!
//! ## Supported Commands
//!
//! - `PING [anything ...]` - Always replies `PONG`
//! - `ECHO message` - Echo message
//! - `SET key value [PX milliseconds | EX seconds]` - Set a key
//! - `GET key` - Get a key's value
//! - `CONFIG GET parameter` - Read a runtime configuration value
//! - `KEYS *` - List every key
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  execute()  │───>│  dispatch() │───>│   cmd_*()   │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                          │         │        │
//! │                                          ▼         ▼        │
//! │                                   dyn Keyspace   Config     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every user error (wrong arity, bad option, unknown parameter) becomes an
//! `Error` reply; nothing here ends the connection.

use crate::config::Config;
use crate::protocol::RespValue;
use crate::storage::Keyspace;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::trace;

/// Dispatches commands to their handlers.
///
/// Cheap to clone; each connection gets its own clone sharing the same
/// keyspace and configuration.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<dyn Keyspace>,
    config: Arc<Config>,
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn wrong_arity(cmd: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd
    ))
}

fn syntax_error() -> RespValue {
    RespValue::error("ERR syntax error")
}

impl CommandHandler {
    pub fn new(storage: Arc<dyn Keyspace>, config: Arc<Config>) -> Self {
        Self { storage, config }
    }

    /// Executes one command frame and returns the reply.
    ///
    /// `args[0]` is the command name, matched case-insensitively.
    pub fn execute(&self, args: Vec<RespValue>) -> RespValue {
        let Some(first) = args.first() else {
            return RespValue::error("ERR empty command");
        };

        let cmd_name = match first.as_str() {
            Some(name) => name.to_ascii_uppercase(),
            None => return RespValue::error("ERR invalid command name"),
        };

        trace!(command = %cmd_name, argc = args.len(), "Executing command");
        self.dispatch(&cmd_name, &args)
    }

    /// Routes a command to its handler. `args` still includes the name.
    fn dispatch(&self, cmd: &str, args: &[RespValue]) -> RespValue {
        match cmd {
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "CONFIG" => self.cmd_config(args),
            "KEYS" => self.cmd_keys(args),
            _ => RespValue::error(format!(
                "ERR unknown command '{}'",
                args[0].as_str().unwrap_or(cmd)
            )),
        }
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING [anything ...]
    fn cmd_ping(&self, _args: &[RespValue]) -> RespValue {
        RespValue::pong()
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_arity("echo");
        }

        match args[1].as_bytes() {
            Some(msg) => RespValue::bulk_string(msg),
            None => RespValue::error("ERR invalid message"),
        }
    }

    /// CONFIG GET parameter
    fn cmd_config(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return wrong_arity("config");
        }

        let sub = args[1].as_str().unwrap_or_default();
        if !sub.eq_ignore_ascii_case("GET") {
            return RespValue::error(format!("ERR unknown subcommand '{}'", sub));
        }
        if args.len() != 3 {
            return wrong_arity("config|get");
        }

        let Some(name) = args[2].as_str() else {
            return RespValue::error("ERR invalid config parameter");
        };

        match self.config.get(name) {
            Some(value) => RespValue::array(vec![
                RespValue::bulk_string(Bytes::from(name.to_string())),
                RespValue::bulk_string(Bytes::from(value.to_string())),
            ]),
            None => RespValue::error(format!("ERR unknown config parameter '{}'", name)),
        }
    }

    // ========================================================================
    // String Commands
    // ========================================================================

    /// SET key value [PX milliseconds | EX seconds]
    fn cmd_set(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 && args.len() != 5 {
            return wrong_arity("set");
        }

        let (Some(key), Some(value)) = (args[1].as_bytes(), args[2].as_bytes()) else {
            return syntax_error();
        };

        let ttl = if args.len() == 5 {
            match parse_expiry(&args[3], &args[4]) {
                Ok(ttl) => Some(ttl),
                Err(reply) => return reply,
            }
        } else {
            None
        };

        self.storage.set(key, value, ttl);
        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_arity("get");
        }

        let Some(key) = args[1].as_bytes() else {
            return syntax_error();
        };

        match self.storage.get(&key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// KEYS pattern
    ///
    /// Only `*` is supported. Keys that have expired but haven't been read
    /// since are still listed.
    fn cmd_keys(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_arity("keys");
        }

        let pattern = args[1].as_str().unwrap_or_default();
        match self.storage.keys(pattern) {
            Ok(keys) => RespValue::array(keys.into_iter().map(RespValue::bulk_string).collect()),
            Err(e) => RespValue::error(format!("ERR {}", e)),
        }
    }
}

/// Parses the `PX <ms>` / `EX <s>` option pair of SET.
///
/// The TTL is rejected when it, or the resulting Unix-millisecond deadline,
/// doesn't fit in an `i64`.
fn parse_expiry(option: &RespValue, amount: &RespValue) -> Result<Duration, RespValue> {
    let option = option.as_str().unwrap_or_default();
    let unit_ms: i64 = if option.eq_ignore_ascii_case("PX") {
        1
    } else if option.eq_ignore_ascii_case("EX") {
        1000
    } else {
        return Err(syntax_error());
    };

    let amount: i64 = amount
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RespValue::error("ERR value is not an integer or out of range"))?;

    let millis = amount
        .checked_mul(unit_ms)
        .filter(|&ms| ms > 0 && unix_millis_now().checked_add(ms).is_some())
        .ok_or_else(|| RespValue::error("ERR invalid expire time in 'set' command"))?;

    Ok(Duration::from_millis(millis as u64))
}

fn unix_millis_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use std::collections::HashSet;
    use std::thread;

    fn create_handler() -> CommandHandler {
        create_handler_with(Config::default())
    }

    fn create_handler_with(config: Config) -> CommandHandler {
        CommandHandler::new(Arc::new(StorageEngine::new()), Arc::new(config))
    }

    fn make_command(args: &[&str]) -> Vec<RespValue> {
        args.iter()
            .map(|s| RespValue::bulk_string(Bytes::from(s.to_string())))
            .collect()
    }

    fn bulk(s: &str) -> RespValue {
        RespValue::bulk_string(Bytes::from(s.to_string()))
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        assert_eq!(handler.execute(make_command(&["PING"])), RespValue::pong());
        assert_eq!(handler.execute(make_command(&["ping"])), RespValue::pong());
        assert_eq!(
            handler.execute(make_command(&["PING", "hello", "world"])),
            RespValue::pong()
        );
    }

    #[test]
    fn test_echo() {
        let handler = create_handler();

        assert_eq!(handler.execute(make_command(&["ECHO", "hello"])), bulk("hello"));
        assert_eq!(
            handler.execute(make_command(&["ECHO"])),
            RespValue::error("ERR wrong number of arguments for 'echo' command")
        );
        assert_eq!(
            handler.execute(make_command(&["echo", "a", "b"])),
            RespValue::error("ERR wrong number of arguments for 'echo' command")
        );
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        assert_eq!(handler.execute(make_command(&["SET", "key", "value"])), RespValue::ok());
        assert_eq!(handler.execute(make_command(&["GET", "key"])), bulk("value"));
        assert_eq!(handler.execute(make_command(&["get", "key"])), bulk("value"));
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();
        assert_eq!(handler.execute(make_command(&["GET", "nonexistent"])), RespValue::null());
    }

    #[test]
    fn test_set_get_arity() {
        let handler = create_handler();

        for cmd in [vec!["SET"], vec!["SET", "k"], vec!["SET", "k", "v", "PX"]] {
            assert_eq!(
                handler.execute(make_command(&cmd)),
                RespValue::error("ERR wrong number of arguments for 'set' command")
            );
        }
        assert_eq!(
            handler.execute(make_command(&["GET"])),
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
        assert_eq!(
            handler.execute(make_command(&["GET", "a", "b"])),
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
    }

    #[test]
    fn test_set_with_px() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["SET", "key", "value", "px", "50"])),
            RespValue::ok()
        );
        assert_eq!(handler.execute(make_command(&["GET", "key"])), bulk("value"));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(handler.execute(make_command(&["GET", "key"])), RespValue::null());
    }

    #[test]
    fn test_set_with_ex() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["SET", "key", "value", "EX", "100"])),
            RespValue::ok()
        );
        assert_eq!(handler.execute(make_command(&["GET", "key"])), bulk("value"));
    }

    #[test]
    fn test_set_invalid_options() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "NX", "10"])),
            RespValue::error("ERR syntax error")
        );
        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "PX", "soon"])),
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "PX", "0"])),
            RespValue::error("ERR invalid expire time in 'set' command")
        );
        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "PX", "-5"])),
            RespValue::error("ERR invalid expire time in 'set' command")
        );
        // Nothing was stored by the rejected commands
        assert_eq!(handler.execute(make_command(&["GET", "k"])), RespValue::null());
    }

    #[test]
    fn test_set_expiry_out_of_range() {
        let handler = create_handler();
        let max = i64::MAX.to_string();

        for option in ["EX", "PX"] {
            assert_eq!(
                handler.execute(make_command(&["SET", "k", "v", option, max.as_str()])),
                RespValue::error("ERR invalid expire time in 'set' command")
            );
        }
        // Seconds that only overflow once converted to milliseconds
        let secs = (i64::MAX / 1000 + 1).to_string();
        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "EX", secs.as_str()])),
            RespValue::error("ERR invalid expire time in 'set' command")
        );
        assert_eq!(handler.execute(make_command(&["GET", "k"])), RespValue::null());

        // A far but representable deadline is accepted
        let far = (i64::MAX / 4).to_string();
        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "PX", far.as_str()])),
            RespValue::ok()
        );
        assert_eq!(handler.execute(make_command(&["GET", "k"])), bulk("v"));
    }

    #[test]
    fn test_overwrite_semantics() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "k", "v1"]));
        handler.execute(make_command(&["SET", "k", "v2", "PX", "50"]));
        assert_eq!(handler.execute(make_command(&["GET", "k"])), bulk("v2"));

        // A plain SET clears the expiry
        handler.execute(make_command(&["SET", "k", "v3"]));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(handler.execute(make_command(&["GET", "k"])), bulk("v3"));

        // ...and a new TTL governs again
        handler.execute(make_command(&["SET", "k", "v4", "PX", "50"]));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(handler.execute(make_command(&["GET", "k"])), RespValue::null());
    }

    #[test]
    fn test_config_get() {
        let handler = create_handler_with(Config::default().with("dir", "/tmp/data"));

        assert_eq!(
            handler.execute(make_command(&["CONFIG", "GET", "dir"])),
            RespValue::array(vec![bulk("dir"), bulk("/tmp/data")])
        );
        assert_eq!(
            handler.execute(make_command(&["config", "get", "dbfilename"])),
            RespValue::array(vec![bulk("dbfilename"), bulk("dumb.rdb")])
        );
    }

    #[test]
    fn test_config_errors() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["CONFIG", "GET", "maxmemory"])),
            RespValue::error("ERR unknown config parameter 'maxmemory'")
        );
        assert_eq!(
            handler.execute(make_command(&["CONFIG", "GET"])),
            RespValue::error("ERR wrong number of arguments for 'config|get' command")
        );
        assert_eq!(
            handler.execute(make_command(&["CONFIG", "GET", "dir", "extra"])),
            RespValue::error("ERR wrong number of arguments for 'config|get' command")
        );
        assert_eq!(
            handler.execute(make_command(&["CONFIG"])),
            RespValue::error("ERR wrong number of arguments for 'config' command")
        );
        assert_eq!(
            handler.execute(make_command(&["CONFIG", "SET", "dir", "/"])),
            RespValue::error("ERR unknown subcommand 'SET'")
        );
    }

    #[test]
    fn test_keys() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "a", "1"]));
        handler.execute(make_command(&["SET", "b", "2"]));

        let keys: HashSet<Bytes> = match handler.execute(make_command(&["KEYS", "*"])) {
            RespValue::Array(values) => values.iter().filter_map(RespValue::as_bytes).collect(),
            other => panic!("expected array, got {:?}", other),
        };
        assert_eq!(keys, HashSet::from([Bytes::from("a"), Bytes::from("b")]));
    }

    #[test]
    fn test_keys_errors() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["KEYS", "user:*"])),
            RespValue::error("ERR unsupported KEYS pattern 'user:*', only '*' is supported")
        );
        assert_eq!(
            handler.execute(make_command(&["KEYS"])),
            RespValue::error("ERR wrong number of arguments for 'keys' command")
        );
    }

    #[test]
    fn test_keys_includes_expired_until_read() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "temp", "v", "PX", "20"]));
        thread::sleep(Duration::from_millis(60));

        assert_eq!(
            handler.execute(make_command(&["KEYS", "*"])),
            RespValue::array(vec![bulk("temp")])
        );
        assert_eq!(handler.execute(make_command(&["GET", "temp"])), RespValue::null());
        assert_eq!(
            handler.execute(make_command(&["KEYS", "*"])),
            RespValue::array(vec![])
        );
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["FLUSHALL"])),
            RespValue::error("ERR unknown command 'FLUSHALL'")
        );
        assert_eq!(
            handler.execute(make_command(&["hgetall", "k"])),
            RespValue::error("ERR unknown command 'hgetall'")
        );
    }

    #[test]
    fn test_invalid_command_name() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(vec![RespValue::integer(1)]),
            RespValue::error("ERR invalid command name")
        );
        assert_eq!(handler.execute(vec![]), RespValue::error("ERR empty command"));
    }

    #[test]
    fn test_simple_string_arguments() {
        let handler = create_handler();

        let reply = handler.execute(vec![
            RespValue::simple_string("ECHO"),
            RespValue::simple_string("hi"),
        ]);
        assert_eq!(reply, bulk("hi"));
    }

    #[test]
    fn test_concurrent_sets_same_key() {
        let handler = create_handler();
        let written: HashSet<Bytes> = (0..8).map(|i| Bytes::from(format!("v{}", i))).collect();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let handler = handler.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let value = format!("v{}", i);
                        handler.execute(make_command(&["SET", "k", value.as_str()]));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        match handler.execute(make_command(&["GET", "k"])) {
            RespValue::BulkString(value) => assert!(written.contains(&value)),
            other => panic!("expected bulk string, got {:?}", other),
        }
    }
}
