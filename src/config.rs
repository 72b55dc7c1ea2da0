//! Runtime Configuration
//!
//! A read-only `{name: value}` mapping built once at startup. Clients can
//! read it through `CONFIG GET`; nothing changes it afterwards.

use std::collections::HashMap;
use std::path::PathBuf;

/// Snapshot directory parameter
pub const DIR: &str = "dir";

/// Snapshot file name parameter
pub const DBFILENAME: &str = "dbfilename";

pub const DEFAULT_DIR: &str = "./";

pub const DEFAULT_DBFILENAME: &str = "dumb.rdb";

/// Runtime configuration mapping.
///
/// Parameter names are stored lowercase and looked up case-insensitively.
///
/// # Example
///
/// ```
/// use redlite::config::Config;
///
/// let config = Config::default().with("dir", "/tmp/data");
/// assert_eq!(config.get("DIR"), Some("/tmp/data"));
/// assert_eq!(config.get("dbfilename"), Some("dumb.rdb"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    values: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_pairs([(DIR, DEFAULT_DIR), (DBFILENAME, DEFAULT_DBFILENAME)])
    }
}

impl Config {
    /// Builds a configuration from exactly the given pairs, no defaults.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into().to_ascii_lowercase(), v.into()))
            .collect();
        Self { values }
    }

    /// Returns the configuration with `name` set to `value`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn dir(&self) -> &str {
        self.get(DIR).unwrap_or(DEFAULT_DIR)
    }

    pub fn dbfilename(&self) -> &str {
        self.get(DBFILENAME).unwrap_or(DEFAULT_DBFILENAME)
    }

    /// Full path of the snapshot file: `dir` joined with `dbfilename`.
    pub fn snapshot_path(&self) -> PathBuf {
        PathBuf::from(self.dir()).join(self.dbfilename())
    }
}
