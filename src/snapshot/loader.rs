//! Startup bootstrap of the keyspace from the configured snapshot file.

use crate::config::Config;
use crate::snapshot::rdb::{RdbDecoder, SnapshotError};
use crate::storage::Keyspace;
use std::io::ErrorKind;
use tracing::{debug, info};

/// Loads the snapshot named by `dir`/`dbfilename` into `keyspace`.
///
/// A missing file is not an error: the keyspace simply starts empty and
/// `Ok(0)` is returned. Any other failure is returned so the caller can
/// refuse to start with a partially loaded keyspace.
///
/// Expiry instants from the file are stored as-is, so entries that expired
/// while the server was down are inserted and then hidden by lazy expiry.
pub fn load_snapshot(config: &Config, keyspace: &dyn Keyspace) -> Result<usize, SnapshotError> {
    let path = config.snapshot_path();

    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "No snapshot found, starting with an empty keyspace");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let stats = RdbDecoder::new(&data).for_each_entry(|key, value, expires_at| {
        keyspace.set_with_expiry(key, value, expires_at);
    })?;

    if stats.skipped > 0 {
        debug!(skipped = stats.skipped, "Ignored non-string snapshot entries");
    }
    info!(
        path = %path.display(),
        keys = stats.strings,
        "Snapshot loaded"
    );

    Ok(stats.strings)
}
