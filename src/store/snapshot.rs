//! Durable keyspace snapshots.
//!
//! A durable [`LocalStore`](super::LocalStore) keeps its whole keyspace in one
//! JSON file and rewrites it after every mutation.
//!
//! # Atomic Writes
//!
//! 1. Write to `<path>.tmp`
//! 2. fsync the temp file
//! 3. Rename to `<path>`
//! 4. fsync the parent directory
//!
//! A crash at any point leaves either the previous or the new keyspace on disk,
//! never a torn one. This is what lets an in-progress marker survive a broker
//! crash and be found again on restart.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Keyspace, Result, StoreError};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

/// On-disk form of a durable keyspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub schema_version: u32,

    /// When this snapshot was written.
    pub saved_at: DateTime<Utc>,

    pub keys: Keyspace,
}

/// Saves the keyspace atomically to `path`.
///
/// # Errors
///
/// Returns an error if any IO operation fails. On error the previous snapshot
/// (if any) is still intact at `path`.
pub fn save_keyspace_atomic(path: &Path, keys: &Keyspace) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent)?;
    }

    let snapshot = StoreSnapshot {
        schema_version: SCHEMA_VERSION,
        saved_at: Utc::now(),
        keys: keys.clone(),
    };
    let bytes = serde_json::to_vec_pretty(&snapshot)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(tmp_path, path)?;

    // The rename is only durable once the directory entry is.
    let dir = parent.unwrap_or_else(|| Path::new("."));
    File::open(dir)?.sync_all()?;

    Ok(())
}

/// Loads a keyspace snapshot.
///
/// # Errors
///
/// Returns an error if the file can't be read, the JSON is malformed, or the
/// schema version is incompatible.
pub fn load_keyspace(path: &Path) -> Result<Keyspace> {
    let bytes = std::fs::read(path)?;
    let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;

    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(StoreError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: snapshot.schema_version,
        });
    }

    Ok(snapshot.keys)
}

/// Loads a keyspace snapshot, returning an empty keyspace if none exists yet.
///
/// Other errors (malformed JSON, schema mismatch) are propagated.
pub fn load_keyspace_or_empty(path: &Path) -> Result<Keyspace> {
    match load_keyspace(path) {
        Ok(keys) => Ok(keys),
        Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(Keyspace::new()),
        Err(e) => Err(e),
    }
}
