//! RDB-Style Snapshot Persistence
//!
//! The snapshot is a point-in-time serialization of the [`Store`]. It is
//! rewritten in full on `SAVE` (and on the first `GET` if no file exists
//! yet) and decoded into a transient key/value map on demand. The store is
//! never rebuilt from it.
//!
//! ## Modules
//!
//! - `format`: markers, magic header and string length prefix
//! - `writer`: encoding and the truncate-write-checksum file writer
//! - `reader`: decoding and checksum verification
//! - `crc64`: the CRC-64 trailer checksum
//!
//! ## Locking
//!
//! Every file operation goes through a [`Snapshot`] handle and holds its
//! mutex, so saves and loads never interleave on disk. A save additionally
//! holds the store's write lock while it enumerates and writes, which keeps
//! concurrent `SET`s out of the file being produced. The snapshot mutex is
//! always taken before the store lock.

pub mod crc64;
pub mod format;
pub mod reader;
pub mod writer;

pub use reader::{decode, MetadataValue, SnapshotData};
pub use writer::encode;

use crate::storage::Store;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info};

/// Errors produced while writing or reading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("snapshot file is empty")]
    Empty,

    #[error("invalid snapshot header")]
    BadMagic,

    #[error("unexpected byte {found:#04x}, expected {expected:#04x}")]
    UnexpectedByte { expected: u8, found: u8 },

    #[error("unsupported value type {0:#04x}")]
    UnsupportedType(u8),

    #[error("unsupported length encoding {0:#04x}")]
    UnsupportedLength(u8),

    #[error("snapshot ends before the declared structure is complete")]
    Truncated,

    #[error("string too long for snapshot encoding: {0} bytes")]
    StringTooLong(usize),

    #[error("too many keys for snapshot encoding: {0} (max 255)")]
    TooManyKeys(usize),

    #[error("checksum mismatch: file says {expected:#018x}, contents hash to {actual:#018x}")]
    ChecksumMismatch { expected: u64, actual: u64 },
}

impl SnapshotError {
    /// True for failures caused by the data being saved rather than by the
    /// file system or the file's contents.
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            SnapshotError::StringTooLong(_) | SnapshotError::TooManyKeys(_)
        )
    }
}

/// Summary of a completed save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveStats {
    pub keys: usize,
    pub bytes: usize,
    pub checksum: u64,
}

/// Handle to the snapshot file at a fixed path.
#[derive(Debug)]
pub struct Snapshot {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Snapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the file from the current contents of `store`.
    pub fn save(&self, store: &Store) -> Result<SaveStats, SnapshotError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.save_locked(store)
    }

    /// Reads and decodes the file.
    pub fn load(&self) -> Result<SnapshotData, SnapshotError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_locked()
    }

    /// Loads the file, first creating it from `store` if it does not exist.
    pub fn load_or_create(&self, store: &Store) -> Result<SnapshotData, SnapshotError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Snapshot not found, creating it");
            self.save_locked(store)?;
        }
        self.load_locked()
    }

    fn save_locked(&self, store: &Store) -> Result<SaveStats, SnapshotError> {
        let stats = store.with_locked(|map| {
            let body = encode(map.iter())?;
            let checksum = writer::write_file(&self.path, &body)?;
            Ok::<_, SnapshotError>(SaveStats {
                keys: map.len(),
                bytes: body.len() + 8,
                checksum,
            })
        })?;

        info!(
            path = %self.path.display(),
            keys = stats.keys,
            bytes = stats.bytes,
            "Snapshot saved"
        );
        Ok(stats)
    }

    fn load_locked(&self) -> Result<SnapshotData, SnapshotError> {
        let buf = std::fs::read(&self.path)?;
        decode(&buf, SystemTime::now())
    }
}
