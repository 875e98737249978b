//! Durable state: the feed cursor and the watched-account snapshot.
//!
//! # Design Decisions
//! - One logical record per store, written as a whole JSON document
//! - Writes go to a temporary file and are renamed into place
//! - Stores never retry; the observer's state machine owns retry policy

pub mod accounts;
pub mod cursor;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

pub use accounts::{AccountStore, FileAccountStore, MemoryAccountStore, StoredAccount};
pub use cursor::{CursorStore, FileCursorStore, MemoryCursorStore};

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("stored state was never loaded")]
    NotLoaded,
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Serialize `value` to `path`, replacing any previous content.
pub(crate) fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a JSON document from `path`, `None` if the file does not exist.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
