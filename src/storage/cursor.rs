//! Last processed feed position.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::ledger::types::Cursor;
use crate::storage::{read_json, write_json, StorageResult};

/// Single-row store for the observer's cursor.
///
/// `save` is an idempotent upsert; saving the same cursor twice is harmless.
pub trait CursorStore: Send + Sync {
    fn save(&self, cursor: &Cursor) -> StorageResult<()>;
    fn load(&self) -> StorageResult<Option<Cursor>>;
}

#[derive(Serialize, Deserialize)]
struct CursorRecord {
    cursor: Cursor,
}

/// Cursor kept in a JSON file.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CursorStore for FileCursorStore {
    fn save(&self, cursor: &Cursor) -> StorageResult<()> {
        write_json(
            &self.path,
            &CursorRecord {
                cursor: cursor.clone(),
            },
        )
    }

    fn load(&self) -> StorageResult<Option<Cursor>> {
        Ok(read_json::<CursorRecord>(&self.path)?.map(|record| record.cursor))
    }
}

/// Cursor held in memory; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursor: Mutex<Option<Cursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: Cursor) -> Self {
        Self {
            cursor: Mutex::new(Some(cursor)),
        }
    }
}

impl CursorStore for MemoryCursorStore {
    fn save(&self, cursor: &Cursor) -> StorageResult<()> {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner) = Some(cursor.clone());
        Ok(())
    }

    fn load(&self) -> StorageResult<Option<Cursor>> {
        Ok(self.cursor.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_cursor_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cursor.json");

        let store = FileCursorStore::new(&path);
        assert!(store.load().unwrap().is_none());

        store.save(&Cursor::new("100")).unwrap();
        store.save(&Cursor::new("200")).unwrap();
        store.save(&Cursor::new("200")).unwrap();

        // A fresh instance sees the last write.
        let reopened = FileCursorStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(Cursor::new("200")));
    }

    #[test]
    fn test_corrupt_cursor_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = FileCursorStore::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("encoding"));
    }

    #[test]
    fn test_memory_cursor_store() {
        let store = MemoryCursorStore::with_cursor(Cursor::new("5"));
        assert_eq!(store.load().unwrap(), Some(Cursor::new("5")));
        store.save(&Cursor::new("6")).unwrap();
        assert_eq!(store.load().unwrap(), Some(Cursor::new("6")));
    }
}
