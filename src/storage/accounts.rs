//! Durable snapshot of watched accounts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::accounts::AccountType;
use crate::storage::{read_json, write_json, StorageResult};

/// Persisted form of a watched account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub account: String,
    /// Last observation, seconds since the Unix epoch.
    pub last_observed: u64,
    /// Older snapshots carry no tag; those entries load as transient.
    #[serde(default)]
    pub account_type: AccountType,
}

/// Store backing the account registry across restarts.
pub trait AccountStore: Send + Sync {
    fn list(&self) -> StorageResult<Vec<StoredAccount>>;

    /// Replace the stored snapshot with `accounts`.
    fn replace_all(&self, accounts: &[StoredAccount]) -> StorageResult<()>;
}

/// Accounts kept in a JSON file.
#[derive(Debug, Clone)]
pub struct FileAccountStore {
    path: PathBuf,
}

impl FileAccountStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl AccountStore for FileAccountStore {
    fn list(&self) -> StorageResult<Vec<StoredAccount>> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    fn replace_all(&self, accounts: &[StoredAccount]) -> StorageResult<()> {
        write_json(&self.path, accounts)?;
        tracing::debug!(count = accounts.len(), path = ?self.path, "Saved watched accounts");
        Ok(())
    }
}

/// Accounts held in memory.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<Vec<StoredAccount>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<StoredAccount>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
        }
    }
}

impl AccountStore for MemoryAccountStore {
    fn list(&self) -> StorageResult<Vec<StoredAccount>> {
        Ok(self.accounts.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn replace_all(&self, accounts: &[StoredAccount]) -> StorageResult<()> {
        *self.accounts.lock().unwrap_or_else(PoisonError::into_inner) = accounts.to_vec();
        Ok(())
    }
}
