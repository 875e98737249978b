//! Watched-account registry.
//!
//! Accounts live in a concurrent map keyed by account id. The feed-delivery
//! task touches entries on every match while registration calls and the
//! eviction sweep run from other tasks; no lock spans more than one entry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::observability::metrics;
use crate::storage::{AccountStore, StorageError, StorageResult, StoredAccount};

/// Whether an account may be evicted when idle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Watched until idle for longer than the configured maximum.
    #[default]
    Transient,
    /// Watched permanently (distribution and custody accounts).
    Residential,
}

/// A watched account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedAccount {
    pub account_id: String,
    pub last_observed_at: SystemTime,
    pub account_type: AccountType,
}

impl WatchedAccount {
    /// Time since the account was last observed.
    pub fn idle_for(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_observed_at).unwrap_or_default()
    }

    fn to_stored(&self) -> StoredAccount {
        StoredAccount {
            account: self.account_id.clone(),
            last_observed: self
                .last_observed_at
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            account_type: self.account_type,
        }
    }

    fn from_stored(stored: StoredAccount) -> Self {
        Self {
            account_id: stored.account,
            last_observed_at: UNIX_EPOCH + Duration::from_secs(stored.last_observed),
            account_type: stored.account_type,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Watch {
    last_observed_at: SystemTime,
    account_type: AccountType,
}

/// Registration surface offered to business logic.
pub trait AccountRegistrar: Send + Sync {
    /// Start watching `account_id`, or refresh it if already watched.
    fn register_account(&self, account_id: &str, account_type: AccountType);

    /// Stop watching `account_id`. Returns whether it was watched.
    fn unregister_account(&self, account_id: &str) -> bool;
}

/// In-memory index of watched accounts backed by an [`AccountStore`].
///
/// The store is only written after a successful [`load`](Self::load), so a
/// registry that never saw the stored accounts cannot overwrite them.
#[derive(Clone)]
pub struct AccountRegistry {
    accounts: Arc<DashMap<String, Watch>>,
    store: Arc<dyn AccountStore>,
    loaded: Arc<AtomicBool>,
}

impl AccountRegistry {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            store,
            loaded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Insert or refresh an account.
    ///
    /// A residential entry is never downgraded to transient.
    pub fn upsert(&self, account_id: &str, account_type: AccountType) {
        self.upsert_at(account_id, account_type, SystemTime::now());
    }

    fn upsert_at(&self, account_id: &str, account_type: AccountType, observed_at: SystemTime) {
        let inserted = match self.accounts.entry(account_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let watch = entry.get_mut();
                watch.last_observed_at = watch.last_observed_at.max(observed_at);
                if account_type == AccountType::Residential {
                    watch.account_type = AccountType::Residential;
                }
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(Watch {
                    last_observed_at: observed_at,
                    account_type,
                });
                true
            }
        };
        // The shard lock is released here; len() takes every shard.
        if inserted {
            metrics::record_watched_accounts(self.accounts.len());
        }
    }

    /// Put back an entry with its original timestamp, as when reloading.
    pub fn restore(&self, account: WatchedAccount) {
        self.upsert_at(&account.account_id, account.account_type, account.last_observed_at);
    }

    /// Whether `account_id` is watched. A match counts as an observation and
    /// refreshes the entry.
    pub fn match_and_touch(&self, account_id: &str) -> bool {
        match self.accounts.get_mut(account_id) {
            Some(mut watch) => {
                watch.last_observed_at = SystemTime::now();
                true
            }
            None => false,
        }
    }

    /// Remove an account regardless of its type.
    pub fn remove(&self, account_id: &str) -> bool {
        let removed = self.accounts.remove(account_id).is_some();
        if removed {
            metrics::record_watched_accounts(self.accounts.len());
        }
        removed
    }

    /// Drop transient accounts idle for longer than `max_idle`.
    ///
    /// Returns the number of evicted accounts.
    pub fn evict(&self, max_idle: Duration) -> usize {
        let now = SystemTime::now();
        let before = self.accounts.len();
        self.accounts.retain(|_, watch| {
            watch.account_type == AccountType::Residential
                || now.duration_since(watch.last_observed_at).unwrap_or_default() <= max_idle
        });
        let evicted = before.saturating_sub(self.accounts.len());
        if evicted > 0 {
            tracing::info!(evicted, remaining = self.accounts.len(), "Evicted idle accounts");
            metrics::record_watched_accounts(self.accounts.len());
        }
        evicted
    }

    pub fn get(&self, account_id: &str) -> Option<WatchedAccount> {
        self.accounts.get(account_id).map(|watch| WatchedAccount {
            account_id: account_id.to_string(),
            last_observed_at: watch.last_observed_at,
            account_type: watch.account_type,
        })
    }

    pub fn list_all(&self) -> Vec<WatchedAccount> {
        self.accounts
            .iter()
            .map(|r| WatchedAccount {
                account_id: r.key().clone(),
                last_observed_at: r.value().last_observed_at,
                account_type: r.value().account_type,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Seed the registry from the durable store.
    pub fn load(&self) -> StorageResult<usize> {
        let stored = self.store.list()?;
        let count = stored.len();
        for account in stored {
            self.restore(WatchedAccount::from_stored(account));
        }
        self.loaded.store(true, Ordering::SeqCst);
        tracing::info!(count, "Loaded watched accounts from store");
        Ok(count)
    }

    /// Whether the durable store has been read at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Write every in-memory entry to the durable store.
    ///
    /// Fails with [`StorageError::NotLoaded`] until `load` has succeeded.
    pub fn flush(&self) -> StorageResult<()> {
        if !self.is_loaded() {
            return Err(StorageError::NotLoaded);
        }
        let snapshot: Vec<StoredAccount> = self.list_all().iter().map(WatchedAccount::to_stored).collect();
        self.store.replace_all(&snapshot)
    }

    /// Periodic maintenance: evict idle accounts, then persist the rest.
    pub fn sweep(&self, max_idle: Duration) -> StorageResult<usize> {
        if !self.is_loaded() {
            return Err(StorageError::NotLoaded);
        }
        let evicted = self.evict(max_idle);
        self.flush()?;
        Ok(evicted)
    }
}

impl AccountRegistrar for AccountRegistry {
    fn register_account(&self, account_id: &str, account_type: AccountType) {
        tracing::info!(account = %account_id, account_type = ?account_type, "Registering account");
        self.upsert(account_id, account_type);
    }

    fn unregister_account(&self, account_id: &str) -> bool {
        tracing::info!(account = %account_id, "Unregistering account");
        self.remove(account_id)
    }
}

impl std::fmt::Debug for AccountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRegistry")
            .field("accounts", &self.accounts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryAccountStore;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn registry() -> AccountRegistry {
        AccountRegistry::new(Arc::new(MemoryAccountStore::new()))
    }

    fn idle(account_id: &str, account_type: AccountType, idle: Duration) -> WatchedAccount {
        WatchedAccount {
            account_id: account_id.to_string(),
            last_observed_at: SystemTime::now() - idle,
            account_type,
        }
    }

    #[test]
    fn test_eviction_respects_residency() {
        let registry = registry();
        registry.restore(idle("A", AccountType::Residential, DAY * 100));
        registry.restore(idle("B", AccountType::Transient, DAY * 100));
        registry.restore(idle("C", AccountType::Transient, DAY));

        assert_eq!(registry.evict(DAY * 30), 1);
        assert!(registry.get("A").is_some());
        assert!(registry.get("B").is_none());
        assert!(registry.get("C").is_some());
    }

    #[test]
    fn test_upsert_never_downgrades() {
        let registry = registry();
        registry.upsert("GDIST", AccountType::Residential);
        registry.upsert("GDIST", AccountType::Transient);
        assert_eq!(registry.get("GDIST").unwrap().account_type, AccountType::Residential);
        assert_eq!(registry.len(), 1);

        registry.upsert("GDEP", AccountType::Transient);
        registry.upsert("GDEP", AccountType::Residential);
        assert_eq!(registry.get("GDEP").unwrap().account_type, AccountType::Residential);
    }

    #[test]
    fn test_match_refreshes_last_observed() {
        let registry = registry();
        registry.restore(idle("GDEP", AccountType::Transient, DAY * 40));

        assert!(!registry.match_and_touch("GOTHER"));
        assert!(registry.match_and_touch("GDEP"));

        let now = SystemTime::now();
        assert!(registry.get("GDEP").unwrap().idle_for(now) < Duration::from_secs(5));
        assert_eq!(registry.evict(DAY * 30), 0);
    }

    #[test]
    fn test_registrar_round_trip() {
        let registry = registry();
        registry.register_account("GNEW", AccountType::Transient);
        assert!(registry.match_and_touch("GNEW"));
        assert!(registry.unregister_account("GNEW"));
        assert!(!registry.unregister_account("GNEW"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_persists_survivors_with_type() {
        let store = Arc::new(MemoryAccountStore::new());
        let registry = AccountRegistry::new(store.clone());
        assert_eq!(registry.load().unwrap(), 0);
        registry.restore(idle("GDIST", AccountType::Residential, DAY * 100));
        registry.restore(idle("GSTALE", AccountType::Transient, DAY * 100));
        registry.upsert("GFRESH", AccountType::Transient);

        assert_eq!(registry.sweep(DAY * 30).unwrap(), 1);

        let mut stored = store.list().unwrap();
        stored.sort_by(|a, b| a.account.cmp(&b.account));
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].account, "GDIST");
        assert_eq!(stored[0].account_type, AccountType::Residential);
        assert_eq!(stored[1].account, "GFRESH");

        // A restarted registry keeps the residential tag.
        let reloaded = AccountRegistry::new(store);
        assert_eq!(reloaded.load().unwrap(), 2);
        assert_eq!(reloaded.evict(DAY * 30), 0);
        assert_eq!(reloaded.get("GDIST").unwrap().account_type, AccountType::Residential);
    }

    #[test]
    fn test_flush_refused_before_load() {
        let store = Arc::new(MemoryAccountStore::with_accounts(vec![StoredAccount {
            account: "GDEPOSIT".to_string(),
            last_observed: 0,
            account_type: AccountType::Residential,
        }]));
        let registry = AccountRegistry::new(store.clone());
        registry.upsert("GCONFIG", AccountType::Residential);

        assert!(!registry.is_loaded());
        assert!(matches!(registry.flush(), Err(StorageError::NotLoaded)));
        assert!(matches!(registry.sweep(DAY), Err(StorageError::NotLoaded)));
        assert_eq!(store.list().unwrap().len(), 1);

        assert_eq!(registry.load().unwrap(), 1);
        registry.flush().unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_touch_and_evict() {
        let registry = registry();
        for i in 0..100 {
            registry.upsert(&format!("G{i}"), AccountType::Transient);
        }

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        if t % 2 == 0 {
                            registry.match_and_touch(&format!("G{i}"));
                        } else {
                            registry.evict(DAY);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 100);
    }
}
