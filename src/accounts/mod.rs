//! Watched accounts.
//!
//! # Data Flow
//! ```text
//! startup:   AccountStore::list → registry.rs (restore with original type)
//! runtime:   AccountRegistrar::register_account → upsert
//! per event: observer engine → match_and_touch(to / from)
//! periodic:  evict(max_idle) → flush → AccountStore::replace_all
//! ```

pub mod registry;

pub use registry::{AccountRegistrar, AccountRegistry, AccountType, WatchedAccount};
