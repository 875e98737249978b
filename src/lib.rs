//! Resilient Stellar payment observer.
//!
//! Follows the Horizon payments feed, routes payments that touch watched
//! accounts to listeners, and persists the feed cursor so that every
//! relevant payment is delivered at least once across crashes and
//! reconnects.

pub mod accounts;
pub mod admin;
pub mod config;
pub mod health;
pub mod ledger;
pub mod lifecycle;
pub mod observability;
pub mod observer;
pub mod payments;
pub mod storage;

pub use accounts::{AccountRegistrar, AccountRegistry, AccountType};
pub use config::AppConfig;
pub use lifecycle::Shutdown;
pub use observer::{EngineSettings, ObserverEngine, ObserverStatus};
