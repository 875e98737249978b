//! Payment observer.
//!
//! # Data Flow
//! ```text
//! LedgerClient::subscribe(cursor)
//!     → engine.rs delivery task
//!         → normalizer → AccountRegistry::match_and_touch
//!         → PaymentListener::on_received / on_sent
//!         → CursorStore::save
//!     → failures → status.rs (validated transition)
//!     → status watcher → backoff.rs delay → resubscribe from stored cursor
//! ```

pub mod backoff;
pub mod engine;
pub mod status;

pub use backoff::BackoffTimer;
pub use engine::{resolve_start_cursor, EngineSettings, ObserverEngine, OpenError};
pub use status::{ObserverStatus, StatusCell, Transition};
