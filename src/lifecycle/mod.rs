//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ObserverEngine::shutdown
//!
//! Shutdown (shutdown.rs):
//!     trigger → watchers leave their loops → pending backoff sleeps end early
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
