//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! ObserverEngine (status, subscription, activity clock)
//! AccountRegistry (size)
//!     → reporter.rs (HealthSnapshot)
//!     → admin GET /health, readiness probes
//! ```
//!
//! # Bucketing
//! ```text
//! RUNNING                  → green
//! *_ERROR                  → yellow
//! NEEDS_SHUTDOWN, SHUTDOWN → red
//! RUNNING, stream closed   → red
//! ```

pub mod reporter;

pub use reporter::{HealthBucket, HealthCheck, HealthReporter, HealthSnapshot};
