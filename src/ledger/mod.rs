//! Ledger feed integration.
//!
//! # Data Flow
//! ```text
//! Horizon /payments (SSE)
//!     → horizon.rs (HTTP, SSE framing, record decoding)
//!     → client.rs (LedgerClient trait, OperationStream)
//!     → observer engine (one subscription at a time)
//! ```
//!
//! # Constraints
//! - Records are delivered strictly in feed order
//! - End of stream is reported as an error item, never a silent finish
//! - Undecodable records keep their paging token so they can be skipped

pub mod client;
pub mod horizon;
pub mod types;

pub use client::{LedgerClient, OperationStream};
pub use horizon::HorizonClient;
pub use types::{Cursor, LedgerError, LedgerResult, RawOperation, RawTransaction};
