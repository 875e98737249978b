//! Payment normalization and delivery.
//!
//! # Data Flow
//! ```text
//! RawOperation (ledger feed)
//!     → normalizer.rs (filter, asset + memo decoding)
//!     → ObservedPayment (types.rs)
//!     → PaymentListener::on_received / on_sent (listener.rs)
//! ```

pub mod listener;
pub mod normalizer;
pub mod types;

pub use listener::{LoggingListener, PaymentListener, PublishError};
pub use normalizer::{normalize, normalize_or_skip, NormalizeError};
pub use types::{AssetInfo, ObservedPayment, PaymentKind, NATIVE_ASSET_CODE};
