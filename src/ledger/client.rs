//! Ledger feed abstraction consumed by the observer.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::ledger::types::{Cursor, LedgerResult, RawOperation};

/// Live stream of operation records.
///
/// Items arrive in feed order. An `Err` item means the subscription failed;
/// the stream yields nothing useful after it.
pub type OperationStream = BoxStream<'static, LedgerResult<RawOperation>>;

/// A source of ledger payment operations.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Cursor of the most recent payment on the network, `None` if the
    /// network has none yet.
    async fn latest_cursor(&self) -> LedgerResult<Option<Cursor>>;

    /// Open a live subscription starting after `from`.
    async fn subscribe(&self, from: &Cursor) -> LedgerResult<OperationStream>;
}
