//! Feed positions, raw operation records and error definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque position in the payment feed.
///
/// Horizon paging tokens are decimal integers, so ordering is only defined
/// for cursors that parse as one. The special `now` cursor asks the feed to
/// start at whatever arrives next.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Token understood by the feed as "start from the next new record".
    pub const NOW: &'static str = "now";

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn now() -> Self {
        Self(Self::NOW.to_string())
    }

    pub fn is_now(&self) -> bool {
        self.0 == Self::NOW
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric position of this cursor, if it has one.
    pub fn position(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl From<u64> for Cursor {
    fn from(position: u64) -> Self {
        Self(position.to_string())
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The parent transaction embedded in an operation record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTransaction {
    pub hash: Option<String>,
    pub successful: Option<bool>,
    pub source_account: Option<String>,
    pub memo_type: Option<String>,
    /// Memo value; base64 encoded for `hash` and `return` memos.
    pub memo: Option<String>,
    pub envelope_xdr: Option<String>,
}

/// One operation record as delivered by the ledger feed.
///
/// Only the fields used by payment normalization are modelled; everything
/// else in the record is ignored during decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOperation {
    pub id: String,
    pub paging_token: String,
    #[serde(rename = "type")]
    pub op_type: String,
    pub transaction_successful: bool,
    pub source_account: Option<String>,
    pub created_at: Option<String>,
    pub transaction_hash: Option<String>,

    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: Option<String>,
    pub asset_type: Option<String>,
    pub asset_code: Option<String>,
    pub asset_issuer: Option<String>,

    pub source_amount: Option<String>,
    pub source_asset_type: Option<String>,
    pub source_asset_code: Option<String>,
    pub source_asset_issuer: Option<String>,

    pub transaction: Option<RawTransaction>,
}

impl Default for RawOperation {
    fn default() -> Self {
        Self {
            id: String::new(),
            paging_token: String::new(),
            op_type: String::new(),
            transaction_successful: true,
            source_account: None,
            created_at: None,
            transaction_hash: None,
            from: None,
            to: None,
            amount: None,
            asset_type: None,
            asset_code: None,
            asset_issuer: None,
            source_amount: None,
            source_asset_type: None,
            source_asset_code: None,
            source_asset_issuer: None,
            transaction: None,
        }
    }
}

impl RawOperation {
    /// Operation type used for feed records that could not be decoded.
    pub const UNDECODABLE: &'static str = "undecodable";

    /// Placeholder for a record the client could not decode. It keeps the
    /// feed position so the observer can step past it.
    pub fn undecodable(paging_token: impl Into<String>) -> Self {
        let paging_token = paging_token.into();
        Self {
            id: paging_token.clone(),
            paging_token,
            op_type: Self::UNDECODABLE.to_string(),
            ..Self::default()
        }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.paging_token.clone())
    }
}

/// Errors raised by the ledger feed.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transport failure talking to the feed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The feed answered with a non-success status.
    #[error("feed returned status {0}")]
    Status(u16),

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The subscription ended. Live feeds never end on their own.
    #[error("stream closed by the server")]
    StreamClosed,

    /// The configured base URL is unusable.
    #[error("invalid feed URL '{0}'")]
    InvalidUrl(String),
}

/// Result type for ledger feed operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
