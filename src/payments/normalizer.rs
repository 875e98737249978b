//! Conversion of raw feed operations into [`ObservedPayment`]s.
//!
//! Normalization is pure. Operations that are not payments, or whose
//! transaction failed on-ledger, normalize to `None`. Content that can never
//! be interpreted (an unsupported memo, a missing destination) is an error
//! from [`normalize`]; [`normalize_or_skip`] logs it and filters the
//! operation so the feed can move past it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::ledger::types::{RawOperation, RawTransaction};
use crate::payments::types::{AssetInfo, ObservedPayment, PaymentKind, NATIVE_ASSET_CODE};

/// Reasons an operation cannot be turned into a payment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("unsupported memo type '{0}'")]
    UnsupportedMemo(String),

    #[error("invalid {memo_type} memo '{memo}'")]
    InvalidMemo { memo_type: String, memo: String },

    #[error("payment is missing field '{0}'")]
    MissingField(&'static str),
}

pub type NormalizeResult<T> = Result<T, NormalizeError>;

fn kind_of(op_type: &str) -> Option<PaymentKind> {
    match op_type {
        "payment" => Some(PaymentKind::Payment),
        "path_payment" | "path_payment_strict_receive" | "path_payment_strict_send" => {
            Some(PaymentKind::PathPayment)
        }
        _ => None,
    }
}

/// Normalize one feed operation.
pub fn normalize(op: &RawOperation) -> NormalizeResult<Option<ObservedPayment>> {
    let Some(kind) = kind_of(&op.op_type) else {
        return Ok(None);
    };
    if !op.transaction_successful {
        return Ok(None);
    }

    let tx = op.transaction.as_ref();
    let source_account = op
        .source_account
        .clone()
        .or_else(|| tx.and_then(|t| t.source_account.clone()));
    let from = op
        .from
        .clone()
        .or_else(|| source_account.clone())
        .ok_or(NormalizeError::MissingField("from"))?;
    let to = op.to.clone().ok_or(NormalizeError::MissingField("to"))?;
    let amount = op.amount.clone().ok_or(NormalizeError::MissingField("amount"))?;

    let asset = asset_from(
        op.asset_type.as_deref(),
        op.asset_code.as_deref(),
        op.asset_issuer.as_deref(),
    )
    .ok_or(NormalizeError::MissingField("asset_type"))?;

    let (source_amount, source_asset) = match kind {
        PaymentKind::Payment => (None, None),
        PaymentKind::PathPayment => (
            op.source_amount.clone(),
            asset_from(
                op.source_asset_type.as_deref(),
                op.source_asset_code.as_deref(),
                op.source_asset_issuer.as_deref(),
            ),
        ),
    };

    let (transaction_memo, transaction_memo_type) = decode_memo(tx)?;

    Ok(Some(ObservedPayment {
        id: op.id.clone(),
        kind,
        from,
        to,
        amount,
        asset,
        source_amount,
        source_asset,
        source_account,
        created_at: op.created_at.clone(),
        transaction_hash: op
            .transaction_hash
            .clone()
            .or_else(|| tx.and_then(|t| t.hash.clone())),
        transaction_memo,
        transaction_memo_type,
        transaction_envelope: tx.and_then(|t| t.envelope_xdr.clone()),
    }))
}

/// Normalize one feed operation, logging and filtering data faults.
pub fn normalize_or_skip(op: &RawOperation) -> Option<ObservedPayment> {
    match normalize(op) {
        Ok(payment) => payment,
        Err(e) => {
            let memo = op.transaction.as_ref().and_then(|t| t.memo.as_deref());
            tracing::warn!(
                id = %op.id,
                memo = ?memo,
                error = %e,
                "Skipping payment that cannot be interpreted"
            );
            None
        }
    }
}

fn asset_from(asset_type: Option<&str>, code: Option<&str>, issuer: Option<&str>) -> Option<AssetInfo> {
    let asset_type = asset_type?;
    if asset_type == NATIVE_ASSET_CODE {
        return Some(AssetInfo::native());
    }
    Some(AssetInfo::credit(asset_type, code?, issuer?))
}

/// Decode the transaction memo into `(value, type)`.
///
/// Hash memos arrive base64 encoded and are reported as lowercase hex.
fn decode_memo(tx: Option<&RawTransaction>) -> NormalizeResult<(Option<String>, String)> {
    let Some(tx) = tx else {
        return Ok((None, "none".to_string()));
    };
    let memo_type = tx.memo_type.as_deref().unwrap_or("none");
    let memo = tx.memo.clone().unwrap_or_default();

    let value = match memo_type {
        "none" => String::new(),
        "text" => memo,
        "id" => {
            let id: u64 = memo.parse().map_err(|_| NormalizeError::InvalidMemo {
                memo_type: memo_type.to_string(),
                memo: memo.clone(),
            })?;
            id.to_string()
        }
        "hash" => {
            let bytes = STANDARD.decode(memo.as_bytes()).map_err(|_| NormalizeError::InvalidMemo {
                memo_type: memo_type.to_string(),
                memo: memo.clone(),
            })?;
            hex::encode(bytes)
        }
        other => return Err(NormalizeError::UnsupportedMemo(other.to_string())),
    };
    Ok((Some(value), memo_type.to_string()))
}
