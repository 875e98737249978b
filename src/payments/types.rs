//! Normalized payment types.

use serde::{Deserialize, Serialize};

/// Asset code used for the network's native asset.
pub const NATIVE_ASSET_CODE: &str = "native";

/// Kind of ledger operation a payment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Payment,
    PathPayment,
}

/// Asset identity of a payment leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Feed asset type (`native`, `credit_alphanum4`, `credit_alphanum12`).
    pub asset_type: String,
    /// Asset code, or [`NATIVE_ASSET_CODE`] for the native asset.
    pub code: String,
    /// Issuing account; `None` for the native asset.
    pub issuer: Option<String>,
}

impl AssetInfo {
    pub fn native() -> Self {
        Self {
            asset_type: NATIVE_ASSET_CODE.to_string(),
            code: NATIVE_ASSET_CODE.to_string(),
            issuer: None,
        }
    }

    pub fn credit(asset_type: impl Into<String>, code: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            asset_type: asset_type.into(),
            code: code.into(),
            issuer: Some(issuer.into()),
        }
    }

    pub fn is_native(&self) -> bool {
        self.issuer.is_none() && self.code == NATIVE_ASSET_CODE
    }

    /// Canonical asset name: `native` or `CODE:ISSUER`.
    pub fn name(&self) -> String {
        match &self.issuer {
            Some(issuer) => format!("{}:{}", self.code, issuer),
            None => self.code.clone(),
        }
    }
}

/// A payment observed on the ledger, independent of the feed's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedPayment {
    /// Feed-assigned operation id.
    pub id: String,
    pub kind: PaymentKind,
    pub from: String,
    pub to: String,
    /// Decimal amount received, as reported by the feed.
    pub amount: String,
    pub asset: AssetInfo,
    /// Amount sent, for path payments.
    pub source_amount: Option<String>,
    /// Asset sent, for path payments.
    pub source_asset: Option<AssetInfo>,
    pub source_account: Option<String>,
    pub created_at: Option<String>,
    pub transaction_hash: Option<String>,
    /// Decoded memo; `None` when the parent transaction was not available.
    pub transaction_memo: Option<String>,
    pub transaction_memo_type: String,
    pub transaction_envelope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_name() {
        assert_eq!(AssetInfo::native().name(), "native");
        assert!(AssetInfo::native().is_native());

        let usdc = AssetInfo::credit("credit_alphanum4", "USDC", "GISSUER");
        assert_eq!(usdc.name(), "USDC:GISSUER");
        assert!(!usdc.is_native());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentKind::PathPayment).unwrap();
        assert_eq!(json, "\"path_payment\"");
    }
}
