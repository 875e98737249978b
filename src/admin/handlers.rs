use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::UNIX_EPOCH;

use crate::accounts::{AccountRegistrar, AccountType, WatchedAccount};
use crate::health::{HealthBucket, HealthSnapshot};
use super::AdminState;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountView {
    pub account_id: String,
    pub account_type: AccountType,
    /// Unix seconds.
    pub last_observed: u64,
}

impl From<WatchedAccount> for AccountView {
    fn from(account: WatchedAccount) -> Self {
        Self {
            last_observed: account
                .last_observed_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            account_id: account.account_id,
            account_type: account.account_type,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub account_id: String,
    #[serde(default)]
    pub account_type: AccountType,
}

pub async fn get_health(State(state): State<AdminState>) -> (StatusCode, Json<HealthSnapshot>) {
    let snapshot = state.health.check();
    let code = if snapshot.status == HealthBucket::Red {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(snapshot))
}

pub async fn list_accounts(State(state): State<AdminState>) -> Json<Vec<AccountView>> {
    let mut accounts: Vec<AccountView> = state
        .registry
        .list_all()
        .into_iter()
        .map(AccountView::from)
        .collect();
    accounts.sort_by(|a, b| a.account_id.cmp(&b.account_id));
    Json(accounts)
}

pub async fn register_account(
    State(state): State<AdminState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AccountView>), StatusCode> {
    let account_id = request.account_id.trim();
    if account_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    state.registry.register_account(account_id, request.account_type);
    let account = state
        .registry
        .get(account_id)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

pub async fn unregister_account(
    State(state): State<AdminState>,
    Path(account_id): Path<String>,
) -> StatusCode {
    if state.registry.unregister_account(&account_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
