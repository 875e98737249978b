//! Admin HTTP API.
//!
//! # Routes
//! ```text
//! GET    /health          health snapshot (no auth; 503 when red)
//! GET    /accounts        watched accounts
//! POST   /accounts        register an account
//! DELETE /accounts/{id}   unregister an account
//! ```
//!
//! Account routes require `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::accounts::AccountRegistry;
use crate::health::HealthCheck;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state of the admin API.
#[derive(Clone)]
pub struct AdminState {
    pub health: Arc<dyn HealthCheck>,
    pub registry: AccountRegistry,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(health: Arc<dyn HealthCheck>, registry: AccountRegistry, api_key: &str) -> Self {
        Self {
            health,
            registry,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    let accounts = Router::new()
        .route("/accounts", get(list_accounts).post(register_account))
        .route("/accounts/{id}", delete(unregister_account))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/health", get(get_health))
        .merge(accounts)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
