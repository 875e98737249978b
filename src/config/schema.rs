//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::observability::logging::LogFormat;

/// Root configuration for the payment observer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Horizon server the payment feed is read from.
    pub horizon: HorizonConfig,

    /// Recovery timing and budgets.
    pub observer: ObserverConfig,

    /// Watched-account retention.
    pub accounts: AccountsConfig,

    /// Durable state locations.
    pub storage: StorageConfig,

    pub admin: AdminConfig,

    pub observability: ObservabilityConfig,
}

/// Horizon connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HorizonConfig {
    /// Base URL (e.g., "https://horizon.stellar.org").
    pub url: String,

    /// Timeout for non-streaming requests in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            url: "https://horizon-testnet.stellar.org".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Observer recovery settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// How often the silence watcher runs.
    pub silence_check_interval_secs: u64,

    /// Idle time after which an open stream is considered dead.
    pub silence_timeout_secs: u64,

    /// Silence reconnects before shutting down (0 = unlimited).
    pub silence_timeout_retries: u32,

    pub initial_stream_backoff_secs: u64,
    pub max_stream_backoff_secs: u64,

    pub initial_event_backoff_secs: u64,
    pub max_event_backoff_secs: u64,

    pub initial_database_backoff_secs: u64,
    pub max_database_backoff_secs: u64,

    /// How often the status watcher runs, in milliseconds.
    pub status_check_interval_ms: u64,

    /// Furthest behind the network tip a resumed stream may start.
    pub max_page_size: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            silence_check_interval_secs: 5,
            silence_timeout_secs: 90,
            silence_timeout_retries: 2,
            initial_stream_backoff_secs: 5,
            max_stream_backoff_secs: 300,
            initial_event_backoff_secs: 5,
            max_event_backoff_secs: 300,
            initial_database_backoff_secs: 1,
            max_database_backoff_secs: 20,
            status_check_interval_ms: 1000,
            max_page_size: 200,
        }
    }
}

/// Watched-account retention settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Eviction sweep period in seconds.
    pub eviction_interval_secs: u64,

    /// Idle time after which a transient account is evicted.
    pub max_idle_secs: u64,

    /// Accounts watched permanently (distribution and custody accounts).
    pub residential: Vec<String>,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            eviction_interval_secs: 300,
            max_idle_secs: 30 * 24 * 3600,
            residential: Vec::new(),
        }
    }
}

/// File locations for durable state.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub cursor_path: String,
    pub accounts_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cursor_path: "data/cursor.json".to_string(),
            accounts_path: "data/accounts.json".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
