//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::AppConfig;
use crate::ledger::horizon::MAX_PAGE_LIMIT;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = Url::parse(&config.horizon.url) {
        errors.push(ValidationError::new("horizon.url", format!("invalid URL: {e}")));
    }
    if config.horizon.request_timeout_secs == 0 {
        errors.push(ValidationError::new("horizon.request_timeout_secs", "must be greater than 0"));
    }

    let observer = &config.observer;
    let backoffs = [
        (
            "observer.initial_stream_backoff_secs",
            observer.initial_stream_backoff_secs,
            observer.max_stream_backoff_secs,
        ),
        (
            "observer.initial_event_backoff_secs",
            observer.initial_event_backoff_secs,
            observer.max_event_backoff_secs,
        ),
        (
            "observer.initial_database_backoff_secs",
            observer.initial_database_backoff_secs,
            observer.max_database_backoff_secs,
        ),
    ];
    for (field, initial, max) in backoffs {
        if initial == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        } else if initial > max {
            errors.push(ValidationError::new(field, format!("{initial} exceeds the maximum {max}")));
        }
    }

    if observer.silence_check_interval_secs == 0 {
        errors.push(ValidationError::new(
            "observer.silence_check_interval_secs",
            "must be greater than 0",
        ));
    }
    if observer.silence_timeout_secs <= observer.silence_check_interval_secs {
        errors.push(ValidationError::new(
            "observer.silence_timeout_secs",
            "must be greater than silence_check_interval_secs",
        ));
    }
    if observer.status_check_interval_ms == 0 {
        errors.push(ValidationError::new(
            "observer.status_check_interval_ms",
            "must be greater than 0",
        ));
    }
    if !(1..=MAX_PAGE_LIMIT).contains(&observer.max_page_size) {
        errors.push(ValidationError::new(
            "observer.max_page_size",
            format!("must be between 1 and {MAX_PAGE_LIMIT}"),
        ));
    }

    if config.accounts.max_idle_secs == 0 {
        errors.push(ValidationError::new("accounts.max_idle_secs", "must be greater than 0"));
    }
    if config.accounts.eviction_interval_secs == 0 {
        errors.push(ValidationError::new(
            "accounts.eviction_interval_secs",
            "must be greater than 0",
        ));
    }

    if config.admin.enabled {
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "required when the admin API is enabled"));
        }
        if config.admin.bind_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "invalid socket address"));
        }
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "invalid socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&AppConfig::default()), Ok(()));
    }

    #[test]
    fn test_backoff_bounds() {
        let mut config = AppConfig::default();
        config.observer.initial_stream_backoff_secs = 0;
        config.observer.initial_database_backoff_secs = 30;
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "observer.initial_stream_backoff_secs",
                "observer.initial_database_backoff_secs"
            ]
        );
    }

    #[test]
    fn test_silence_timeout_must_exceed_check_interval() {
        let mut config = AppConfig::default();
        config.observer.silence_timeout_secs = 5;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observer.silence_timeout_secs");
    }

    #[test]
    fn test_admin_requires_api_key() {
        let mut config = AppConfig::default();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "admin.api_key");

        config.admin.api_key = "secret".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_page_size_range() {
        let mut config = AppConfig::default();
        config.observer.max_page_size = 201;
        assert!(validate_config(&config).is_err());
        config.observer.max_page_size = 1;
        assert!(validate_config(&config).is_ok());
    }
}
