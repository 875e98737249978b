//! Ledger payment observer service.
//!
//! # Architecture Overview
//!
//! ```text
//! Horizon /payments (SSE)
//!     → HorizonClient
//!     → ObserverEngine ──▶ PaymentListener (on_received / on_sent)
//!         ├── CursorStore      (data/cursor.json)
//!         ├── AccountRegistry  (data/accounts.json)
//!         └── HealthReporter ──▶ admin API
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use ledger_observer::accounts::{AccountRegistry, AccountType};
use ledger_observer::admin::{setup_admin_router, AdminState};
use ledger_observer::config::{load_config, validate_config, AppConfig, ConfigError};
use ledger_observer::health::HealthReporter;
use ledger_observer::ledger::HorizonClient;
use ledger_observer::lifecycle::wait_for_signal;
use ledger_observer::observability::{logging, metrics};
use ledger_observer::observer::{EngineSettings, ObserverEngine};
use ledger_observer::payments::{LoggingListener, PaymentListener};
use ledger_observer::storage::{FileAccountStore, FileCursorStore};

#[derive(Parser)]
#[command(name = "ledger-observer", version, about = "Stellar payment observer")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "OBSERVER_CONFIG")]
    config: Option<PathBuf>,
}

fn load(args: &Args) -> Result<AppConfig, ConfigError> {
    match &args.config {
        Some(path) => load_config(path),
        None => {
            let config = AppConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load(&args)?;

    logging::init(
        &config.observability.log_level,
        config.observability.log_format,
    );
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ledger-observer starting");
    tracing::info!(
        horizon = %config.horizon.url,
        cursor_path = %config.storage.cursor_path,
        accounts_path = %config.storage.accounts_path,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let client = Arc::new(HorizonClient::new(&config.horizon)?);
    let cursor_store = Arc::new(FileCursorStore::new(&config.storage.cursor_path));
    let registry = AccountRegistry::new(Arc::new(FileAccountStore::new(
        &config.storage.accounts_path,
    )));
    for account in &config.accounts.residential {
        registry.upsert(account, AccountType::Residential);
    }

    let listeners: Vec<Arc<dyn PaymentListener>> = vec![Arc::new(LoggingListener)];
    let engine = ObserverEngine::new(
        client,
        cursor_store,
        registry.clone(),
        listeners,
        EngineSettings::from_config(&config.observer, &config.accounts),
    );
    engine.start().await;

    let admin = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");

        let state = AdminState::new(
            Arc::new(HealthReporter::new(engine.clone())),
            registry,
            &config.admin.api_key,
        );
        let router = setup_admin_router(state);
        let stopped = engine.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { stopped.run_until_shutdown().await })
                .await
        }))
    } else {
        None
    };

    tokio::select! {
        _ = wait_for_signal() => engine.shutdown(),
        _ = engine.run_until_shutdown() => {
            tracing::warn!("Observer stopped after exhausting its recovery budget");
        }
    }

    if let Some(admin) = admin {
        match admin.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin API task panicked"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
