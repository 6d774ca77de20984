//! Casino wallet server.
//!
//! Serves the wallet ledger over HTTP, backed by PostgreSQL or by the
//! in-memory store.

use std::sync::Arc;

use anyhow::{Context, Error};
use casino_wallet::{
    db::{Database, MemoryLedgerStore, PgLedgerStore, WalletStore, ensure_schema},
    wallet::{SeedOptions, WalletManager, WalletService, seed_players},
};
use cw_server::{
    api,
    config::{CliOverrides, ServerConfig, StoreBackend},
    logging, metrics,
};
use pico_args::Arguments;

const HELP: &str = "\
Run the casino wallet server

USAGE:
  cw_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND, else 0.0.0.0:$APPLICATION_PORT, else 0.0.0.0:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL, else built from POSTGRES_*]
  --store      BACKEND     postgres or memory          [default: env STORE_BACKEND or postgres]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  APPLICATION_PORT         Port used when SERVER_BIND is unset
  DATABASE_URL             PostgreSQL connection string
  POSTGRES_HOST/PORT/USER/PASSWORD/DB
                           Connection parts used when DATABASE_URL is unset
  LOG_LEVEL                Log level (DEBUG=true forces debug)
  METRICS_BIND             Prometheus exporter address (disabled when unset)
  SEED_PLAYERS             Create sample players on an empty store [default: true]
  (See .env.example for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let overrides = CliOverrides {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        backend: pargs.opt_value_from_str("--store")?,
    };

    let config = ServerConfig::from_env(overrides)?;
    config.validate()?;

    logging::init(&config.log_level);
    tracing::info!(
        bind = %config.bind,
        backend = ?config.backend,
        "Starting casino wallet server"
    );

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        tracing::info!(%addr, "Prometheus exporter listening");
    }

    let (wallet, database) = match config.backend {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database");
            let db = Database::connect_with_retry(&config.database)
                .await
                .context("Failed to connect to database")?;
            ensure_schema(db.pool())
                .await
                .context("Failed to prepare database schema")?;
            tracing::info!("Database connected successfully");

            let store = Arc::new(PgLedgerStore::from_config(
                db.pool().clone(),
                &config.database,
            ));
            (build_wallet(store, config.seed.as_ref()).await?, Some(db))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; balances are lost on exit");
            let store = Arc::new(
                MemoryLedgerStore::new().with_lock_timeout(config.database.lock_timeout()),
            );
            (build_wallet(store, config.seed.as_ref()).await?, None)
        }
    };

    // Create router
    let app = api::create_router(api::AppState { wallet });

    // Start HTTP server
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    tracing::info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down server...");
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Seed the store if asked to and wrap it for the handlers
async fn build_wallet<S>(
    store: Arc<S>,
    seed: Option<&SeedOptions>,
) -> Result<Arc<dyn WalletService>, Error>
where
    S: WalletStore + 'static,
{
    if let Some(options) = seed {
        seed_players(store.as_ref(), options)
            .await
            .context("Failed to seed sample players")?;
    }
    Ok(Arc::new(WalletManager::new(store)))
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
