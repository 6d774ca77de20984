//! HTTP API for the wallet server.
//!
//! This module exposes event ingestion, balance lookups and the health probe.
//!
//! # Architecture
//!
//! The API is built with:
//! - **Axum**: Async web framework for HTTP
//! - **Tower**: Middleware for CORS and request correlation
//! - **WalletService**: Store-agnostic wallet operations shared by all handlers
//!
//! # Modules
//!
//! - [`events`]: Bet and result ingestion
//! - [`wallets`]: Balances, player list and transaction history
//! - [`request_id`]: Correlation id middleware
//!
//! # Endpoints Overview
//!
//! - `GET  /` - Liveness
//! - `GET  /health` - Store reachability
//! - `POST /event` - Process a bet or result
//! - `GET  /wallet/{player_id}` - Balance of a player
//! - `GET  /wallet/{player_id}/transactions` - Ledger history of a player
//! - `GET  /players` - All players with balances
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use cw_server::api::{create_router, AppState};
//! use casino_wallet::{db::MemoryLedgerStore, wallet::WalletManager};
//! use std::sync::Arc;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!
//! // Create application state
//! let state = AppState {
//!     wallet: Arc::new(WalletManager::new(Arc::new(MemoryLedgerStore::new()))),
//! };
//!
//! // Create router with all endpoints
//! let app = create_router(state);
//!
//! // Start server
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod request_id;
pub mod wallets;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use casino_wallet::wallet::WalletService;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// This state is cloned for each request (cheap due to Arc wrappers).
///
/// # Fields
///
/// - `wallet`: Event processing and balance queries over the configured store
#[derive(Clone)]
pub struct AppState {
    pub wallet: Arc<dyn WalletService>,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Arguments
///
/// - `state`: Application state with the wallet service
///
/// # Returns
///
/// Configured Axum router ready to serve requests
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/event", post(events::process_event))
        .route("/players", get(wallets::list_players))
        .route("/wallet/{player_id}", get(wallets::get_wallet))
        .route(
            "/wallet/{player_id}/transactions",
            get(wallets::list_transactions),
        )
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe.
async fn root() -> &'static str {
    "ok"
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` if the store answers, or `503 Service Unavailable` otherwise.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"ok","database":"ok","timestamp":"2025-11-22T10:30:00+00:00"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = match state.wallet.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            false
        }
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let label = if healthy { "ok" } else { "error" };

    let response = json!({
        "status": label,
        "database": label,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
