//! Event ingestion API handler.
//!
//! Game providers post `bet` and `result` events here. Each event is decoded,
//! validated and handed to the wallet on its own task, so a client that
//! disconnects mid-request cannot cut a unit of work short.
//!
//! # Examples
//!
//! Place a bet:
//! ```bash
//! curl -X POST http://localhost:8080/event \
//!   -H "Content-Type: application/json" \
//!   -d '{"request_id":"r1","player_id":"player1","wallet_id":"wallet1",
//!        "round_id":"round1","session_id":"s1","game_code":"slots",
//!        "type":"bet","amount":500,"currency":"INR"}'
//! ```

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use casino_wallet::wallet::{EventRequest, LedgerError};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{AppState, request_id::RequestId};
use crate::{logging, metrics};

/// Outcome of `POST /event`
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EventResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventResponse {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// HTTP status for a ledger error
///
/// Replays are `409 Conflict`; every other business rejection is
/// `400 Bad Request`; infrastructure failures are `500`.
pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::DuplicateRequest(_) => StatusCode::CONFLICT,
        err if err.is_business_rejection() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Process a bet or result event.
///
/// # Request Body
///
/// ```json
/// {
///   "request_id": "r1",
///   "player_id": "player1",
///   "wallet_id": "wallet1",
///   "round_id": "round1",
///   "session_id": "s1",
///   "game_code": "slots",
///   "type": "bet",
///   "amount": 500,
///   "currency": "INR"
/// }
/// ```
///
/// # Response
///
/// Returns `200 OK` with `{"success": true}`.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed body, failed validation or a rule rejection
/// - `409 Conflict`: `request_id` already processed
/// - `500 Internal Server Error`: Unknown player or store failure
pub async fn process_event(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<EventRequest>, JsonRejection>,
) -> (StatusCode, Json<EventResponse>) {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::info!(
                request_id = %request_id.as_str(),
                error = %rejection.body_text(),
                "Event body could not be decoded"
            );
            return (
                StatusCode::BAD_REQUEST,
                Json(EventResponse::failed(rejection.body_text())),
            );
        }
    };

    let event = match request.validate() {
        Ok(event) => event,
        Err(err) => {
            tracing::info!(
                request_id = %request_id.as_str(),
                error = %err,
                "Event failed validation"
            );
            metrics::ledger_events_total("unknown", err.code());
            return (
                StatusCode::BAD_REQUEST,
                Json(EventResponse::failed(err.client_message())),
            );
        }
    };

    let kind = event.kind.as_str();
    let event_id = event.request_id.clone();
    let started = Instant::now();

    let wallet = state.wallet.clone();
    let outcome = tokio::spawn(async move { wallet.process(&event).await }).await;

    let elapsed = started.elapsed();
    metrics::ledger_event_duration_ms(kind, elapsed.as_secs_f64() * 1000.0);
    logging::log_event_timing(kind, &event_id, elapsed.as_millis() as u64);

    match outcome {
        Ok(Ok(())) => {
            metrics::ledger_events_total(kind, "accepted");
            (StatusCode::OK, Json(EventResponse::ok()))
        }
        Ok(Err(err)) => {
            metrics::ledger_events_total(kind, err.code());
            (status_for(&err), Json(EventResponse::failed(err.client_message())))
        }
        Err(join_err) => {
            tracing::error!(
                request_id = %request_id.as_str(),
                event_request_id = %event_id,
                error = %join_err,
                "Event task did not complete"
            );
            metrics::ledger_events_total(kind, "task_failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(EventResponse::failed("internal server error")),
            )
        }
    }
}
