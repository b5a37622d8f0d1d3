//! Axum REST API consumed by the kiosk front-end.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::controller::{DrainReport, SubmitOutcome, SyncController, ViewState};
use crate::errors::SyncError;
use crate::format::format_eur;
use crate::models::{DonationEntry, PaymentMethod};

#[derive(Clone)]
pub struct ApiState {
    pub controller: Arc<SyncController>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(get_state))
        .route("/donations", post(post_donation))
        .route("/sync", post(post_sync))
        .route("/queue", get(get_queue))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRequest {
    pub amount: Decimal,
    pub project_name: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Serialize)]
pub struct StateResponse {
    #[serde(flatten)]
    pub state: ViewState,
    pub percent_complete: u32,
    pub total_formatted: Option<String>,
    pub goal_formatted: Option<String>,
}

impl From<ViewState> for StateResponse {
    fn from(state: ViewState) -> Self {
        let percent_complete = state.percent_complete();
        let total_formatted = state.stats.as_ref().map(|s| format_eur(s.total_eur));
        let goal_formatted = state.stats.as_ref().map(|s| format_eur(s.goal_eur));
        Self {
            state,
            percent_complete,
            total_formatted,
            goal_formatted,
        }
    }
}

#[derive(Serialize)]
pub struct DonationResponse {
    pub queued: bool,
    pub donation: Option<DonationEntry>,
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct QueueResponse {
    pub pending: bool,
    pub count: usize,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /state`
///
/// Current stats, loading flag, error and message as last published.
pub async fn get_state(State(state): State<Arc<ApiState>>) -> Json<StateResponse> {
    Json(StateResponse::from(state.controller.snapshot()))
}

/// `POST /donations`
///
/// 201 when the gateway confirmed the donation, 202 when it was queued
/// offline, 422 for a non-positive amount.
pub async fn post_donation(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<DonationRequest>,
) -> impl IntoResponse {
    let result = state
        .controller
        .submit_donation(req.amount, req.project_name, req.payment_method)
        .await;
    let message = state.controller.snapshot().message;

    match result {
        Ok(SubmitOutcome::Confirmed(entry)) => (
            StatusCode::CREATED,
            Json(serde_json::json!(DonationResponse {
                queued: false,
                donation: Some(entry),
                message,
            })),
        )
            .into_response(),
        Ok(SubmitOutcome::Queued) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!(DonationResponse {
                queued: true,
                donation: None,
                message,
            })),
        )
            .into_response(),
        Err(e @ SyncError::InvalidAmount(_)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!(ErrorResponse {
                error: e.to_string()
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!(ErrorResponse {
                error: e.to_string()
            })),
        )
            .into_response(),
    }
}

/// `POST /sync`
///
/// Replays the offline queue now instead of waiting for a reconnect.
pub async fn post_sync(State(state): State<Arc<ApiState>>) -> Json<DrainReport> {
    Json(state.controller.drain_queue().await)
}

/// `GET /queue`
pub async fn get_queue(State(state): State<Arc<ApiState>>) -> Json<QueueResponse> {
    let count = state.controller.queue().len().await;
    Json(QueueResponse {
        pending: count > 0,
        count,
    })
}
