use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use busline_booking::{InitializePayment, VerifiedPayment, WebhookOutcome};
use busline_core::payment::{PaymentSession, SIGNATURE_HEADER};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub reference: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/paystack/initialize", post(initialize))
        .route("/v1/paystack/verify", post(verify))
        .route("/v1/paystack/webhook", get(webhook_status).post(webhook))
}

/// POST /v1/paystack/initialize
async fn initialize(
    State(state): State<AppState>,
    Json(req): Json<InitializePayment>,
) -> Result<Json<Value>, AppError> {
    let session: PaymentSession = state.checkout.initialize(req).await?;
    Ok(Json(json!({ "status": true, "data": session })))
}

/// POST /v1/paystack/verify
async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifiedPayment>, AppError> {
    Ok(Json(state.checkout.verify(req.reference).await?))
}

/// GET /v1/paystack/webhook
async fn webhook_status() -> Json<Value> {
    Json(json!({
        "message": "Webhook endpoint is working",
        "timestamp": Utc::now().to_rfc3339(),
        "methods": ["GET", "POST"],
    }))
}

/// POST /v1/paystack/webhook
///
/// The signature covers the exact bytes sent, so the body is taken raw.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let body = match state.checkout.handle_webhook(&body, signature).await? {
        WebhookOutcome::BookingCreated(reference) => json!({
            "message": "Webhook processed successfully",
            "reference": reference,
        }),
        WebhookOutcome::AlreadyProcessed(reference) => json!({
            "message": "Booking already exists",
            "reference": reference,
        }),
        WebhookOutcome::Ignored(event) => json!({
            "message": "Event not handled",
            "event": event,
        }),
    };
    Ok(Json(body))
}
