use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use busline_core::hold::SeatHold;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct HoldRequest {
    pub seats: Vec<String>,
    /// Re-use to extend or grow an existing hold.
    pub hold_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub seats: Vec<String>,
    pub hold_token: String,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: Vec<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/trips/{id}/holds", post(hold_seats).delete(release_seats))
}

/// POST /v1/trips/:id/holds
async fn hold_seats(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<HoldRequest>,
) -> Result<(StatusCode, Json<SeatHold>), AppError> {
    let hold = state.holds.hold(trip_id, req.seats, req.hold_token).await?;
    Ok((StatusCode::CREATED, Json(hold)))
}

/// DELETE /v1/trips/:id/holds
async fn release_seats(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let released = state.holds.release(trip_id, req.seats, &req.hold_token).await?;
    Ok(Json(ReleaseResponse { released }))
}
