use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use busline_booking::CreatedBooking;
use busline_core::booking::{Booking, BookingDetails, BookingInput, BookingPatch};
use busline_core::search::{BookingFilter, Page, Paging};

use crate::{error::AppError, middleware::Claims, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckPaymentQuery {
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckPaymentResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<Booking>,
}

#[derive(Debug, Deserialize)]
pub struct ListBookingsQuery {
    pub email: Option<String>,
    pub status: Option<String>,
    pub trip_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        // Static segment first so it is never read as a reference.
        .route("/v1/bookings/check-payment", get(check_payment))
        .route("/v1/bookings/{reference}", get(get_booking))
        .route("/v1/bookings/{reference}/cancel", post(cancel_booking))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", get(list_bookings).post(create_booking))
        .route("/bookings/{reference}", patch(update_booking).delete(delete_booking))
}

// ============================================================================
// Public
// ============================================================================

/// GET /v1/bookings/:reference
async fn get_booking(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<BookingDetails>, AppError> {
    Ok(Json(state.bookings.get(&reference).await?))
}

/// POST /v1/bookings/:reference/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<BookingDetails>, AppError> {
    Ok(Json(state.bookings.cancel(&reference, &req.email).await?))
}

/// GET /v1/bookings/check-payment?reference=
async fn check_payment(
    State(state): State<AppState>,
    Query(query): Query<CheckPaymentQuery>,
) -> Result<Json<CheckPaymentResponse>, AppError> {
    let reference = query
        .reference
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::ValidationError("Reference is required".to_string()))?;

    let booking = state.bookings.find_by_payment_reference(&reference).await?;
    Ok(Json(CheckPaymentResponse { exists: booking.is_some(), booking }))
}

// ============================================================================
// Admin
// ============================================================================

/// GET /v1/admin/bookings
async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListBookingsQuery>,
) -> Result<Json<Page<Booking>>, AppError> {
    let filter = BookingFilter {
        email: query.email.filter(|s| !s.is_empty()),
        status: query.status.filter(|s| !s.is_empty()),
        trip_id: query.trip_id,
        paging: Paging::new(query.limit, query.offset),
    };
    Ok(Json(state.bookings.list(&filter).await?))
}

/// POST /v1/admin/bookings
async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<BookingInput>,
) -> Result<(StatusCode, Json<CreatedBooking>), AppError> {
    let created = state.bookings.create(req).await?;
    let status = if created.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(created)))
}

/// PATCH /v1/admin/bookings/:reference
async fn update_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(reference): Path<String>,
    Json(req): Json<BookingPatch>,
) -> Result<Json<BookingDetails>, AppError> {
    Ok(Json(state.bookings.update(&reference, req, &claims.email).await?))
}

/// DELETE /v1/admin/bookings/:reference
async fn delete_booking(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<StatusCode, AppError> {
    state.bookings.delete(&reference).await?;
    Ok(StatusCode::NO_CONTENT)
}
