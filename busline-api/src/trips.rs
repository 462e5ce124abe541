use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, patch},
    Extension, Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use busline_booking::fleet::{TripInput, TripPatch};
use busline_booking::SeatMap;
use busline_core::schedule::{self, TripDetails};
use busline_core::search::{Page, Paging, TripFilter, TripSearchResult};

use crate::{error::AppError, middleware::Claims, state::AppState};

#[derive(Debug, Deserialize)]
pub struct TripQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<String>,
    pub bus_id: Option<Uuid>,
    pub passengers: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TripQuery {
    fn filter(&self) -> Result<TripFilter, AppError> {
        let date = match self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(
                schedule::parse_date(raw).ok_or_else(|| AppError::ValidationError(format!("Invalid date: {}", raw)))?,
            ),
            None => None,
        };
        Ok(TripFilter {
            from: self.from.clone().filter(|s| !s.is_empty()),
            to: self.to.clone().filter(|s| !s.is_empty()),
            date,
            bus_id: self.bus_id,
            available_only: false,
            paging: Paging::new(self.limit, self.offset),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/search", get(search_trips))
        .route("/v1/trips/{id}", get(get_trip))
        .route("/v1/trips/{id}/seats", get(seat_map))
        .route("/v1/trips/{id}/stream", get(stream_seats))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/trips", get(list_trips).post(create_trip))
        .route("/trips/{id}", patch(update_trip).delete(delete_trip))
        .route("/trips/{id}/availability", patch(set_availability))
}

// ============================================================================
// Public
// ============================================================================

/// GET /v1/trips/search
async fn search_trips(
    State(state): State<AppState>,
    Query(query): Query<TripQuery>,
) -> Result<Json<Page<TripSearchResult>>, AppError> {
    let filter = query.filter()?;
    let passengers = query.passengers.unwrap_or(1);
    Ok(Json(state.fleet.search_trips(&filter, passengers).await?))
}

/// GET /v1/trips/:id
async fn get_trip(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<TripDetails>, AppError> {
    Ok(Json(state.fleet.get_trip(id).await?))
}

/// GET /v1/trips/:id/seats
async fn seat_map(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<SeatMap>, AppError> {
    Ok(Json(state.holds.seat_map(id).await?))
}

/// GET /v1/trips/:id/stream
///
/// Server-sent seat events (`seat_held`, `seat_released`, `seats_booked`)
/// for one trip.
async fn stream_seats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    state.fleet.get_trip(id).await?;

    let stream = BroadcastStream::new(state.holds.subscribe()).filter_map(move |message| async move {
        match message {
            Ok(event) if event.trip_id() == id => Event::default().event(event.name()).json_data(&event).ok().map(Ok),
            // Lagged receivers just skip ahead.
            _ => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ============================================================================
// Admin
// ============================================================================

/// GET /v1/admin/trips
async fn list_trips(
    State(state): State<AppState>,
    Query(query): Query<TripQuery>,
) -> Result<Json<Page<TripDetails>>, AppError> {
    Ok(Json(state.fleet.list_trips(&query.filter()?).await?))
}

/// POST /v1/admin/trips
async fn create_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<TripInput>,
) -> Result<(StatusCode, Json<TripDetails>), AppError> {
    let trip = state.fleet.create_trip(req, &claims.email).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

/// PATCH /v1/admin/trips/:id
async fn update_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<TripPatch>,
) -> Result<Json<TripDetails>, AppError> {
    Ok(Json(state.fleet.update_trip(id, req, &claims.email).await?))
}

/// PATCH /v1/admin/trips/:id/availability
async fn set_availability(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<TripDetails>, AppError> {
    Ok(Json(state.fleet.set_availability(id, req.is_available, &claims.email).await?))
}

/// DELETE /v1/admin/trips/:id
async fn delete_trip(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    state.fleet.delete_trip(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
