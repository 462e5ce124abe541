use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use busline_booking::fleet::{BusInput, BusPatch};
use busline_core::fleet::Bus;
use busline_core::search::{BusFilter, Page, Paging};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ListBusesQuery {
    pub operator: Option<String>,
    pub bus_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/buses", get(list_buses).post(create_bus))
        .route("/buses/{id}", get(get_bus).patch(update_bus).delete(delete_bus))
}

/// GET /v1/admin/buses
async fn list_buses(
    State(state): State<AppState>,
    Query(query): Query<ListBusesQuery>,
) -> Result<Json<Page<Bus>>, AppError> {
    let filter = BusFilter {
        operator: query.operator.filter(|s| !s.is_empty()),
        bus_type: query.bus_type.filter(|s| !s.is_empty()),
        paging: Paging::new(query.limit, query.offset),
    };
    Ok(Json(state.fleet.list_buses(&filter).await?))
}

/// GET /v1/admin/buses/:id
async fn get_bus(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Bus>, AppError> {
    Ok(Json(state.fleet.get_bus(id).await?))
}

/// POST /v1/admin/buses
async fn create_bus(
    State(state): State<AppState>,
    Json(req): Json<BusInput>,
) -> Result<(StatusCode, Json<Bus>), AppError> {
    let bus = state.fleet.create_bus(req).await?;
    Ok((StatusCode::CREATED, Json(bus)))
}

/// PATCH /v1/admin/buses/:id
async fn update_bus(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<BusPatch>,
) -> Result<Json<Bus>, AppError> {
    Ok(Json(state.fleet.update_bus(id, req).await?))
}

/// DELETE /v1/admin/buses/:id
async fn delete_bus(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    state.fleet.delete_bus(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
