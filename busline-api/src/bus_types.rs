use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Extension, Json, Router,
};
use uuid::Uuid;

use busline_booking::fleet::{BusTypeInput, BusTypePatch};
use busline_core::fleet::BusType;
use busline_core::search::Page;

use crate::{error::AppError, middleware::Claims, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/bus-types", get(list_bus_types))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/bus-types", get(list_bus_types).post(create_bus_type))
        .route("/bus-types/{id}", patch(update_bus_type).delete(delete_bus_type))
}

/// GET /v1/bus-types
async fn list_bus_types(State(state): State<AppState>) -> Result<Json<Page<BusType>>, AppError> {
    let types = state.fleet.list_bus_types().await?;
    let total = types.len() as i64;
    Ok(Json(Page { data: types, total }))
}

/// POST /v1/admin/bus-types
async fn create_bus_type(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BusTypeInput>,
) -> Result<(StatusCode, Json<BusType>), AppError> {
    let bus_type = state.fleet.create_bus_type(req, &claims.email).await?;
    Ok((StatusCode::CREATED, Json(bus_type)))
}

/// PATCH /v1/admin/bus-types/:id
async fn update_bus_type(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<BusTypePatch>,
) -> Result<Json<BusType>, AppError> {
    Ok(Json(state.fleet.update_bus_type(id, req, &claims.email).await?))
}

/// DELETE /v1/admin/bus-types/:id
async fn delete_bus_type(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    state.fleet.delete_bus_type(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
