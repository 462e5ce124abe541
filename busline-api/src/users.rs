use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use busline_core::search::{Page, Paging};
use busline_core::user::{User, UserPatch};
use busline_shared::pii::Masked;

use crate::{error::AppError, middleware::Claims, state::AppState};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user).patch(update_user).delete(delete_user))
}

async fn require_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .users
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("User not found".to_string()))
}

/// GET /v1/admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<User>>, AppError> {
    let paging = Paging::new(query.limit, query.offset);
    Ok(Json(state.users.list_users(paging).await?))
}

/// GET /v1/admin/users/:id
async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<User>, AppError> {
    Ok(Json(require_user(&state, id).await?))
}

/// PATCH /v1/admin/users/:id
async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UserPatch>,
) -> Result<Json<User>, AppError> {
    let mut user = require_user(&state, id).await?;
    user.apply(req)?;
    state.users.update_user(&user).await?;
    tracing::info!("User {} updated by {}", id, Masked(claims.email.as_str()));
    Ok(Json(user))
}

/// DELETE /v1/admin/users/:id
async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_user(&state, id).await?;
    if claims.sub == id.to_string() {
        return Err(AppError::ConflictError("Cannot delete your own account".to_string()));
    }
    state.users.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
