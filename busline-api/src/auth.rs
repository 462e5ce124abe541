use axum::{extract::State, http::HeaderMap, routing::get, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use busline_core::user::User;

use crate::{
    error::AppError,
    middleware::{authenticate, Claims},
    state::AppState,
};

#[derive(Debug, Serialize)]
struct MeResponse {
    claims: Claims,
    is_admin: bool,
    /// Local profile, when the subject is a known user id.
    user: Option<User>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/me", get(me))
}

/// GET /v1/auth/me
async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<MeResponse>, AppError> {
    let claims = authenticate(&headers, &state.auth.secret)?;

    let user = match Uuid::parse_str(&claims.sub) {
        Ok(id) => state.users.get_user(id).await?,
        Err(_) => None,
    };
    if user.as_ref().is_some_and(|u| !u.is_active) {
        return Err(AppError::AuthorizationError("Account is disabled".to_string()));
    }

    Ok(Json(MeResponse { is_admin: claims.is_admin(), claims, user }))
}
