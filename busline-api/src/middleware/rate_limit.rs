use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::state::AppState;

const WINDOW_SECONDS: i64 = 60;

/// Fixed-window limit per client IP. Fails open when the limiter is down.
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let ip = client_ip(&req);
    let key = format!("ratelimit:{}", ip);
    let limit = state.business_rules.rate_limit_per_minute;

    match state.rate_limiter.check_rate_limit(&key, limit, WINDOW_SECONDS).await {
        Ok(false) => {
            tracing::warn!("Rate limit exceeded for {}", ip);
            (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": "Rate limit exceeded" }))).into_response()
        }
        Ok(true) => next.run(req).await,
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, allowing request: {}", e);
            next.run(req).await
        }
    }
}

fn client_ip(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
