use axum::{http::Method, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod bookings;
pub mod bus_types;
pub mod buses;
pub mod error;
pub mod holds;
pub mod middleware;
pub mod paystack;
pub mod state;
pub mod trips;
pub mod users;

pub use state::{AppState, AuthConfig, Backends};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let admin = Router::new()
        .merge(bus_types::admin_routes())
        .merge(buses::admin_routes())
        .merge(trips::admin_routes())
        .merge(bookings::admin_routes())
        .merge(users::admin_routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(auth::routes())
        .merge(bus_types::routes())
        .merge(trips::routes())
        .merge(holds::routes())
        .merge(bookings::routes())
        .merge(paystack::routes())
        .nest("/v1/admin", admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
