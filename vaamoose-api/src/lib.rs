use axum::{
    http::Method,
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod bookings;
pub mod broadcast;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod partners;
pub mod payments;
pub mod reviews;
pub mod sessions;
pub mod slots;
pub mod state;
pub mod worker;

pub use state::{AppBuilder, AppState, AuthConfig, Stores};

use middleware::{rate_limit_middleware, require_auth};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let authenticated = Router::new()
        .merge(sessions::routes())
        .merge(payments::routes())
        .merge(bookings::routes())
        .merge(partners::routes())
        .merge(reviews::routes())
        .merge(slots::partner_routes())
        .merge(admin::routes())
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let v1 = Router::new()
        .merge(slots::routes())
        .merge(reviews::public_routes())
        .merge(payments::webhook_routes())
        .merge(authenticated);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/v1", v1)
        .route_layer(from_fn_with_state(state.clone(), metrics::track_requests))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
