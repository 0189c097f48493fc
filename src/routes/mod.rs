use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, set_security_headers};
use crate::handlers::{create_event, health_check, list_events, root};

pub fn create_routes(pool: PgPool) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/events", get(list_events).post(create_event))
        .layer(from_fn(set_security_headers))
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(pool)
}
