//! Router assembly.

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Creates the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/live", get(handlers::liveness))
        .route("/health/ready", get(handlers::readiness))
        .route(
            "/v1/accounts/{tenant_appid}/articles",
            get(handlers::batch_articles),
        )
        .route(
            "/v1/accounts/{tenant_appid}/articles/{article_id}",
            get(handlers::get_article),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
