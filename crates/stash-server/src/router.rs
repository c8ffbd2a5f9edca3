use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderName, Method};
use axum::routing::{get, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::API_KEY_HEADER;
use crate::handler;
use crate::state::AppState;

/// Build the axum router with all Stash endpoints.
///
/// Upload size is enforced while hashing, so axum's default body limit is
/// turned off.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route("/upload", put(handler::upload))
        .route("/assets", get(handler::list))
        .route(
            "/assets/:name",
            get(handler::download).delete(handler::delete),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ORIGIN,
            CONTENT_TYPE,
            ACCEPT,
            CONTENT_DISPOSITION,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .expose_headers([CONTENT_LENGTH, CONTENT_DISPOSITION])
        .max_age(Duration::from_secs(12 * 60 * 60))
}
