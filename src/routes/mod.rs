//! API Routes
//!
//! - `/api/generateLesson`, `/api/generateQuizzes` - prompt relay (JSON or SSE)
//! - `/api/models`, `/api/pullModel` - backend model management
//! - `/health` - server and backend status

pub mod generate;
pub mod health;
pub mod models;

use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::{apply_cors, panic_response};
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let origins = state.config.server.cors_allowed_origins.clone();

    let router = Router::new()
        .merge(generate::router(state.clone()))
        .merge(models::router(state.clone()))
        .merge(health::router(state));

    apply_cors(router, &origins)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}
