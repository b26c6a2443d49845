//! Router assembly.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/analysis", get(handlers::analyze))
        .route("/market-review", get(handlers::market_review))
        .route("/tasks", get(handlers::tasks))
        .route("/task", get(handlers::task))
        .route("/cancel", post(handlers::cancel))
        .route("/env", get(handlers::env_show))
        .route("/env/update", post(handlers::env_update))
        .route("/common/update", post(handlers::common_update))
        .route("/stocks", get(handlers::stocks_show))
        .route("/stocks/update", post(handlers::stocks_update))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
