//! HTTP routes.

use axum::{
    routing::{any, get},
    Router,
};

use crate::state::AppState;

pub mod health;
pub mod proxy;

/// Assemble the router over shared state.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/graphql", any(proxy::proxy_handler))
        .with_state(state)
}
