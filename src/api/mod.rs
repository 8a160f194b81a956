//! Axum handlers and the router for the v1 HTTP API.

pub mod repos;
pub mod search;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let health_uri = state.config.health_check_uri.clone();
    Router::new()
        .route("/api/v1/search", get(search::search))
        .route("/api/v1/repos", get(repos::list_repos))
        .route("/api/v1/update", post(repos::update_repos))
        .route("/api/v1/excludes", get(repos::excluded_files))
        .route(&health_uri, get(repos::health))
        .with_state(state)
}
