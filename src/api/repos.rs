use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::RepoConfig;
use crate::git::ExcludedFile;
use crate::models::ErrorResponse;
use crate::search::{LocalSearcher, RepoStatus};
use crate::state::AppState;

/// One configured repo as reported by `/api/v1/repos`
#[derive(Debug, Clone, Serialize)]
pub struct RepoInfo {
    #[serde(flatten)]
    pub config: RepoConfig,
    pub status: RepoStatus,
}

/// GET /api/v1/repos - searchable repos keyed by name, in configured order
pub async fn list_repos(State(state): State<AppState>) -> Json<serde_json::Map<String, serde_json::Value>> {
    let mut repos = serde_json::Map::new();
    for searcher in state.repos.all() {
        let info = RepoInfo {
            config: searcher.repo().clone(),
            status: searcher.status(),
        };
        if let Ok(value) = serde_json::to_value(info) {
            repos.insert(searcher.repo().name.clone(), value);
        }
    }
    Json(repos)
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: String) -> ApiError {
    (status, Json(ErrorResponse { error }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateParams {
    #[serde(default)]
    pub repos: String,
}

/// POST /api/v1/update - push-triggered sync of the named repos.
///
/// `repos` is empty/`*` for every repo or a comma list of names. Unknown
/// names and repos without push updates stop processing of the request.
pub async fn update_repos(
    State(state): State<AppState>,
    Form(params): Form<UpdateParams>,
) -> Result<Json<&'static str>, ApiError> {
    let targets = resolve_update_targets(&state, &params.repos)?;
    for searcher in targets {
        state.spawn_sync(searcher);
    }
    Ok(Json("ok"))
}

fn resolve_update_targets(
    state: &AppState,
    selector: &str,
) -> Result<Vec<Arc<LocalSearcher>>, ApiError> {
    let selector = selector.trim();
    let searchers: Vec<Arc<LocalSearcher>> = if selector.is_empty() || selector == "*" {
        state.repos.all().to_vec()
    } else {
        selector
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                state.repos.get(name).cloned().ok_or_else(|| {
                    api_error(StatusCode::NOT_FOUND, format!("No such repository: {name}"))
                })
            })
            .collect::<Result<_, _>>()?
    };

    if let Some(denied) = searchers.iter().find(|s| !s.repo().push_updates_enabled()) {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            format!(
                "Push updates are not enabled for repository {}",
                denied.repo().name
            ),
        ));
    }
    Ok(searchers)
}

#[derive(Debug, Deserialize)]
pub struct ExcludesParams {
    #[serde(default)]
    pub repo: String,
}

/// GET /api/v1/excludes - files the searcher skips in one repo
pub async fn excluded_files(
    State(state): State<AppState>,
    Query(params): Query<ExcludesParams>,
) -> Result<Json<Vec<ExcludedFile>>, ApiError> {
    let searcher = state.repos.get(&params.repo).cloned().ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            format!("No such repository: {}", params.repo),
        )
    })?;
    searcher
        .excluded_files()
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
}

/// Health check
pub async fn health() -> &'static str {
    "ok"
}
