use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::{ErrorResponse, SearchOptions, SearchResponse};
use crate::search::SearchRequest;
use crate::state::AppState;

const DEFAULT_LINES_OF_CONTEXT: usize = 2;
const MAX_LINES_OF_CONTEXT: usize = 20;

/// Raw query string of `/api/v1/search`. Everything is parsed leniently:
/// bad values fall back to defaults instead of failing the request.
#[derive(Debug, Default)]
pub struct SearchParams {
    pub q: String,
    pub repos: String,
    pub rng_repos: String,
    pub rng: String,
    pub files: String,
    pub exclude_files: String,
    pub i: String,
    pub ctx: String,
    pub stats: String,
}

impl SearchParams {
    /// Build from decoded query pairs. A repeated key keeps its first value
    /// and unknown keys are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs.into_iter().rev() {
            let slot = match key.as_str() {
                "q" => &mut params.q,
                "repos" => &mut params.repos,
                "rngRepos" => &mut params.rng_repos,
                "rng" => &mut params.rng,
                "files" => &mut params.files,
                "excludeFiles" => &mut params.exclude_files,
                "i" => &mut params.i,
                "ctx" => &mut params.ctx,
                "stats" => &mut params.stats,
                _ => continue,
            };
            *slot = value;
        }
        params
    }
}

/// GET /api/v1/search - one page of repositories matching `q`.
///
/// Failures are answered with 200 and an `Error` body; existing clients
/// only look at the body.
pub async fn search(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    match run_search(&state, SearchParams::from_pairs(pairs)).await {
        Ok(resp) => Json(resp).into_response(),
        Err(error) => Json(ErrorResponse { error }).into_response(),
    }
}

async fn run_search(state: &AppState, params: SearchParams) -> Result<SearchResponse, String> {
    let include_stats = parse_as_bool(&params.stats);
    let (offset_repos, mut limit_repos) = parse_range_value(&params.rng_repos);
    if limit_repos == 0 {
        limit_repos = state.config.max_repos_in_first_result;
    }
    let (offset, limit) = parse_range_value(&params.rng);

    let repos = state
        .repos
        .select(&params.repos)
        .map_err(|e| format!("Invalid repos pattern: {e}"))?;

    let req = SearchRequest {
        query: params.q,
        options: SearchOptions {
            file_regexp: params.files,
            exclude_file_regexp: params.exclude_files,
            ignore_case: parse_as_bool(&params.i),
            lines_of_context: parse_as_uint_value(
                &params.ctx,
                0,
                MAX_LINES_OF_CONTEXT,
                DEFAULT_LINES_OF_CONTEXT,
            ),
            offset,
            limit,
        },
        offset_repos,
        limit_repos,
    };

    let page = state
        .coordinator
        .run(&req, &repos)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(
        query = %req.query,
        repos = repos.len(),
        fetched = page.results.len(),
        duration_ms = page.stats.duration,
        "Search complete"
    );

    Ok(SearchResponse {
        results: page.results,
        stats: include_stats.then_some(page.stats),
        repos_pagination: page.pagination,
    })
}

/// Flag values: `true`, `1` and `fosho`, case-insensitive.
pub fn parse_as_bool(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "fosho")
}

/// Parse `offset:limit`. Missing colon or unparsable parts give zeros.
pub fn parse_range_value(v: &str) -> (usize, usize) {
    let Some((begin, end)) = v.split_once(':') else {
        return (0, 0);
    };
    let parse = |s: &str| s.trim().parse::<usize>().unwrap_or(0);
    (parse(begin), parse(end))
}

/// Parse an unsigned value, clamped to `[min, max]`; `def` when unparsable.
pub fn parse_as_uint_value(v: &str, min: usize, max: usize, def: usize) -> usize {
    match v.trim().parse::<usize>() {
        Ok(n) => n.clamp(min, max),
        Err(_) => def,
    }
}
