use serde::{Deserialize, Serialize};

/// Per-request options handed unchanged to every repository's searcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Only search files whose path matches this regex (empty = all files)
    pub file_regexp: String,
    /// Skip files whose path matches this regex (empty = skip nothing)
    pub exclude_file_regexp: String,
    pub ignore_case: bool,
    /// Lines of context around each matching line
    pub lines_of_context: usize,
    /// Files-with-matches to skip within each repository
    pub offset: usize,
    /// Files-with-matches to return within each repository (0 = unlimited)
    pub limit: usize,
}

/// A single matching line with its surrounding context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct LineMatch {
    pub line: String,
    pub line_number: usize,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// All matching lines of one file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct FileMatch {
    pub filename: String,
    pub matches: Vec<LineMatch>,
}

/// Matches of one repository that made it into the page
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct RepoResult {
    pub repo: String,
    pub matches: Vec<FileMatch>,
    pub files_with_match: usize,
    pub revision: String,
}

/// Timing and volume counters for one request
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Stats {
    pub files_opened: usize,
    pub repos_scanned: usize,
    /// Milliseconds
    pub duration: u64,
}

/// Cursor for the next page of repositories
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ReposPagination {
    pub next_offset: usize,
    /// Repositories in the search space that this page did not resolve
    pub other_repos: usize,
    pub next_limit: usize,
}

/// Search response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchResponse {
    pub results: Vec<RepoResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    pub repos_pagination: ReposPagination,
}

/// Error body. Search failures are delivered with a 200 status because
/// existing clients only inspect the body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorResponse {
    pub error: String,
}
