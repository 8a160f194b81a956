use async_trait::async_trait;

use crate::models::{FileMatch, SearchOptions};

/// Result of the cheap existence check for one repository.
#[derive(Debug)]
pub struct ProbeOutcome<P> {
    pub found: bool,
    /// Opaque to the coordinator; handed back unmodified to [`Searcher::fetch`].
    pub payload: P,
}

/// Result of the content retrieval for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub matches: Vec<FileMatch>,
    /// Files with matches before the per-repository offset/limit was applied
    pub files_with_match: usize,
    pub files_opened: usize,
    pub revision: String,
}

/// Per-repository two-phase search engine.
///
/// The payload returned by `probe` must stay valid until `release_probe` is
/// called. Callers treat the span between the two as a borrow of the
/// repository's resources, and call `release_probe` exactly once per probe,
/// whether or not `fetch` ran.
#[async_trait]
pub trait Searcher: Send + Sync + 'static {
    type Payload: Send + Sync + 'static;

    fn repo_name(&self) -> &str;

    async fn probe(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> anyhow::Result<ProbeOutcome<Self::Payload>>;

    async fn fetch(
        &self,
        payload: &Self::Payload,
        opts: &SearchOptions,
    ) -> anyhow::Result<FetchOutcome>;

    async fn release_probe(&self);
}
