//! Multi-repository search: the [`SearchCoordinator`] and the primitives it
//! schedules with, plus the on-disk [`LocalSearcher`].

pub mod coordinator;
pub mod gate;
pub mod limiter;
pub mod local;
pub mod order;
pub mod searcher;

pub use coordinator::{PageResult, SearchCoordinator, SearchRequest};
pub use local::{LocalProbe, LocalSearcher, RepoStatus};
pub use searcher::{FetchOutcome, ProbeOutcome, Searcher};
