//! # repo-hound
//!
//! Code search across many repositories at once. A query is fanned out to
//! every selected repository in two phases, and results are paginated by
//! repository in configured order.
//!
//! ## Request flow
//!
//! ```text
//!     GET /api/v1/search?q=..&rngRepos=offset:limit
//!                       │
//!                       ▼
//!            ┌─────────────────────┐
//!            │  SearchCoordinator  │
//!            └──────────┬──────────┘
//!                       │ ≤ max-concurrent-searchers at once
//!        ┌──────────────┼──────────────┐
//!        ▼              ▼              ▼
//!   ┌─────────┐    ┌─────────┐    ┌─────────┐
//!   │ probe A │    │ probe B │    │ probe C │   cheap: "any hit?"
//!   └────┬────┘    └────┬────┘    └────┬────┘
//!        └──────────────┼──────────────┘
//!                       ▼
//!            ┌─────────────────────┐
//!            │   OrderTracker      │  longest resolved prefix,
//!            │   cutoff at limit   │  in configured order
//!            └──────────┬──────────┘
//!                       ▼
//!            ┌─────────────────────┐
//!            │ fetch (found ones)  │  expensive: grep + context
//!            └──────────┬──────────┘
//!                       ▼
//!        Results + ReposPagination{NextOffset, OtherRepos, NextLimit}
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - JSON config file plus environment overrides
//! - [`models`] - Search options and the JSON response types
//! - [`error`] - Why a search produced no page
//! - [`search::coordinator`] - Probe/fetch scheduling, cutoff and cleanup
//! - [`search::limiter`] - Closeable permit pool bounding concurrent probes
//! - [`search::gate`] - One-shot signal deferring per-repo resource release
//! - [`search::order`] - Resolved-prefix bookkeeping for out-of-order results
//! - [`search::local`] - Searcher over a checkout on disk
//! - [`git`] - Clone, fast-forward pull and tree walking
//! - [`api`] - Axum handlers for search, repo listing, updates and excludes
//! - [`state`] - Shared application state and repo sync

pub mod api;
pub mod config;
pub mod error;
pub mod git;
pub mod models;
pub mod search;
pub mod state;
