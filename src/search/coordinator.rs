//! Two-phase, order-preserving fan-out of one query across many repositories.
//!
//! ```text
//!   launcher ──acquire permit──► probe worker (one per repo)
//!                                   │ publish ProbeOutcome + gate
//!                                   │ drop permit
//!                                   │ wait on gate ──► release_probe
//!                                   ▼
//!   aggregator (sole owner of OrderTracker)
//!                                   │ settled: cutoff = first_undone
//!             ┌─────────────────────┴───────────────────┐
//!             ▼                                         ▼
//!   found in [0, cutoff): fetch worker           past cutoff: fire gate now
//!             │ outcome consumed → fire gate
//!             ▼
//!   page in configured order; reaper drains late probes
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::error::SearchError;
use crate::models::{RepoResult, ReposPagination, SearchOptions, Stats};
use crate::search::gate::{cleanup_gate, CleanupGate};
use crate::search::limiter::{ConcurrencyLimiter, Permit};
use crate::search::order::OrderTracker;
use crate::search::searcher::{FetchOutcome, ProbeOutcome, Searcher};

/// One page request over an ordered set of repositories.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub options: SearchOptions,
    /// Repositories of the configured order to skip
    pub offset_repos: usize,
    /// Matching repositories to fetch for this page
    pub limit_repos: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResult {
    /// Fetched repositories, in configured order
    pub results: Vec<RepoResult>,
    pub stats: Stats,
    pub pagination: ReposPagination,
}

struct ProbeMessage<P> {
    index: usize,
    outcome: anyhow::Result<ProbeOutcome<P>>,
    gate: CleanupGate,
}

struct FetchMessage {
    index: usize,
    outcome: anyhow::Result<FetchOutcome>,
    gate: CleanupGate,
}

/// A matching repository whose payload is still owned by the coordinator.
struct Held<P> {
    payload: P,
    gate: CleanupGate,
}

impl<P> Held<P> {
    fn release(self) {
        let Held { payload, mut gate } = self;
        drop(payload);
        gate.fire();
    }
}

/// Schedules probes and fetches for search requests.
///
/// Cloning is cheap; clones share the task tracker so [`shutdown`] waits for
/// work started through any of them.
///
/// [`shutdown`]: SearchCoordinator::shutdown
#[derive(Debug, Clone)]
pub struct SearchCoordinator {
    max_concurrent: usize,
    next_limit: usize,
    tasks: TaskTracker,
}

impl SearchCoordinator {
    pub fn new(max_concurrent: usize, next_limit: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            next_limit,
            tasks: TaskTracker::new(),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Workers, fetches and reapers still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every worker has released its repository.
    pub async fn shutdown(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Search `repos` (the configured order) for one page of results.
    ///
    /// Any probe or fetch error fails the whole request; no partial page is
    /// returned. Every probed repository gets exactly one `release_probe`,
    /// including the ones still running when the page is decided.
    pub async fn run<S: Searcher>(
        &self,
        req: &SearchRequest,
        repos: &[Arc<S>],
    ) -> Result<PageResult, SearchError> {
        let started_at = Instant::now();
        let offset = req.offset_repos.min(repos.len());
        let repos: Arc<[Arc<S>]> = repos[offset..].to_vec().into();
        let n = repos.len();

        if n == 0 || req.limit_repos == 0 {
            return Ok(PageResult {
                results: Vec::new(),
                stats: Stats {
                    duration: started_at.elapsed().as_millis() as u64,
                    ..Stats::default()
                },
                pagination: ReposPagination {
                    next_offset: offset,
                    other_repos: n,
                    next_limit: self.next_limit,
                },
            });
        }

        let opts = Arc::new(req.options.clone());
        let limiter = ConcurrencyLimiter::new(n.min(self.max_concurrent));
        let (tx, mut rx) = mpsc::channel(n);
        let launcher = self.tasks.spawn(launch_probes(
            self.tasks.clone(),
            limiter.clone(),
            repos.clone(),
            Arc::from(req.query.as_str()),
            opts.clone(),
            tx,
        ));

        // Aggregation: this loop is the only writer of `order` and `held`.
        let mut order = OrderTracker::new(n, req.limit_repos);
        let mut held: Vec<Option<Held<S::Payload>>> = (0..n).map(|_| None).collect();
        let mut failure = None;

        while !order.is_settled() {
            let Some(ProbeMessage {
                index,
                outcome,
                mut gate,
            }) = rx.recv().await
            else {
                failure = Some(SearchError::WorkerLost {
                    repo: repos[order.first_undone()].repo_name().to_string(),
                });
                break;
            };

            match outcome {
                Err(err) => {
                    gate.fire();
                    failure = Some(SearchError::probe(repos[index].repo_name(), &err));
                    break;
                }
                Ok(ProbeOutcome { found, payload }) => {
                    if found {
                        held[index] = Some(Held { payload, gate });
                    } else {
                        drop(payload);
                        gate.fire();
                    }
                    order.record(index, found);
                }
            }
        }
        limiter.close();
        // Closing stops the launcher at its next acquire. Every probe it
        // started is drained, here or by the reaper, so all of them count.
        let repos_scanned = launcher.await.unwrap_or(order.first_undone());

        if let Some(err) = failure {
            tracing::warn!("Search failed: {err}");
            held.into_iter().flatten().for_each(Held::release);
            reap_probes(rx).await;
            return Err(err);
        }

        let cutoff = order.first_undone();
        tracing::debug!(
            cutoff,
            found = order.found(),
            repos = n,
            repos_scanned,
            "Page cutoff decided"
        );

        // Already-known excess repositories are released without waiting
        // for the stragglers, which the reaper releases as they report.
        for slot in held[cutoff..].iter_mut() {
            if let Some(h) = slot.take() {
                h.release();
            }
        }
        let reaper = self.tasks.spawn(reap_probes(rx));

        let (ftx, mut frx) = mpsc::channel(req.limit_repos.min(cutoff).max(1));
        let mut dispatched = Vec::new();
        for (index, slot) in held[..cutoff].iter_mut().enumerate() {
            if dispatched.len() == req.limit_repos {
                break;
            }
            let Some(Held { payload, gate }) = slot.take() else {
                continue;
            };
            self.tasks.spawn(fetch_worker(
                index,
                repos[index].clone(),
                payload,
                gate,
                opts.clone(),
                ftx.clone(),
            ));
            dispatched.push(index);
        }
        drop(ftx);

        let mut fetched: Vec<Option<FetchOutcome>> = (0..n).map(|_| None).collect();
        let mut failure = None;
        let mut received = 0;
        while let Some(FetchMessage {
            index,
            outcome,
            mut gate,
        }) = frx.recv().await
        {
            received += 1;
            gate.fire();
            match outcome {
                Ok(outcome) => fetched[index] = Some(outcome),
                Err(err) => {
                    failure.get_or_insert_with(|| SearchError::fetch(repos[index].repo_name(), &err));
                }
            }
        }
        if failure.is_none() && received < dispatched.len() {
            let lost = dispatched
                .iter()
                .copied()
                .find(|&i| fetched[i].is_none())
                .unwrap_or(0);
            failure = Some(SearchError::WorkerLost {
                repo: repos[lost].repo_name().to_string(),
            });
        }

        if let Some(err) = failure {
            tracing::warn!("Search failed: {err}");
            let _ = reaper.await;
            return Err(err);
        }

        let mut files_opened = 0;
        let results = fetched
            .into_iter()
            .enumerate()
            .filter_map(|(index, outcome)| {
                let outcome = outcome?;
                files_opened += outcome.files_opened;
                Some(RepoResult {
                    repo: repos[index].repo_name().to_string(),
                    matches: outcome.matches,
                    files_with_match: outcome.files_with_match,
                    revision: outcome.revision,
                })
            })
            .collect();

        Ok(PageResult {
            results,
            stats: Stats {
                files_opened,
                repos_scanned,
                duration: started_at.elapsed().as_millis() as u64,
            },
            pagination: ReposPagination {
                next_offset: offset + cutoff,
                other_repos: n - cutoff,
                next_limit: self.next_limit,
            },
        })
    }
}

/// Start a probe worker per repository as permits free up. Returns how many
/// were started.
async fn launch_probes<S: Searcher>(
    tasks: TaskTracker,
    limiter: ConcurrencyLimiter,
    repos: Arc<[Arc<S>]>,
    query: Arc<str>,
    opts: Arc<SearchOptions>,
    tx: mpsc::Sender<ProbeMessage<S::Payload>>,
) -> usize {
    for (index, searcher) in repos.iter().enumerate() {
        let Some(permit) = limiter.acquire().await else {
            tracing::debug!(launched = index, total = repos.len(), "Probe launcher stopped");
            return index;
        };
        tasks.spawn(probe_worker(
            index,
            searcher.clone(),
            query.clone(),
            opts.clone(),
            tx.clone(),
            permit,
        ));
    }
    repos.len()
}

async fn probe_worker<S: Searcher>(
    index: usize,
    searcher: Arc<S>,
    query: Arc<str>,
    opts: Arc<SearchOptions>,
    tx: mpsc::Sender<ProbeMessage<S::Payload>>,
    permit: Permit,
) {
    let outcome = AssertUnwindSafe(searcher.probe(&query, &opts))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(anyhow::anyhow!("probe panicked: {}", panic_message(&*panic))));

    let (gate, waiter) = cleanup_gate();
    // The channel holds one slot per repository, so this never waits. If the
    // request is gone the gate is dropped with the message and `wait` returns.
    let _ = tx.send(ProbeMessage { index, outcome, gate }).await;
    drop(tx);
    permit.release();

    waiter.wait().await;
    searcher.release_probe().await;
}

async fn fetch_worker<S: Searcher>(
    index: usize,
    searcher: Arc<S>,
    payload: S::Payload,
    gate: CleanupGate,
    opts: Arc<SearchOptions>,
    tx: mpsc::Sender<FetchMessage>,
) {
    let outcome = AssertUnwindSafe(searcher.fetch(&payload, &opts))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(anyhow::anyhow!("fetch panicked: {}", panic_message(&*panic))));
    drop(payload);
    let _ = tx.send(FetchMessage { index, outcome, gate }).await;
}

/// Fire the gate of every probe still to report. Returns how many there were.
async fn reap_probes<P>(mut rx: mpsc::Receiver<ProbeMessage<P>>) -> usize {
    let mut reaped = 0;
    while let Some(ProbeMessage {
        index,
        outcome,
        mut gate,
    }) = rx.recv().await
    {
        if let Err(err) = outcome {
            tracing::debug!(index, "Discarding late probe error: {err:#}");
        }
        gate.fire();
        reaped += 1;
    }
    if reaped > 0 {
        tracing::debug!(reaped, "Released probes that reported after the page was decided");
    }
    reaped
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
