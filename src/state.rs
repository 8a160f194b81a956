use anyhow::Result;
use futures_util::future::join_all;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::search::{LocalSearcher, SearchCoordinator};

/// Searchers in configured order. The order is what pagination walks.
#[derive(Debug, Default)]
pub struct RepoSet {
    searchers: Vec<Arc<LocalSearcher>>,
}

impl RepoSet {
    pub fn new(searchers: Vec<Arc<LocalSearcher>>) -> Self {
        Self { searchers }
    }

    pub fn all(&self) -> &[Arc<LocalSearcher>] {
        &self.searchers
    }

    pub fn get(&self, name: &str) -> Option<&Arc<LocalSearcher>> {
        self.searchers.iter().find(|s| s.repo().name == name)
    }

    pub fn len(&self) -> usize {
        self.searchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.searchers.is_empty()
    }

    /// Repos selected by a `repos` parameter, in configured order.
    ///
    /// Empty or `*` selects everything, a comma list selects exact names and
    /// anything else is a regex matched against repo names.
    pub fn select(&self, selector: &str) -> Result<Vec<Arc<LocalSearcher>>, regex::Error> {
        let selector = selector.trim();
        let pattern = match selector {
            "" | "*" => ".*".to_string(),
            s if s.contains(',') => s
                .split(',')
                .map(|name| format!("^{}$", regex::escape(name.trim())))
                .collect::<Vec<_>>()
                .join("|"),
            s => s.to_string(),
        };
        let re = Regex::new(&pattern)?;
        Ok(self
            .searchers
            .iter()
            .filter(|s| re.is_match(&s.repo().name))
            .cloned()
            .collect())
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Arc<RepoSet>,
    pub coordinator: SearchCoordinator,
    pub sync_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config, repos: RepoSet) -> Self {
        let coordinator = SearchCoordinator::new(
            config.max_concurrent_searchers,
            config.max_repos_in_next_result,
        );
        let sync_semaphore = Arc::new(tokio::sync::Semaphore::new(
            config.max_concurrent_indexers.max(1),
        ));
        Self {
            config: Arc::new(config),
            repos: Arc::new(repos),
            coordinator,
            sync_semaphore,
        }
    }

    /// Build a searcher per configured repo and bring every checkout up to
    /// date. Repos whose first sync fails are left out of the search set.
    pub async fn initialize(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.db_path)?;

        let candidates: Vec<Arc<LocalSearcher>> = config
            .repos
            .iter()
            .map(|repo| Arc::new(LocalSearcher::new(repo.clone(), config.repo_dir(repo))))
            .collect();

        let state = Self::new(config, RepoSet::default());
        let synced = join_all(candidates.iter().map(|s| state.sync_repo(s))).await;

        let mut ready = Vec::with_capacity(candidates.len());
        for (searcher, result) in candidates.into_iter().zip(synced) {
            match result {
                Ok(()) => ready.push(searcher),
                Err(e) => tracing::error!(
                    "Dropping {} from the search set: {e:#}",
                    searcher.repo().name
                ),
            }
        }
        if ready.len() < state.config.repos.len() {
            tracing::warn!("Some repos failed to index, see output above");
        } else {
            tracing::info!("All {} repos ready", ready.len());
        }

        Ok(Self {
            repos: Arc::new(RepoSet::new(ready)),
            ..state
        })
    }

    /// Sync one checkout, bounded by `max-concurrent-indexers`.
    pub async fn sync_repo(&self, searcher: &LocalSearcher) -> Result<()> {
        let _permit = self
            .sync_semaphore
            .acquire()
            .await
            .map_err(|_| anyhow::anyhow!("Sync semaphore closed"))?;
        let sha = searcher.sync().await?;
        tracing::info!("Synced {} at {}", searcher.repo().name, short_sha(&sha));
        Ok(())
    }

    /// Run a sync in the background, logging failures.
    pub fn spawn_sync(&self, searcher: Arc<LocalSearcher>) {
        let state = self.clone();
        tokio::spawn(async move {
            if let Err(e) = state.sync_repo(&searcher).await {
                tracing::error!("Failed to sync {}: {e:#}", searcher.repo().name);
            }
        });
    }

    /// Start periodic syncs for repos with a URL and polling enabled.
    pub fn spawn_pollers(&self) {
        for searcher in self.repos.all() {
            let repo = searcher.repo();
            if repo.url.is_none() || !repo.poll_updates_enabled() {
                continue;
            }
            let state = self.clone();
            let searcher = searcher.clone();
            let period = Duration::from_millis(repo.ms_between_poll);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(period).await;
                    if let Err(e) = state.sync_repo(&searcher).await {
                        tracing::warn!("Poll of {} failed: {e:#}", searcher.repo().name);
                    }
                }
            });
        }
    }
}

fn short_sha(sha: &str) -> &str {
    if sha.is_empty() {
        "(no revision)"
    } else {
        &sha[..sha.len().min(12)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoConfig;
    use std::path::PathBuf;

    fn repo_set(names: &[&str]) -> RepoSet {
        RepoSet::new(
            names
                .iter()
                .map(|n| Arc::new(LocalSearcher::new(RepoConfig::new(n), PathBuf::from(n))))
                .collect(),
        )
    }

    fn names(selected: &[Arc<LocalSearcher>]) -> Vec<&str> {
        selected.iter().map(|s| s.repo().name.as_str()).collect()
    }

    #[test]
    fn test_select_all_keeps_config_order() {
        let set = repo_set(&["zeta", "alpha", "mu"]);
        assert_eq!(names(&set.select("").unwrap()), vec!["zeta", "alpha", "mu"]);
        assert_eq!(names(&set.select("*").unwrap()), vec!["zeta", "alpha", "mu"]);
    }

    #[test]
    fn test_select_comma_list_is_exact() {
        let set = repo_set(&["api", "api-docs", "web"]);
        assert_eq!(names(&set.select("web,api").unwrap()), vec!["api", "web"]);
    }

    #[test]
    fn test_select_regex() {
        let set = repo_set(&["api", "api-docs", "web"]);
        assert_eq!(names(&set.select("^api").unwrap()), vec!["api", "api-docs"]);
        assert!(set.select("(").is_err());
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(short_sha("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_sha(""), "(no revision)");
    }
}
