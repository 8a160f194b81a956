use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;

use crate::config::RepoConfig;
use crate::git::{self, ExcludedFile, RepoFile};
use crate::models::{FileMatch, LineMatch, SearchOptions};
use crate::search::searcher::{FetchOutcome, ProbeOutcome, Searcher};

const SYNC_RETRY_INTERVAL: Duration = Duration::from_millis(25);
const SYNC_MAX_WAIT: Duration = Duration::from_secs(30);

/// Sync state of a checkout
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct RepoStatus {
    pub revision: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// What a probe found: the candidate files in path order and the first one
/// with a hit.
#[derive(Debug)]
pub struct LocalProbe {
    regex: Regex,
    files: Vec<RepoFile>,
    first_hit: usize,
}

/// Searches a repository checkout directly on disk.
///
/// Each probe takes a read lock on the working tree that is held until the
/// matching `release_probe`; `sync` takes the write lock, so a pull never
/// changes files that an unreleased probe payload still points at.
#[derive(Debug)]
pub struct LocalSearcher {
    repo: RepoConfig,
    dir: PathBuf,
    tree: Arc<tokio::sync::RwLock<()>>,
    borrowed: Mutex<Vec<OwnedRwLockReadGuard<()>>>,
    status: RwLock<RepoStatus>,
}

impl LocalSearcher {
    pub fn new(repo: RepoConfig, dir: PathBuf) -> Self {
        Self {
            repo,
            dir,
            tree: Arc::new(tokio::sync::RwLock::new(())),
            borrowed: Mutex::new(Vec::new()),
            status: RwLock::new(RepoStatus::default()),
        }
    }

    pub fn repo(&self) -> &RepoConfig {
        &self.repo
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn status(&self) -> RepoStatus {
        self.status.read().clone()
    }

    /// Probes whose resources have not been released yet
    pub fn outstanding_probes(&self) -> usize {
        self.borrowed.lock().len()
    }

    /// Clone or fast-forward the checkout, then record its revision.
    pub async fn sync(&self) -> Result<String> {
        let _tree = self.lock_tree_for_sync().await?;
        let dir = self.dir.clone();
        let url = self.repo.url.clone();

        let result = tokio::task::spawn_blocking(move || match url {
            Some(url) if !dir.exists() => git::clone_repo(&url, &dir),
            Some(_) => git::pull_repo(&dir),
            None if dir.is_dir() => Ok(git::head_commit_sha(&dir).unwrap_or_default()),
            None => bail!("Checkout {} does not exist", dir.display()),
        })
        .await
        .context("Sync task failed")
        .and_then(|r| r);

        let mut status = self.status.write();
        match &result {
            Ok(sha) => {
                status.revision = Some(sha.clone());
                status.synced_at = Some(Utc::now());
                status.error = None;
            }
            Err(e) => status.error = Some(format!("{e:#}")),
        }
        result
    }

    /// Take the tree for writing once no probe holds it. Never queues on the
    /// lock: a waiting writer blocks new probes, and those probes may belong
    /// to requests that the current holders are waiting on.
    async fn lock_tree_for_sync(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        let deadline = Instant::now() + SYNC_MAX_WAIT;
        loop {
            if let Ok(guard) = self.tree.try_write() {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                bail!(
                    "Sync of {} deferred, {} probes still outstanding",
                    self.repo.name,
                    self.outstanding_probes()
                );
            }
            tokio::time::sleep(SYNC_RETRY_INTERVAL).await;
        }
    }

    /// Files in the checkout that are never searched
    pub async fn excluded_files(&self) -> Result<Vec<ExcludedFile>> {
        let dir = self.dir.clone();
        let exclude_dot_files = self.repo.exclude_dot_files;
        let tree = tokio::task::spawn_blocking(move || git::walk_repo(&dir, exclude_dot_files))
            .await
            .context("Walk task failed")?;
        Ok(tree.excluded)
    }

    fn revision(&self) -> String {
        self.status.read().revision.clone().unwrap_or_default()
    }
}

#[async_trait]
impl Searcher for LocalSearcher {
    type Payload = LocalProbe;

    fn repo_name(&self) -> &str {
        &self.repo.name
    }

    async fn probe(&self, query: &str, opts: &SearchOptions) -> Result<ProbeOutcome<LocalProbe>> {
        // Borrow the tree before anything can fail: every probe is paired
        // with exactly one release_probe.
        let guard = self.tree.clone().read_owned().await;
        self.borrowed.lock().push(guard);

        if !self.dir.is_dir() {
            bail!("Checkout {} is not available", self.dir.display());
        }
        let regex = RegexBuilder::new(query)
            .case_insensitive(opts.ignore_case)
            .build()
            .context("Invalid query")?;
        let filter = PathFilter::new(opts)?;

        let dir = self.dir.clone();
        let exclude_dot_files = self.repo.exclude_dot_files;
        let scan_regex = regex.clone();
        let (files, first_hit) = tokio::task::spawn_blocking(move || {
            let files: Vec<RepoFile> = git::walk_repo(&dir, exclude_dot_files)
                .files
                .into_iter()
                .filter(|f| filter.accepts(&f.relative_path))
                .collect();
            let first_hit = files.iter().position(|f| {
                std::fs::read_to_string(&f.path)
                    .map(|content| scan_regex.is_match(&content))
                    .unwrap_or(false)
            });
            (files, first_hit)
        })
        .await
        .context("Probe task failed")?;

        Ok(ProbeOutcome {
            found: first_hit.is_some(),
            payload: LocalProbe {
                regex,
                first_hit: first_hit.unwrap_or(files.len()),
                files,
            },
        })
    }

    async fn fetch(&self, payload: &LocalProbe, opts: &SearchOptions) -> Result<FetchOutcome> {
        let files = payload.files[payload.first_hit..].to_vec();
        let regex = payload.regex.clone();
        let context = opts.lines_of_context;

        let (matches, files_opened) = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            let mut files_opened = 0;
            for file in &files {
                let Ok(content) = std::fs::read_to_string(&file.path) else {
                    continue;
                };
                files_opened += 1;
                let lines = grep_lines(&content, &regex, context);
                if !lines.is_empty() {
                    matches.push(FileMatch {
                        filename: file.relative_path.clone(),
                        matches: lines,
                    });
                }
            }
            (matches, files_opened)
        })
        .await
        .context("Fetch task failed")?;

        let files_with_match = matches.len();
        let limit = if opts.limit == 0 { usize::MAX } else { opts.limit };
        Ok(FetchOutcome {
            matches: matches.into_iter().skip(opts.offset).take(limit).collect(),
            files_with_match,
            files_opened,
            revision: self.revision(),
        })
    }

    async fn release_probe(&self) {
        let guard = self.borrowed.lock().pop();
        if guard.is_none() {
            tracing::warn!("release_probe for {} without an outstanding probe", self.repo.name);
        }
    }
}

/// `files` / `excludeFiles` path filters
#[derive(Debug)]
struct PathFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl PathFilter {
    fn new(opts: &SearchOptions) -> Result<Self> {
        let compile = |pattern: &str, what: &str| -> Result<Option<Regex>> {
            if pattern.is_empty() {
                return Ok(None);
            }
            RegexBuilder::new(pattern)
                .case_insensitive(opts.ignore_case)
                .build()
                .map(Some)
                .with_context(|| format!("Invalid {what} pattern"))
        };
        Ok(Self {
            include: compile(&opts.file_regexp, "file")?,
            exclude: compile(&opts.exclude_file_regexp, "exclude file")?,
        })
    }

    fn accepts(&self, path: &str) -> bool {
        self.include.as_ref().map_or(true, |re| re.is_match(path))
            && !self.exclude.as_ref().map_or(false, |re| re.is_match(path))
    }
}

/// Matching lines of `content` with up to `context` lines either side.
fn grep_lines(content: &str, regex: &Regex, context: usize) -> Vec<LineMatch> {
    let lines: Vec<&str> = content.lines().collect();
    let owned = |range: &[&str]| range.iter().map(|l| l.to_string()).collect::<Vec<_>>();

    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| regex.is_match(line))
        .map(|(i, line)| LineMatch {
            line: line.to_string(),
            line_number: i + 1,
            before: owned(&lines[i.saturating_sub(context)..i]),
            after: owned(&lines[i + 1..(i + 1 + context).min(lines.len())]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkout(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        dir
    }

    fn searcher(dir: &Path) -> LocalSearcher {
        LocalSearcher::new(RepoConfig::new("local"), dir.to_path_buf())
    }

    fn opts() -> SearchOptions {
        SearchOptions {
            lines_of_context: 1,
            ..SearchOptions::default()
        }
    }

    #[test]
    fn test_grep_lines_with_context() {
        let re = Regex::new("needle").unwrap();
        let found = grep_lines("a\nb\nneedle here\nc\nd", &re, 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line_number, 3);
        assert_eq!(found[0].before, vec!["b"]);
        assert_eq!(found[0].after, vec!["c"]);
    }

    #[test]
    fn test_grep_lines_context_clamped_at_edges() {
        let re = Regex::new("x").unwrap();
        let found = grep_lines("x\ny\nx", &re, 5);
        assert_eq!(found.len(), 2);
        assert!(found[0].before.is_empty());
        assert_eq!(found[0].after, vec!["y", "x"]);
        assert!(found[1].after.is_empty());
    }

    #[test]
    fn test_path_filter() {
        let filter = PathFilter::new(&SearchOptions {
            file_regexp: r"\.rs$".to_string(),
            exclude_file_regexp: "^vendor/".to_string(),
            ..SearchOptions::default()
        })
        .unwrap();
        assert!(filter.accepts("src/lib.rs"));
        assert!(!filter.accepts("vendor/dep.rs"));
        assert!(!filter.accepts("README.md"));
    }

    #[tokio::test]
    async fn test_probe_then_fetch() {
        let dir = checkout(&[
            ("a.txt", "nothing\n"),
            ("b.rs", "fn alpha() {}\nlet beta = 1;\n"),
            ("c.rs", "beta again\n"),
        ]);
        let s = searcher(dir.path());

        let probe = s.probe("beta", &opts()).await.unwrap();
        assert!(probe.found);
        assert_eq!(s.outstanding_probes(), 1);

        let fetched = s.fetch(&probe.payload, &opts()).await.unwrap();
        let names: Vec<&str> = fetched.matches.iter().map(|m| m.filename.as_str()).collect();
        assert_eq!(names, vec!["b.rs", "c.rs"]);
        assert_eq!(fetched.files_with_match, 2);
        assert_eq!(fetched.files_opened, 2);
        assert_eq!(fetched.matches[0].matches[0].before, vec!["fn alpha() {}"]);

        s.release_probe().await;
        assert_eq!(s.outstanding_probes(), 0);
    }

    #[tokio::test]
    async fn test_probe_miss_and_ignore_case() {
        let dir = checkout(&[("a.txt", "Hello World\n")]);
        let s = searcher(dir.path());

        let miss = s.probe("hello", &opts()).await.unwrap();
        assert!(!miss.found);
        s.release_probe().await;

        let hit = s
            .probe(
                "hello",
                &SearchOptions {
                    ignore_case: true,
                    ..opts()
                },
            )
            .await
            .unwrap();
        assert!(hit.found);
        s.release_probe().await;
    }

    #[tokio::test]
    async fn test_fetch_applies_file_offset_and_limit() {
        let dir = checkout(&[("1.txt", "x\n"), ("2.txt", "x\n"), ("3.txt", "x\n")]);
        let s = searcher(dir.path());
        let paged = SearchOptions {
            offset: 1,
            limit: 1,
            ..opts()
        };

        let probe = s.probe("x", &paged).await.unwrap();
        let fetched = s.fetch(&probe.payload, &paged).await.unwrap();
        assert_eq!(fetched.files_with_match, 3);
        assert_eq!(fetched.matches.len(), 1);
        assert_eq!(fetched.matches[0].filename, "2.txt");
        s.release_probe().await;
    }

    #[tokio::test]
    async fn test_invalid_query_still_borrows_tree() {
        let dir = checkout(&[("a.txt", "x\n")]);
        let s = searcher(dir.path());

        let err = s.probe("(unclosed", &opts()).await.unwrap_err();
        assert!(format!("{err:#}").contains("Invalid query"));
        assert_eq!(s.outstanding_probes(), 1);
        s.release_probe().await;
        assert_eq!(s.outstanding_probes(), 0);
    }

    #[tokio::test]
    async fn test_sync_waits_for_released_probes() {
        let dir = checkout(&[("a.txt", "x\n")]);
        let s = Arc::new(searcher(dir.path()));

        let _probe = s.probe("x", &opts()).await.unwrap();
        let sync = {
            let s = s.clone();
            tokio::spawn(async move { s.sync().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(!sync.is_finished(), "sync must wait for the outstanding probe");

        s.release_probe().await;
        let rev = sync.await.unwrap().unwrap();
        // Not a git checkout: no revision, but the sync itself succeeds.
        assert_eq!(rev, "");
        assert!(s.status().synced_at.is_some());
    }

    #[tokio::test]
    async fn test_pending_sync_does_not_block_new_searches() {
        let dir = checkout(&[("a.txt", "x\n")]);
        let s = Arc::new(searcher(dir.path()));

        let _first = s.probe("x", &opts()).await.unwrap();
        let sync = {
            let s = s.clone();
            tokio::spawn(async move { s.sync().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let second = tokio::time::timeout(std::time::Duration::from_millis(500), s.probe("x", &opts()))
            .await
            .expect("a waiting sync must not hold back new searches")
            .unwrap();
        assert!(second.found);
        assert_eq!(s.outstanding_probes(), 2);
        assert!(!sync.is_finished());

        s.release_probe().await;
        s.release_probe().await;
        sync.await.unwrap().unwrap();
    }
}
