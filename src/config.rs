use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const DEFAULT_MS_BETWEEN_POLL: u64 = 30_000;
const DEFAULT_MAX_CONCURRENT_INDEXERS: usize = 2;
const DEFAULT_MAX_CONCURRENT_SEARCHERS: usize = 1000;
const DEFAULT_MAX_REPOS_IN_FIRST_RESULT: usize = 10;
const DEFAULT_MAX_REPOS_IN_NEXT_RESULT: usize = 30;
const DEFAULT_POLL_ENABLED: bool = true;
const DEFAULT_PUSH_ENABLED: bool = false;
const DEFAULT_VCS: &str = "git";
const DEFAULT_BASE_URL: &str = "{url}/blob/{rev}/{path}{anchor}";
const DEFAULT_ANCHOR: &str = "#L{line}";
const DEFAULT_HEALTH_CHECK_URI: &str = "/healthz";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Where checkouts live when a repo has no explicit `path`
    #[serde(rename = "dbpath")]
    pub db_path: PathBuf,
    /// Server bind address
    #[serde(skip)]
    pub bind_addr: String,
    /// Searchable repositories, in the order results are paginated
    pub repos: Vec<RepoConfig>,
    /// Maximum concurrent clone/pull operations
    pub max_concurrent_indexers: usize,
    /// Maximum concurrent probes per search request
    pub max_concurrent_searchers: usize,
    /// Matching repositories on the first page
    pub max_repos_in_first_result: usize,
    /// Matching repositories on each following page
    pub max_repos_in_next_result: usize,
    pub health_check_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct UrlPattern {
    pub base_url: String,
    pub anchor: String,
}

impl Default for UrlPattern {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            anchor: DEFAULT_ANCHOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RepoConfig {
    pub name: String,
    /// Clone URL. Repos without one are searched in place and never synced.
    #[serde(default)]
    pub url: Option<String>,
    /// Local checkout; defaults to `<dbpath>/<name>`
    #[serde(default, skip_serializing)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub ms_between_poll: u64,
    #[serde(default)]
    pub vcs: String,
    #[serde(default)]
    pub url_pattern: UrlPattern,
    #[serde(default)]
    pub exclude_dot_files: bool,
    #[serde(default)]
    pub enable_poll_updates: Option<bool>,
    #[serde(default)]
    pub enable_push_updates: Option<bool>,
}

impl RepoConfig {
    pub fn new(name: &str) -> Self {
        let mut repo = Self {
            name: name.to_string(),
            url: None,
            path: None,
            ms_between_poll: 0,
            vcs: String::new(),
            url_pattern: UrlPattern::default(),
            exclude_dot_files: false,
            enable_poll_updates: None,
            enable_push_updates: None,
        };
        repo.fill_defaults();
        repo
    }

    pub fn poll_updates_enabled(&self) -> bool {
        self.enable_poll_updates.unwrap_or(DEFAULT_POLL_ENABLED)
    }

    pub fn push_updates_enabled(&self) -> bool {
        self.enable_push_updates.unwrap_or(DEFAULT_PUSH_ENABLED)
    }

    fn fill_defaults(&mut self) {
        if self.ms_between_poll == 0 {
            self.ms_between_poll = DEFAULT_MS_BETWEEN_POLL;
        }
        if self.vcs.is_empty() {
            self.vcs = DEFAULT_VCS.to_string();
        }
        if self.url_pattern.base_url.is_empty() {
            self.url_pattern.base_url = DEFAULT_BASE_URL.to_string();
        }
        if self.url_pattern.anchor.is_empty() {
            self.url_pattern.anchor = DEFAULT_ANCHOR.to_string();
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:6080".to_string(),
            repos: Vec::new(),
            max_concurrent_indexers: DEFAULT_MAX_CONCURRENT_INDEXERS,
            max_concurrent_searchers: DEFAULT_MAX_CONCURRENT_SEARCHERS,
            max_repos_in_first_result: DEFAULT_MAX_REPOS_IN_FIRST_RESULT,
            max_repos_in_next_result: DEFAULT_MAX_REPOS_IN_NEXT_RESULT,
            health_check_uri: DEFAULT_HEALTH_CHECK_URI.to_string(),
        }
    }
}

/// On-disk shape: everything optional, zero means "use the default".
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigFile {
    #[serde(rename = "dbpath", default)]
    db_path: Option<PathBuf>,
    #[serde(default)]
    repos: Vec<RepoConfig>,
    #[serde(default)]
    max_concurrent_indexers: usize,
    #[serde(default)]
    max_concurrent_searchers: usize,
    #[serde(default)]
    max_repos_in_first_result: usize,
    #[serde(default)]
    max_repos_in_next_result: usize,
    #[serde(default)]
    health_check_uri: String,
}

impl Config {
    /// Load `REPO_HOUND_CONFIG` (default `config.json`), then apply
    /// environment overrides. A missing file yields an empty repo list.
    pub fn load() -> Result<Self> {
        let path = std::env::var("REPO_HOUND_CONFIG").unwrap_or_else(|_| "config.json".to_string());
        let path = PathBuf::from(path);
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            tracing::warn!("Config file {} not found, starting with no repos", path.display());
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config = Self::from_json(&data)
            .with_context(|| format!("Invalid config {}", path.display()))?;

        if config.db_path.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.db_path = base.join(&config.db_path);
        }
        Ok(config)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(data)?;
        let defaults = Self::default();
        let or_default = |value: usize, default: usize| if value == 0 { default } else { value };

        let mut seen = HashSet::new();
        let mut repos = file.repos;
        for repo in &mut repos {
            if repo.name.is_empty() {
                bail!("Repo without a name");
            }
            if !seen.insert(repo.name.clone()) {
                bail!("Duplicate repo name: {}", repo.name);
            }
            repo.fill_defaults();
        }

        Ok(Self {
            db_path: file.db_path.unwrap_or(defaults.db_path),
            bind_addr: defaults.bind_addr,
            repos,
            max_concurrent_indexers: or_default(
                file.max_concurrent_indexers,
                defaults.max_concurrent_indexers,
            ),
            max_concurrent_searchers: or_default(
                file.max_concurrent_searchers,
                defaults.max_concurrent_searchers,
            ),
            max_repos_in_first_result: or_default(
                file.max_repos_in_first_result,
                defaults.max_repos_in_first_result,
            ),
            max_repos_in_next_result: or_default(
                file.max_repos_in_next_result,
                defaults.max_repos_in_next_result,
            ),
            health_check_uri: if file.health_check_uri.is_empty() {
                defaults.health_check_uri
            } else {
                file.health_check_uri
            },
        })
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("REPO_HOUND_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("REPO_HOUND_DB_PATH") {
            self.db_path = PathBuf::from(dir);
        }
        if let Ok(val) = std::env::var("REPO_HOUND_MAX_CONCURRENT_SEARCHERS") {
            if let Ok(v) = val.parse::<usize>() {
                if v > 0 {
                    self.max_concurrent_searchers = v;
                }
            }
        }
    }

    /// Checkout directory of a configured repo
    pub fn repo_dir(&self, repo: &RepoConfig) -> PathBuf {
        repo.path
            .clone()
            .unwrap_or_else(|| self.db_path.join(&repo.name))
    }
}
