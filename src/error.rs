use thiserror::Error;

/// Why a multi-repository search produced no page.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{repo}: {message}")]
    Probe { repo: String, message: String },

    #[error("{repo}: {message}")]
    Fetch { repo: String, message: String },

    #[error("search of {repo} ended without reporting a result")]
    WorkerLost { repo: String },
}

impl SearchError {
    pub fn probe(repo: &str, err: &anyhow::Error) -> Self {
        Self::Probe {
            repo: repo.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn fetch(repo: &str, err: &anyhow::Error) -> Self {
        Self::Fetch {
            repo: repo.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn repo(&self) -> &str {
        match self {
            Self::Probe { repo, .. } | Self::Fetch { repo, .. } | Self::WorkerLost { repo } => repo,
        }
    }
}
