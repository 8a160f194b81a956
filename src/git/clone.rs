use anyhow::{bail, Context, Result};
use std::path::Path;

/// Clone a git repository to the target directory and return its HEAD sha.
pub fn clone_repo(url: &str, target: &Path) -> Result<String> {
    tracing::info!("Cloning {} into {}", url, target.display());
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let repo = git2::Repository::clone(url, target)
        .with_context(|| format!("Failed to clone {url}"))?;
    tracing::info!("Clone complete: {}", target.display());
    head_sha(&repo)
}

/// Fetch `origin` and fast-forward the checked out branch. Returns the new
/// HEAD sha.
pub fn pull_repo(repo_dir: &Path) -> Result<String> {
    let repo = git2::Repository::open(repo_dir)
        .with_context(|| format!("Failed to open {}", repo_dir.display()))?;

    {
        let mut remote = repo
            .find_remote("origin")
            .context("Repository has no origin remote")?;
        remote
            .fetch::<&str>(&[], None, None)
            .with_context(|| format!("Failed to fetch into {}", repo_dir.display()))?;
    }

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let incoming = repo.reference_to_annotated_commit(&fetch_head)?;
    let (analysis, _) = repo.merge_analysis(&[&incoming])?;

    if analysis.is_up_to_date() {
        return head_sha(&repo);
    }
    if !analysis.is_fast_forward() {
        bail!(
            "Local branch in {} has diverged from origin",
            repo_dir.display()
        );
    }

    let head_name = repo
        .head()?
        .name()
        .context("HEAD is not a named reference")?
        .to_string();
    repo.find_reference(&head_name)?
        .set_target(incoming.id(), "repo-hound: fast-forward")?;
    repo.set_head(&head_name)?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;

    head_sha(&repo)
}

/// HEAD sha of the repository at `repo_dir`.
pub fn head_commit_sha(repo_dir: &Path) -> Result<String> {
    let repo = git2::Repository::open(repo_dir)
        .with_context(|| format!("Failed to open {}", repo_dir.display()))?;
    head_sha(&repo)
}

fn head_sha(repo: &git2::Repository) -> Result<String> {
    let commit = repo.head()?.peel_to_commit()?;
    Ok(commit.id().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_with_commit(dir: &Path) -> String {
        let repo = git2::Repository::init(dir).unwrap();
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@example.com").unwrap();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
        oid.to_string()
    }

    #[test]
    fn test_head_commit_sha_matches_commit() {
        let dir = tempfile::tempdir().unwrap();
        let oid = init_with_commit(dir.path());
        assert_eq!(head_commit_sha(dir.path()).unwrap(), oid);
    }

    #[test]
    fn test_head_commit_sha_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(head_commit_sha(dir.path()).is_err());
    }

    #[test]
    fn test_clone_and_pull_up_to_date() {
        let origin = tempfile::tempdir().unwrap();
        let oid = init_with_commit(origin.path());

        let work = tempfile::tempdir().unwrap();
        let target = work.path().join("checkout");
        let url = origin.path().to_string_lossy().to_string();

        assert_eq!(clone_repo(&url, &target).unwrap(), oid);
        assert_eq!(pull_repo(&target).unwrap(), oid);
    }
}
