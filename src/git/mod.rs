//! Working-tree access for configured repositories: cloning, fast-forward
//! pulls and walking the checkout for searchable files.

mod clone;
mod walk;

pub use clone::{clone_repo, head_commit_sha, pull_repo};
pub use walk::{walk_repo, ExcludedFile, RepoFile, RepoTree, MAX_FILE_SIZE};
