use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Files larger than this are never searched.
pub const MAX_FILE_SIZE: u64 = 1_048_576;

/// A searchable file in a checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    /// Path relative to the checkout root, `/`-separated
    pub relative_path: String,
    pub path: PathBuf,
}

/// A file the searcher skips, and why
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ExcludedFile {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct RepoTree {
    pub files: Vec<RepoFile>,
    pub excluded: Vec<ExcludedFile>,
}

/// Walk a checkout, splitting its files into searchable and excluded.
/// Results are sorted by path so repeated walks are identical.
pub fn walk_repo(repo_dir: &Path, exclude_dot_files: bool) -> RepoTree {
    let mut tree = RepoTree::default();

    for entry in WalkDir::new(repo_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(repo_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let hidden = relative
            .split('/')
            .any(|component| component.starts_with('.'));
        let reason = if exclude_dot_files && hidden {
            Some("Dot file")
        } else if !is_text_file(path) {
            Some("Not a text file")
        } else if std::fs::metadata(path).map(|m| m.len() > MAX_FILE_SIZE).unwrap_or(true) {
            Some("File too large")
        } else {
            None
        };

        match reason {
            Some(reason) => tree.excluded.push(ExcludedFile {
                filename: relative,
                reason: reason.to_string(),
            }),
            None => tree.files.push(RepoFile {
                relative_path: relative,
                path: path.to_path_buf(),
            }),
        }
    }

    tree
}

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    matches!(
        entry.file_name().to_string_lossy().as_ref(),
        ".git" | ".hg" | ".svn" | "node_modules" | "target" | "__pycache__" | ".venv"
    )
}

fn is_text_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if matches!(
        filename.as_ref(),
        "makefile"
            | "dockerfile"
            | "rakefile"
            | "gemfile"
            | "readme"
            | "license"
            | "authors"
            | "changelog"
            | ".gitignore"
            | ".editorconfig"
    ) {
        return true;
    }

    matches!(
        ext.as_str(),
        "rs" | "py"
            | "js"
            | "mjs"
            | "ts"
            | "tsx"
            | "jsx"
            | "go"
            | "java"
            | "c"
            | "cpp"
            | "cc"
            | "h"
            | "hpp"
            | "cs"
            | "rb"
            | "php"
            | "swift"
            | "kt"
            | "scala"
            | "lua"
            | "pl"
            | "sh"
            | "bash"
            | "zsh"
            | "sql"
            | "html"
            | "css"
            | "scss"
            | "less"
            | "xml"
            | "json"
            | "yaml"
            | "yml"
            | "toml"
            | "ini"
            | "cfg"
            | "conf"
            | "md"
            | "rst"
            | "txt"
            | "proto"
            | "graphql"
            | "vue"
            | "svelte"
            | "ex"
            | "exs"
            | "erl"
            | "hs"
            | "ml"
            | "clj"
            | "el"
            | "vim"
            | "tf"
            | "nix"
            | "zig"
            | "dart"
            | "jl"
            | "lock"
            | "csv"
    )
}
