//! Runs `git diff` for a single file, with the argument vector chosen by a
//! [`DiffMode`].

use agentview_core::diff::DiffMode;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("not a git repository: {0}")]
    NotRepo(String),
    #[error("invalid git reference: {0}")]
    BadRevision(String),
    #[error("file not tracked by git: {0}")]
    Untracked(String),
    #[error("git diff failed: {0}")]
    Failed(String),
    #[error("git error: {0}")]
    Other(String),
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Unified diff of `path` in `mode`. An empty string means no changes.
pub async fn git_diff(path: &str, mode: &DiffMode) -> Result<String, GitError> {
    let abs = absolute_path(path).await?;
    let dir = abs
        .parent()
        .ok_or_else(|| GitError::InvalidPath(path.to_string()))?;
    let root = find_git_root(dir).await?;
    let rel = relative_to(&root, &abs)?;

    let args = mode.build_args(&rel);
    debug!(event = "git_diff", root = %root.display(), args = ?args);
    let output = Command::new("git")
        .args(&args)
        .current_dir(&root)
        .output()
        .await?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    match classify_failure(&stderr, &root, mode, &rel) {
        Some(err) => Err(err),
        None => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
    }
}

/// Maps git's stderr to a user-facing error. A failure with nothing on
/// stderr is not an error.
pub fn classify_failure(stderr: &str, root: &Path, mode: &DiffMode, rel: &str) -> Option<GitError> {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        return None;
    }
    if stderr.contains("not a git repository") {
        return Some(GitError::NotRepo(root.display().to_string()));
    }
    if stderr.contains("unknown revision") || stderr.contains("bad revision") {
        return Some(GitError::BadRevision(mode.reference().to_string()));
    }
    if stderr.contains("did not match any") {
        return Some(GitError::Untracked(rel.to_string()));
    }
    Some(GitError::Failed(stderr.to_string()))
}

pub async fn find_git_root(dir: &Path) -> Result<PathBuf, GitError> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(dir)
        .output()
        .await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not a git repository") {
            return Err(GitError::NotRepo(dir.display().to_string()));
        }
        return Err(GitError::Other(stderr.trim().to_string()));
    }
    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    // git reports the resolved toplevel; match it against a resolved path.
    Ok(tokio::fs::canonicalize(&root).await.unwrap_or_else(|_| PathBuf::from(root)))
}

/// Absolute form of `path` with its directory resolved. The file itself may
/// be missing (a deleted file still has a diff).
async fn absolute_path(path: &str) -> Result<PathBuf, GitError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(GitError::InvalidPath("path cannot be empty".to_string()));
    }
    let raw = PathBuf::from(trimmed);
    let raw = if raw.is_absolute() {
        raw
    } else {
        std::env::current_dir()?.join(raw)
    };
    let name = raw
        .file_name()
        .ok_or_else(|| GitError::InvalidPath(trimmed.to_string()))?
        .to_owned();
    let parent = raw
        .parent()
        .ok_or_else(|| GitError::InvalidPath(trimmed.to_string()))?;
    let parent = tokio::fs::canonicalize(parent)
        .await
        .map_err(|err| GitError::InvalidPath(format!("{trimmed}: {err}")))?;
    Ok(parent.join(name))
}

fn relative_to(root: &Path, path: &Path) -> Result<String, GitError> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| GitError::InvalidPath(format!("{} is outside {}", path.display(), root.display())))?;
    Ok(rel.to_string_lossy().replace('\\', "/"))
}
