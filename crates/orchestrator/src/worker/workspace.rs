//! The per-project filesystem + git collaborator contract (spec.md §6
//! "Workspace"). All operations are scoped inside the project root;
//! path arguments that escape the root are rejected.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("path '{0}' escapes the project root")]
    PathEscapesRoot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("git command failed: {0}")]
    GitFailed(String),
}

/// Result of applying a unified diff.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub applied: bool,
    pub output: String,
}

/// Directory tree entry returned by [`Workspace::read_tree`].
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    pub is_dir: bool,
}

/// Result of a bash invocation.
#[derive(Debug, Clone)]
pub struct BashResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Per-project filesystem + git collaborator (spec.md §6).
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<String, WorkspaceError>;
    async fn write_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError>;
    async fn read_tree(
        &self,
        path: &str,
        max_depth: usize,
        limit: usize,
    ) -> Result<Vec<TreeEntry>, WorkspaceError>;
    async fn search_text(
        &self,
        path: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, WorkspaceError>;
    async fn apply_patch(&self, unified_diff: &str) -> Result<PatchOutcome, WorkspaceError>;
    async fn bash(&self, cmd: &str, timeout_secs: u64) -> Result<BashResult, WorkspaceError>;
    async fn git_commit(&self, message: &str, files: &[String]) -> Result<String, WorkspaceError>;
    async fn git_push(&self, branch: &str, set_upstream: bool) -> Result<(), WorkspaceError>;
    async fn git_status(&self) -> Result<String, WorkspaceError>;
    async fn git_diff(&self) -> Result<String, WorkspaceError>;
}

/// Default sub-operation timeouts (spec.md §5: "bash 120 s, HTTP 30 s,
/// git 60 s").
pub const BASH_TIMEOUT: Duration = Duration::from_secs(120);
pub const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Filesystem + `git` CLI backed workspace scoped to a project root.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `path` relative to the project root, rejecting anything
    /// that would escape it via `..` components.
    fn resolve(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        let candidate = Path::new(path);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(WorkspaceError::PathEscapesRoot(path.to_string()));
        }
        if candidate.is_absolute() {
            return Err(WorkspaceError::PathEscapesRoot(path.to_string()));
        }
        Ok(self.root.join(candidate))
    }

    async fn run_git(&self, args: &[&str]) -> Result<String, WorkspaceError> {
        let output = timeout(
            GIT_TIMEOUT,
            Command::new("git")
                .current_dir(&self.root)
                .args(args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| WorkspaceError::Timeout(GIT_TIMEOUT))??;

        if !output.status.success() {
            return Err(WorkspaceError::GitFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn read_file(&self, path: &str) -> Result<String, WorkspaceError> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::read_to_string(full).await?)
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(full, content).await?;
        Ok(())
    }

    async fn read_tree(
        &self,
        path: &str,
        max_depth: usize,
        limit: usize,
    ) -> Result<Vec<TreeEntry>, WorkspaceError> {
        let root = self.resolve(path)?;
        let mut entries = Vec::new();
        let mut stack = vec![(root.clone(), 0usize)];
        while let Some((dir, depth)) = stack.pop() {
            if entries.len() >= limit || depth > max_depth {
                continue;
            }
            let mut read_dir = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                if entries.len() >= limit {
                    break;
                }
                let is_dir = entry.file_type().await?.is_dir();
                let relative = entry
                    .path()
                    .strip_prefix(&self.root)
                    .unwrap_or(&entry.path())
                    .to_string_lossy()
                    .to_string();
                entries.push(TreeEntry {
                    path: relative,
                    is_dir,
                });
                if is_dir && depth < max_depth {
                    stack.push((entry.path(), depth + 1));
                }
            }
        }
        Ok(entries)
    }

    async fn search_text(
        &self,
        path: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, WorkspaceError> {
        let entries = self.read_tree(path, 8, 10_000).await?;
        let mut matches = Vec::new();
        for entry in entries {
            if entry.is_dir || matches.len() >= limit {
                continue;
            }
            if let Ok(content) = self.read_file(&entry.path).await {
                if content.contains(query) {
                    matches.push(entry.path);
                }
            }
        }
        Ok(matches)
    }

    async fn apply_patch(&self, unified_diff: &str) -> Result<PatchOutcome, WorkspaceError> {
        let mut child = Command::new("git")
            .current_dir(&self.root)
            .args(["apply", "--whitespace=nowarn", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            stdin.write_all(unified_diff.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;
        Ok(PatchOutcome {
            applied: output.status.success(),
            output: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn bash(&self, cmd: &str, timeout_secs: u64) -> Result<BashResult, WorkspaceError> {
        let duration = Duration::from_secs(timeout_secs);
        let output = timeout(
            duration,
            Command::new("sh")
                .current_dir(&self.root)
                .arg("-c")
                .arg(cmd)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| WorkspaceError::Timeout(duration))??;

        Ok(BashResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn git_commit(&self, message: &str, files: &[String]) -> Result<String, WorkspaceError> {
        if !files.is_empty() {
            let mut args = vec!["add"];
            args.extend(files.iter().map(String::as_str));
            self.run_git(&args).await?;
        }
        self.run_git(&["commit", "-m", message]).await?;
        let sha = self.run_git(&["rev-parse", "HEAD"]).await?;
        Ok(sha.trim().to_string())
    }

    async fn git_push(&self, branch: &str, set_upstream: bool) -> Result<(), WorkspaceError> {
        if set_upstream {
            self.run_git(&["push", "--set-upstream", "origin", branch])
                .await?;
        } else {
            self.run_git(&["push", "origin", branch]).await?;
        }
        Ok(())
    }

    async fn git_status(&self) -> Result<String, WorkspaceError> {
        self.run_git(&["status", "--porcelain"]).await
    }

    async fn git_diff(&self) -> Result<String, WorkspaceError> {
        self.run_git(&["diff"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());
        ws.write_file("notes/todo.md", "hello").await.unwrap();
        let content = ws.read_file("notes/todo.md").await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn path_escaping_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());
        let result = ws.read_file("../outside.txt").await;
        assert!(matches!(result, Err(WorkspaceError::PathEscapesRoot(_))));
    }

    #[tokio::test]
    async fn absolute_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());
        let result = ws.read_file("/etc/passwd").await;
        assert!(matches!(result, Err(WorkspaceError::PathEscapesRoot(_))));
    }

    #[tokio::test]
    async fn search_text_finds_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());
        ws.write_file("a.txt", "needle here").await.unwrap();
        ws.write_file("b.txt", "nothing").await.unwrap();
        let hits = ws.search_text(".", "needle", 10).await.unwrap();
        assert_eq!(hits, vec!["a.txt".to_string()]);
    }
}
