//! Repository Gateway (C2): the only component allowed to mutate `flow`,
//! `plan/*`, and `task/*` refs. All git access goes through the `git` binary
//! via subprocess, matching how the reference worktree manager this is
//! modeled on shells out rather than linking a git library.

pub mod branch;
pub mod read;
pub mod worktree;

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::GitError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const HISTORY_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the single logical lock on the main working copy's HEAD. Worktrees
/// are separate checkouts and are not serialized through this lock; only
/// operations that touch the main checkout's branch pointer are.
#[derive(Clone)]
pub struct RepositoryGateway {
    repo_path: PathBuf,
    head_lock: Arc<Mutex<()>>,
}

impl RepositoryGateway {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            head_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub(crate) fn worktrees_dir(&self) -> PathBuf {
        self.repo_path.join(".worktrees")
    }

    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        self.run_in(&self.repo_path, args, DEFAULT_TIMEOUT).await
    }

    async fn run_history(&self, args: &[&str]) -> Result<String, GitError> {
        self.run_in(&self.repo_path, args, HISTORY_SCAN_TIMEOUT).await
    }

    async fn run_in(&self, dir: &Path, args: &[&str], timeout: Duration) -> Result<String, GitError> {
        let command_label = format!("git {}", args.join(" "));
        let fut = Command::new("git").args(args).current_dir(dir).output();

        let output: Output = match tokio::time::timeout(timeout, fut).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(GitError::Timeout {
                    command: command_label,
                    elapsed_secs: timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: command_label,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn current_branch(&self) -> Result<String, GitError> {
        self.run(&["branch", "--show-current"]).await
    }

    /// Whether `branch` currently exists. Used by the Worker Pool to
    /// validate `launch` preconditions before starting a session.
    pub async fn branch_exists(&self, branch: &str) -> Result<bool, GitError> {
        match self.run(&["rev-parse", "--verify", branch]).await {
            Ok(_) => Ok(true),
            Err(GitError::CommandFailed { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }
}
