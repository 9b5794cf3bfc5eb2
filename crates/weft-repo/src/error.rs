use std::path::PathBuf;

/// Errors surfaced by the Repository Gateway (§7 `GitError`). Every mutating
/// gateway operation guarantees rollback has already happened before one of
/// these is returned.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git {command} failed (exit {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("git {command} timed out after {elapsed_secs}s")]
    Timeout { command: String, elapsed_secs: u64 },

    #[error("branch {0} already exists")]
    BranchExists(String),

    #[error("branch {0} does not exist")]
    BranchNotFound(String),

    #[error("merge of {branch} into {target} conflicted and was aborted")]
    MergeConflict { branch: String, target: String },

    #[error("worktree path {0} is not a valid git working tree")]
    InvalidWorktree(PathBuf),

    #[error("rollback of a failed {operation} itself failed: {detail}")]
    RollbackFailed { operation: String, detail: String },

    #[error("io error running git: {0}")]
    Io(#[from] std::io::Error),
}
