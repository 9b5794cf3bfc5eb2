//! Error types for the components built on top of the repository gateway:
//! the Worker Pool's launch-time validation, the harness layer's runtime
//! failures, and cooperative cancellation. `weft_repo::GitError` covers
//! everything below the gateway boundary; these cover everything above it.

use std::path::PathBuf;

/// Why `WorkerPool::launch` refused to start a session. Surfaced both as
/// this structured error (synchronously, to the caller) and as a
/// `worker_completion{exit_code: VALIDATION_EXIT_CODE}` event on the
/// Control Bus, so the scheduler observes it the same way it observes a
/// real completion.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("worker slot {0} is not idle")]
    SlotNotIdle(u32),
    #[error("refusing to launch: {active} active workers already at max_parallel={max}")]
    AtCapacity { active: u32, max: u32 },
    #[error("task branch {0:?} does not exist")]
    TaskBranchMissing(String),
    #[error("no harness registered under {0:?}")]
    HarnessNotFound(String),
    #[error("worktree path {0:?} does not exist")]
    WorktreeMissing(PathBuf),
    #[error("worktree path {0:?} is not a directory")]
    WorktreeNotADirectory(PathBuf),
    #[error("worktree path {0:?} is not a git working tree")]
    WorktreeNotAGitDir(PathBuf),
    #[error("worktree {worktree:?} is missing the agent instruction file {file:?}")]
    InstructionFileMissing { worktree: PathBuf, file: String },
}

/// Which phase of a session an [`AgentRuntimeError`] happened in, so logs
/// and diagnostics can distinguish "never got the process running" from
/// "it ran and then fell over".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimePhase {
    Init,
    Running,
}

impl std::fmt::Display for RuntimePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RuntimePhase::Init => "init",
            RuntimePhase::Running => "runtime",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("agent runtime error during {phase}: {message}")]
pub struct AgentRuntimeError {
    pub phase: RuntimePhase,
    pub message: String,
}

impl AgentRuntimeError {
    pub fn init(message: impl Into<String>) -> Self {
        Self { phase: RuntimePhase::Init, message: message.into() }
    }

    pub fn running(message: impl Into<String>) -> Self {
        Self { phase: RuntimePhase::Running, message: message.into() }
    }
}

/// A session or scheduler run was cancelled cooperatively rather than
/// failing. Carried separately from `AgentRuntimeError` so callers can
/// tell a deliberate stop from an actual fault.
#[derive(Debug, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;
