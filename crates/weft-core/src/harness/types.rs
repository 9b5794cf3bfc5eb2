//! Shared types for the harness adapter layer (C6): the contract between
//! the Worker Pool and whatever external agent runtime actually does the
//! work. None of these types know about git; a harness receives a working
//! directory and instruction text, nothing more.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::process::ChildStdin;

/// Everything a harness needs to start a session for one task: the
/// worktree to run in, the instruction text to hand the agent, and any
/// extra environment/tool configuration layered on top of the harness's
/// own defaults.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub task_id: u64,
    pub task_branch: String,
    pub working_dir: PathBuf,
    pub instructions: String,
    pub env_vars: HashMap<String, String>,
    pub extra_tools: Vec<String>,
}

/// Opaque handle to a running agent session, returned by `spawn` and
/// threaded back through `events`/`send`/`kill`/`is_running`.
pub struct SessionHandle {
    pub pid: u32,
    pub stdin: Option<ChildStdin>,
    pub task_id: u64,
    pub harness_name: String,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("pid", &self.pid)
            .field("task_id", &self.task_id)
            .field("harness_name", &self.harness_name)
            .finish()
    }
}

/// One message emitted by a running agent session, in the order the
/// harness observed it. The last event on any stream is always either
/// `Completed` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Message { role: String, content: String },
    ToolCall { tool: String, input: serde_json::Value },
    ToolResult { tool: String, output: serde_json::Value },
    Error { message: String },
    Completed,
}
