//! Plan/task data types shared by the codec and the repository gateway.
//!
//! These are plain data: nothing here talks to git or to a process. Keeping
//! them free of I/O is what lets the codec round-trip without a repository
//! on hand, per the codec's contract.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type TaskId = u64;

/// Status of a task as recorded in the plan. This is the *authoritative*
/// status; the task branch itself is append-only and carries no status field
/// after its init commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid task status: {0:?}")]
pub struct TaskStatusParseError(String);

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(TaskStatusParseError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid priority: {0:?}")]
pub struct PriorityParseError(String);

impl FromStr for Priority {
    type Err = PriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(PriorityParseError(other.to_string())),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// One task inside a `Plan` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub status: TaskStatus,
    pub depends_on: Vec<TaskId>,
    pub key_files: Vec<String>,
    pub priority: Priority,
    pub estimated_time: Option<String>,
    /// Shell command run in the task's worktree before it is merged (§3
    /// supplemental Gate Result). `None` means the task has no configured
    /// gate and its merge commit omits the `## Gate` section entirely.
    pub gate_command: Option<String>,
}

/// A full-snapshot plan commit. `version` is derived by the gateway by
/// counting commits on the plan branch, not stored redundantly inside the
/// message, but callers may still set it on a freshly-built snapshot before
/// `update_plan_branch` assigns the real value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub session_name: String,
    pub user_request: String,
    pub version: u32,
    pub design_doc: String,
    pub tech_stack: String,
    pub tasks: Vec<Task>,
}

impl Plan {
    /// True iff `depends_on` only ever refers to ids present in this plan and
    /// the induced graph has no cycles. Used by the scheduler before every
    /// plan write (§8 invariant 1).
    pub fn is_valid_dag(&self) -> bool {
        use std::collections::HashSet;
        let ids: HashSet<TaskId> = self.tasks.iter().map(|t| t.id).collect();
        if ids.len() != self.tasks.len() {
            return false; // duplicate ids
        }
        for t in &self.tasks {
            for dep in &t.depends_on {
                if !ids.contains(dep) {
                    return false;
                }
            }
        }
        !has_cycle(&self.tasks)
    }
}

fn has_cycle(tasks: &[Task]) -> bool {
    use std::collections::HashMap;
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }
    let by_id: HashMap<TaskId, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
    let mut marks: HashMap<TaskId, Mark> =
        tasks.iter().map(|t| (t.id, Mark::Unvisited)).collect();

    fn visit(
        id: TaskId,
        by_id: &HashMap<TaskId, &Task>,
        marks: &mut HashMap<TaskId, Mark>,
    ) -> bool {
        match marks.get(&id).copied() {
            Some(Mark::Done) => return false,
            Some(Mark::InProgress) => return true,
            _ => {}
        }
        marks.insert(id, Mark::InProgress);
        if let Some(task) = by_id.get(&id) {
            for dep in &task.depends_on {
                if visit(*dep, by_id, marks) {
                    return true;
                }
            }
        }
        marks.insert(id, Mark::Done);
        false
    }

    tasks.iter().any(|t| visit(t.id, &by_id, &mut marks))
}

/// Static metadata carried by a task branch's first ("initialize") commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInit {
    pub id: TaskId,
    pub description: String,
    pub preconditions: Vec<String>,
    pub provides: Vec<String>,
    pub files: Vec<String>,
    pub session_name: String,
    pub plan_branch: String,
    pub plan_version: u32,
    pub depends_on: Vec<TaskId>,
    pub enables: Vec<TaskId>,
}

/// The kind of worker progress commit, per the title's leading verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitKind {
    InitialDesign,
    Implementation,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSection {
    pub overview: String,
    pub decisions: Vec<String>,
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub n: u32,
    pub description: String,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub status: TaskStatus,
    pub done: u32,
    pub total: u32,
}

/// A decoded worker progress commit (§4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCommit {
    pub task_id: TaskId,
    pub commit_kind: CommitKind,
    pub step: Option<(u32, u32)>,
    pub implementation_text: String,
    pub design: DesignSection,
    pub todos: Vec<TodoItem>,
    pub progress: Progress,
}

/// Verification policy for a task's optional gate (§3 supplemental Gate Result).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatePolicy {
    Auto,
    HumanReview,
}

impl fmt::Display for GatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GatePolicy::Auto => "auto",
            GatePolicy::HumanReview => "human-review",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid gate policy: {0:?}")]
pub struct GatePolicyParseError(String);

impl FromStr for GatePolicy {
    type Err = GatePolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(GatePolicy::Auto),
            "human-review" => Ok(GatePolicy::HumanReview),
            other => Err(GatePolicyParseError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GateVerdict {
    Passed,
    Failed { output: Option<String> },
}

/// What a merge commit onto `flow` carries beyond the git merge itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergeRecord {
    pub provides: Vec<String>,
    pub gate: Option<(GatePolicy, GateVerdict)>,
}

/// A non-fatal decode anomaly. Accumulated by decode functions alongside
/// their (always-produced) result and mirrored to a `tracing::warn!` event.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    pub context: String,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: TaskId, deps: &[TaskId]) -> Task {
        Task {
            id,
            description: "d".into(),
            status: TaskStatus::Pending,
            depends_on: deps.to_vec(),
            key_files: vec![],
            priority: Priority::Medium,
            estimated_time: None,
            gate_command: None,
        }
    }

    #[test]
    fn status_roundtrip() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(s.to_string().parse::<TaskStatus>().unwrap(), s);
        }
    }

    #[test]
    fn status_rejects_garbage() {
        assert!("bogus".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn linear_dag_is_valid() {
        let plan = Plan {
            session_name: "s".into(),
            user_request: "r".into(),
            version: 1,
            design_doc: String::new(),
            tech_stack: String::new(),
            tasks: vec![task(1, &[]), task(2, &[1])],
        };
        assert!(plan.is_valid_dag());
    }

    #[test]
    fn self_cycle_is_invalid() {
        let plan = Plan {
            session_name: "s".into(),
            user_request: "r".into(),
            version: 1,
            design_doc: String::new(),
            tech_stack: String::new(),
            tasks: vec![task(1, &[2]), task(2, &[1])],
        };
        assert!(!plan.is_valid_dag());
    }

    #[test]
    fn dangling_dependency_is_invalid() {
        let plan = Plan {
            session_name: "s".into(),
            user_request: "r".into(),
            version: 1,
            design_doc: String::new(),
            tech_stack: String::new(),
            tasks: vec![task(1, &[99])],
        };
        assert!(!plan.is_valid_dag());
    }

    #[test]
    fn duplicate_ids_are_invalid() {
        let plan = Plan {
            session_name: "s".into(),
            user_request: "r".into(),
            version: 1,
            design_doc: String::new(),
            tech_stack: String::new(),
            tasks: vec![task(1, &[]), task(1, &[])],
        };
        assert!(!plan.is_valid_dag());
    }
}
