//! Ready-set computation (§4.4): the subset of a plan's tasks that can be
//! dispatched right now. `depends_on` (by id) is authoritative; string
//! preconditions, where a task branch already carries them, are an
//! optional secondary gate layered on top (§9 design decision) -- never a
//! replacement for the id-based graph.

use std::collections::HashSet;

use weft_repo::codec::task_init::task_branch_name;
use weft_repo::{GitError, Plan, Priority, Task, TaskId, TaskStatus};
use weft_repo::RepositoryGateway;

use super::plan_gen::dispatch_rank;

/// Computes the ready set and returns task ids in dispatch order:
/// `(priority desc, id asc)` (§4.4 tie-break). A task is a candidate if it
/// is `Pending` (never yet branched) or `InProgress` (a previously-stopped
/// task being re-offered, §4.4 decision on exit-code 2) and every id in
/// `depends_on` is `Completed` in this snapshot.
///
/// `InProgress` candidates whose task branch already exists are also
/// gated on their recorded string preconditions against the current
/// provides frontier; `Pending` candidates have no branch yet and
/// therefore no preconditions to check.
pub async fn ready_set(gateway: &RepositoryGateway, plan: &Plan) -> Result<Vec<TaskId>, GitError> {
    let completed: HashSet<TaskId> = plan
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.id)
        .collect();

    let candidates: Vec<&Task> = plan
        .tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress))
        .filter(|t| t.depends_on.iter().all(|d| completed.contains(d)))
        .collect();

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let provides = gateway.get_provides().await?;
    let mut ready: Vec<&Task> = Vec::with_capacity(candidates.len());
    for task in candidates {
        if task.status == TaskStatus::InProgress {
            let branch = task_branch_name(task.id, &task.description);
            if gateway.branch_exists(&branch).await? {
                let (init, _warnings) = gateway.read_task_init(&branch).await?;
                if !init.preconditions.iter().all(|p| provides.contains(p)) {
                    continue;
                }
            }
        }
        ready.push(task);
    }

    ready.sort_by(|a, b| rank_key(b).cmp(&rank_key(a)).then(a.id.cmp(&b.id)));
    Ok(ready.into_iter().map(|t| t.id).collect())
}

fn rank_key(task: &Task) -> u8 {
    dispatch_rank(priority_of(task))
}

fn priority_of(task: &Task) -> Priority {
    task.priority
}
