//! Trivial plan construction (§4.9): this binary carries no decomposition
//! intelligence of its own. Each natural-language request becomes exactly
//! one new task appended to the plan; a "session" is just the append-only
//! sequence of requests a user has made against one `plan/<name>` branch.
//! A real planner is expected to sit in front of this and hand it a
//! multi-task breakdown instead of raw text -- this module is the
//! fallback when none does.

use weft_repo::{Plan, Priority, Task, TaskId, TaskStatus};

/// Builds the next plan snapshot: `existing` (if any) plus one new
/// `Pending` task per entry in `requests`. Already-recorded tasks are
/// carried over unchanged -- completion status is never touched here,
/// keeping the extension monotonic (§4.4).
pub fn amend_plan(existing: Option<&Plan>, session_name: &str, requests: &[String]) -> Plan {
    let mut tasks: Vec<Task> = existing.map(|p| p.tasks.clone()).unwrap_or_default();
    let mut next_id: TaskId = tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;

    for request in requests {
        tasks.push(Task {
            id: next_id,
            description: request.clone(),
            status: TaskStatus::Pending,
            depends_on: vec![],
            key_files: vec![],
            priority: Priority::Medium,
            estimated_time: None,
            gate_command: None,
        });
        next_id += 1;
    }

    let user_request = match existing {
        Some(p) if !requests.is_empty() => format!("{}\n{}", p.user_request, requests.join("\n")),
        Some(p) => p.user_request.clone(),
        None => requests.join("\n"),
    };

    Plan {
        session_name: session_name.to_string(),
        user_request,
        version: existing.map(|p| p.version + 1).unwrap_or(1),
        design_doc: existing.map(|p| p.design_doc.clone()).unwrap_or_default(),
        tech_stack: existing.map(|p| p.tech_stack.clone()).unwrap_or_default(),
        tasks,
    }
}

/// Ordering key for the dispatch tie-break: `(priority desc, id asc)`.
pub fn dispatch_rank(priority: Priority) -> u8 {
    match priority {
        Priority::High => 2,
        Priority::Medium => 1,
        Priority::Low => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_creates_task_one() {
        let plan = amend_plan(None, "s", &["do a thing".to_string()]);
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].id, 1);
        assert_eq!(plan.version, 1);
    }

    #[test]
    fn second_request_appends_without_disturbing_first() {
        let first = amend_plan(None, "s", &["first".to_string()]);
        let mut completed = first.clone();
        completed.tasks[0].status = TaskStatus::Completed;

        let second = amend_plan(Some(&completed), "s", &["second".to_string()]);
        assert_eq!(second.tasks.len(), 2);
        assert_eq!(second.tasks[0].status, TaskStatus::Completed);
        assert_eq!(second.tasks[1].id, 2);
        assert_eq!(second.version, 2);
    }

    #[test]
    fn empty_requests_is_a_pure_version_bump() {
        let first = amend_plan(None, "s", &["first".to_string()]);
        let again = amend_plan(Some(&first), "s", &[]);
        assert_eq!(again.tasks, first.tasks);
        assert_eq!(again.version, 2);
    }
}
