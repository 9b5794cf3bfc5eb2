//! Renders the natural-language instruction file copied into a worker's
//! worktree at `.weft/task-instructions/README.md`. The scheduler has no
//! opinion on prompt engineering beyond handing the agent the plan's
//! design doc and the one task it owns; a real deployment is expected to
//! layer richer prompts on top via a harness's own templating.

use weft_repo::Task;

pub const INSTRUCTION_FILE_PATH: &str = ".weft/task-instructions/README.md";

pub fn render(task: &Task, design_doc: &str) -> String {
    let mut out = format!("# Task {}: {}\n\n", task.id, task.description);
    if !design_doc.trim().is_empty() {
        out.push_str("## Design Doc\n\n");
        out.push_str(design_doc.trim());
        out.push_str("\n\n");
    }
    if !task.key_files.is_empty() {
        out.push_str("## Key Files\n\n");
        for f in &task.key_files {
            out.push_str(&format!("- {f}\n"));
        }
        out.push('\n');
    }
    out.push_str(
        "Commit your progress on this branch using the project's commit grammar. \
         Mark the task `completed` in your final commit once it is done.\n",
    );
    out
}

/// Capability strings recorded as `## Provides` on this task's merge
/// commit once it lands, derived from the files it is declared to touch.
/// A task with no key files provides nothing beyond its own completion.
pub fn provides_for(task: &Task) -> Vec<String> {
    task.key_files.iter().map(|f| format!("{f} exists")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_repo::{Priority, TaskStatus};

    fn sample() -> Task {
        Task {
            id: 1,
            description: "Create index.html".to_string(),
            status: TaskStatus::Pending,
            depends_on: vec![],
            key_files: vec!["index.html".to_string()],
            priority: Priority::Medium,
            estimated_time: None,
            gate_command: None,
        }
    }

    #[test]
    fn render_includes_task_description_and_key_files() {
        let text = render(&sample(), "Static site.");
        assert!(text.contains("Create index.html"));
        assert!(text.contains("index.html"));
        assert!(text.contains("Static site."));
    }

    #[test]
    fn provides_derives_one_capability_per_key_file() {
        assert_eq!(provides_for(&sample()), vec!["index.html exists".to_string()]);
    }
}
