//! `weft status`: a read-only snapshot of the repository's sessions. Needs
//! no running scheduler -- everything here comes straight off `flow` and
//! the `plan/*` branches via the Gateway's pure read operations.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use weft_repo::{RepositoryGateway, TaskStatus};

pub async fn run(repo_path: &Path, session: Option<&str>) -> Result<()> {
    let gateway = RepositoryGateway::new(repo_path);

    let branches = match session {
        Some(name) => vec![format!("plan/{name}")],
        None => plan_branches(repo_path)?,
    };

    if branches.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    for branch in branches {
        let (plan, warnings) = gateway
            .read_plan(&branch)
            .await
            .with_context(|| format!("failed to read {branch}"))?;
        for w in &warnings {
            eprintln!("warning: {} ({})", w.message, w.context);
        }

        println!("Session: {} ({branch})", plan.session_name);
        println!("Request: {}", plan.user_request.lines().next().unwrap_or(""));
        println!("Version: {}", plan.version);

        let (done, total) = (
            plan.tasks.iter().filter(|t| t.status == TaskStatus::Completed).count(),
            plan.tasks.len(),
        );
        println!("Progress: {done}/{total} tasks completed");
        println!();

        for task in &plan.tasks {
            let icon = match task.status {
                TaskStatus::Pending => ".",
                TaskStatus::InProgress => "*",
                TaskStatus::Completed => "+",
                TaskStatus::Failed => "!",
            };
            println!("  [{icon}] task {}: {} ({})", task.id, task.description, task.status);
        }
        println!();
    }

    Ok(())
}

fn plan_branches(repo_path: &Path) -> Result<Vec<String>> {
    let output = Command::new("git")
        .args(["for-each-ref", "--format=%(refname:short)", "refs/heads/plan/"])
        .current_dir(repo_path)
        .output()
        .context("failed to list plan branches")?;
    if !output.status.success() {
        anyhow::bail!("git for-each-ref failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect())
}
