//! `weft cleanup`: invokes `cleanup_merged_worktrees` on demand (§4.2).
//! The scheduler already runs this automatically after every successful
//! merge; this command exists for manual maintenance after an aborted
//! session leaves stray worktrees behind.

use std::path::Path;

use anyhow::{Context, Result};
use weft_repo::RepositoryGateway;

pub async fn run(repo_path: &Path) -> Result<()> {
    let gateway = RepositoryGateway::new(repo_path);
    let removed = gateway.cleanup_merged_worktrees("flow").await.context("cleanup_merged_worktrees failed")?;

    if removed.is_empty() {
        println!("No merged worktrees to clean up.");
    } else {
        println!("Removed worktrees for {} merged branch(es):", removed.len());
        for branch in removed {
            println!("  - {branch}");
        }
    }
    Ok(())
}
