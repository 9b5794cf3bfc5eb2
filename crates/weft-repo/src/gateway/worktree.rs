//! `create_worktree`, `remove_worktree`, `cleanup_merged_worktrees` — the
//! Gateway operations that manage `.worktrees/worker-<N>` checkouts.

use crate::error::GitError;

use super::RepositoryGateway;

/// Deterministic worktree directory name for a given worker slot.
pub fn worktree_dir_name(worker_id: u32) -> String {
    format!("worker-{worker_id}")
}

impl RepositoryGateway {
    /// The path a worker's worktree lives (or would live) at, without
    /// touching git. Callers that already know a worktree is attached (e.g.
    /// to run a command inside it) use this instead of re-deriving
    /// `.worktrees/worker-<N>` themselves.
    pub fn worktree_path_for(&self, worker_id: u32) -> std::path::PathBuf {
        self.worktrees_dir().join(worktree_dir_name(worker_id))
    }

    /// Attaches a working directory under `.worktrees/worker-<worker_id>`
    /// bound to `task_branch`. Idempotent: an existing worktree at that path
    /// is force-removed first.
    pub async fn create_worktree(&self, worker_id: u32, task_branch: &str) -> Result<std::path::PathBuf, GitError> {
        let _guard = self.head_lock.lock().await;

        let path = self.worktrees_dir().join(worktree_dir_name(worker_id));
        if path.exists() {
            self.force_remove_worktree_at(&path).await?;
        }

        let path_str = path.to_string_lossy().to_string();
        self.run(&["worktree", "add", "--force", &path_str, task_branch]).await?;
        Ok(path)
    }

    /// Force-removes the worktree for `worker_id`. Missing is success.
    pub async fn remove_worktree(&self, worker_id: u32) -> Result<(), GitError> {
        let _guard = self.head_lock.lock().await;
        let path = self.worktrees_dir().join(worktree_dir_name(worker_id));
        if !path.exists() {
            // Still prune stale metadata in case a prior removal was partial.
            let _ = self.run(&["worktree", "prune"]).await;
            return Ok(());
        }
        self.force_remove_worktree_at(&path).await
    }

    /// Removes any worktree under `.worktrees/` whose bound branch is an
    /// ancestor of `target_ref`, then prunes stale metadata. Invoked
    /// automatically after every successful merge (see scheduler) and also
    /// exposed here for on-demand maintenance.
    pub async fn cleanup_merged_worktrees(&self, target_ref: &str) -> Result<Vec<String>, GitError> {
        let _guard = self.head_lock.lock().await;
        let mut removed = Vec::new();

        let list_output = self.run(&["worktree", "list", "--porcelain"]).await?;
        for entry in parse_porcelain_worktrees(&list_output) {
            if entry.path == self.repo_path {
                continue; // never touch the main checkout
            }
            let Some(branch) = &entry.branch else { continue };
            let is_ancestor = self
                .run(&["merge-base", "--is-ancestor", branch, target_ref])
                .await
                .is_ok();
            if is_ancestor {
                self.force_remove_worktree_at(&entry.path).await?;
                removed.push(branch.clone());
            }
        }
        self.run(&["worktree", "prune"]).await?;
        Ok(removed)
    }

    pub async fn list_worktrees(&self) -> Result<Vec<WorktreeEntry>, GitError> {
        let output = self.run(&["worktree", "list", "--porcelain"]).await?;
        Ok(parse_porcelain_worktrees(&output))
    }

    async fn force_remove_worktree_at(&self, path: &std::path::Path) -> Result<(), GitError> {
        let path_str = path.to_string_lossy().to_string();
        match self.run(&["worktree", "remove", "--force", &path_str]).await {
            Ok(_) => Ok(()),
            Err(GitError::CommandFailed { stderr, .. }) if stderr.contains("is not a working tree") => {
                // Directory already gone from git's perspective: prune and move on.
                self.run(&["worktree", "prune"]).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorktreeEntry {
    pub path: std::path::PathBuf,
    pub branch: Option<String>,
}

fn parse_porcelain_worktrees(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut path = None;
    let mut branch = None;

    for line in output.lines() {
        if let Some(p) = line.strip_prefix("worktree ") {
            if let Some(path) = path.take() {
                entries.push(WorktreeEntry { path, branch: branch.take() });
            }
            path = Some(std::path::PathBuf::from(p));
        } else if let Some(b) = line.strip_prefix("branch ") {
            branch = Some(b.trim_start_matches("refs/heads/").to_string());
        } else if line.is_empty() {
            if let Some(path) = path.take() {
                entries.push(WorktreeEntry { path, branch: branch.take() });
            }
        }
    }
    if let Some(path) = path.take() {
        entries.push(WorktreeEntry { path, branch: branch.take() });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::model::TaskInit;
    use crate::gateway::branch::InstructionFile;

    async fn setup_task_branch(gw: &RepositoryGateway) -> String {
        let init = TaskInit {
            id: 1,
            description: "Create index.html".to_string(),
            preconditions: vec![],
            provides: vec![],
            files: vec![],
            session_name: "s".to_string(),
            plan_branch: "plan/s".to_string(),
            plan_version: 1,
            depends_on: vec![],
            enables: vec![],
        };
        gw.create_task_branch(&init, &[] as &[InstructionFile]).await.unwrap().0
    }

    #[tokio::test]
    async fn create_and_remove_worktree_round_trips() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        let branch = setup_task_branch(&gw).await;

        let path = gw.create_worktree(1, &branch).await.unwrap();
        assert!(path.exists());

        gw.remove_worktree(1).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn remove_worktree_is_idempotent_when_absent() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        gw.remove_worktree(99).await.unwrap();
        gw.remove_worktree(99).await.unwrap();
    }

    #[tokio::test]
    async fn create_worktree_is_idempotent_when_already_present() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        let branch = setup_task_branch(&gw).await;

        gw.create_worktree(1, &branch).await.unwrap();
        let path = gw.create_worktree(1, &branch).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn cleanup_merged_worktrees_removes_only_merged_branches() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        let branch = setup_task_branch(&gw).await;
        let path = gw.create_worktree(1, &branch).await.unwrap();

        // Not yet merged: cleanup against flow must leave it alone.
        let removed = gw.cleanup_merged_worktrees("flow").await.unwrap();
        assert!(removed.is_empty());
        assert!(path.exists());

        gw.merge_task_branch(
            &branch,
            &crate::codec::model::MergeRecord { provides: vec![], gate: None },
        )
        .await
        .unwrap();

        let removed = gw.cleanup_merged_worktrees("flow").await.unwrap();
        assert_eq!(removed, vec![branch]);
        assert!(!path.exists());
    }

    #[test]
    fn porcelain_parser_handles_multiple_entries() {
        let output = "worktree /repo\nHEAD abc\nbranch refs/heads/flow\n\nworktree /repo/.worktrees/worker-1\nHEAD def\nbranch refs/heads/task/1-x\n";
        let entries = parse_porcelain_worktrees(output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].branch.as_deref(), Some("task/1-x"));
    }
}
