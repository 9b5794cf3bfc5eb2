//! Pure reads: `read_plan`, `read_task_init`, `read_latest_worker_commit`,
//! `get_provides`. None of these take the head lock — they never change
//! the main checkout's HEAD, only `git log`/`git show` against refs.

use std::collections::BTreeSet;

use crate::codec::merge::provides_frontier;
use crate::codec::model::{ParseWarning, Plan, TaskInit, WorkerCommit};
use crate::codec::plan::decode_plan;
use crate::codec::task_init::decode_task_init;
use crate::codec::worker_commit::decode_worker_commit;
use crate::error::GitError;

use super::RepositoryGateway;

impl RepositoryGateway {
    pub async fn read_plan(&self, branch: &str) -> Result<(Plan, Vec<ParseWarning>), GitError> {
        let message = self.head_message(branch).await?;
        Ok(decode_plan(&message))
    }

    /// Reads the first commit on a task branch (its init metadata).
    pub async fn read_task_init(&self, branch: &str) -> Result<(TaskInit, Vec<ParseWarning>), GitError> {
        let first_sha = self
            .run_history(&["log", "--reverse", "--format=%H", branch])
            .await?
            .lines()
            .next()
            .map(str::to_string)
            .ok_or_else(|| GitError::BranchNotFound(branch.to_string()))?;
        let message = self.commit_message(&first_sha).await?;
        Ok(decode_task_init(&message))
    }

    pub async fn read_latest_worker_commit(&self, branch: &str) -> Result<(WorkerCommit, Vec<ParseWarning>), GitError> {
        let message = self.head_message(branch).await?;
        Ok(decode_worker_commit(&message))
    }

    /// Reads merge commits reachable from `flow` (first-parent only, since
    /// only the Gateway's own `merge_task_branch` produces merge commits onto
    /// `flow`) and returns the union of their `## Provides` bullets.
    pub async fn get_provides(&self) -> Result<BTreeSet<String>, GitError> {
        let log = self
            .run_history(&["log", "--first-parent", "--merges", "--format=%B%x00", "flow"])
            .await
            .or_else(|e| match e {
                GitError::CommandFailed { .. } => Ok(String::new()),
                other => Err(other),
            })?;
        let messages = log.split('\0').filter(|m| !m.trim().is_empty());
        Ok(provides_frontier(messages))
    }

    async fn head_message(&self, branch: &str) -> Result<String, GitError> {
        self.run(&["log", "-1", "--format=%B", branch]).await
    }

    async fn commit_message(&self, sha: &str) -> Result<String, GitError> {
        self.run(&["show", "-s", "--format=%B", sha]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::model::{MergeRecord, Priority, Task, TaskStatus};
    use crate::gateway::branch::InstructionFile;

    #[tokio::test]
    async fn read_plan_round_trips_through_gateway() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        let plan = Plan {
            session_name: "s".to_string(),
            user_request: "r".to_string(),
            version: 1,
            design_doc: "d".to_string(),
            tech_stack: "t".to_string(),
            tasks: vec![Task {
                id: 1,
                description: "x".to_string(),
                status: TaskStatus::Pending,
                depends_on: vec![],
                key_files: vec![],
                priority: Priority::Medium,
                estimated_time: None,
                gate_command: None,
            }],
        };
        let (branch, _) = gw.create_plan_branch(&plan).await.unwrap();
        let (read_back, warnings) = gw.read_plan(&branch).await.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(read_back, plan);
    }

    #[tokio::test]
    async fn get_provides_unions_merge_commits() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        let init = crate::codec::model::TaskInit {
            id: 1,
            description: "a".to_string(),
            preconditions: vec![],
            provides: vec!["cap-a".to_string()],
            files: vec![],
            session_name: "s".to_string(),
            plan_branch: "plan/s".to_string(),
            plan_version: 1,
            depends_on: vec![],
            enables: vec![],
        };
        let (branch, _) = gw.create_task_branch(&init, &[] as &[InstructionFile]).await.unwrap();
        gw.merge_task_branch(
            &branch,
            &MergeRecord { provides: vec!["cap-a".to_string()], gate: None },
        )
        .await
        .unwrap();

        let provides = gw.get_provides().await.unwrap();
        assert!(provides.contains("cap-a"));
    }

    #[tokio::test]
    async fn get_provides_is_empty_set_before_any_merge() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        assert!(gw.get_provides().await.unwrap().is_empty());
    }
}
