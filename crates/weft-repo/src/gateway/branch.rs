//! `create_plan_branch`, `update_plan_branch`, `create_task_branch`,
//! `merge_task_branch` — the Gateway operations that mutate the main
//! checkout's HEAD and therefore run under `head_lock`.

use std::path::Path;

use crate::codec::merge::encode_merge_message;
use crate::codec::model::{MergeRecord, Plan, TaskInit};
use crate::codec::plan::encode_plan;
use crate::codec::task_init::{encode_task_init, task_branch_name};
use crate::error::GitError;

use super::RepositoryGateway;

/// An instruction file to be copied into a task's worktree and included in
/// its init commit. Content is entirely caller-supplied: the Gateway has no
/// opinion on agent prompts.
pub struct InstructionFile {
    pub relative_path: String,
    pub content: String,
}

impl RepositoryGateway {
    /// Creates `plan/<session-name>` from `flow` and writes the first plan
    /// commit. Fails with `BranchExists` if the branch is already there.
    /// Restores the prior checked-out branch before returning, on both the
    /// success and failure paths.
    pub async fn create_plan_branch(&self, plan: &Plan) -> Result<(String, String), GitError> {
        let branch = format!("plan/{}", plan.session_name);
        let _guard = self.head_lock.lock().await;

        if self.branch_exists(&branch).await? {
            return Err(GitError::BranchExists(branch));
        }

        let prior = self.current_branch().await?;

        let result = self.write_first_commit_on_new_branch(&branch, "flow", &encode_plan(plan)).await;

        match result {
            Ok(sha) => {
                self.restore_branch(&prior).await?;
                Ok((branch, sha))
            }
            Err(e) => {
                self.rollback_new_branch(&branch, &prior).await;
                Err(e)
            }
        }
    }

    /// Appends a new full-snapshot commit on an existing plan branch.
    pub async fn update_plan_branch(&self, plan_branch: &str, new_snapshot: &Plan) -> Result<String, GitError> {
        let _guard = self.head_lock.lock().await;

        if !self.branch_exists(plan_branch).await? {
            return Err(GitError::BranchNotFound(plan_branch.to_string()));
        }

        let prior = self.current_branch().await?;
        let result = self.append_commit_on_branch(plan_branch, &encode_plan(new_snapshot)).await;
        self.restore_branch(&prior).await?;
        result
    }

    /// Creates `task/<id>-<slug>` from `flow`, writes the init commit, and
    /// copies `instructions` into the new tree as part of that same commit.
    pub async fn create_task_branch(
        &self,
        init: &TaskInit,
        instructions: &[InstructionFile],
    ) -> Result<(String, String), GitError> {
        let branch = task_branch_name(init.id, &init.description);
        let _guard = self.head_lock.lock().await;

        if self.branch_exists(&branch).await? {
            return Err(GitError::BranchExists(branch));
        }

        let prior = self.current_branch().await?;

        let result = async {
            self.run(&["checkout", "-f", "flow"]).await?;
            self.run(&["checkout", "-b", &branch]).await?;

            for file in instructions {
                let path = self.repo_path.join(&file.relative_path);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, &file.content).await?;
                self.run(&["add", &file.relative_path]).await?;
            }

            let message = encode_task_init(init);
            let sha = self.commit_on_current_branch(&message, instructions.is_empty()).await?;
            Ok(sha)
        }
        .await;

        match result {
            Ok(sha) => {
                self.restore_branch(&prior).await?;
                Ok((branch, sha))
            }
            Err(e) => {
                self.rollback_new_branch(&branch, &prior).await;
                Err(e)
            }
        }
    }

    /// Merges `task_branch` into `flow`, writing `## Provides` (and, if
    /// present, `## Gate`) onto the merge commit. Aborts and returns
    /// `MergeConflict` rather than leaving the working copy mid-conflict.
    pub async fn merge_task_branch(
        &self,
        task_branch: &str,
        record: &MergeRecord,
    ) -> Result<String, GitError> {
        let _guard = self.head_lock.lock().await;
        let prior = self.current_branch().await?;

        let result = async {
            self.run(&["checkout", "-f", "flow"]).await?;
            let message = encode_merge_message(task_branch, record);
            let merge_result = self
                .run(&["merge", "--no-ff", task_branch, "-m", &message])
                .await;

            match merge_result {
                Ok(_) => self.run(&["rev-parse", "HEAD"]).await,
                Err(_) => {
                    // Leave no half-merged state behind.
                    let _ = self.run(&["merge", "--abort"]).await;
                    Err(GitError::MergeConflict {
                        branch: task_branch.to_string(),
                        target: "flow".to_string(),
                    })
                }
            }
        }
        .await;

        self.restore_branch(&prior).await?;
        result
    }

    async fn write_first_commit_on_new_branch(
        &self,
        branch: &str,
        from: &str,
        message: &str,
    ) -> Result<String, GitError> {
        self.run(&["checkout", "-f", from]).await?;
        self.run(&["checkout", "-b", branch]).await?;
        self.commit_on_current_branch(message, true).await
    }

    async fn append_commit_on_branch(&self, branch: &str, message: &str) -> Result<String, GitError> {
        self.run(&["checkout", "-f", branch]).await?;
        self.commit_on_current_branch(message, true).await
    }

    async fn commit_on_current_branch(&self, message: &str, allow_empty: bool) -> Result<String, GitError> {
        let mut args = vec!["commit"];
        if allow_empty {
            args.push("--allow-empty");
        }
        args.extend(["-m", message]);
        self.run(&args).await?;
        self.run(&["rev-parse", "HEAD"]).await
    }

    async fn restore_branch(&self, branch: &str) -> Result<(), GitError> {
        self.run(&["checkout", "-f", branch]).await?;
        Ok(())
    }

    /// Best-effort cleanup after a failed branch creation: delete the
    /// partially-created branch and restore the prior checkout. Failure to
    /// restore is only logged — the original error is what the caller sees.
    async fn rollback_new_branch(&self, branch: &str, prior: &str) {
        if let Err(e) = self.run(&["checkout", "-f", prior]).await {
            tracing::error!(branch, prior, error = %e, "failed to restore prior branch during rollback");
        }
        if let Err(e) = self.run(&["branch", "-D", branch]).await {
            tracing::warn!(branch, error = %e, "failed to delete partially-created branch during rollback");
        }
    }

    #[allow(dead_code)]
    fn repo_root(&self) -> &Path {
        &self.repo_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::model::{Priority, Task, TaskStatus};

    fn sample_plan() -> Plan {
        Plan {
            session_name: "build-site".to_string(),
            user_request: "Create index.html then add styles".to_string(),
            version: 1,
            design_doc: "Static site.".to_string(),
            tech_stack: "HTML".to_string(),
            tasks: vec![Task {
                id: 1,
                description: "Create index.html".to_string(),
                status: TaskStatus::Pending,
                depends_on: vec![],
                key_files: vec!["index.html".to_string()],
                priority: Priority::High,
                estimated_time: None,
                gate_command: None,
            }],
        }
    }

    #[tokio::test]
    async fn create_plan_branch_writes_commit_and_restores_head() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        let plan = sample_plan();

        let (branch, sha) = gw.create_plan_branch(&plan).await.unwrap();
        assert_eq!(branch, "plan/build-site");
        assert!(!sha.is_empty());
        assert_eq!(gw.current_branch().await.unwrap(), "flow");

        let msg = weft_test_utils::head_message(repo.path(), &branch);
        assert!(msg.starts_with("Initialize execution plan v1"));
    }

    #[tokio::test]
    async fn create_plan_branch_fails_if_already_exists() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        let plan = sample_plan();
        gw.create_plan_branch(&plan).await.unwrap();

        let err = gw.create_plan_branch(&plan).await.unwrap_err();
        assert!(matches!(err, GitError::BranchExists(_)));
        // HEAD must still be clean on flow after the failed attempt.
        assert_eq!(gw.current_branch().await.unwrap(), "flow");
    }

    #[tokio::test]
    async fn update_plan_branch_appends_full_snapshot() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        let mut plan = sample_plan();
        let (branch, _) = gw.create_plan_branch(&plan).await.unwrap();

        plan.version = 2;
        plan.tasks[0].status = TaskStatus::Completed;
        gw.update_plan_branch(&branch, &plan).await.unwrap();

        let msg = weft_test_utils::head_message(repo.path(), &branch);
        assert!(msg.starts_with("Update execution plan v2"));
        assert_eq!(gw.current_branch().await.unwrap(), "flow");
    }

    #[tokio::test]
    async fn create_task_branch_copies_instructions_into_init_commit() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        let init = TaskInit {
            id: 1,
            description: "Create index.html".to_string(),
            preconditions: vec![],
            provides: vec!["index.html exists".to_string()],
            files: vec!["index.html".to_string()],
            session_name: "build-site".to_string(),
            plan_branch: "plan/build-site".to_string(),
            plan_version: 1,
            depends_on: vec![],
            enables: vec![],
        };
        let instructions = vec![InstructionFile {
            relative_path: ".weft/task-instructions/README.md".to_string(),
            content: "Follow the plan.".to_string(),
        }];

        let (branch, _) = gw.create_task_branch(&init, &instructions).await.unwrap();
        assert_eq!(branch, "task/1-create-index-html");
        assert_eq!(gw.current_branch().await.unwrap(), "flow");

        let msg = weft_test_utils::head_message(repo.path(), &branch);
        assert!(msg.starts_with("Initialize task/1-create-index-html"));
    }

    #[tokio::test]
    async fn merge_task_branch_records_provides() {
        let repo = weft_test_utils::init_flow_repo();
        let gw = RepositoryGateway::new(repo.path());
        let init = TaskInit {
            id: 1,
            description: "Create index.html".to_string(),
            preconditions: vec![],
            provides: vec!["index.html exists".to_string()],
            files: vec![],
            session_name: "s".to_string(),
            plan_branch: "plan/s".to_string(),
            plan_version: 1,
            depends_on: vec![],
            enables: vec![],
        };
        let (branch, _) = gw.create_task_branch(&init, &[]).await.unwrap();

        let record = MergeRecord {
            provides: vec!["index.html exists".to_string()],
            gate: None,
        };
        gw.merge_task_branch(&branch, &record).await.unwrap();
        assert_eq!(gw.current_branch().await.unwrap(), "flow");

        let msg = weft_test_utils::head_message(repo.path(), "flow");
        assert!(msg.contains("index.html exists"));
    }
}
