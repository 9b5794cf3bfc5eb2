//! Scheduler / Orchestrator Loop (C4): the decision engine. It never talks
//! to the agent runtime directly -- only to the Repository Gateway, the
//! Worker Pool, and the Control Bus (§4.4).
//!
//! ```text
//!      Idle --intervention--> Planning --> Dispatching <-------.
//!       ^                                     |  ^             |
//!       |                                     |  | merge ok    |
//!       `--------- Finalizing <---------------'  |             |
//!       |                                         |             |
//!       `--- stop ---- Waiting <------------------'   replan ---'
//!                         |  ^
//!                         `--' (one bus event handled per iteration)
//! ```

mod gate;
mod instructions;
mod plan_gen;
mod ready;

use std::collections::HashSet;

use tracing::{info, instrument, warn};

use weft_repo::codec::task_init::task_branch_name;
use weft_repo::{GateVerdict, MergeRecord, Plan, RepositoryGateway, TaskId, TaskInit, TaskStatus};

use crate::bus::{ControlBusConsumer, ControlEvent, WorkerCompletion, EXIT_ERROR, EXIT_NORMAL, EXIT_STOPPED};
use crate::harness::SessionSpec;
use crate::pool::{SlotStatus, WorkerPool};

pub use plan_gen::{amend_plan, dispatch_rank};
pub use ready::ready_set;

/// Everything about a session that doesn't belong to the Gateway, the
/// Pool, or the Bus: its name and which harness dispatched tasks run
/// under.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub session_name: String,
    pub harness_name: String,
}

/// How a call to [`Scheduler::run`] ended. All three are a return to
/// `Idle` in the state machine; this is *why* it returned there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerOutcome {
    /// Every task in the plan reached `Completed`.
    Finalized,
    /// The user sent `Stop`; active workers were cancelled and any
    /// already-queued interventions discarded.
    StoppedByUser,
    /// The bus's last producer was dropped with no further work pending.
    BusClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Planning,
    Dispatching,
    Waiting,
    Replanning,
    Finalizing,
}

/// Drives one session's plan to completion (or until the user stops it).
/// Construct once per `plan/<session-name>` branch; `run` consumes it.
pub struct Scheduler {
    gateway: RepositoryGateway,
    pool: WorkerPool,
    consumer: ControlBusConsumer,
    config: SchedulerConfig,
    plan_branch: Option<String>,
    plan: Option<Plan>,
    pending_requests: Vec<String>,
}

impl Scheduler {
    /// `resume_plan_branch`, if given, is read via the Gateway at startup
    /// instead of waiting for the first `Intervention` to create a fresh
    /// plan -- this is how a session picks back up after its host process
    /// restarted.
    pub fn new(
        gateway: RepositoryGateway,
        pool: WorkerPool,
        consumer: ControlBusConsumer,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            gateway,
            pool,
            consumer,
            config,
            plan_branch: None,
            plan: None,
            pending_requests: Vec::new(),
        }
    }

    pub async fn resume(mut self, plan_branch: &str) -> Result<Self, weft_repo::GitError> {
        let (plan, warnings) = self.gateway.read_plan(plan_branch).await?;
        for w in &warnings {
            warn!(%w, "plan decode warning while resuming session");
        }
        self.plan_branch = Some(plan_branch.to_string());
        self.plan = Some(plan);
        Ok(self)
    }

    /// Runs the state machine until it returns to `Idle` for a reason a
    /// caller needs to act on: the plan finished, the user stopped it, or
    /// the bus has nothing left to deliver.
    #[instrument(skip(self), fields(session = %self.config.session_name))]
    pub async fn run(mut self) -> anyhow::Result<SchedulerOutcome> {
        let mut phase = if self.plan.is_some() { Phase::Dispatching } else { Phase::Idle };
        loop {
            phase = match phase {
                Phase::Idle => match self.await_first_event().await? {
                    Some(next) => next,
                    None => return Ok(SchedulerOutcome::BusClosed),
                },
                Phase::Planning => self.on_planning().await?,
                Phase::Dispatching => self.on_dispatching().await?,
                Phase::Waiting => match self.on_waiting().await? {
                    WaitOutcome::Next(p) => p,
                    WaitOutcome::Stopped => return Ok(SchedulerOutcome::StoppedByUser),
                    WaitOutcome::BusClosed => return Ok(SchedulerOutcome::BusClosed),
                },
                Phase::Replanning => self.on_replanning().await?,
                Phase::Finalizing => {
                    self.on_finalizing();
                    return Ok(SchedulerOutcome::Finalized);
                }
            };
        }
    }

    async fn await_first_event(&mut self) -> anyhow::Result<Option<Phase>> {
        loop {
            match self.consumer.recv().await {
                None => return Ok(None),
                Some(ControlEvent::Intervention { text }) => {
                    self.pending_requests.push(text);
                    return Ok(Some(Phase::Planning));
                }
                Some(ControlEvent::Stop) => {
                    self.pool.stop_all().await;
                    self.consumer.drain_interventions();
                    continue;
                }
                Some(ControlEvent::ConfigUpdate { max_parallel }) => {
                    self.pool.update_max_parallel(max_parallel);
                    continue;
                }
                // Nothing is in flight while Idle; a stray completion or
                // stop-worker result has no task to attach to.
                Some(_) => continue,
            }
        }
    }

    async fn on_planning(&mut self) -> anyhow::Result<Phase> {
        let requests = std::mem::take(&mut self.pending_requests);
        let new_plan = amend_plan(self.plan.as_ref(), &self.config.session_name, &requests);
        if !new_plan.is_valid_dag() {
            anyhow::bail!("amended plan for session {:?} is not a valid DAG", self.config.session_name);
        }

        let branch = match &self.plan_branch {
            Some(branch) => {
                self.gateway.update_plan_branch(branch, &new_plan).await?;
                branch.clone()
            }
            None => {
                let (branch, _sha) = self.gateway.create_plan_branch(&new_plan).await?;
                branch
            }
        };

        info!(branch, version = new_plan.version, tasks = new_plan.tasks.len(), "plan written");
        self.plan_branch = Some(branch);
        self.plan = Some(new_plan);
        Ok(Phase::Dispatching)
    }

    async fn on_dispatching(&mut self) -> anyhow::Result<Phase> {
        loop {
            let plan = self.plan.clone().expect("plan must exist once Dispatching is reached");
            let ready = ready_set(&self.gateway, &plan).await?;
            let active = active_task_ids(&self.pool.snapshot().await);

            let Some(task_id) = ready.into_iter().find(|id| !active.contains(id)) else {
                break;
            };
            let Some(slot) = self.pool.next_idle_slot().await else {
                break;
            };
            self.launch_task(slot, task_id).await?;
        }
        Ok(Phase::Waiting)
    }

    async fn launch_task(&mut self, slot: u32, task_id: TaskId) -> anyhow::Result<()> {
        let plan = self.plan.as_ref().expect("plan must exist while dispatching");
        let task = plan
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
            .expect("ready() only returns ids present in the plan");

        let branch = task_branch_name(task.id, &task.description);
        if !self.gateway.branch_exists(&branch).await? {
            let init = TaskInit {
                id: task.id,
                description: task.description.clone(),
                preconditions: vec![],
                provides: instructions::provides_for(&task),
                files: task.key_files.clone(),
                session_name: self.config.session_name.clone(),
                plan_branch: self.plan_branch.clone().unwrap_or_default(),
                plan_version: plan.version,
                depends_on: task.depends_on.clone(),
                enables: enables_of(plan, task.id),
            };
            let files = vec![weft_repo::InstructionFile {
                relative_path: instructions::INSTRUCTION_FILE_PATH.to_string(),
                content: instructions::render(&task, &plan.design_doc),
            }];
            self.gateway.create_task_branch(&init, &files).await?;
        }

        let worktree = self.gateway.create_worktree(slot, &branch).await?;
        let spec = SessionSpec {
            task_id: task.id,
            task_branch: branch,
            working_dir: worktree,
            instructions: instructions::render(&task, &plan.design_doc),
            env_vars: Default::default(),
            extra_tools: vec![],
        };

        if let Err(e) = self.pool.launch(slot, &self.config.harness_name, spec).await {
            warn!(task_id, slot, error = %e, "launch rejected; awaiting its worker_completion event");
        }

        if task.status == TaskStatus::Pending {
            self.set_task_status(task_id, TaskStatus::InProgress).await?;
        }
        Ok(())
    }

    async fn on_waiting(&mut self) -> anyhow::Result<WaitOutcome> {
        let Some(event) = self.consumer.recv().await else {
            return Ok(WaitOutcome::BusClosed);
        };

        match event {
            ControlEvent::WorkerCompletion(completion) => {
                Ok(WaitOutcome::Next(self.handle_completion(completion).await?))
            }
            ControlEvent::Intervention { text } => {
                self.pending_requests.push(text);
                let idle = self.pool.snapshot().await.iter().all(|s| s.status == SlotStatus::Idle);
                Ok(WaitOutcome::Next(if idle { Phase::Replanning } else { Phase::Waiting }))
            }
            ControlEvent::ConfigUpdate { max_parallel } => {
                self.pool.update_max_parallel(max_parallel);
                Ok(WaitOutcome::Next(Phase::Dispatching))
            }
            ControlEvent::Stop => {
                self.pool.stop_all().await;
                self.consumer.drain_interventions();
                Ok(WaitOutcome::Stopped)
            }
            ControlEvent::StopWorkerResult { .. } => Ok(WaitOutcome::Next(Phase::Waiting)),
        }
    }

    async fn handle_completion(&mut self, completion: WorkerCompletion) -> anyhow::Result<Phase> {
        let task_id = task_id_from_branch(&completion.task_branch);
        self.gateway.remove_worktree(completion.worker_id).await?;

        match completion.exit_code {
            EXIT_STOPPED => {
                if let Some(id) = task_id {
                    self.set_task_status(id, TaskStatus::InProgress).await?;
                }
                info!(worker_id = completion.worker_id, task_id, "worker stopped, awaiting user guidance");
                Ok(Phase::Waiting)
            }
            EXIT_NORMAL => self.handle_normal_completion(&completion, task_id).await,
            code => {
                warn!(
                    worker_id = completion.worker_id,
                    task_id,
                    code,
                    error = ?completion.error_message,
                    "worker completed with an error"
                );
                if let Some(id) = task_id {
                    self.set_task_status(id, TaskStatus::Failed).await?;
                }
                Ok(Phase::Replanning)
            }
        }
    }

    async fn handle_normal_completion(
        &mut self,
        completion: &WorkerCompletion,
        task_id: Option<TaskId>,
    ) -> anyhow::Result<Phase> {
        let (commit, warnings) = self.gateway.read_latest_worker_commit(&completion.task_branch).await?;
        for w in &warnings {
            warn!(%w, task_branch = %completion.task_branch, "worker commit decode warning");
        }

        if commit.progress.status != TaskStatus::Completed {
            warn!(task_branch = %completion.task_branch, "worker exited normally but its latest commit is not completed");
            if let Some(id) = task_id {
                self.set_task_status(id, TaskStatus::Failed).await?;
            }
            return Ok(Phase::Replanning);
        }

        let task = task_id.and_then(|id| {
            self.plan.as_ref().and_then(|p| p.tasks.iter().find(|t| t.id == id).cloned())
        });

        if let Some(gate_cmd) = task.as_ref().and_then(|t| t.gate_command.as_deref()) {
            let worktree = self.gateway.worktree_path_for(completion.worker_id);
            let verdict = gate::run(gate_cmd, &worktree).await;
            if matches!(verdict, GateVerdict::Failed { .. }) {
                warn!(task_branch = %completion.task_branch, ?verdict, "gate failed, task left unmerged");
                if let Some(id) = task_id {
                    self.set_task_status(id, TaskStatus::Failed).await?;
                }
                return Ok(Phase::Replanning);
            }
        }

        let (init, _warnings) = self.gateway.read_task_init(&completion.task_branch).await?;
        let gate_record = task
            .as_ref()
            .and_then(|t| t.gate_command.as_ref())
            .map(|_| (weft_repo::GatePolicy::Auto, GateVerdict::Passed));
        let record = MergeRecord { provides: init.provides.clone(), gate: gate_record };
        self.gateway.merge_task_branch(&completion.task_branch, &record).await?;
        self.gateway.cleanup_merged_worktrees("flow").await?;

        if let Some(id) = task_id {
            self.set_task_status(id, TaskStatus::Completed).await?;
        }

        let all_done = self.plan.as_ref().is_some_and(|p| p.tasks.iter().all(|t| t.status == TaskStatus::Completed));
        Ok(if all_done { Phase::Finalizing } else { Phase::Dispatching })
    }

    async fn on_replanning(&mut self) -> anyhow::Result<Phase> {
        if self.pending_requests.is_empty() {
            // Nothing new to fold in; re-offer the current plan as-is.
            return Ok(Phase::Dispatching);
        }
        self.on_planning().await
    }

    fn on_finalizing(&self) {
        info!(
            session = %self.config.session_name,
            tasks = self.plan.as_ref().map(|p| p.tasks.len()).unwrap_or(0),
            "session finalized: every task completed"
        );
    }

    async fn set_task_status(&mut self, task_id: TaskId, status: TaskStatus) -> Result<(), weft_repo::GitError> {
        let mut plan = self.plan.clone().expect("plan must exist to update a task status");
        if let Some(task) = plan.tasks.iter_mut().find(|t| t.id == task_id) {
            task.status = status;
        }
        plan.version += 1;
        let branch = self.plan_branch.clone().expect("plan branch must exist to update a task status");
        self.gateway.update_plan_branch(&branch, &plan).await?;
        self.plan = Some(plan);
        Ok(())
    }
}

enum WaitOutcome {
    Next(Phase),
    Stopped,
    BusClosed,
}

fn task_id_from_branch(branch: &str) -> Option<TaskId> {
    branch.strip_prefix("task/")?.split('-').next()?.parse().ok()
}

fn active_task_ids(snapshot: &[crate::pool::WorkerSnapshot]) -> HashSet<TaskId> {
    snapshot
        .iter()
        .filter_map(|s| match &s.status {
            SlotStatus::Active { task_branch, .. } => task_id_from_branch(task_branch),
            SlotStatus::Idle => None,
        })
        .collect()
}

fn enables_of(plan: &Plan, id: TaskId) -> Vec<TaskId> {
    let mut ids: Vec<TaskId> =
        plan.tasks.iter().filter(|t| t.depends_on.contains(&id)).map(|t| t.id).collect();
    ids.sort_unstable();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ControlBus;
    use crate::harness::{AgentEvent, Harness, HarnessRegistry, SessionHandle};
    use async_trait::async_trait;
    use futures::Stream;
    use std::pin::Pin;
    use std::process::Command;
    use std::sync::Arc;
    use weft_repo::codec::worker_commit::encode_worker_commit;
    use weft_repo::{DesignSection, Priority as Prio, Progress, Task, WorkerCommit};

    /// Commits a completed worker progress commit directly into the
    /// worktree before signaling `Completed`, standing in for what a real
    /// agent session would have committed along the way.
    struct CompletingHarness;

    #[async_trait]
    impl Harness for CompletingHarness {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn spawn(&self, spec: &SessionSpec) -> anyhow::Result<SessionHandle> {
            let commit = WorkerCommit {
                task_id: spec.task_id,
                commit_kind: weft_repo::CommitKind::Implementation,
                step: Some((1, 1)),
                implementation_text: "Wrote index.html.".to_string(),
                design: DesignSection { overview: "n/a".to_string(), decisions: vec![], interfaces: vec![] },
                todos: vec![],
                progress: Progress { status: TaskStatus::Completed, done: 1, total: 1 },
            };
            let message = encode_worker_commit("finish the page", &commit);
            let status = Command::new("git")
                .args(["commit", "--allow-empty", "-m", &message])
                .current_dir(&spec.working_dir)
                .status()?;
            anyhow::ensure!(status.success(), "git commit failed in test worktree");
            Ok(SessionHandle { pid: 1, stdin: None, task_id: spec.task_id, harness_name: "scripted".to_string() })
        }
        fn events(&self, _handle: &SessionHandle) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send>> {
            Box::pin(futures::stream::once(async { AgentEvent::Completed }))
        }
        async fn send(&self, _handle: &SessionHandle, _message: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn kill(&self, _handle: &SessionHandle) -> anyhow::Result<()> {
            Ok(())
        }
        async fn is_running(&self, _handle: &SessionHandle) -> bool {
            false
        }
    }

    fn make_scheduler(gateway: RepositoryGateway, harness: impl Harness + 'static) -> (Scheduler, ControlBus) {
        let mut registry = HarnessRegistry::new();
        registry.register(harness);
        let (bus, consumer) = ControlBus::channel();
        let pool = WorkerPool::new(gateway.clone(), Arc::new(registry), bus.clone(), 1);
        let config = SchedulerConfig { session_name: "s".to_string(), harness_name: "scripted".to_string() };
        (Scheduler::new(gateway, pool, consumer, config), bus)
    }

    #[tokio::test]
    async fn single_task_session_finalizes_after_one_merge() {
        let repo = weft_test_utils::init_flow_repo();
        let gateway = RepositoryGateway::new(repo.path());
        let (scheduler, bus) = make_scheduler(gateway.clone(), CompletingHarness);

        bus.intervene("build a thing");
        drop(bus);

        let outcome = scheduler.run().await.unwrap();
        assert_eq!(outcome, SchedulerOutcome::Finalized);

        let provides = gateway.get_provides().await.unwrap();
        assert!(provides.is_empty(), "task had no key_files, so it provides nothing: {provides:?}");
    }

    #[tokio::test]
    async fn stop_during_waiting_returns_stopped_by_user() {
        struct HangingHarness;
        #[async_trait]
        impl Harness for HangingHarness {
            fn name(&self) -> &str {
                "scripted"
            }
            async fn spawn(&self, spec: &SessionSpec) -> anyhow::Result<SessionHandle> {
                Ok(SessionHandle { pid: 9, stdin: None, task_id: spec.task_id, harness_name: "scripted".to_string() })
            }
            fn events(&self, _handle: &SessionHandle) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send>> {
                Box::pin(futures::stream::pending())
            }
            async fn send(&self, _handle: &SessionHandle, _message: &str) -> anyhow::Result<()> {
                Ok(())
            }
            async fn kill(&self, _handle: &SessionHandle) -> anyhow::Result<()> {
                Ok(())
            }
            async fn is_running(&self, _handle: &SessionHandle) -> bool {
                true
            }
        }

        let repo = weft_test_utils::init_flow_repo();
        let gateway = RepositoryGateway::new(repo.path());
        let (scheduler, bus) = make_scheduler(gateway.clone(), HangingHarness);

        bus.intervene("build a thing");
        let stopper = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            stopper.stop();
        });

        let outcome = scheduler.run().await.unwrap();
        assert_eq!(outcome, SchedulerOutcome::StoppedByUser);

        let (plan, _) = gateway.read_plan("plan/s").await.unwrap();
        assert_eq!(plan.tasks[0].status, TaskStatus::InProgress);
    }

    #[test]
    fn task_id_parses_out_of_branch_name() {
        assert_eq!(task_id_from_branch("task/42-do-a-thing"), Some(42));
        assert_eq!(task_id_from_branch("flow"), None);
    }

    #[test]
    fn enables_lists_direct_dependents_sorted() {
        let plan = Plan {
            session_name: "s".to_string(),
            user_request: "r".to_string(),
            version: 1,
            design_doc: String::new(),
            tech_stack: String::new(),
            tasks: vec![
                Task { id: 1, description: "a".into(), status: TaskStatus::Pending, depends_on: vec![], key_files: vec![], priority: Prio::Medium, estimated_time: None, gate_command: None },
                Task { id: 3, description: "c".into(), status: TaskStatus::Pending, depends_on: vec![1], key_files: vec![], priority: Prio::Medium, estimated_time: None, gate_command: None },
                Task { id: 2, description: "b".into(), status: TaskStatus::Pending, depends_on: vec![1], key_files: vec![], priority: Prio::Medium, estimated_time: None, gate_command: None },
            ],
        };
        assert_eq!(enables_of(&plan, 1), vec![2, 3]);
    }
}
