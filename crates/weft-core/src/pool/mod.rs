//! Worker Pool (C3): a fixed set of slots, each either `Idle` or `Active`
//! with exactly one running agent session. Every slot's background task
//! reports exactly one `WorkerCompletion` event onto the Control Bus, no
//! matter how it ends -- normally, with an error, by validation failure,
//! or by being stopped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weft_repo::RepositoryGateway;

use crate::bus::{ControlBus, WorkerCompletion, EXIT_ERROR, EXIT_NORMAL, EXIT_STOPPED};
use crate::error::ValidationError;
use crate::harness::{AgentEvent, HarnessRegistry, SessionSpec};

const STOP_GRACE: Duration = Duration::from_secs(5);

enum SlotState {
    Idle,
    Active {
        task_branch: String,
        worktree_path: PathBuf,
        start_time: Instant,
        cancel: CancellationToken,
        join: JoinHandle<()>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SlotStatus {
    Idle,
    Active { task_branch: String, elapsed_secs: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSnapshot {
    pub worker_id: u32,
    pub status: SlotStatus,
}

/// A cheap-to-clone handle: every clone shares the same slot table, so a
/// clone handed to the HTTP control surface (§4.9) observes the same live
/// state the scheduler's copy does, the same way `ControlBus` shares one
/// queue across its producer handles.
#[derive(Clone)]
pub struct WorkerPool {
    gateway: RepositoryGateway,
    registry: Arc<HarnessRegistry>,
    bus: ControlBus,
    max_parallel: Arc<AtomicU32>,
    slots: Arc<Mutex<HashMap<u32, SlotState>>>,
}

impl WorkerPool {
    pub fn new(gateway: RepositoryGateway, registry: Arc<HarnessRegistry>, bus: ControlBus, max_parallel: u32) -> Self {
        Self {
            gateway,
            registry,
            bus,
            max_parallel: Arc::new(AtomicU32::new(max_parallel.max(1))),
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn update_max_parallel(&self, new_max: u32) {
        self.max_parallel.store(new_max.max(1), Ordering::SeqCst);
    }

    pub fn max_parallel(&self) -> u32 {
        self.max_parallel.load(Ordering::SeqCst)
    }

    /// Lowest-numbered idle slot, if the pool has spare capacity under
    /// `max_parallel`. Slots are numbered `1..=max_parallel` (§4.3).
    /// Deterministic by construction (§4.4: "worker-slot assignment picks
    /// the lowest-numbered idle slot").
    pub async fn next_idle_slot(&self) -> Option<u32> {
        let slots = self.slots.lock().await;
        let active = slots.values().filter(|s| matches!(s, SlotState::Active { .. })).count() as u32;
        if active >= self.max_parallel.load(Ordering::SeqCst) {
            return None;
        }
        (1..=self.max_parallel.load(Ordering::SeqCst))
            .find(|id| !matches!(slots.get(id), Some(SlotState::Active { .. })))
    }

    pub async fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let slots = self.slots.lock().await;
        let mut out: Vec<WorkerSnapshot> = slots
            .iter()
            .map(|(id, state)| WorkerSnapshot {
                worker_id: *id,
                status: match state {
                    SlotState::Idle => SlotStatus::Idle,
                    SlotState::Active { task_branch, start_time, .. } => SlotStatus::Active {
                        task_branch: task_branch.clone(),
                        elapsed_secs: start_time.elapsed().as_secs(),
                    },
                },
            })
            .collect();
        out.sort_by_key(|s| s.worker_id);
        out
    }

    /// Validates launch preconditions and, on success, starts the session
    /// in the background. Validation failures are returned synchronously
    /// *and* injected onto the bus as a `WorkerCompletion{exit_code:
    /// EXIT_ERROR}` so the scheduler treats them uniformly with real
    /// completions (§4.3).
    pub async fn launch(
        &self,
        worker_id: u32,
        harness_name: &str,
        spec: SessionSpec,
    ) -> Result<(), ValidationError> {
        if let Err(e) = self.validate_launch(worker_id, &spec).await {
            self.bus.worker_completion(WorkerCompletion {
                worker_id,
                task_branch: spec.task_branch.clone(),
                exit_code: EXIT_ERROR,
                error_message: Some(e.to_string()),
            });
            return Err(e);
        }

        if self.registry.get(harness_name).is_none() {
            let e = ValidationError::HarnessNotFound(harness_name.to_string());
            self.bus.worker_completion(WorkerCompletion {
                worker_id,
                task_branch: spec.task_branch.clone(),
                exit_code: EXIT_ERROR,
                error_message: Some(e.to_string()),
            });
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let task_branch = spec.task_branch.clone();
        let worktree_path = spec.working_dir.clone();

        let registry = self.registry.clone();
        let harness_name = harness_name.to_string();
        let bus = self.bus.clone();
        let slots = self.slots.clone();
        let run_cancel = cancel.clone();

        let join = tokio::spawn(run_session(
            worker_id,
            spec,
            registry,
            harness_name,
            bus,
            run_cancel,
            slots,
        ));

        let mut slots = self.slots.lock().await;
        slots.insert(
            worker_id,
            SlotState::Active { task_branch, worktree_path, start_time: Instant::now(), cancel, join },
        );
        Ok(())
    }

    async fn validate_launch(&self, worker_id: u32, spec: &SessionSpec) -> Result<(), ValidationError> {
        {
            let slots = self.slots.lock().await;
            if matches!(slots.get(&worker_id), Some(SlotState::Active { .. })) {
                return Err(ValidationError::SlotNotIdle(worker_id));
            }
            let active = slots.values().filter(|s| matches!(s, SlotState::Active { .. })).count() as u32;
            let max = self.max_parallel.load(Ordering::SeqCst);
            if active >= max {
                return Err(ValidationError::AtCapacity { active, max });
            }
        }

        if !self.gateway.branch_exists(&spec.task_branch).await.unwrap_or(false) {
            return Err(ValidationError::TaskBranchMissing(spec.task_branch.clone()));
        }

        validate_worktree(&spec.working_dir)?;
        Ok(())
    }

    /// Cancels the session in `worker_id`, if active, and waits (up to a
    /// grace period) for its background task to report completion and
    /// free the slot. A no-op (returns `false`) on an already-idle slot.
    pub async fn stop(&self, worker_id: u32) -> bool {
        let (cancel, join) = {
            let mut slots = self.slots.lock().await;
            match slots.remove(&worker_id) {
                Some(SlotState::Active { cancel, join, .. }) => (cancel, join),
                Some(idle) => {
                    slots.insert(worker_id, idle);
                    return false;
                }
                None => return false,
            }
        };
        cancel.cancel();

        let completed = match tokio::time::timeout(STOP_GRACE, join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(worker_id, error = %e, "worker task panicked while stopping");
                true
            }
            Err(_) => {
                warn!(worker_id, "stop did not observe completion within grace period");
                false
            }
        };

        // `run_session`'s own tail already reinserts `Idle` once it
        // finishes; this only matters on the timeout path, where the slot
        // would otherwise be left with no entry at all.
        let mut slots = self.slots.lock().await;
        slots.entry(worker_id).or_insert(SlotState::Idle);
        completed
    }

    pub async fn stop_all(&self) {
        let ids: Vec<u32> = {
            let slots = self.slots.lock().await;
            slots
                .iter()
                .filter(|(_, s)| matches!(s, SlotState::Active { .. }))
                .map(|(id, _)| *id)
                .collect()
        };
        let futures = ids.into_iter().map(|id| self.stop(id));
        futures::future::join_all(futures).await;
    }
}

fn validate_worktree(path: &Path) -> Result<(), ValidationError> {
    if !path.exists() {
        return Err(ValidationError::WorktreeMissing(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(ValidationError::WorktreeNotADirectory(path.to_path_buf()));
    }
    if !path.join(".git").exists() {
        return Err(ValidationError::WorktreeNotAGitDir(path.to_path_buf()));
    }
    const INSTRUCTION_FILE: &str = ".weft/task-instructions/README.md";
    if !path.join(INSTRUCTION_FILE).exists() {
        return Err(ValidationError::InstructionFileMissing {
            worktree: path.to_path_buf(),
            file: INSTRUCTION_FILE.to_string(),
        });
    }
    Ok(())
}

/// Runs one session to completion (or cancellation) and reports exactly
/// one `WorkerCompletion`, then marks its slot idle. This function is the
/// "finally" in "exactly-one completion guarantee": every `return` path
/// below passes through the same tail that sends the event and frees the
/// slot.
async fn run_session(
    worker_id: u32,
    spec: SessionSpec,
    registry: Arc<HarnessRegistry>,
    harness_name: String,
    bus: ControlBus,
    cancel: CancellationToken,
    slots: Arc<Mutex<HashMap<u32, SlotState>>>,
) {
    let task_branch = spec.task_branch.clone();
    let outcome = drive_session(&spec, &registry, &harness_name, &cancel).await;

    let (exit_code, error_message) = match outcome {
        Ok(()) if cancel.is_cancelled() => (EXIT_STOPPED, None),
        Ok(()) => (EXIT_NORMAL, None),
        Err(_) if cancel.is_cancelled() => (EXIT_STOPPED, None),
        Err(e) => (EXIT_ERROR, Some(e.to_string())),
    };

    info!(worker_id, task_branch, exit_code, "worker session finished");
    bus.worker_completion(WorkerCompletion {
        worker_id,
        task_branch,
        exit_code,
        error_message,
    });

    let mut slots = slots.lock().await;
    slots.insert(worker_id, SlotState::Idle);
}

async fn drive_session(
    spec: &SessionSpec,
    registry: &HarnessRegistry,
    harness_name: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let harness = registry
        .get(harness_name)
        .ok_or_else(|| anyhow::anyhow!(crate::error::AgentRuntimeError::init(format!(
            "harness {harness_name:?} vanished from the registry after validation"
        ))))?;

    let handle = harness.spawn(spec).await.map_err(|e| {
        anyhow::anyhow!(crate::error::AgentRuntimeError::init(e.to_string()))
    })?;

    let mut events = harness.events(&handle);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = harness.kill(&handle).await;
                return Ok(());
            }
            next = events.next() => {
                match next {
                    Some(AgentEvent::Error { message }) => {
                        return Err(anyhow::anyhow!(crate::error::AgentRuntimeError::running(message)));
                    }
                    Some(AgentEvent::Completed) => return Ok(()),
                    Some(_other) => continue,
                    None => return Ok(()),
                }
            }
        }
    }
}
