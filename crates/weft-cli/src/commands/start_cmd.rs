//! `weft start <request>`: starts (or resumes) a session, drives the
//! scheduler until it returns to `Idle`, and prints progress lines. This
//! command contains no decomposition intelligence of its own (§4.9) --
//! each distinct natural-language request becomes one task via
//! `weft_core::scheduler::amend_plan`'s trivial fallback.

use std::sync::Arc;

use anyhow::{Context, Result};
use weft_core::{
    Config, ControlBus, HarnessRegistry, Scheduler, SchedulerConfig, SchedulerOutcome, SubprocessHarness, WorkerPool,
};
use weft_repo::{codec::task_init::slugify, RepositoryGateway};

pub async fn run(config: &Config, session: Option<&str>, request: &str) -> Result<()> {
    let gateway = RepositoryGateway::new(&config.repo_path);

    let session_name = match session {
        Some(name) => name.to_string(),
        None => derive_session_name(&gateway, request).await?,
    };
    let plan_branch = format!("plan/{session_name}");
    let resuming = gateway.branch_exists(&plan_branch).await?;

    let mut registry = HarnessRegistry::new();
    registry.register(SubprocessHarness::new(
        config.harness_name.clone(),
        config.harness_command.clone(),
    ));
    let registry = Arc::new(registry);

    let (bus, consumer) = ControlBus::channel();
    let pool = WorkerPool::new(gateway.clone(), registry, bus.clone(), config.max_parallel);

    let server_handle = match &config.control_bind_addr {
        Some(addr) => {
            let addr = addr.clone();
            let bus_for_server = bus.clone();
            let pool_for_server = pool.clone();
            println!("Control surface listening on http://{addr}");
            Some(tokio::spawn(async move {
                if let Err(e) = crate::control_server::serve(&addr, bus_for_server, pool_for_server).await {
                    tracing::error!(error = %e, "control surface exited with an error");
                }
            }))
        }
        None => None,
    };

    bus.intervene(request);
    println!("Session {session_name:?} ({})", if resuming { "resuming" } else { "new" });

    let scheduler_config = SchedulerConfig { session_name: session_name.clone(), harness_name: config.harness_name.clone() };
    let mut scheduler = Scheduler::new(gateway.clone(), pool, consumer, scheduler_config);
    if resuming {
        scheduler = scheduler.resume(&plan_branch).await.context("resuming existing session")?;
    }

    let outcome = scheduler.run().await.context("scheduler run failed")?;
    if let Some(handle) = server_handle {
        handle.abort();
    }

    match outcome {
        SchedulerOutcome::Finalized => println!("Session {session_name:?} finalized: every task completed."),
        SchedulerOutcome::StoppedByUser => println!("Session {session_name:?} stopped by user."),
        SchedulerOutcome::BusClosed => println!("Session {session_name:?} ended: control bus closed."),
    }

    crate::commands::status_cmd::run(&config.repo_path, Some(&session_name)).await
}

async fn derive_session_name(gateway: &RepositoryGateway, request: &str) -> Result<String> {
    let words: Vec<&str> = request.split_whitespace().take(6).collect();
    let base = slugify(&words.join(" "));
    // A request that slugifies to nothing (emoji-only, punctuation-only)
    // still needs a distinct branch name; fall back to a timestamp the
    // same way `gator-core`'s plan generator names a fallback session.
    let base = if base.is_empty() {
        format!("session-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S"))
    } else {
        base
    };

    let mut candidate = base.clone();
    let mut n = 2;
    while gateway.branch_exists(&format!("plan/{candidate}")).await.unwrap_or(false) {
        candidate = format!("{base}-{n}");
        n += 1;
    }
    Ok(candidate)
}
