//! The `Harness` trait -- the adapter interface for agent runtimes (C6).
//!
//! Exactly one concrete implementation ships in this crate
//! ([`super::subprocess::SubprocessHarness`]); the trait exists so the
//! Worker Pool never hard-codes which agent binary it talks to.

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;

use super::types::{AgentEvent, SessionHandle, SessionSpec};

/// Adapter interface for spawning and managing a coding-agent session.
///
/// # Object Safety
///
/// Every method returns a concrete type or a boxed trait object, so `dyn
/// Harness` is usable and is exactly how [`super::registry::HarnessRegistry`]
/// stores adapters.
#[async_trait]
pub trait Harness: Send + Sync {
    /// Name this harness is registered under (e.g. `"subprocess"`).
    fn name(&self) -> &str;

    /// Start an agent session for one task. Implementations should set
    /// `spec.working_dir` as the child's current directory and inject
    /// `spec.env_vars`.
    async fn spawn(&self, spec: &SessionSpec) -> Result<SessionHandle>;

    /// Stream of events from a running session, terminated by
    /// `AgentEvent::Completed` or `AgentEvent::Error`.
    fn events(&self, handle: &SessionHandle) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

    /// Send a follow-up message to the agent's stdin.
    async fn send(&self, handle: &SessionHandle, message: &str) -> Result<()>;

    /// Terminate the session: SIGTERM, then SIGKILL if it outlives a
    /// short grace period.
    async fn kill(&self, handle: &SessionHandle) -> Result<()>;

    /// Whether the underlying process is still alive.
    async fn is_running(&self, handle: &SessionHandle) -> bool;
}

// Compile-time assertion that the trait stays object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Harness) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHarness;

    #[async_trait]
    impl Harness for NoopHarness {
        fn name(&self) -> &str {
            "noop"
        }

        async fn spawn(&self, _spec: &SessionSpec) -> Result<SessionHandle> {
            Ok(SessionHandle {
                pid: 0,
                stdin: None,
                task_id: 0,
                harness_name: "noop".to_string(),
            })
        }

        fn events(&self, _handle: &SessionHandle) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send>> {
            Box::pin(futures::stream::empty())
        }

        async fn send(&self, _handle: &SessionHandle, _message: &str) -> Result<()> {
            Ok(())
        }

        async fn kill(&self, _handle: &SessionHandle) -> Result<()> {
            Ok(())
        }

        async fn is_running(&self, _handle: &SessionHandle) -> bool {
            false
        }
    }

    #[test]
    fn harness_is_object_safe() {
        let harness: Box<dyn Harness> = Box::new(NoopHarness);
        assert_eq!(harness.name(), "noop");
    }

    #[tokio::test]
    async fn noop_harness_spawn_and_query() {
        let harness: Box<dyn Harness> = Box::new(NoopHarness);
        let spec = SessionSpec {
            task_id: 1,
            task_branch: "task/1-x".to_string(),
            working_dir: std::path::PathBuf::from("/tmp"),
            instructions: "do the thing".to_string(),
            env_vars: Default::default(),
            extra_tools: vec![],
        };
        let handle = harness.spawn(&spec).await.unwrap();
        assert_eq!(handle.pid, 0);
        assert!(!harness.is_running(&handle).await);
        harness.send(&handle, "hello").await.unwrap();
        harness.kill(&handle).await.unwrap();
    }
}
