//! A named collection of available harness adapters. Resolves the
//! `harness_name` configured per task (or globally) to a `&dyn Harness` at
//! dispatch time.

use std::collections::HashMap;

use super::trait_def::Harness;

#[derive(Default)]
pub struct HarnessRegistry {
    harnesses: HashMap<String, Box<dyn Harness>>,
}

impl HarnessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a harness under the name returned by `Harness::name`,
    /// replacing and returning any previous entry with that name.
    pub fn register(&mut self, harness: impl Harness + 'static) -> Option<Box<dyn Harness>> {
        let name = harness.name().to_string();
        self.harnesses.insert(name, Box::new(harness))
    }

    pub fn get(&self, name: &str) -> Option<&dyn Harness> {
        self.harnesses.get(name).map(|b| b.as_ref())
    }

    pub fn list(&self) -> Vec<&str> {
        self.harnesses.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.harnesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.harnesses.is_empty()
    }
}

impl std::fmt::Debug for HarnessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarnessRegistry")
            .field("harnesses", &self.harnesses.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::types::{AgentEvent, SessionHandle, SessionSpec};
    use anyhow::Result;
    use async_trait::async_trait;
    use futures::Stream;
    use std::pin::Pin;

    struct FakeHarness {
        harness_name: String,
    }

    impl FakeHarness {
        fn new(name: &str) -> Self {
            Self { harness_name: name.to_string() }
        }
    }

    #[async_trait]
    impl Harness for FakeHarness {
        fn name(&self) -> &str {
            &self.harness_name
        }

        async fn spawn(&self, _spec: &SessionSpec) -> Result<SessionHandle> {
            Ok(SessionHandle {
                pid: 42,
                stdin: None,
                task_id: 0,
                harness_name: self.harness_name.clone(),
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
    fn registry_starts_empty() {
        let registry = HarnessRegistry::new();
        assert!(registry.is_empty());
    }

    #[test]
    fn register_and_get() {
        let mut registry = HarnessRegistry::new();
        let old = registry.register(FakeHarness::new("alpha"));
        assert!(old.is_none());
        assert_eq!(registry.get("alpha").unwrap().name(), "alpha");
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = HarnessRegistry::new();
        registry.register(FakeHarness::new("alpha"));
        let old = registry.register(FakeHarness::new("alpha"));
        assert!(old.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_missing_returns_none() {
        let registry = HarnessRegistry::new();
        assert!(registry.get("nonexistent").is_none());
    }
}
