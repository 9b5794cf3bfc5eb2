//! Worker Pool (C3), Control Bus (C5), Harness adapter layer (C6), and the
//! Scheduler / Orchestrator Loop (C4) that ties them together. This crate
//! owns no git state of its own -- every read and write of the flow/plan/
//! task branches goes through [`weft_repo::RepositoryGateway`].

pub mod bus;
pub mod config;
pub mod error;
pub mod harness;
pub mod pool;
pub mod scheduler;

pub use bus::{ControlBus, ControlBusConsumer, ControlEvent, WorkerCompletion};
pub use config::Config;
pub use error::{AgentRuntimeError, Cancelled, ValidationError};
pub use harness::{Harness, HarnessRegistry, SubprocessHarness};
pub use pool::{SlotStatus, WorkerPool, WorkerSnapshot};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerOutcome};
