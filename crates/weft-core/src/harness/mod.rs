//! Harness adapter layer (C6): the black-box boundary between the Worker
//! Pool and whatever runs an agent session. The orchestrator loop never
//! sees a concrete agent binary, only `dyn Harness` looked up by name from
//! a [`HarnessRegistry`].
//!
//! ```text
//! Worker Pool
//!     |
//!     v
//! HarnessRegistry --get("subprocess")--> &dyn Harness
//!     |                                        |
//!     |   spawn(spec) --------------------------+
//!     |        |
//!     |        v
//!     |   SessionHandle { pid, task_id, ... }
//!     |        |
//!     |   events(handle) --> Stream<AgentEvent>
//!     |   send(handle, msg)
//!     |   kill(handle)
//!     |   is_running(handle)
//! ```

pub mod registry;
pub mod subprocess;
pub mod trait_def;
pub mod types;

pub use registry::HarnessRegistry;
pub use subprocess::SubprocessHarness;
pub use trait_def::Harness;
pub use types::{AgentEvent, SessionHandle, SessionSpec};
