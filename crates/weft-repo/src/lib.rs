//! Commit Codec (C1) and Repository Gateway (C2): the only two components
//! that know the commit message grammar and the only one (the Gateway) that
//! shells out to `git`. No external database is linked anywhere in this
//! crate — the repository itself is the state store.

pub mod codec;
pub mod error;
pub mod gateway;

pub use codec::model::*;
pub use error::GitError;
pub use gateway::branch::InstructionFile;
pub use gateway::worktree::WorktreeEntry;
pub use gateway::RepositoryGateway;
