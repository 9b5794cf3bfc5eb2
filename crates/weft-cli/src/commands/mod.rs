//! Subcommand implementations. Each module owns exactly one `weft`
//! subcommand and talks to `weft-core`/`weft-repo` the same way any other
//! embedder of those crates would -- nothing here is reachable from
//! outside the binary.

pub mod cleanup_cmd;
pub mod init_cmd;
pub mod intervene_cmd;
pub mod set_max_parallel_cmd;
pub mod start_cmd;
pub mod status_cmd;
pub mod stop_cmd;
