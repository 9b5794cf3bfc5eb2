//! Outer host (C9): the `weft` binary. Thin by design -- every subcommand
//! resolves configuration, builds whatever `weft-core`/`weft-repo` resources
//! it needs, and hands off; no orchestration logic lives here.

mod commands;
mod config;
mod control_server;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use config::ConfigOverrides;

#[derive(Parser)]
#[command(name = "weft", about = "Git-native autonomous development orchestrator")]
struct Cli {
    /// Repository to operate on (defaults to the current directory)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Address the HTTP control surface listens on, e.g. 127.0.0.1:4717
    #[arg(long, global = true)]
    control_bind_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare a repository to host sessions
    Init {
        /// Overwrite an existing .weft/config.toml
        #[arg(long)]
        force: bool,
    },
    /// Start (or resume) a session from a natural-language request
    Start {
        /// What to build or change
        request: String,
        /// Resume an existing session by name instead of deriving one
        #[arg(long)]
        session: Option<String>,
        /// Maximum number of tasks running at once
        #[arg(long)]
        max_parallel: Option<u32>,
        /// Harness to dispatch tasks under
        #[arg(long)]
        harness: Option<String>,
    },
    /// Show session and task progress
    Status {
        /// Session to show (omit to list all sessions)
        session: Option<String>,
    },
    /// Post a new requirement to a running session
    Intervene {
        /// The requirement to add
        text: String,
    },
    /// Stop a running session's active workers
    Stop,
    /// Change a running session's maximum parallelism
    SetMaxParallel {
        /// New maximum number of concurrently active workers
        max_parallel: u32,
    },
    /// Remove worktrees for already-merged task branches
    Cleanup,
    /// Print a shell completion script to stdout
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { force } => {
            let repo_path = cli.repo.unwrap_or_else(|| PathBuf::from("."));
            commands::init_cmd::run(&repo_path, force)
        }
        Commands::Start { request, session, max_parallel, harness } => {
            let config = config::resolve(ConfigOverrides {
                repo_path: cli.repo,
                max_parallel,
                harness_name: harness,
                control_bind_addr: cli.control_bind_addr,
            })?;
            commands::start_cmd::run(&config, session.as_deref(), &request).await
        }
        Commands::Status { session } => {
            let repo_path = cli.repo.unwrap_or_else(|| PathBuf::from("."));
            commands::status_cmd::run(&repo_path, session.as_deref()).await
        }
        Commands::Intervene { text } => {
            let addr = require_control_addr(cli.repo, cli.control_bind_addr)?;
            commands::intervene_cmd::run(&addr, &text).await
        }
        Commands::Stop => {
            let addr = require_control_addr(cli.repo, cli.control_bind_addr)?;
            commands::stop_cmd::run(&addr).await
        }
        Commands::SetMaxParallel { max_parallel } => {
            let addr = require_control_addr(cli.repo, cli.control_bind_addr)?;
            commands::set_max_parallel_cmd::run(&addr, max_parallel).await
        }
        Commands::Cleanup => {
            let repo_path = cli.repo.unwrap_or_else(|| PathBuf::from("."));
            commands::cleanup_cmd::run(&repo_path).await
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "weft", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
    Ok(())
}

/// Resolves the control surface address for commands that talk to an
/// already-running `weft start`: the `--control-bind-addr` flag, falling
/// back to whatever `.weft/config.toml`/`WEFT_CONTROL_BIND_ADDR` name.
fn require_control_addr(repo: Option<PathBuf>, override_addr: Option<String>) -> anyhow::Result<String> {
    if let Some(addr) = override_addr {
        return Ok(addr);
    }
    let config = config::resolve(ConfigOverrides { repo_path: repo, ..Default::default() })?;
    config.control_bind_addr.ok_or_else(|| {
        anyhow::anyhow!(
            "no control surface address configured; pass --control-bind-addr or set control_bind_addr \
             in .weft/config.toml (must match the address `weft start` was run with)"
        )
    })
}
