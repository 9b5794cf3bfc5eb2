//! `weft init`: prepare a repository (fresh or existing) to host sessions
//! by making sure the `flow` integration branch exists, and writing a
//! starter `.weft/config.toml`.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};

const DEFAULT_CONFIG: &str = "\
# max_parallel = 1
# harness_name = \"subprocess\"
# harness_command = [\"echo\"]
# control_bind_addr = \"127.0.0.1:4717\"
";

pub fn run(repo_path: &Path, force: bool) -> Result<()> {
    std::fs::create_dir_all(repo_path)
        .with_context(|| format!("failed to create {}", repo_path.display()))?;

    if !repo_path.join(".git").exists() {
        run_git(repo_path, &["init", "--initial-branch=flow"])
            .context("failed to initialize a new git repository")?;
        run_git(repo_path, &["commit", "--allow-empty", "-m", "initial commit"])
            .context("failed to create the repository's first commit")?;
        println!("Initialized a new git repository at {} on branch flow.", repo_path.display());
    } else if !branch_exists(repo_path, "flow")? {
        let current = current_branch(repo_path)?;
        run_git(repo_path, &["branch", "flow", &current])
            .context("failed to create the flow branch")?;
        println!("Created flow branch from {current}.");
    } else {
        println!("flow branch already exists.");
    }

    let weft_dir = crate::config::weft_dir(repo_path);
    std::fs::create_dir_all(&weft_dir)
        .with_context(|| format!("failed to create {}", weft_dir.display()))?;
    let config_path = weft_dir.join("config.toml");
    if config_path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", config_path.display());
    }
    std::fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    println!("Config written to {}", config_path.display());
    Ok(())
}

fn branch_exists(repo_path: &Path, branch: &str) -> Result<bool> {
    let status = Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
        .current_dir(repo_path)
        .status()
        .context("failed to invoke git rev-parse")?;
    Ok(status.success())
}

fn current_branch(repo_path: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(repo_path)
        .output()
        .context("failed to invoke git rev-parse")?;
    if !output.status.success() {
        bail!("git rev-parse HEAD failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn run_git(repo_path: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .with_context(|| format!("failed to invoke git {args:?}"))?;
    if !output.status.success() {
        bail!("git {args:?} failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(())
}
