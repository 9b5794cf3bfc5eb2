//! Fixtures shared by `weft-repo` and `weft-core` tests: a throwaway git
//! repository with the `flow` integration branch already initialized.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// A temporary git repository with `flow` as its default branch and one
/// commit on it, ready to be handed to a `RepositoryGateway`.
pub struct TempRepo {
    dir: TempDir,
}

impl TempRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Creates a fresh repository under a new temp dir, on branch `flow`,
/// with a single commit so `flow` is a valid ref other branches can fork from.
pub fn init_flow_repo() -> TempRepo {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path();

    run_git(path, &["init", "--initial-branch=flow"]);
    run_git(path, &["config", "user.email", "weft-tests@example.invalid"]);
    run_git(path, &["config", "user.name", "weft-tests"]);
    run_git(path, &["commit", "--allow-empty", "-m", "initial commit"]);

    TempRepo { dir }
}

/// Reads the current commit message at `HEAD` on the given branch.
pub fn head_message(repo: &Path, branch: &str) -> String {
    let out = Command::new("git")
        .args(["log", "-1", "--format=%B", branch])
        .current_dir(repo)
        .output()
        .expect("run git log");
    assert!(out.status.success(), "git log failed: {}", String::from_utf8_lossy(&out.stderr));
    String::from_utf8_lossy(&out.stdout).trim_end().to_string()
}

/// Lists local branch names.
pub fn list_branches(repo: &Path) -> Vec<String> {
    let out = Command::new("git")
        .args(["branch", "--format=%(refname:short)"])
        .current_dir(repo)
        .output()
        .expect("run git branch");
    assert!(out.status.success());
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn run_git(dir: &Path, args: &[&str]) {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {args:?}: {e}"));
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
}
