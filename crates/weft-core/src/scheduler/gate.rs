//! Runs a task's configured gate command (§3 supplemental Gate Result) in
//! its worktree before the scheduler decides whether to merge. Only the
//! `auto` policy is exercised today -- no per-task policy field exists yet
//! to route a verdict to a human reviewer instead, so every configured
//! gate is treated as `auto` (see DESIGN.md).

use std::path::Path;

use tokio::process::Command;
use weft_repo::GateVerdict;

const OUTPUT_TRUNCATE_BYTES: usize = 4096;

/// Runs `command` via `sh -c` inside `working_dir`. A nonzero exit or a
/// failure to even spawn the shell both decode to `Failed`, carrying
/// whatever combined stdout/stderr (or spawn error) is available.
pub async fn run(command: &str, working_dir: &Path) -> GateVerdict {
    let output = Command::new("sh").arg("-c").arg(command).current_dir(working_dir).output().await;

    match output {
        Ok(out) if out.status.success() => GateVerdict::Passed,
        Ok(out) => {
            let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&out.stderr));
            GateVerdict::Failed { output: Some(truncate(&combined)) }
        }
        Err(e) => GateVerdict::Failed { output: Some(format!("failed to run gate command: {e}")) },
    }
}

fn truncate(s: &str) -> String {
    if s.len() <= OUTPUT_TRUNCATE_BYTES {
        return s.to_string();
    }
    // `OUTPUT_TRUNCATE_BYTES` may fall inside a multibyte char; back up to
    // the nearest char boundary so the slice below can't panic.
    let mut cut = OUTPUT_TRUNCATE_BYTES;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (truncated)", &s[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passing_command_is_passed() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = run("true", dir.path()).await;
        assert_eq!(verdict, GateVerdict::Passed);
    }

    #[tokio::test]
    async fn failing_command_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = run("echo boom && false", dir.path()).await;
        match verdict {
            GateVerdict::Failed { output: Some(out) } => assert!(out.contains("boom")),
            other => panic!("expected Failed with output, got {other:?}"),
        }
    }

    #[test]
    fn truncate_does_not_split_a_multibyte_char_at_the_boundary() {
        // One multibyte char ('é', 2 bytes) straddling the cutoff: the char
        // starting at byte OUTPUT_TRUNCATE_BYTES - 1 would be split by a
        // naive byte slice at OUTPUT_TRUNCATE_BYTES.
        let mut s = "a".repeat(OUTPUT_TRUNCATE_BYTES - 1);
        s.push('é');
        s.push_str(&"b".repeat(100));
        let truncated = truncate(&s);
        assert!(truncated.ends_with("... (truncated)"));
    }

    #[test]
    fn truncate_leaves_short_output_untouched() {
        assert_eq!(truncate("short"), "short");
    }
}
