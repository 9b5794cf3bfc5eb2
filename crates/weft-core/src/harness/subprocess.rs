//! The one concrete harness this crate ships: spawns a configured command
//! line as a subprocess, feeds it the task instructions on stdin, and
//! parses newline-delimited JSON events off its stdout.
//!
//! Line shape (one JSON object per line, trailing newline):
//! `{"type": "message"|"tool_call"|"tool_result"|"error"|"completed", ...}`.
//! A line that isn't valid JSON, or whose `type` isn't recognized, yields
//! an `AgentEvent::Error` rather than aborting the stream -- the rest of
//! the session's output is still worth reading.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::trait_def::Harness;
use super::types::{AgentEvent, SessionHandle, SessionSpec};

struct ProcessState {
    child: Child,
    stdout: Option<ChildStdout>,
    stdin: Option<ChildStdin>,
}

/// Harness adapter that runs a configured command (`config.harness_command`)
/// as the agent. The command is expected to read instructions from stdin
/// and write one JSON event per line to stdout.
#[derive(Clone)]
pub struct SubprocessHarness {
    name: String,
    command: Vec<String>,
    processes: Arc<Mutex<HashMap<u32, ProcessState>>>,
}

impl std::fmt::Debug for SubprocessHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubprocessHarness")
            .field("name", &self.name)
            .field("command", &self.command)
            .finish()
    }
}

impl SubprocessHarness {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            processes: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn parse_json_line(line: &str) -> Result<AgentEvent> {
    let v: serde_json::Value = serde_json::from_str(line).context("malformed event JSON")?;
    let kind = v.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let event = match kind {
        "message" => AgentEvent::Message {
            role: v.get("role").and_then(|r| r.as_str()).unwrap_or("assistant").to_string(),
            content: v.get("content").and_then(|c| c.as_str()).unwrap_or_default().to_string(),
        },
        "tool_call" => AgentEvent::ToolCall {
            tool: v.get("tool").and_then(|t| t.as_str()).unwrap_or("unknown").to_string(),
            input: v.get("input").cloned().unwrap_or(serde_json::Value::Null),
        },
        "tool_result" => AgentEvent::ToolResult {
            tool: v.get("tool").and_then(|t| t.as_str()).unwrap_or("unknown").to_string(),
            output: v.get("output").cloned().unwrap_or(serde_json::Value::Null),
        },
        "error" => AgentEvent::Error {
            message: v.get("message").and_then(|m| m.as_str()).unwrap_or("unknown error").to_string(),
        },
        "completed" => AgentEvent::Completed,
        other => bail!("unrecognized event type {other:?}"),
    };
    Ok(event)
}

#[async_trait]
impl Harness for SubprocessHarness {
    fn name(&self) -> &str {
        &self.name
    }

    async fn spawn(&self, spec: &SessionSpec) -> Result<SessionHandle> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("harness {:?} has an empty command", self.name);
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&spec.working_dir)
            .envs(&spec.env_vars)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().with_context(|| format!("spawning harness command {program:?}"))?;
        let pid = child.id().context("spawned child has no pid")?;

        let mut stdin = child.stdin.take();
        if let Some(stdin) = stdin.as_mut() {
            stdin.write_all(spec.instructions.as_bytes()).await?;
        }
        let stdout = child.stdout.take();

        let mut processes = self.processes.lock().await;
        processes.insert(pid, ProcessState { child, stdout, stdin });

        Ok(SessionHandle {
            pid,
            stdin: None,
            task_id: spec.task_id,
            harness_name: self.name.clone(),
        })
    }

    fn events(&self, handle: &SessionHandle) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send>> {
        let processes = self.processes.clone();
        let pid = handle.pid;

        Box::pin(async_stream::stream! {
            let stdout = {
                let mut processes = processes.lock().await;
                processes.get_mut(&pid).and_then(|p| p.stdout.take())
            };
            let Some(stdout) = stdout else {
                yield AgentEvent::Error { message: format!("no stdout recorded for pid {pid}") };
                yield AgentEvent::Completed;
                return;
            };

            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match parse_json_line(&line) {
                            Ok(event) => {
                                let is_terminal = matches!(event, AgentEvent::Completed);
                                yield event;
                                if is_terminal {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(pid, error = %e, line, "dropping unparseable harness event line");
                                yield AgentEvent::Error { message: e.to_string() };
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield AgentEvent::Error { message: format!("reading harness stdout: {e}") };
                        break;
                    }
                }
            }
            yield AgentEvent::Completed;
        })
    }

    async fn send(&self, handle: &SessionHandle, message: &str) -> Result<()> {
        let mut processes = self.processes.lock().await;
        let Some(state) = processes.get_mut(&handle.pid) else {
            bail!("no active session for pid {}", handle.pid);
        };
        let Some(stdin) = state.stdin.as_mut() else {
            bail!("session for pid {} has no open stdin", handle.pid);
        };
        stdin.write_all(message.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        Ok(())
    }

    async fn kill(&self, handle: &SessionHandle) -> Result<()> {
        let pid = handle.pid;
        let mut processes = self.processes.lock().await;
        let Some(state) = processes.get_mut(&pid) else {
            debug!(pid, "kill called but no process recorded (already reaped?)");
            return Ok(());
        };

        #[cfg(unix)]
        {
            let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
            if ret != 0 {
                warn!(pid, "SIGTERM failed, proceeding straight to SIGKILL");
            }
        }

        let exited = tokio::time::timeout(std::time::Duration::from_secs(5), state.child.wait()).await;
        if exited.is_err() || matches!(exited, Ok(Err(_))) {
            debug!(pid, "process did not exit after SIGTERM, sending SIGKILL");
            let _ = state.child.kill().await;
        }
        processes.remove(&pid);
        Ok(())
    }

    async fn is_running(&self, handle: &SessionHandle) -> bool {
        let mut processes = self.processes.lock().await;
        match processes.get_mut(&handle.pid) {
            Some(state) => matches!(state.child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn spec(working_dir: std::path::PathBuf, instructions: &str) -> SessionSpec {
        SessionSpec {
            task_id: 1,
            task_branch: "task/1-x".to_string(),
            working_dir,
            instructions: instructions.to_string(),
            env_vars: Default::default(),
            extra_tools: vec![],
        }
    }

    #[tokio::test]
    async fn spawns_and_parses_emitted_events() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("agent.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo '{\"type\":\"message\",\"role\":\"assistant\",\"content\":\"hi\"}'\n\
             echo '{\"type\":\"completed\"}'\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let harness = SubprocessHarness::new("sh-agent", vec!["sh".to_string(), script.to_string_lossy().to_string()]);
        let handle = harness.spawn(&spec(dir.path().to_path_buf(), "do it")).await.unwrap();
        let events: Vec<AgentEvent> = harness.events(&handle).collect().await;

        assert!(events.iter().any(|e| matches!(e, AgentEvent::Message { content, .. } if content == "hi")));
        assert_eq!(events.last().unwrap(), &AgentEvent::Completed);
    }

    #[tokio::test]
    async fn unparseable_line_yields_error_event_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("agent.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'not json'\necho '{\"type\":\"completed\"}'\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let harness = SubprocessHarness::new("sh-agent", vec!["sh".to_string(), script.to_string_lossy().to_string()]);
        let handle = harness.spawn(&spec(dir.path().to_path_buf(), "")).await.unwrap();
        let events: Vec<AgentEvent> = harness.events(&handle).collect().await;

        assert!(events.iter().any(|e| matches!(e, AgentEvent::Error { .. })));
        assert_eq!(events.last().unwrap(), &AgentEvent::Completed);
    }

    #[tokio::test]
    async fn kill_terminates_subprocess() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sleepy.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 3600\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let harness = SubprocessHarness::new("sleepy", vec!["sh".to_string(), script.to_string_lossy().to_string()]);
        let handle = harness.spawn(&spec(dir.path().to_path_buf(), "")).await.unwrap();
        assert!(harness.is_running(&handle).await);
        harness.kill(&handle).await.unwrap();
        assert!(!harness.is_running(&handle).await);
    }
}
