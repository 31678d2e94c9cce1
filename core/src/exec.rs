//! Spawning and supervising one agent child process per invocation.
//!
//! The runner substitutes the prompt into the argument list, wires the three
//! standard pipes, registers the child in the process registry for the
//! lifetime of the call, and enforces the effective timeout with a two-phase
//! kill (SIGTERM, a short grace period, SIGKILL).

use std::io;
use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::QuorumErr;
use crate::error::Result;
use crate::registry::KILL_GRACE;
use crate::registry::ProcessRegistry;
use crate::registry::RegistryGuard;
use crate::registry::Signal;
use crate::registry::send_signal;
use crate::roster::AgentSpec;
use crate::roster::InputMode;
use crate::roster::PROMPT_TOKEN;

// Maximum captured per stream; agents emitting more than this are truncated
// but still drained to EOF so they never block on a full pipe.
const MAX_STREAM_OUTPUT: usize = 1024 * 1024;
const MAX_STREAM_OUTPUT_LINES: usize = 50_000;

#[derive(Debug)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Run one agent invocation to completion. Nonzero exits are reported in
/// the returned [`ExecOutput`]; only spawn failure, timeout, cancellation,
/// and I/O trouble surface as errors.
pub async fn invoke_agent(
    agent: &AgentSpec,
    prompt: &str,
    caller_timeout: Duration,
    registry: &ProcessRegistry,
    cancel: &CancellationToken,
) -> Result<ExecOutput> {
    let start = Instant::now();

    let args: Vec<String> = agent
        .args
        .iter()
        .map(|arg| arg.replace(PROMPT_TOKEN, prompt))
        .collect();

    let mut cmd = Command::new(&agent.cmd);
    cmd.args(&args);
    match agent.input_mode {
        InputMode::Stdin => cmd.stdin(Stdio::piped()),
        // Do not leave stdin open: some CLIs block reading from it.
        InputMode::Arg => cmd.stdin(Stdio::null()),
    };
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| QuorumErr::Spawn {
        cmd: agent.cmd.clone(),
        err,
    })?;

    // Deregistered on drop, i.e. on every exit path of this function.
    let _guard = child
        .id()
        .map(|pid| RegistryGuard::register(registry, &agent.id, pid));

    let stdout_reader = child.stdout.take().ok_or_else(|| {
        QuorumErr::Io(io::Error::other("stdout pipe was unexpectedly not available"))
    })?;
    let stderr_reader = child.stderr.take().ok_or_else(|| {
        QuorumErr::Io(io::Error::other("stderr pipe was unexpectedly not available"))
    })?;

    let stdout_handle = tokio::spawn(read_capped(
        BufReader::new(stdout_reader),
        MAX_STREAM_OUTPUT,
        MAX_STREAM_OUTPUT_LINES,
    ));
    let stderr_handle = tokio::spawn(read_capped(
        BufReader::new(stderr_reader),
        MAX_STREAM_OUTPUT,
        MAX_STREAM_OUTPUT_LINES,
    ));

    // Written only after both readers are draining, so a large prompt can
    // never deadlock against a child that talks before it listens. The
    // write is best-effort: a child that exits without reading stdin is
    // judged by its output, not by our EPIPE.
    if agent.input_mode == InputMode::Stdin
        && let Some(mut stdin) = child.stdin.take()
        && stdin.write_all(prompt.as_bytes()).await.is_ok()
    {
        let _ = stdin.shutdown().await;
    }

    let effective = caller_timeout.max(Duration::from_millis(agent.timeout_ms));
    let exit_status = tokio::select! {
        result = tokio::time::timeout(effective, child.wait()) => {
            match result {
                Ok(status) => status?,
                Err(_) => {
                    kill_two_phase(&mut child).await;
                    return Err(QuorumErr::Timeout {
                        timeout_ms: effective.as_millis() as u64,
                    });
                }
            }
        }
        _ = cancel.cancelled() => {
            kill_two_phase(&mut child).await;
            return Err(QuorumErr::Interrupted);
        }
    };

    let stdout = String::from_utf8_lossy(&stdout_handle.await??).to_string();
    let stderr = String::from_utf8_lossy(&stderr_handle.await??).to_string();

    Ok(ExecOutput {
        exit_code: exit_status.code().unwrap_or(-1),
        stdout,
        stderr,
        duration: start.elapsed(),
    })
}

/// SIGTERM, then SIGKILL after the grace period if the child is still alive.
async fn kill_two_phase(child: &mut Child) {
    match child.id() {
        Some(pid) => {
            send_signal(pid, Signal::Term);
            if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
        // Already reaped.
        None => {
            let _ = child.start_kill();
        }
    }
}

async fn read_capped<R: AsyncRead + Unpin>(
    mut reader: R,
    max_output: usize,
    max_lines: usize,
) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(max_output.min(8 * 1024));
    let mut tmp = [0u8; 8192];

    let mut remaining_bytes = max_output;
    let mut remaining_lines = max_lines;

    loop {
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            break;
        }

        if remaining_bytes > 0 && remaining_lines > 0 {
            let mut copy_len = 0;
            for &b in &tmp[..n] {
                if remaining_bytes == 0 || remaining_lines == 0 {
                    break;
                }
                copy_len += 1;
                remaining_bytes -= 1;
                if b == b'\n' {
                    remaining_lines -= 1;
                }
            }
            buf.extend_from_slice(&tmp[..copy_len]);
        }
        // Keep draining to EOF so the child never blocks on a full pipe.
    }

    Ok(buf)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::roster::test_agent;
    use pretty_assertions::assert_eq;

    fn shell_agent(id: &str, script: &str) -> AgentSpec {
        let mut agent = test_agent(id);
        agent.args = vec![
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
            PROMPT_TOKEN.to_string(),
        ];
        agent
    }

    #[tokio::test]
    async fn captures_stdout_and_substitutes_prompt() {
        let agent = shell_agent("echoer", r#"printf '%s' "$1""#);
        let registry = ProcessRegistry::new();
        let cancel = CancellationToken::new();

        let out = invoke_agent(&agent, "hello world", Duration::from_secs(5), &registry, &cancel)
            .await
            .expect("invoke");
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "hello world");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn delivers_prompt_on_stdin_when_configured() {
        let mut agent = shell_agent("stdin-cat", "cat");
        agent.input_mode = InputMode::Stdin;
        let registry = ProcessRegistry::new();
        let cancel = CancellationToken::new();

        let out = invoke_agent(&agent, "from stdin", Duration::from_secs(5), &registry, &cancel)
            .await
            .expect("invoke");
        assert_eq!(out.stdout, "from stdin");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_an_error() {
        let agent = shell_agent("failing", "echo oops >&2; exit 3");
        let registry = ProcessRegistry::new();
        let cancel = CancellationToken::new();

        let out = invoke_agent(&agent, "p", Duration::from_secs(5), &registry, &cancel)
            .await
            .expect("invoke");
        assert_eq!(out.exit_code, 3);
        assert!(out.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_failure() {
        let mut agent = test_agent("ghost");
        agent.cmd = "/nonexistent/quorum-test-binary".to_string();
        let registry = ProcessRegistry::new();
        let cancel = CancellationToken::new();

        let err = invoke_agent(&agent, "p", Duration::from_secs(5), &registry, &cancel)
            .await
            .expect_err("spawn must fail");
        assert!(matches!(err, QuorumErr::Spawn { .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn timeout_kills_the_child_and_deregisters() {
        let mut agent = shell_agent("sleeper", "sleep 30");
        agent.timeout_ms = 200;
        let registry = ProcessRegistry::new();
        let cancel = CancellationToken::new();

        let start = Instant::now();
        let err = invoke_agent(&agent, "p", Duration::from_millis(200), &registry, &cancel)
            .await
            .expect_err("must time out");
        assert!(matches!(err, QuorumErr::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn effective_timeout_is_the_larger_of_the_two() {
        // Agent declares 2s; the caller asks for 50ms. The call must honor
        // the larger agent timeout and let a 300ms child finish.
        let mut agent = shell_agent("slowish", "sleep 0.3; echo done");
        agent.timeout_ms = 2_000;
        let registry = ProcessRegistry::new();
        let cancel = CancellationToken::new();

        let out = invoke_agent(&agent, "p", Duration::from_millis(50), &registry, &cancel)
            .await
            .expect("must not time out");
        assert!(out.stdout.contains("done"));
    }

    #[tokio::test]
    async fn cancellation_interrupts_an_inflight_call() {
        let agent = shell_agent("hang", "sleep 30");
        let registry = ProcessRegistry::new();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = invoke_agent(&agent, "p", Duration::from_secs(30), &registry, &cancel)
            .await
            .expect_err("must be interrupted");
        assert!(matches!(err, QuorumErr::Interrupted));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(registry.is_empty());
    }
}
