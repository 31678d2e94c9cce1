//! Retry wrapper around a single agent call.
//!
//! One "call" is spawn → capture → extract → decode; any transient failure
//! along that chain is retried with linear backoff. Spawn failures and
//! cancellation are final.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::QuorumErr;
use crate::error::Result;
use crate::exec::invoke_agent;
use crate::parse::ParserFn;
use crate::parse::parser_for;
use crate::registry::ProcessRegistry;
use crate::roster::AgentSpec;

pub const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_UNIT_MS: u64 = 1_000;
const STDERR_SNIPPET_LEN: usize = 500;

/// Linear backoff schedule: 1s → 2s.
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_UNIT_MS * u64::from(attempt))
}

/// Invoke `agent` with retries and decode its response as `T`.
pub async fn call_agent<T>(
    agent: &AgentSpec,
    prompt: &str,
    caller_timeout: Duration,
    registry: &ProcessRegistry,
    cancel: &CancellationToken,
) -> Result<T>
where
    T: DeserializeOwned,
{
    let extract = parser_for(agent.response_parser.as_deref());
    let mut attempt = 0;
    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(QuorumErr::Interrupted);
        }

        match attempt_call::<T>(agent, prompt, caller_timeout, registry, cancel, extract).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= MAX_ATTEMPTS {
                    return Err(err);
                }
                warn!(
                    agent = %agent.id,
                    attempt,
                    "agent call failed, retrying: {err}"
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff(attempt)) => {}
                    _ = cancel.cancelled() => return Err(QuorumErr::Interrupted),
                }
            }
        }
    }
}

async fn attempt_call<T>(
    agent: &AgentSpec,
    prompt: &str,
    caller_timeout: Duration,
    registry: &ProcessRegistry,
    cancel: &CancellationToken,
    extract: ParserFn,
) -> Result<T>
where
    T: DeserializeOwned,
{
    let out = invoke_agent(agent, prompt, caller_timeout, registry, cancel).await?;
    if out.exit_code != 0 {
        return Err(QuorumErr::NonzeroExit {
            exit_code: out.exit_code,
            stderr: snippet(&out.stderr),
        });
    }
    if out.stdout.trim().is_empty() {
        return Err(QuorumErr::EmptyOutput);
    }
    let json_text = extract(&out.stdout);
    serde_json::from_str::<T>(&json_text).map_err(|e| QuorumErr::Parse(e.to_string()))
}

fn snippet(stderr: &str) -> String {
    let trimmed = stderr.trim();
    match trimmed.char_indices().nth(STDERR_SNIPPET_LEN) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
