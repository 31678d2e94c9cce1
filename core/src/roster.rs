//! Agent descriptors and roster validation.
//!
//! A roster is the fixed panel of external agent CLIs for one debate. It is
//! validated once at startup; after that every component treats the
//! descriptors as shared read-only data.

use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use crate::error::QuorumErr;
use crate::error::Result;

/// Literal token in an agent's argument list that is replaced with the
/// prompt on every invocation.
pub const PROMPT_TOKEN: &str = "{PROMPT}";

pub(crate) const DEFAULT_AGENT_TIMEOUT_MS: u64 = 120_000;

/// How the prompt is delivered to the child process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Prompt is substituted into the argument list only.
    #[default]
    Arg,
    /// Prompt is additionally written to the child's stdin, then stdin is
    /// closed.
    Stdin,
}

/// Immutable description of one agent CLI, supplied by external config.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AgentSpec {
    /// Unique key; used for the process registry, tallies, and prompts.
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub color: String,
    /// Executable to spawn.
    pub cmd: String,
    /// Ordered argument list; must contain [`PROMPT_TOKEN`] at least once.
    pub args: Vec<String>,
    #[serde(default)]
    pub input_mode: InputMode,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Output dialect; `None` selects the default parser.
    #[serde(default)]
    pub response_parser: Option<String>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_AGENT_TIMEOUT_MS
}

/// Validate roster-wide invariants before anything is spawned: ids and
/// display names unique, prompt token present, timeouts positive.
pub fn validate_roster(agents: &[AgentSpec]) -> Result<()> {
    if agents.is_empty() {
        return Err(QuorumErr::Roster("no agents configured".to_string()));
    }

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for agent in agents {
        if agent.id.trim().is_empty() {
            return Err(QuorumErr::Roster("agent id must be non-empty".to_string()));
        }
        if !ids.insert(agent.id.as_str()) {
            return Err(QuorumErr::Roster(format!("duplicate agent id `{}`", agent.id)));
        }
        if !names.insert(agent.display_name.as_str()) {
            return Err(QuorumErr::Roster(format!(
                "duplicate display name `{}`",
                agent.display_name
            )));
        }
        if !agent.args.iter().any(|a| a.contains(PROMPT_TOKEN)) {
            return Err(QuorumErr::Roster(format!(
                "agent `{}`: no argument contains {PROMPT_TOKEN}",
                agent.id
            )));
        }
        if agent.timeout_ms == 0 {
            return Err(QuorumErr::Roster(format!(
                "agent `{}`: timeout_ms must be positive",
                agent.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_agent(id: &str) -> AgentSpec {
    AgentSpec {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        avatar: String::new(),
        color: String::new(),
        cmd: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), PROMPT_TOKEN.to_string()],
        input_mode: InputMode::Arg,
        timeout_ms: 5_000,
        response_parser: None,
    }
}
