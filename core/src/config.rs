//! Typed configuration for a debate run, plus the TOML loading surface.
//!
//! The orchestrator itself only ever sees the typed [`Config`]; the TOML
//! file is a convenience for the CLI. All numeric knobs have serde defaults
//! so a minimal config is just a roster.

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::error::QuorumErr;
use crate::error::Result;
use crate::phase::Phase;
use crate::roster::AgentSpec;
use crate::roster::validate_roster;

const DEFAULT_MAX_ROUNDS: u32 = 5;
const DEFAULT_UNANIMOUS_PCT: f64 = 0.95;
const DEFAULT_SUPER_MAJORITY_PCT: f64 = 0.75;
const DEFAULT_MAJORITY_PCT: f64 = 0.5;
const DEFAULT_RUBBER_PENALTY: f64 = 0.5;
const DEFAULT_RESPONSE_THRESHOLD: f64 = 0.8;
const DEFAULT_OWNER_MIN_SCORE: f64 = 0.8;
const DEFAULT_PHASE_TIMEOUT_SECS: u64 = 120;

/// How high the top normalized score must be for consensus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusMode {
    Unanimous,
    #[default]
    Super,
    Majority,
}

/// How owner approval combines when several owners are configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerMode {
    #[default]
    Any,
    All,
}

/// Designated veto holders. An empty `ids` list grants approval
/// unconditionally.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OwnerConfig {
    pub ids: Vec<String>,
    pub min_score: f64,
    pub mode: OwnerMode,
}

impl Default for OwnerConfig {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            min_score: DEFAULT_OWNER_MIN_SCORE,
            mode: OwnerMode::default(),
        }
    }
}

/// All tunables of the round loop.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DebateConfig {
    pub consensus_mode: ConsensusMode,
    pub max_rounds: u32,
    pub unanimous_pct: f64,
    pub super_majority_pct: f64,
    pub majority_pct: f64,
    /// Vote weight of a voter that did not critique any peer this round.
    pub rubber_penalty: f64,
    /// Minimum fraction of agents that must answer a phase before we stop
    /// warning about response rate.
    pub response_threshold: f64,
    /// Disqualify candidates carrying a blocker-severity critique.
    pub require_no_blockers: bool,
    /// Caller-side timeout per agent call; the effective timeout is the
    /// larger of this and the agent's own `timeout_ms`.
    pub phase_timeout_secs: u64,
    pub owner: OwnerConfig,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            consensus_mode: ConsensusMode::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            unanimous_pct: DEFAULT_UNANIMOUS_PCT,
            super_majority_pct: DEFAULT_SUPER_MAJORITY_PCT,
            majority_pct: DEFAULT_MAJORITY_PCT,
            rubber_penalty: DEFAULT_RUBBER_PENALTY,
            response_threshold: DEFAULT_RESPONSE_THRESHOLD,
            require_no_blockers: false,
            phase_timeout_secs: DEFAULT_PHASE_TIMEOUT_SECS,
            owner: OwnerConfig::default(),
        }
    }
}

impl DebateConfig {
    /// The score threshold selected by the configured consensus mode.
    pub fn threshold(&self) -> f64 {
        match self.consensus_mode {
            ConsensusMode::Unanimous => self.unanimous_pct,
            ConsensusMode::Super => self.super_majority_pct,
            ConsensusMode::Majority => self.majority_pct,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(QuorumErr::Config("max_rounds must be at least 1".to_string()));
        }
        if self.phase_timeout_secs == 0 {
            return Err(QuorumErr::Config(
                "phase_timeout_secs must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("unanimous_pct", self.unanimous_pct),
            ("super_majority_pct", self.super_majority_pct),
            ("majority_pct", self.majority_pct),
            ("rubber_penalty", self.rubber_penalty),
            ("response_threshold", self.response_threshold),
            ("owner.min_score", self.owner.min_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(QuorumErr::Config(format!("{name} must be within [0,1]")));
            }
        }
        Ok(())
    }
}

/// Per-phase template overrides from the config file. Unset phases use the
/// built-in template.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateOverrides {
    pub propose: Option<String>,
    pub critique: Option<String>,
    pub revise: Option<String>,
    pub vote: Option<String>,
    pub action_agree: Option<String>,
    pub action_execute: Option<String>,
}

/// Resolved prompt templates, one per phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Templates {
    propose: String,
    critique: String,
    revise: String,
    vote: String,
    action_agree: String,
    action_execute: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            propose: include_str!("../templates/propose.md").to_string(),
            critique: include_str!("../templates/critique.md").to_string(),
            revise: include_str!("../templates/revise.md").to_string(),
            vote: include_str!("../templates/vote.md").to_string(),
            action_agree: include_str!("../templates/action_agree.md").to_string(),
            action_execute: include_str!("../templates/action_execute.md").to_string(),
        }
    }
}

impl Templates {
    pub fn with_overrides(overrides: TemplateOverrides) -> Self {
        let mut templates = Self::default();
        let TemplateOverrides {
            propose,
            critique,
            revise,
            vote,
            action_agree,
            action_execute,
        } = overrides;
        if let Some(t) = propose {
            templates.propose = t;
        }
        if let Some(t) = critique {
            templates.critique = t;
        }
        if let Some(t) = revise {
            templates.revise = t;
        }
        if let Some(t) = vote {
            templates.vote = t;
        }
        if let Some(t) = action_agree {
            templates.action_agree = t;
        }
        if let Some(t) = action_execute {
            templates.action_execute = t;
        }
        templates
    }

    pub fn for_phase(&self, phase: Phase) -> &str {
        match phase {
            Phase::Propose => &self.propose,
            Phase::Critique => &self.critique,
            Phase::Revise => &self.revise,
            Phase::Vote => &self.vote,
            Phase::ActionAgree => &self.action_agree,
            Phase::ActionExecute => &self.action_execute,
        }
    }
}

/// Everything a debate run needs, fully validated.
#[derive(Debug, Clone)]
pub struct Config {
    pub agents: Vec<AgentSpec>,
    pub debate: DebateConfig,
    pub templates: Templates,
}

impl Config {
    pub fn new(agents: Vec<AgentSpec>, debate: DebateConfig, templates: Templates) -> Result<Self> {
        validate_roster(&agents)?;
        debate.validate()?;
        Ok(Self {
            agents,
            debate,
            templates,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigToml {
    agents: Vec<AgentSpec>,
    debate: DebateConfig,
    templates: TemplateOverrides,
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        QuorumErr::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<Config> {
    let raw: ConfigToml =
        toml::from_str(contents).map_err(|e| QuorumErr::Config(e.to_string()))?;
    Config::new(
        raw.agents,
        raw.debate,
        Templates::with_overrides(raw.templates),
    )
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn minimal_config_gets_spec_defaults() {
        let config = parse_config(
            r#"
            [[agents]]
            id = "codex"
            display_name = "Codex"
            cmd = "codex"
            args = ["exec", "{PROMPT}"]
            "#,
        )
        .expect("parse");
        assert_eq!(config.debate.consensus_mode, ConsensusMode::Super);
        assert_eq!(config.debate.max_rounds, 5);
        assert_eq!(config.debate.response_threshold, 0.8);
        assert!(config.debate.owner.ids.is_empty());
        assert_eq!(config.agents[0].timeout_ms, 120_000);
    }

    #[test]
    fn debate_table_overrides_defaults() {
        let config = parse_config(
            r#"
            [debate]
            consensus_mode = "majority"
            max_rounds = 2
            require_no_blockers = true

            [debate.owner]
            ids = ["claude"]
            min_score = 0.9
            mode = "all"

            [[agents]]
            id = "claude"
            display_name = "Claude"
            cmd = "claude"
            args = ["-p", "{PROMPT}"]
            input_mode = "stdin"
            "#,
        )
        .expect("parse");
        assert_eq!(config.debate.consensus_mode, ConsensusMode::Majority);
        assert_eq!(config.debate.max_rounds, 2);
        assert!(config.debate.require_no_blockers);
        assert_eq!(config.debate.owner.mode, OwnerMode::All);
        assert_eq!(config.debate.threshold(), 0.5);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = parse_config(
            r#"
            [debate]
            super_majority_pct = 1.5

            [[agents]]
            id = "a"
            display_name = "A"
            cmd = "a"
            args = ["{PROMPT}"]
            "#,
        )
        .expect_err("out of range");
        assert!(matches!(err, QuorumErr::Config(_)));
    }

    #[test]
    fn rejects_zero_rounds() {
        let err = parse_config(
            r#"
            [debate]
            max_rounds = 0

            [[agents]]
            id = "a"
            display_name = "A"
            cmd = "a"
            args = ["{PROMPT}"]
            "#,
        )
        .expect_err("zero rounds");
        assert!(matches!(err, QuorumErr::Config(_)));
    }

    #[test]
    fn template_override_replaces_only_named_phase() {
        let config = parse_config(
            r#"
            [templates]
            vote = "score {{AGENTS}} on {{QUESTION}}"

            [[agents]]
            id = "a"
            display_name = "A"
            cmd = "a"
            args = ["{PROMPT}"]
            "#,
        )
        .expect("parse");
        assert_eq!(
            config.templates.for_phase(Phase::Vote),
            "score {{AGENTS}} on {{QUESTION}}"
        );
        assert_eq!(
            config.templates.for_phase(Phase::Propose),
            Templates::default().for_phase(Phase::Propose)
        );
    }
}
