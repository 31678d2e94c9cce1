//! The round loop: propose once, then critique → revise → vote until the
//! panel converges, the round budget runs out, or the user pulls the plug.
//!
//! The loop itself is single-threaded; all concurrency lives one layer
//! down in the phase executor. Per-agent failures never abort a phase, and
//! cancellation is observed at every phase boundary.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quorum_protocol::CritiqueResponse;
use quorum_protocol::ProposalPayload;
use quorum_protocol::RevisionResponse;
use quorum_protocol::VoteResponse;
use serde_json::Value;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::action::run_action_gate;
use crate::approval::owner_approves;
use crate::config::Config;
use crate::consensus::Verdict;
use crate::consensus::evaluate;
use crate::error::QuorumErr;
use crate::error::Result;
use crate::phase::AgentResponse;
use crate::phase::Phase;
use crate::phase::PhaseRunner;
use crate::registry::ProcessRegistry;
use crate::roster::AgentSpec;
use crate::sink::DebateSink;
use crate::sink::TracingSink;
use crate::tally::Tally;
use crate::tally::tally_votes;

/// Terminal outcome of one debate run. Fatal conditions (an unusable
/// roster, zero initial proposals) are reported as errors, not outcomes.
#[derive(Debug, Clone, PartialEq)]
pub enum DebateOutcome {
    Consensus {
        winner_id: String,
        round: u32,
        score: f64,
        answer: String,
        /// Output of an approved and executed action, if any.
        action_output: Option<String>,
    },
    NoConsensus {
        best_id: String,
        answer: String,
    },
    Interrupted,
}

impl DebateOutcome {
    /// What a front end should print: the action output when one exists,
    /// otherwise the formatted answer. `None` for an interrupted session.
    pub fn final_text(&self) -> Option<&str> {
        match self {
            DebateOutcome::Consensus {
                action_output: Some(output),
                ..
            } => Some(output),
            DebateOutcome::Consensus { answer, .. } => Some(answer),
            DebateOutcome::NoConsensus { answer, .. } => Some(answer),
            DebateOutcome::Interrupted => None,
        }
    }
}

/// One agent's current proposal. Replaced in place when the agent revises
/// with `is_changed = true`.
#[derive(Debug, Clone)]
struct Proposal {
    agent_id: String,
    payload: ProposalPayload,
}

/// A configured debate, ready to run questions.
pub struct Debate {
    config: Config,
    registry: Arc<ProcessRegistry>,
    cancel: CancellationToken,
    sink: Arc<dyn DebateSink>,
    cwd: PathBuf,
}

impl Debate {
    pub fn new(config: Config, registry: Arc<ProcessRegistry>, cancel: CancellationToken) -> Self {
        Self {
            config,
            registry,
            cancel,
            sink: Arc::new(TracingSink),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DebateSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }

    /// Drive the full state machine for one question.
    pub async fn run(&self, question: &str) -> Result<DebateOutcome> {
        let run_id = Uuid::new_v4();
        info!(%run_id, agents = self.config.agents.len(), "debate started");

        let runner = PhaseRunner {
            agents: Arc::new(self.config.agents.clone()),
            registry: Arc::clone(&self.registry),
            cancel: self.cancel.clone(),
            sink: Arc::clone(&self.sink),
            response_threshold: self.config.debate.response_threshold,
            call_timeout: Duration::from_secs(self.config.debate.phase_timeout_secs),
        };

        self.sink.block_title("Proposals");
        let initial = match runner
            .run::<ProposalPayload, _>(
                Phase::Propose,
                self.config.templates.for_phase(Phase::Propose),
                question,
                &self.config.agents,
                |_| json!({"phase": "propose", "round": 0}),
                None,
            )
            .await
        {
            Ok(responses) => responses,
            Err(QuorumErr::Interrupted) => return Ok(DebateOutcome::Interrupted),
            // Zero valid proposals is the one fatal starvation.
            Err(err) => return Err(err),
        };

        let mut proposals: Vec<Proposal> = initial
            .into_iter()
            .map(|r| Proposal {
                agent_id: r.agent_id,
                payload: r.payload,
            })
            .collect();
        info!(proposers = proposals.len(), "initial proposals collected");

        let mut last_round_tally: Option<Tally> = None;

        for round in 1..=self.config.debate.max_rounds {
            if self.cancel.is_cancelled() {
                return Ok(DebateOutcome::Interrupted);
            }
            self.sink.block_title(&format!("Round {round}"));

            // Critique.
            let critiques = match runner
                .run::<CritiqueResponse, _>(
                    Phase::Critique,
                    self.config.templates.for_phase(Phase::Critique),
                    question,
                    &self.config.agents,
                    |agent| self.critique_context(round, &proposals, agent),
                    None,
                )
                .await
            {
                Ok(responses) => responses,
                Err(QuorumErr::Interrupted) => return Ok(DebateOutcome::Interrupted),
                Err(QuorumErr::PhaseStarved { .. }) => Vec::new(),
                Err(err) => return Err(err),
            };
            self.log_critiques(&critiques);

            let peer_critics: HashSet<String> = critiques
                .iter()
                .filter(|r| r.payload.critiques_a_peer(&r.agent_id))
                .map(|r| r.agent_id.clone())
                .collect();
            // The veto reads critique records directly; a blocker from a
            // rubber-stamped voter still disqualifies its target.
            let blocked: HashSet<String> = critiques
                .iter()
                .flat_map(|r| r.payload.blocker_targets().map(str::to_string))
                .collect();

            if self.cancel.is_cancelled() {
                return Ok(DebateOutcome::Interrupted);
            }

            // Revise.
            let revisions = match runner
                .run::<RevisionResponse, _>(
                    Phase::Revise,
                    self.config.templates.for_phase(Phase::Revise),
                    question,
                    &self.config.agents,
                    |agent| self.revise_context(round, &proposals, &critiques, agent),
                    None,
                )
                .await
            {
                Ok(responses) => responses,
                Err(QuorumErr::Interrupted) => return Ok(DebateOutcome::Interrupted),
                Err(QuorumErr::PhaseStarved { .. }) => Vec::new(),
                Err(err) => return Err(err),
            };
            apply_revisions(&mut proposals, revisions);

            if self.cancel.is_cancelled() {
                return Ok(DebateOutcome::Interrupted);
            }

            // Vote.
            let votes: Vec<(String, VoteResponse)> = match runner
                .run::<VoteResponse, _>(
                    Phase::Vote,
                    self.config.templates.for_phase(Phase::Vote),
                    question,
                    &self.config.agents,
                    |_| self.vote_context(round, &proposals),
                    None,
                )
                .await
            {
                Ok(responses) => responses
                    .into_iter()
                    .map(|r| (r.agent_id, r.payload))
                    .collect(),
                Err(QuorumErr::Interrupted) => return Ok(DebateOutcome::Interrupted),
                Err(QuorumErr::PhaseStarved { .. }) => Vec::new(),
                Err(err) => return Err(err),
            };
            if votes.is_empty() {
                warn!(round, "no valid votes this round");
                continue;
            }

            let candidate_order: Vec<String> =
                proposals.iter().map(|p| p.agent_id.clone()).collect();
            let tally = tally_votes(
                &votes,
                &peer_critics,
                self.config.debate.rubber_penalty,
                &candidate_order,
            );
            for entry in &tally.entries {
                self.sink.line(
                    &entry.agent_id,
                    Phase::Vote,
                    &format!("score {:.3} from {} voter(s)", entry.normalized, entry.voters.len()),
                    true,
                );
            }
            last_round_tally = Some(tally.clone());

            match evaluate(&self.config.debate, &tally, &blocked) {
                Verdict::Reached { winner_id, score } => {
                    if !owner_approves(&self.config.debate.owner, &winner_id, &votes) {
                        info!(round, winner = %winner_id, "owners withheld approval, debating on");
                        continue;
                    }
                    info!(round, winner = %winner_id, score, "consensus reached");
                    return self
                        .finish_with_winner(&runner, question, round, winner_id, score, &proposals)
                        .await;
                }
                Verdict::NotReached => {
                    info!(round, "no consensus yet");
                }
            }
        }

        // Round budget exhausted: surface the best candidate we saw.
        let best_id = last_round_tally
            .as_ref()
            .and_then(|t| t.top())
            .map(|e| e.agent_id.clone())
            .unwrap_or_else(|| proposals[0].agent_id.clone());
        let payload = proposal_payload(&proposals, &best_id);
        let answer = self.render_answer("No consensus, best candidate", &best_id, payload, None);
        Ok(DebateOutcome::NoConsensus { best_id, answer })
    }

    async fn finish_with_winner(
        &self,
        runner: &PhaseRunner,
        question: &str,
        round: u32,
        winner_id: String,
        score: f64,
        proposals: &[Proposal],
    ) -> Result<DebateOutcome> {
        let payload = proposal_payload(proposals, &winner_id).clone();
        let answer = self.render_answer("Consensus", &winner_id, &payload, Some((round, score)));

        let action_output = if payload.is_actionable() {
            let winner_spec = self.agent_spec(&winner_id);
            match run_action_gate(
                runner,
                &self.config.templates,
                question,
                winner_spec,
                &payload,
                &answer,
                &self.cwd.to_string_lossy(),
            )
            .await
            {
                Ok(output) => output,
                Err(QuorumErr::Interrupted) => return Ok(DebateOutcome::Interrupted),
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        Ok(DebateOutcome::Consensus {
            winner_id,
            round,
            score,
            answer,
            action_output,
        })
    }

    fn agent_spec(&self, agent_id: &str) -> &AgentSpec {
        // Winner ids come from the tally, whose candidates come from the
        // roster, so the lookup cannot miss.
        self.config
            .agents
            .iter()
            .find(|a| a.id == agent_id)
            .unwrap_or(&self.config.agents[0])
    }

    fn critique_context(&self, round: u32, proposals: &[Proposal], agent: &AgentSpec) -> Value {
        json!({
            "phase": "critique",
            "round": round,
            "proposals": peers_json(proposals, &agent.id),
        })
    }

    fn revise_context(
        &self,
        round: u32,
        proposals: &[Proposal],
        critiques: &[AgentResponse<CritiqueResponse>],
        agent: &AgentSpec,
    ) -> Value {
        let own = proposals
            .iter()
            .find(|p| p.agent_id == agent.id)
            .map(|p| json!(p.payload))
            .unwrap_or(Value::Null);
        let received: Vec<Value> = critiques
            .iter()
            .flat_map(|r| {
                r.payload
                    .critiques
                    .iter()
                    .filter(|c| c.target_agent == agent.id)
                    .map(|c| {
                        json!({
                            "author_agent_id": r.agent_id,
                            "points": c.points,
                        })
                    })
            })
            .collect();
        json!({
            "phase": "revise",
            "round": round,
            "your_proposal": own,
            "critiques_received": received,
            "peer_proposals": peers_json(proposals, &agent.id),
        })
    }

    fn vote_context(&self, round: u32, proposals: &[Proposal]) -> Value {
        let all: Vec<Value> = proposals
            .iter()
            .map(|p| json!({"agent_id": p.agent_id, "proposal": p.payload}))
            .collect();
        json!({
            "phase": "vote",
            "round": round,
            "proposals": all,
        })
    }

    fn log_critiques(&self, critiques: &[AgentResponse<CritiqueResponse>]) {
        for response in critiques {
            for critique in &response.payload.critiques {
                if !critique.conversation_message.is_empty() {
                    self.sink.line(
                        &response.agent_id,
                        Phase::Critique,
                        &critique.conversation_message,
                        false,
                    );
                }
                for point in &critique.points {
                    self.sink.line(
                        &response.agent_id,
                        Phase::Critique,
                        &format!(
                            "[{}] {} → {}: {}",
                            point.severity, critique.target_agent, point.claim_or_line, point.rationale
                        ),
                        true,
                    );
                }
            }
        }
    }

    fn render_answer(
        &self,
        header: &str,
        agent_id: &str,
        payload: &ProposalPayload,
        round_score: Option<(u32, f64)>,
    ) -> String {
        let display_name = &self.agent_spec(agent_id).display_name;
        let mut out = String::new();
        match round_score {
            Some((round, score)) => {
                let _ = writeln!(
                    out,
                    "{header}: {display_name} (round {round}, score {score:.2})"
                );
            }
            None => {
                let _ = writeln!(out, "{header}: {display_name}");
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", payload.proposal);
        if !payload.key_points.is_empty() {
            let _ = writeln!(out, "\nKey points:");
            for point in &payload.key_points {
                let _ = writeln!(out, "  - {point}");
            }
        }
        if !payload.tests.is_empty() {
            let _ = writeln!(out, "\nTests:");
            for test in &payload.tests {
                let _ = writeln!(out, "  - {test}");
            }
        }
        if let Some(patch) = payload.code_patch.as_deref().filter(|p| !p.trim().is_empty()) {
            let _ = writeln!(out, "\nCode patch:\n{patch}");
        }
        let _ = writeln!(out, "\nConfidence: {}", payload.confidence);
        out
    }
}

fn peers_json(proposals: &[Proposal], excluding: &str) -> Vec<Value> {
    proposals
        .iter()
        .filter(|p| p.agent_id != excluding)
        .map(|p| json!({"agent_id": p.agent_id, "proposal": p.payload}))
        .collect()
}

fn proposal_payload<'a>(proposals: &'a [Proposal], agent_id: &str) -> &'a ProposalPayload {
    // Candidates are always drawn from `proposals`; fall back defensively
    // to the first proposer.
    proposals
        .iter()
        .find(|p| p.agent_id == agent_id)
        .map(|p| &p.payload)
        .unwrap_or(&proposals[0].payload)
}

fn apply_revisions(proposals: &mut [Proposal], revisions: Vec<AgentResponse<RevisionResponse>>) {
    for revision in revisions {
        if !revision.payload.revised.is_changed {
            continue;
        }
        if let Some(proposal) = proposals
            .iter_mut()
            .find(|p| p.agent_id == revision.agent_id)
        {
            proposal.payload = revision.payload.revised.payload;
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn proposal(agent_id: &str, text: &str) -> Proposal {
        Proposal {
            agent_id: agent_id.to_string(),
            payload: ProposalPayload {
                proposal: text.to_string(),
                ..ProposalPayload::default()
            },
        }
    }

    fn revision(agent_id: &str, is_changed: bool, text: &str) -> AgentResponse<RevisionResponse> {
        AgentResponse {
            agent_id: agent_id.to_string(),
            payload: serde_json::from_value(json!({
                "revised": {"is_changed": is_changed, "proposal": text},
            }))
            .expect("revision"),
        }
    }

    #[test]
    fn changed_revision_replaces_the_proposal() {
        let mut proposals = vec![proposal("a", "before")];
        apply_revisions(&mut proposals, vec![revision("a", true, "after")]);
        assert_eq!(proposals[0].payload.proposal, "after");
    }

    #[test]
    fn unchanged_revision_keeps_the_prior_text() {
        let mut proposals = vec![proposal("a", "before")];
        apply_revisions(&mut proposals, vec![revision("a", false, "ignored")]);
        assert_eq!(proposals[0].payload.proposal, "before");
    }

    #[test]
    fn revision_from_a_non_proposer_is_dropped() {
        let mut proposals = vec![proposal("a", "before")];
        apply_revisions(&mut proposals, vec![revision("ghost", true, "sneaky")]);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].payload.proposal, "before");
    }

    #[test]
    fn peers_json_excludes_the_named_agent() {
        let proposals = vec![proposal("a", "pa"), proposal("b", "pb")];
        let peers = peers_json(&proposals, "a");
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0]["agent_id"], "b");
    }
}
