//! Action gate: peer sign-off before a winning proposal's code or tests
//! are executed, then the execution dispatch itself.
//!
//! The gate only ever runs after consensus and owner approval, and only for
//! an actionable winner. Execution is delegated to the winning agent; the
//! orchestrator performs no sandboxing of its own.

use quorum_protocol::ActionAgreeResponse;
use quorum_protocol::ActionExecuteResponse;
use quorum_protocol::ProposalPayload;
use serde_json::json;
use tracing::info;
use tracing::warn;

use crate::config::Templates;
use crate::error::QuorumErr;
use crate::error::Result;
use crate::phase::Phase;
use crate::phase::PhaseRunner;
use crate::prompt::ActionVars;
use crate::roster::AgentSpec;

/// Fraction of parsed non-winner responses that must agree.
const APPROVAL_QUORUM: f64 = 0.5;

/// Ask every non-winner whether the winning action should run; if a
/// majority agrees, have the winner execute and report its output.
///
/// Returns `Ok(None)` whenever the session should fall back to the textual
/// answer: rejection, nobody to ask, nobody parsed, or a failed execution.
pub(crate) async fn run_action_gate(
    runner: &PhaseRunner,
    templates: &Templates,
    question: &str,
    winner: &AgentSpec,
    payload: &ProposalPayload,
    final_answer: &str,
    cwd: &str,
) -> Result<Option<String>> {
    let tests_json = json!(payload.tests).to_string();
    let vars = ActionVars {
        winner_agent: &winner.id,
        final_answer,
        proposal: &payload.proposal,
        code_patch: payload.code_patch.as_deref().unwrap_or(""),
        tests: &tests_json,
        cwd,
    };

    let non_winners: Vec<AgentSpec> = runner
        .agents
        .iter()
        .filter(|a| a.id != winner.id)
        .cloned()
        .collect();
    if non_winners.is_empty() {
        info!("no non-winner agents to approve the action; skipping execution");
        return Ok(None);
    }

    let agreements = match runner
        .run::<ActionAgreeResponse, _>(
            Phase::ActionAgree,
            templates.for_phase(Phase::ActionAgree),
            question,
            &non_winners,
            |_| json!({"winner": winner.id}),
            Some(vars),
        )
        .await
    {
        Ok(responses) => responses,
        // Nobody parsed: no approval quorum, no execution.
        Err(QuorumErr::PhaseStarved { .. }) => return Ok(None),
        Err(err) => return Err(err),
    };

    let agreed = agreements.iter().filter(|r| r.payload.agreed).count();
    let rate = agreed as f64 / agreements.len() as f64;
    for response in &agreements {
        runner.sink.line(
            &response.agent_id,
            Phase::ActionAgree,
            &format!(
                "agreed={} ({}): {}",
                response.payload.agreed, response.payload.action_type, response.payload.reason
            ),
            false,
        );
    }
    if rate < APPROVAL_QUORUM {
        info!(agreed, asked = agreements.len(), "action rejected by the panel");
        return Ok(None);
    }

    info!(agreed, asked = agreements.len(), "action approved, dispatching execution");
    let executed = match runner
        .run::<ActionExecuteResponse, _>(
            Phase::ActionExecute,
            templates.for_phase(Phase::ActionExecute),
            question,
            std::slice::from_ref(winner),
            |_| json!({"winner": winner.id}),
            Some(vars),
        )
        .await
    {
        Ok(mut responses) => responses.remove(0).payload,
        Err(QuorumErr::PhaseStarved { .. }) => {
            warn!("winner failed to execute the approved action");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    if let Some(error) = executed.error.as_deref().filter(|e| !e.is_empty()) {
        warn!(winner = %winner.id, "action execution reported an error: {error}");
    }
    if executed.executed && !executed.output.is_empty() {
        Ok(Some(executed.output))
    } else {
        Ok(None)
    }
}
