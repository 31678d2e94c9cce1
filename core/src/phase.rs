//! One debate phase: fan out one prompt per agent, wait for every call to
//! settle, validate the response rate.
//!
//! The barrier is strict: the next phase never starts while any call of
//! this phase is in flight. Failures of individual agents are recorded and
//! the phase carries on with whoever answered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use strum_macros::Display;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::QuorumErr;
use crate::error::Result;
use crate::prompt::ActionVars;
use crate::prompt::PromptInputs;
use crate::prompt::build_prompt;
use crate::registry::ProcessRegistry;
use crate::retry::call_agent;
use crate::roster::AgentSpec;
use crate::sink::DebateSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Propose,
    Critique,
    Revise,
    Vote,
    ActionAgree,
    ActionExecute,
}

/// One agent's decoded response within a phase.
#[derive(Debug, Clone)]
pub struct AgentResponse<T> {
    pub agent_id: String,
    pub payload: T,
}

pub(crate) struct PhaseRunner {
    pub agents: Arc<Vec<AgentSpec>>,
    pub registry: Arc<ProcessRegistry>,
    pub cancel: CancellationToken,
    pub sink: Arc<dyn DebateSink>,
    pub response_threshold: f64,
    pub call_timeout: Duration,
}

impl PhaseRunner {
    /// Dispatch one concurrent call per participant and await them all.
    ///
    /// Responses come back in roster order regardless of completion order.
    /// Returns `PhaseStarved` when nobody produced a decodable response and
    /// `Interrupted` when cancellation was observed during the phase.
    pub async fn run<T, F>(
        &self,
        phase: Phase,
        template: &str,
        question: &str,
        participants: &[AgentSpec],
        mut context_for: F,
        action: Option<ActionVars<'_>>,
    ) -> Result<Vec<AgentResponse<T>>>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnMut(&AgentSpec) -> Value,
    {
        let mut join_set = JoinSet::new();
        for agent in participants {
            let context = context_for(agent);
            let prompt = build_prompt(
                template,
                &PromptInputs {
                    agents: &self.agents,
                    question,
                    context: &context,
                    action,
                },
            );
            let agent = agent.clone();
            let registry = Arc::clone(&self.registry);
            let cancel = self.cancel.clone();
            let timeout = self.call_timeout;
            join_set.spawn(async move {
                let result = call_agent::<T>(&agent, &prompt, timeout, &registry, &cancel).await;
                (agent.id, result)
            });
        }

        let dispatched = participants.len();
        let mut settled: HashMap<String, T> = HashMap::with_capacity(dispatched);
        while let Some(joined) = join_set.join_next().await {
            let (agent_id, result) = joined?;
            match result {
                Ok(payload) => {
                    settled.insert(agent_id, payload);
                }
                Err(QuorumErr::Interrupted) => {
                    // Cancellation is reported once, below.
                }
                Err(err) => {
                    warn!(agent = %agent_id, %phase, "agent failed: {err}");
                    self.sink
                        .line(&agent_id, phase, &format!("error: {err}"), false);
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(QuorumErr::Interrupted);
        }

        // Completion order is meaningless; hand results back in the stable
        // order of the participant list.
        let responses: Vec<AgentResponse<T>> = participants
            .iter()
            .filter_map(|agent| {
                settled.remove(&agent.id).map(|payload| AgentResponse {
                    agent_id: agent.id.clone(),
                    payload,
                })
            })
            .collect();

        if responses.is_empty() {
            return Err(QuorumErr::PhaseStarved {
                phase: phase.to_string(),
            });
        }

        let rate = responses.len() as f64 / dispatched.max(1) as f64;
        if rate < self.response_threshold {
            warn!(
                %phase,
                responded = responses.len(),
                dispatched,
                "response rate {rate:.2} below threshold {:.2}",
                self.response_threshold
            );
        }

        Ok(responses)
    }
}
