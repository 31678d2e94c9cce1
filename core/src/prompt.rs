//! Prompt template interpolation.
//!
//! Templates are plain strings with a fixed set of `{{NAME}}` placeholders.
//! Every occurrence of a known placeholder is substituted; unknown
//! placeholders are left verbatim so template bugs are visible in the
//! transcript instead of silently eaten.

use serde_json::Value;
use serde_json::json;

use crate::roster::AgentSpec;

/// Extra substitutions used only by the action-gate and action-execute
/// templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionVars<'a> {
    pub winner_agent: &'a str,
    pub final_answer: &'a str,
    pub proposal: &'a str,
    pub code_patch: &'a str,
    pub tests: &'a str,
    pub cwd: &'a str,
}

/// Everything a template may reference.
#[derive(Debug)]
pub struct PromptInputs<'a> {
    /// The full panel, regardless of which agents a phase targets.
    pub agents: &'a [AgentSpec],
    pub question: &'a str,
    /// Phase context object, rendered as pretty JSON.
    pub context: &'a Value,
    pub action: Option<ActionVars<'a>>,
}

pub fn build_prompt(template: &str, inputs: &PromptInputs) -> String {
    let mut prompt = template
        .replace("{{AGENTS}}", &roster_json(inputs.agents))
        .replace("{{QUESTION}}", inputs.question)
        .replace("{{CONTEXT}}", &format!("{:#}", inputs.context));
    if let Some(action) = inputs.action {
        prompt = prompt
            .replace("{{WINNER_AGENT}}", action.winner_agent)
            .replace("{{FINAL_ANSWER}}", action.final_answer)
            .replace("{{PROPOSAL}}", action.proposal)
            .replace("{{CODE_PATCH}}", action.code_patch)
            .replace("{{TESTS}}", action.tests)
            .replace("{{CWD}}", action.cwd);
    }
    prompt
}

fn roster_json(agents: &[AgentSpec]) -> String {
    let entries: Vec<Value> = agents
        .iter()
        .map(|a| {
            json!({
                "agent_id": a.id,
                "agent_display_name": format!(">{}", a.display_name),
            })
        })
        .collect();
    Value::Array(entries).to_string()
}
