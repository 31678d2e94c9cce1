//! Wire types for the debate protocol between the orchestrator and its agents.
//!
//! Every agent invocation is a short-lived child process that receives a
//! prompt and is expected to print a single JSON object on stdout. The types
//! here describe those JSON objects, one per debate phase. Decoding is
//! deliberately lenient: agents are external CLIs with wildly different
//! levels of schema discipline, so every field that is not required for an
//! orchestration decision falls back to a default instead of failing the
//! whole response.

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

/// Severity of a single critique point. `Blocker` participates in the
/// consensus veto; the other two levels are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Blocker,
}

/// Self-reported confidence attached to a proposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Confidence {
    Low,
    #[default]
    Medium,
    High,
}

/// A proposal as emitted in the propose phase, and re-emitted (inside
/// [`RevisedProposal`]) by the revise phase.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProposalPayload {
    pub proposal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_patch: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub tests: Vec<String>,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub confidence: Confidence,
}

impl ProposalPayload {
    /// A proposal is actionable when it carries something that could be
    /// executed: a code patch or at least one test.
    pub fn is_actionable(&self) -> bool {
        self.code_patch.as_deref().is_some_and(|p| !p.trim().is_empty())
            || !self.tests.is_empty()
    }
}

/// One critique point inside a [`Critique`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CritiquePoint {
    #[serde(default)]
    pub claim_or_line: String,
    pub severity: Severity,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub suggested_fix: String,
}

/// A critique of one target agent's proposal.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Critique {
    pub target_agent: String,
    #[serde(default)]
    pub points: Vec<CritiquePoint>,
    #[serde(default)]
    pub conversation_message: String,
}

/// Critique-phase response: one entry per reviewed proposal.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CritiqueResponse {
    #[serde(default)]
    pub critiques: Vec<Critique>,
}

impl CritiqueResponse {
    /// Whether any critique in this response targets a peer (an agent other
    /// than `author`) with at least one point. Self-critiques do not count.
    pub fn critiques_a_peer(&self, author: &str) -> bool {
        self.critiques
            .iter()
            .any(|c| c.target_agent != author && !c.points.is_empty())
    }

    /// Blocker-severity targets named by this response.
    pub fn blocker_targets(&self) -> impl Iterator<Item = &str> {
        self.critiques.iter().filter_map(|c| {
            c.points
                .iter()
                .any(|p| p.severity == Severity::Blocker)
                .then_some(c.target_agent.as_str())
        })
    }
}

/// A `[0,1]` score assigned to one candidate by one voter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScoreEntry {
    pub agent_id: String,
    pub score: f64,
}

/// An issue a voter considers disqualifying for a candidate. Recorded for
/// logging; the consensus veto reads critique severities, not these.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BlockingIssue {
    pub agent_id: String,
    #[serde(default)]
    pub issue: String,
}

/// An optional suggestion to merge several proposals. The orchestrator does
/// not attempt to reconcile these; they are surfaced verbatim.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MergeSuggestion {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub source_agents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_patch: Option<String>,
}

/// Vote-phase response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct VoteResponse {
    #[serde(default)]
    pub scores: Vec<ScoreEntry>,
    #[serde(default)]
    pub blocking_issues: Vec<BlockingIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_suggestion: Option<MergeSuggestion>,
    #[serde(default)]
    pub conversation_message: String,
}

impl VoteResponse {
    /// The first score this voter assigned to `candidate`, clamped to
    /// `[0,1]`. Duplicate entries for the same candidate are ignored.
    pub fn score_for(&self, candidate: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|s| s.agent_id == candidate)
            .map(|s| s.score.clamp(0.0, 1.0))
    }
}

/// What a reviser did with one critic's feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeedbackAction {
    Revised,
    Rejected,
}

/// Per-critic disposition attached to a revision.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeedbackDisposition {
    pub critic_agent: String,
    #[serde(default)]
    pub feedback_accepted: String,
    #[serde(default)]
    pub feedback_rejected: String,
    pub action_taken: FeedbackAction,
    #[serde(default)]
    pub conversation_message: String,
}

/// The revised proposal body. `is_changed = false` means the agent stands by
/// its current proposal and the orchestrator keeps the prior payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RevisedProposal {
    #[serde(default)]
    pub is_changed: bool,
    #[serde(flatten)]
    pub payload: ProposalPayload,
}

/// Revise-phase response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RevisionResponse {
    pub revised: RevisedProposal,
    #[serde(default)]
    pub response_to_feedback: Vec<FeedbackDisposition>,
}

/// Category of action a winning proposal asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionType {
    CodeExecution,
    CommandRun,
    PatchApply,
    #[default]
    InfoOnly,
}

/// Action-agreement response from a non-winner agent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ActionAgreeResponse {
    #[serde(default)]
    pub is_actionable: bool,
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub action_description: String,
    #[serde(default)]
    pub agreed: bool,
    #[serde(default)]
    pub reason: String,
}

/// Action-execution report from the winning agent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ActionExecuteResponse {
    #[serde(default)]
    pub executed: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn proposal_decodes_with_minimal_fields() {
        let payload: ProposalPayload =
            serde_json::from_str(r#"{"proposal": "use a B-tree"}"#).expect("decode");
        assert_eq!(payload.proposal, "use a B-tree");
        assert_eq!(payload.confidence, Confidence::Medium);
        assert!(payload.key_points.is_empty());
        assert!(!payload.is_actionable());
    }

    #[test]
    fn proposal_with_tests_is_actionable() {
        let payload: ProposalPayload = serde_json::from_str(
            r#"{"proposal": "p", "tests": ["cargo test btree"], "confidence": "high"}"#,
        )
        .expect("decode");
        assert!(payload.is_actionable());
        assert_eq!(payload.confidence, Confidence::High);
    }

    #[test]
    fn whitespace_code_patch_is_not_actionable() {
        let payload: ProposalPayload =
            serde_json::from_str(r#"{"proposal": "p", "code_patch": "  \n"}"#).expect("decode");
        assert!(!payload.is_actionable());
    }

    #[test]
    fn revision_flattens_proposal_fields() {
        let revision: RevisionResponse = serde_json::from_str(
            r#"{
                "revised": {
                    "is_changed": true,
                    "proposal": "revised text",
                    "key_points": ["kp"],
                    "confidence": "low"
                },
                "response_to_feedback": [{
                    "critic_agent": "b",
                    "action_taken": "revised"
                }]
            }"#,
        )
        .expect("decode");
        assert!(revision.revised.is_changed);
        assert_eq!(revision.revised.payload.proposal, "revised text");
        assert_eq!(revision.response_to_feedback[0].action_taken, FeedbackAction::Revised);
    }

    #[test]
    fn self_critique_does_not_count_as_peer_review() {
        let response: CritiqueResponse = serde_json::from_str(
            r#"{"critiques": [{
                "target_agent": "a",
                "points": [{"severity": "major"}],
                "conversation_message": "hm"
            }]}"#,
        )
        .expect("decode");
        assert!(!response.critiques_a_peer("a"));
        assert!(response.critiques_a_peer("b"));
    }

    #[test]
    fn blocker_targets_collects_only_blockers() {
        let response: CritiqueResponse = serde_json::from_str(
            r#"{"critiques": [
                {"target_agent": "a", "points": [{"severity": "blocker", "rationale": "r"}]},
                {"target_agent": "b", "points": [{"severity": "minor"}]}
            ]}"#,
        )
        .expect("decode");
        let targets: Vec<&str> = response.blocker_targets().collect();
        assert_eq!(targets, vec!["a"]);
    }

    #[test]
    fn vote_scores_are_clamped() {
        let vote: VoteResponse = serde_json::from_str(
            r#"{"scores": [{"agent_id": "a", "score": 1.4}, {"agent_id": "a", "score": 0.1}]}"#,
        )
        .expect("decode");
        assert_eq!(vote.score_for("a"), Some(1.0));
        assert_eq!(vote.score_for("missing"), None);
    }
}
