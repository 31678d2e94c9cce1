//! Consensus evaluation: mode threshold plus the blocker veto.

use std::collections::HashSet;

use tracing::debug;

use crate::config::DebateConfig;
use crate::tally::Tally;
use crate::tally::TallyEntry;

/// Outcome of one round's consensus check.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Reached { winner_id: String, score: f64 },
    NotReached,
}

impl Verdict {
    pub fn reached(&self) -> bool {
        matches!(self, Verdict::Reached { .. })
    }
}

/// Apply the configured threshold and, when `require_no_blockers` is set,
/// disqualify every candidate in `blocked` before picking the top one.
/// Disqualification is absolute: a blocked candidate cannot win this round
/// no matter its score, and a round whose only above-threshold candidates
/// are blocked yields no consensus.
pub fn evaluate(config: &DebateConfig, tally: &Tally, blocked: &HashSet<String>) -> Verdict {
    let threshold = config.threshold();

    let top = if config.require_no_blockers {
        let mut best = None;
        for entry in &tally.entries {
            if blocked.contains(&entry.agent_id) {
                debug!(candidate = %entry.agent_id, "disqualified by blocker veto");
                continue;
            }
            if best.is_none_or(|b: &TallyEntry| entry.normalized > b.normalized) {
                best = Some(entry);
            }
        }
        best
    } else {
        tally.top()
    };

    match top {
        Some(entry) if entry.normalized >= threshold => Verdict::Reached {
            winner_id: entry.agent_id.clone(),
            score: entry.normalized,
        },
        _ => Verdict::NotReached,
    }
}
