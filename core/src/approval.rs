//! Owner approval gate.
//!
//! Owners are veto holders: consensus alone is not enough while any owner
//! rates the winner below the configured floor. Scores are read raw from
//! the round's votes, before any rubber-stamp weighting.

use quorum_protocol::VoteResponse;
use tracing::debug;

use crate::config::OwnerConfig;
use crate::config::OwnerMode;

/// Whether the configured owners approve `winner` given this round's votes.
pub fn owner_approves(
    config: &OwnerConfig,
    winner: &str,
    votes: &[(String, VoteResponse)],
) -> bool {
    if config.ids.is_empty() {
        return true;
    }

    let mut any_approved = false;
    let mut all_approved = true;
    for owner in &config.ids {
        let score = votes
            .iter()
            .find(|(voter, _)| voter == owner)
            .and_then(|(_, vote)| vote.score_for(winner));
        match score {
            Some(score) if score >= config.min_score => any_approved = true,
            Some(score) => {
                debug!(%owner, winner, score, "owner scored winner below floor");
                all_approved = false;
            }
            // An owner that did not vote (or did not score the winner)
            // cannot approve and blocks `all` mode.
            None => {
                debug!(%owner, winner, "owner did not score the winner");
                all_approved = false;
            }
        }
    }

    match config.mode {
        OwnerMode::Any => any_approved,
        OwnerMode::All => all_approved,
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn vote(scores: &[(&str, f64)]) -> VoteResponse {
        serde_json::from_value(serde_json::json!({
            "scores": scores
                .iter()
                .map(|(id, s)| serde_json::json!({"agent_id": id, "score": s}))
                .collect::<Vec<_>>(),
        }))
        .expect("vote")
    }

    fn owners(ids: &[&str], min_score: f64, mode: OwnerMode) -> OwnerConfig {
        OwnerConfig {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            min_score,
            mode,
        }
    }

    #[test]
    fn no_owners_means_unconditional_approval() {
        let config = owners(&[], 0.9, OwnerMode::All);
        assert!(owner_approves(&config, "a", &[]));
    }

    #[test]
    fn any_mode_needs_one_owner_at_or_above_floor() {
        let votes = vec![
            ("o1".to_string(), vote(&[("a", 0.7)])),
            ("o2".to_string(), vote(&[("a", 0.9)])),
        ];
        let config = owners(&["o1", "o2"], 0.85, OwnerMode::Any);
        assert!(owner_approves(&config, "a", &votes));

        let config = owners(&["o1"], 0.85, OwnerMode::Any);
        assert!(!owner_approves(&config, "a", &votes));
    }

    #[test]
    fn all_mode_needs_every_owner_at_or_above_floor() {
        let votes = vec![
            ("o1".to_string(), vote(&[("a", 0.9)])),
            ("o2".to_string(), vote(&[("a", 0.9)])),
        ];
        let config = owners(&["o1", "o2"], 0.85, OwnerMode::All);
        assert!(owner_approves(&config, "a", &votes));

        let votes = vec![
            ("o1".to_string(), vote(&[("a", 0.9)])),
            ("o2".to_string(), vote(&[("a", 0.2)])),
        ];
        assert!(!owner_approves(&config, "a", &votes));
    }

    #[test]
    fn all_mode_fails_when_an_owner_did_not_vote() {
        let votes = vec![("o1".to_string(), vote(&[("a", 0.9)]))];
        let config = owners(&["o1", "o2"], 0.85, OwnerMode::All);
        assert!(!owner_approves(&config, "a", &votes));
    }

    #[test]
    fn boundary_score_counts_as_approval() {
        let votes = vec![("o1".to_string(), vote(&[("a", 0.85)]))];
        let config = owners(&["o1"], 0.85, OwnerMode::Any);
        assert!(owner_approves(&config, "a", &votes));
    }
}
