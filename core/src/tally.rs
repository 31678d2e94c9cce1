//! Weighted aggregation of one round's votes.

use std::collections::HashSet;

use quorum_protocol::VoteResponse;

/// Aggregate standing of one candidate after a vote phase.
#[derive(Debug, Clone, PartialEq)]
pub struct TallyEntry {
    pub agent_id: String,
    pub weighted_sum: f64,
    pub weight_total: f64,
    /// Voters that scored this candidate, deduplicated.
    pub voters: Vec<String>,
    pub normalized: f64,
}

/// Per-candidate tallies in candidate (roster) order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    pub entries: Vec<TallyEntry>,
    pub valid_voters: usize,
}

impl Tally {
    /// The winning candidate: highest normalized score, first-in-order on
    /// exact ties. Candidate order is the roster order, so the tie-break is
    /// deterministic and independent of map iteration order.
    pub fn top(&self) -> Option<&TallyEntry> {
        let mut best: Option<&TallyEntry> = None;
        for entry in &self.entries {
            if best.is_none_or(|b| entry.normalized > b.normalized) {
                best = Some(entry);
            }
        }
        best
    }

    pub fn entry(&self, agent_id: &str) -> Option<&TallyEntry> {
        self.entries.iter().find(|e| e.agent_id == agent_id)
    }
}

/// Tally one round of votes.
///
/// `peer_critics` holds the voters that submitted a valid peer critique
/// this round; everyone else votes at `rubber_penalty` weight. The
/// normalized score divides by the number of valid voters, not the weight
/// total, so penalized voters genuinely drag their candidates down.
pub fn tally_votes(
    votes: &[(String, VoteResponse)],
    peer_critics: &HashSet<String>,
    rubber_penalty: f64,
    candidate_order: &[String],
) -> Tally {
    let valid_voters = votes.len();
    let mut entries = Vec::with_capacity(candidate_order.len());

    for candidate in candidate_order {
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut voters: Vec<String> = Vec::new();

        for (voter, vote) in votes {
            // At most one score per voter per candidate.
            if voters.iter().any(|v| v == voter) {
                continue;
            }
            let Some(score) = vote.score_for(candidate) else {
                continue;
            };
            let weight = if peer_critics.contains(voter) {
                1.0
            } else {
                rubber_penalty
            };
            weighted_sum += weight * score;
            weight_total += weight;
            voters.push(voter.clone());
        }

        let normalized = weighted_sum / valid_voters.max(1) as f64;
        entries.push(TallyEntry {
            agent_id: candidate.clone(),
            weighted_sum,
            weight_total,
            voters,
            normalized,
        });
    }

    Tally {
        entries,
        valid_voters,
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vote(scores: &[(&str, f64)]) -> VoteResponse {
        serde_json::from_value(serde_json::json!({
            "scores": scores
                .iter()
                .map(|(id, s)| serde_json::json!({"agent_id": id, "score": s}))
                .collect::<Vec<_>>(),
        }))
        .expect("vote")
    }

    fn all_critics(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unweighted_votes_average_over_valid_voters() {
        let votes = vec![
            ("a".to_string(), vote(&[("a", 0.9), ("b", 0.3)])),
            ("b".to_string(), vote(&[("a", 0.9), ("b", 0.3)])),
            ("c".to_string(), vote(&[("a", 0.9), ("b", 0.3)])),
        ];
        let order = vec!["a".to_string(), "b".to_string()];
        let tally = tally_votes(&votes, &all_critics(&["a", "b", "c"]), 0.5, &order);

        let top = tally.top().expect("top");
        assert_eq!(top.agent_id, "a");
        assert!((top.normalized - 0.9).abs() < 1e-9);
        assert_eq!(top.voters.len(), 3);
    }

    #[test]
    fn rubber_stamped_voter_is_downweighted_but_still_counts_in_divisor() {
        // "c" voted without critiquing: its 0.9 for "a" only contributes
        // 0.45, while the divisor stays 3.
        let votes = vec![
            ("a".to_string(), vote(&[("a", 0.9)])),
            ("b".to_string(), vote(&[("a", 0.9)])),
            ("c".to_string(), vote(&[("a", 0.9)])),
        ];
        let order = vec!["a".to_string()];
        let tally = tally_votes(&votes, &all_critics(&["a", "b"]), 0.5, &order);

        let entry = tally.entry("a").expect("entry");
        assert!((entry.weighted_sum - 2.25).abs() < 1e-9);
        assert!((entry.normalized - 0.75).abs() < 1e-9);
        assert!((entry.weight_total - 2.5).abs() < 1e-9);
    }

    #[test]
    fn missing_score_lowers_a_candidate() {
        // "b" did not score "a"; divisor is still the number of voters.
        let votes = vec![
            ("a".to_string(), vote(&[("a", 1.0)])),
            ("b".to_string(), vote(&[])),
        ];
        let order = vec!["a".to_string()];
        let tally = tally_votes(&votes, &all_critics(&["a", "b"]), 0.5, &order);
        let entry = tally.entry("a").expect("entry");
        assert!((entry.normalized - 0.5).abs() < 1e-9);
        assert_eq!(entry.voters, vec!["a".to_string()]);
    }

    #[test]
    fn exact_ties_resolve_to_the_first_candidate_in_order() {
        let votes = vec![("v".to_string(), vote(&[("x", 0.8), ("y", 0.8)]))];
        let order = vec!["x".to_string(), "y".to_string()];
        let tally = tally_votes(&votes, &all_critics(&["v"]), 0.5, &order);
        assert_eq!(tally.top().expect("top").agent_id, "x");

        // Same scores, reversed candidate order: the other candidate wins.
        let order = vec!["y".to_string(), "x".to_string()];
        let tally = tally_votes(&votes, &all_critics(&["v"]), 0.5, &order);
        assert_eq!(tally.top().expect("top").agent_id, "y");
    }

    #[test]
    fn duplicate_scores_from_one_voter_count_once() {
        let vote_with_dup: VoteResponse = serde_json::from_str(
            r#"{"scores": [
                {"agent_id": "a", "score": 0.9},
                {"agent_id": "a", "score": 0.1}
            ]}"#,
        )
        .expect("vote");
        let votes = vec![("v".to_string(), vote_with_dup)];
        let order = vec!["a".to_string()];
        let tally = tally_votes(&votes, &all_critics(&["v"]), 0.5, &order);
        let entry = tally.entry("a").expect("entry");
        assert_eq!(entry.voters.len(), 1);
        assert!((entry.weighted_sum - 0.9).abs() < 1e-9);
    }

    #[test]
    fn empty_vote_set_produces_empty_entries() {
        let order = vec!["a".to_string()];
        let tally = tally_votes(&[], &HashSet::new(), 0.5, &order);
        assert_eq!(tally.valid_voters, 0);
        assert_eq!(tally.entry("a").expect("entry").normalized, 0.0);
    }
}
