//! Connection discovery: run every rule over every candidate and merge.
//!
//! The engine is a pure function. It performs no I/O; the caller loads
//! the subject, its candidates and their vectors, and persists the result.
//!
//! # Merge policy
//!
//! Rules may fire for the same pair under different edge types, and each
//! type is kept separately. Within one `(candidate, type)` key only the
//! highest score survives; equal scores fall back to the lexicographically
//! smaller reason, so the merged output does not depend on the order in
//! which rules or candidates were evaluated.

use std::collections::BTreeMap;

use crate::models::{ConnectionMatch, EdgeType, Testimony, TestimonyEmbedding};
use crate::rules::{DiscoveryOptions, PairContext, RuleMatch, RULES};

/// A testimony that may be connected to the subject, with its vectors.
pub struct Candidate<'a> {
    pub testimony: &'a Testimony,
    pub vectors: &'a [TestimonyEmbedding],
}

/// Compute all connections from `subject` to `candidates`.
///
/// The subject itself is skipped if it appears among the candidates.
/// Results are sorted by score descending, then by candidate id and type.
pub fn discover_connections(
    subject: &Testimony,
    subject_vectors: &[TestimonyEmbedding],
    candidates: &[Candidate<'_>],
    opts: &DiscoveryOptions,
) -> Vec<ConnectionMatch> {
    let mut found = Vec::new();

    for candidate in candidates {
        if candidate.testimony.id == subject.id {
            continue;
        }
        let pair = PairContext {
            subject,
            candidate: candidate.testimony,
            subject_vectors,
            candidate_vectors: candidate.vectors,
        };
        for (_, rule) in RULES {
            if let Some(m) = rule(&pair, opts) {
                found.push((candidate.testimony.id.clone(), m));
            }
        }
    }

    merge_matches(found)
}

/// Keep the best match per `(candidate, type)` and sort the result.
///
/// Accepts matches in any order, so rule evaluation can be split up and
/// recombined here.
pub fn merge_matches<I>(matches: I) -> Vec<ConnectionMatch>
where
    I: IntoIterator<Item = (String, RuleMatch)>,
{
    let mut best: BTreeMap<(String, EdgeType), RuleMatch> = BTreeMap::new();

    for (to_id, m) in matches {
        if !m.score.is_finite() {
            continue;
        }
        match best.get(&(to_id.clone(), m.edge_type)) {
            Some(existing)
                if existing.score > m.score
                    || (existing.score == m.score && existing.reason <= m.reason) => {}
            _ => {
                best.insert((to_id, m.edge_type), m);
            }
        }
    }

    let mut out: Vec<ConnectionMatch> = best
        .into_iter()
        .map(|((to_id, edge_type), m)| ConnectionMatch {
            to_id,
            edge_type,
            score: m.score,
            reason: m.reason,
        })
        .collect();

    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.to_id.cmp(&b.to_id))
            .then_with(|| a.edge_type.cmp(&b.edge_type))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::testimony;

    fn rule_match(edge_type: EdgeType, score: f64, reason: &str) -> RuleMatch {
        RuleMatch {
            edge_type,
            score,
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_end_to_end_same_event_and_nearby() {
        let mut a = testimony("a");
        a.event = Some("Genocide".into());
        a.date_of_event = Some("1994-04-07".parse().unwrap());
        let mut b = testimony("b");
        b.event = Some("Genocide".into());
        b.date_of_event = Some("1994-04-09".parse().unwrap());

        let candidates = [Candidate {
            testimony: &b,
            vectors: &[],
        }];
        let found = discover_connections(&a, &[], &candidates, &DiscoveryOptions::default());

        assert_eq!(found.len(), 2, "got {:?}", found);
        assert_eq!(found[0].edge_type, EdgeType::SameEvent);
        assert!((found[0].score - 0.90).abs() < 1e-9);
        assert_eq!(found[1].edge_type, EdgeType::NearbyDates);
        assert!((found[1].score - 0.69).abs() < 0.01);
        assert!(found.iter().all(|m| m.to_id == "b"));
    }

    #[test]
    fn test_subject_is_never_its_own_candidate() {
        let mut a = testimony("a");
        a.event = Some("Genocide".into());
        let candidates = [Candidate {
            testimony: &a,
            vectors: &[],
        }];
        let found = discover_connections(&a, &[], &candidates, &DiscoveryOptions::default());
        assert!(found.is_empty());
    }

    #[test]
    fn test_merge_keeps_max_per_type() {
        let merged = merge_matches(vec![
            ("b".to_string(), rule_match(EdgeType::SamePerson, 0.85, "name")),
            ("b".to_string(), rule_match(EdgeType::SamePerson, 0.90, "name+rel")),
            ("b".to_string(), rule_match(EdgeType::SameEvent, 0.90, "event")),
        ]);
        assert_eq!(merged.len(), 2);
        let person = merged
            .iter()
            .find(|m| m.edge_type == EdgeType::SamePerson)
            .unwrap();
        assert_eq!(person.reason, "name+rel");
    }

    #[test]
    fn test_merge_is_order_independent() {
        let input = vec![
            ("c".to_string(), rule_match(EdgeType::SameYear, 0.70, "y")),
            ("b".to_string(), rule_match(EdgeType::SameEvent, 0.90, "e1")),
            ("b".to_string(), rule_match(EdgeType::SameEvent, 0.90, "e2")),
            ("b".to_string(), rule_match(EdgeType::SameLocation, 0.80, "l")),
        ];
        let forward = merge_matches(input.clone());
        let mut reversed_input = input;
        reversed_input.reverse();
        let reversed = merge_matches(reversed_input);

        assert_eq!(forward, reversed);
        assert_eq!(forward[0].edge_type, EdgeType::SameEvent);
        assert_eq!(forward[0].reason, "e1");
        assert_eq!(forward[2].to_id, "c");
    }

    #[test]
    fn test_merge_drops_non_finite_scores() {
        let merged = merge_matches(vec![(
            "b".to_string(),
            rule_match(EdgeType::SemanticSimilarity, f64::NAN, "nan"),
        )]);
        assert!(merged.is_empty());
    }
}
