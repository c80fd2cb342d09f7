//! Scoring rules for connection discovery.
//!
//! Each rule looks at one (subject, candidate) pair and yields at most one
//! [`RuleMatch`]. Rules are independent of each other; the engine merges
//! their output.
//!
//! | Rule | Type | Score |
//! |------|------|-------|
//! | same event | `same_event` | 0.90 |
//! | same location | `same_location` | 0.80 |
//! | same mentioned person | `same_person` | 0.85, or 0.90 with matching relationship |
//! | same relation to event | `same_relation_to_event` | 0.75 |
//! | exact date | `same_date` | 0.95 |
//! | dates within window | `nearby_dates` | 0.70 → 0.50 |
//! | same month and year | `same_month` | 0.80 |
//! | same year | `same_year` | 0.70 |
//! | overlapping ranges | `overlapping_dates` | 0.60 → 0.75 |
//! | embedding cosine ≥ threshold | `semantic_similarity` | similarity |
//!
//! The four point-date rules form a cascade: the first that applies wins, so
//! a pair carries at most one of `same_date`, `nearby_dates`, `same_month`,
//! `same_year`.

use crate::dates::{interval_days, overlap_days, EventDate};
use crate::embedding::cosine_similarity;
use crate::models::{normalize_label, EdgeType, Testimony, TestimonyEmbedding};

pub const SAME_EVENT_SCORE: f64 = 0.90;
pub const SAME_LOCATION_SCORE: f64 = 0.80;
pub const SAME_PERSON_SCORE: f64 = 0.85;
pub const SAME_PERSON_AND_RELATIONSHIP_SCORE: f64 = 0.90;
pub const SAME_RELATION_SCORE: f64 = 0.75;
pub const SAME_DATE_SCORE: f64 = 0.95;
pub const SAME_MONTH_SCORE: f64 = 0.80;
pub const SAME_YEAR_SCORE: f64 = 0.70;
pub const OVERLAP_MIN_SCORE: f64 = 0.60;
pub const OVERLAP_MAX_SCORE: f64 = 0.75;
pub const NEARBY_MAX_SCORE: f64 = 0.70;
pub const NEARBY_MIN_SCORE: f64 = 0.50;

/// Tunables shared by all rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscoveryOptions {
    /// Minimum cosine similarity kept as a `semantic_similarity` edge.
    pub semantic_threshold: f64,
    /// Largest day distance that still counts as `nearby_dates`.
    pub nearby_window_days: i64,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            semantic_threshold: 0.70,
            nearby_window_days: 30,
        }
    }
}

/// Output of a single rule for a single pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub edge_type: EdgeType,
    pub score: f64,
    pub reason: String,
}

/// Everything a rule may look at for one comparison.
pub struct PairContext<'a> {
    pub subject: &'a Testimony,
    pub candidate: &'a Testimony,
    pub subject_vectors: &'a [TestimonyEmbedding],
    pub candidate_vectors: &'a [TestimonyEmbedding],
}

pub type RuleFn = fn(&PairContext<'_>, &DiscoveryOptions) -> Option<RuleMatch>;

/// All rules, in no required order.
pub const RULES: &[(&str, RuleFn)] = &[
    ("same_event", same_event),
    ("same_location", same_location),
    ("same_person", same_person),
    ("same_relation_to_event", same_relation_to_event),
    ("point_date", point_date),
    ("overlapping_dates", overlapping_dates),
    ("semantic_similarity", semantic_similarity),
];

fn same_label(a: Option<&str>, b: Option<&str>) -> Option<String> {
    let a = normalize_label(a?)?;
    let b = normalize_label(b?)?;
    if a == b {
        Some(a)
    } else {
        None
    }
}

pub fn same_event(pair: &PairContext<'_>, _opts: &DiscoveryOptions) -> Option<RuleMatch> {
    let label = same_label(pair.subject.event.as_deref(), pair.candidate.event.as_deref())?;
    Some(RuleMatch {
        edge_type: EdgeType::SameEvent,
        score: SAME_EVENT_SCORE,
        reason: format!("both describe the event '{}'", label),
    })
}

pub fn same_location(pair: &PairContext<'_>, _opts: &DiscoveryOptions) -> Option<RuleMatch> {
    same_label(
        pair.subject.location.as_deref(),
        pair.candidate.location.as_deref(),
    )?;
    // The location itself is left out of the reason: anonymous authors'
    // locations are redacted from API output.
    Some(RuleMatch {
        edge_type: EdgeType::SameLocation,
        score: SAME_LOCATION_SCORE,
        reason: "same location".to_string(),
    })
}

pub fn same_person(pair: &PairContext<'_>, _opts: &DiscoveryOptions) -> Option<RuleMatch> {
    let mut best: Option<RuleMatch> = None;

    for ours in &pair.subject.relatives {
        let Some(name) = normalize_label(&ours.name) else {
            continue;
        };
        for theirs in &pair.candidate.relatives {
            if normalize_label(&theirs.name).as_deref() != Some(name.as_str()) {
                continue;
            }
            let same_relationship = same_label(
                ours.relationship_type.as_deref(),
                theirs.relationship_type.as_deref(),
            );
            let m = match same_relationship {
                Some(rel) => RuleMatch {
                    edge_type: EdgeType::SamePerson,
                    score: SAME_PERSON_AND_RELATIONSHIP_SCORE,
                    reason: format!("both mention {} ({})", ours.name.trim(), rel),
                },
                None => RuleMatch {
                    edge_type: EdgeType::SamePerson,
                    score: SAME_PERSON_SCORE,
                    reason: format!("both mention {}", ours.name.trim()),
                },
            };
            if best.as_ref().map(|b| m.score > b.score).unwrap_or(true) {
                best = Some(m);
            }
        }
    }

    best
}

pub fn same_relation_to_event(
    pair: &PairContext<'_>,
    _opts: &DiscoveryOptions,
) -> Option<RuleMatch> {
    let label = same_label(
        pair.subject.relation_to_event.as_deref(),
        pair.candidate.relation_to_event.as_deref(),
    )?;
    Some(RuleMatch {
        edge_type: EdgeType::SameRelationToEvent,
        score: SAME_RELATION_SCORE,
        reason: format!("both authors are '{}'", label),
    })
}

/// Exact date, then nearby days, then same month, then same year.
pub fn point_date(pair: &PairContext<'_>, opts: &DiscoveryOptions) -> Option<RuleMatch> {
    let a = pair.subject.date_of_event?;
    let b = pair.candidate.date_of_event?;
    compare_point_dates(&a, &b, opts.nearby_window_days)
}

pub fn compare_point_dates(a: &EventDate, b: &EventDate, window_days: i64) -> Option<RuleMatch> {
    if a.is_exact() && b.is_exact() {
        let days = (a.date - b.date).num_days().abs();
        if days == 0 {
            return Some(RuleMatch {
                edge_type: EdgeType::SameDate,
                score: SAME_DATE_SCORE,
                reason: format!("same date {}", a),
            });
        }
        if window_days > 0 && days <= window_days {
            let span = NEARBY_MAX_SCORE - NEARBY_MIN_SCORE;
            let score = NEARBY_MAX_SCORE - span * days as f64 / window_days as f64;
            return Some(RuleMatch {
                edge_type: EdgeType::NearbyDates,
                score,
                reason: format!("dates {} days apart", days),
            });
        }
    }

    if a.year() != b.year() {
        return None;
    }

    match (a.month(), b.month()) {
        (Some(ma), Some(mb)) if ma == mb => Some(RuleMatch {
            edge_type: EdgeType::SameMonth,
            score: SAME_MONTH_SCORE,
            reason: format!("same month {}", a.date.format("%Y-%m")),
        }),
        _ => Some(RuleMatch {
            edge_type: EdgeType::SameYear,
            score: SAME_YEAR_SCORE,
            reason: format!("same year {}", a.year()),
        }),
    }
}

/// Only applies when at least one side gives a date range.
pub fn overlapping_dates(pair: &PairContext<'_>, _opts: &DiscoveryOptions) -> Option<RuleMatch> {
    if pair.subject.date_range.is_none() && pair.candidate.date_range.is_none() {
        return None;
    }

    let a = date_interval(pair.subject)?;
    let b = date_interval(pair.candidate)?;
    let overlap = overlap_days(a, b);
    if overlap == 0 {
        return None;
    }

    let shorter = interval_days(a).min(interval_days(b)).max(1);
    let fraction = (overlap as f64 / shorter as f64).min(1.0);
    let score = OVERLAP_MIN_SCORE + (OVERLAP_MAX_SCORE - OVERLAP_MIN_SCORE) * fraction;

    Some(RuleMatch {
        edge_type: EdgeType::OverlappingDates,
        score,
        reason: format!("periods overlap by {} days", overlap),
    })
}

fn date_interval(t: &Testimony) -> Option<(chrono::NaiveDate, chrono::NaiveDate)> {
    match (t.date_range, t.date_of_event) {
        (Some(range), _) => Some(range.interval()),
        (None, Some(date)) => Some(date.interval()),
        (None, None) => None,
    }
}

/// Best cosine similarity between any two compatible vectors.
///
/// Vectors are compatible when they come from the same model and have the
/// same non-zero dimensionality; anything else is skipped, never an error.
pub fn semantic_similarity(pair: &PairContext<'_>, opts: &DiscoveryOptions) -> Option<RuleMatch> {
    let mut best: Option<(f64, &str, &str)> = None;

    for ours in pair.subject_vectors {
        for theirs in pair.candidate_vectors {
            if ours.model != theirs.model || ours.dims() != theirs.dims() || ours.dims() == 0 {
                continue;
            }
            let sim = cosine_similarity(&ours.vector, &theirs.vector) as f64;
            if !sim.is_finite() {
                continue;
            }
            if best.map(|(b, _, _)| sim > b).unwrap_or(true) {
                best = Some((sim, ours.section.as_str(), theirs.section.as_str()));
            }
        }
    }

    let (sim, ours, theirs) = best?;
    if sim < opts.semantic_threshold {
        return None;
    }

    Some(RuleMatch {
        edge_type: EdgeType::SemanticSimilarity,
        score: sim.min(1.0),
        reason: format!("similar text ({} ~ {}, cosine {:.2})", ours, theirs, sim),
    })
}
