//! Per-field decision procedure over sanitized, validated candidates.

use crate::config::ReconcileConfig;
use crate::fields::FieldKind;
use crate::record::{FieldCandidate, FieldFusionResult, FusionDecision};
use crate::source::SourceKind;

const TIE_EPSILON: f64 = 1e-9;

/// `reliability × pattern boost × catalog boost`, clamped to `[0, 1]`.
#[must_use]
pub fn candidate_score(candidate: &FieldCandidate, config: &ReconcileConfig) -> f64 {
    let mut score = candidate.source_reliability;
    if candidate.matches_pattern {
        score *= config.pattern_boost;
    }
    if candidate.matches_catalog {
        score *= config.catalog_boost;
    }
    score.clamp(0.0, 1.0)
}

/// Case-insensitive normalized Levenshtein similarity in `[0, 1]`.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Only names and addresses tolerate approximate agreement; identifiers,
/// case numbers, accounts, amounts, and dates must match exactly.
#[must_use]
pub fn fuzzy_threshold(kind: FieldKind, config: &ReconcileConfig) -> Option<f64> {
    match kind {
        FieldKind::PersonName => Some(config.name_threshold),
        FieldKind::Address => Some(config.address_threshold),
        _ => None,
    }
}

#[must_use]
pub fn resolve_field(
    field: &str,
    kind: FieldKind,
    candidates: &[FieldCandidate],
    config: &ReconcileConfig,
) -> FieldFusionResult {
    let Some(first) = candidates.first() else {
        return FieldFusionResult::missing(field);
    };

    if candidates.len() == 1 {
        return outcome(
            field,
            Some(first.value.clone()),
            FusionDecision::SingleSource,
            candidate_score(first, config),
            candidates.iter(),
        );
    }

    if candidates.iter().all(|c| c.value == first.value) {
        let confidence = candidates
            .iter()
            .map(|c| c.source_reliability)
            .sum::<f64>()
            .min(1.0);
        return outcome(
            field,
            Some(first.value.clone()),
            FusionDecision::ExactMatch,
            confidence,
            candidates.iter(),
        );
    }

    if let Some(threshold) = fuzzy_threshold(kind, config) {
        if let Some(result) = fuzzy_match(field, candidates, threshold) {
            return result;
        }
    }

    weighted_vote(field, candidates, config)
}

fn fuzzy_match(
    field: &str,
    candidates: &[FieldCandidate],
    threshold: f64,
) -> Option<FieldFusionResult> {
    let mut best: Option<(usize, usize, f64)> = None;
    for i in 0..candidates.len() {
        for j in i + 1..candidates.len() {
            let score = similarity(&candidates[i].value, &candidates[j].value);
            if best.is_none_or(|(_, _, top)| score > top) {
                best = Some((i, j, score));
            }
        }
    }

    let (a, b, best_similarity) = best.filter(|(_, _, score)| *score >= threshold)?;
    let anchors = [&candidates[a].value, &candidates[b].value];
    let (cluster, outliers): (Vec<&FieldCandidate>, Vec<&FieldCandidate>) =
        candidates.iter().partition(|c| {
            anchors
                .iter()
                .any(|anchor| similarity(&c.value, anchor) >= threshold)
        });

    let chosen = cluster.iter().copied().max_by(|x, y| {
        x.source_reliability
            .total_cmp(&y.source_reliability)
            .then_with(|| y.source.cmp(&x.source))
    })?;

    for outlier in outliers {
        tracing::warn!(
            "Field {}: {} value {:?} does not match the agreeing sources",
            field,
            outlier.source,
            outlier.value
        );
    }

    let confidence =
        cluster.iter().map(|c| c.source_reliability).sum::<f64>().min(1.0) * best_similarity;
    Some(outcome(
        field,
        Some(chosen.value.clone()),
        FusionDecision::FuzzyMatch,
        confidence,
        cluster.into_iter(),
    ))
}

struct Tally<'a> {
    value: &'a str,
    score: f64,
    supporters: Vec<&'a FieldCandidate>,
}

fn weighted_vote(
    field: &str,
    candidates: &[FieldCandidate],
    config: &ReconcileConfig,
) -> FieldFusionResult {
    let mut tallies: Vec<Tally<'_>> = Vec::new();
    for candidate in candidates {
        let score = candidate_score(candidate, config);
        match tallies.iter_mut().find(|t| t.value == candidate.value) {
            Some(tally) => {
                tally.score = tally.score.max(score);
                tally.supporters.push(candidate);
            }
            None => tallies.push(Tally {
                value: &candidate.value,
                score,
                supporters: vec![candidate],
            }),
        }
    }
    tallies.sort_by(|a, b| b.score.total_cmp(&a.score));

    let winner = &tallies[0];
    if tallies.len() > 1 && (winner.score - tallies[1].score).abs() < TIE_EPSILON {
        tracing::warn!(
            "Field {}: {:?} and {:?} tie at score {:.3}; value withheld",
            field,
            winner.value,
            tallies[1].value,
            winner.score
        );
        return outcome(field, None, FusionDecision::Conflict, 0.0, candidates.iter());
    }

    for loser in &tallies[1..] {
        for candidate in &loser.supporters {
            tracing::warn!(
                "Field {}: discarded {:?} from {} (score {:.3} < {:.3})",
                field,
                candidate.value,
                candidate.source,
                loser.score,
                winner.score
            );
        }
    }

    outcome(
        field,
        Some(winner.value.to_string()),
        FusionDecision::WeightedVoting,
        winner.score,
        winner.supporters.iter().copied(),
    )
}

fn outcome<'a>(
    field: &str,
    value: Option<String>,
    decision: FusionDecision,
    confidence: f64,
    contributors: impl Iterator<Item = &'a FieldCandidate>,
) -> FieldFusionResult {
    let mut sources: Vec<SourceKind> = contributors.map(|c| c.source).collect();
    sources.sort();
    sources.dedup();

    FieldFusionResult {
        field_name: field.to_string(),
        value,
        decision,
        confidence: confidence.clamp(0.0, 1.0),
        contributing_sources: sources,
    }
}
