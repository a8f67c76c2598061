//! Decision analytics: pure aggregation of decision records into run-level
//! statistics
//!
//! No side effects beyond returning the summary; persistence is the caller's
//! responsibility.

use std::collections::BTreeMap;
use vtriage_common::config::DeciderConfig;
use vtriage_common::types::{DecisionRecord, RunSummary, Verdict};

/// How far a final score may sit from a threshold before its verdict is
/// considered stable.
const SENSITIVITY_BAND: f64 = 0.05;

/// Aggregate an ordered sequence of decision records into a run summary.
pub fn summarize(decisions: &[DecisionRecord], config: &DeciderConfig) -> RunSummary {
    let total = decisions.len();
    let mut kept = 0;
    let mut quarantined = 0;
    let mut discarded = 0;
    let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut reason_histogram: BTreeMap<String, usize> = BTreeMap::new();
    let mut score_sum = 0.0;
    let mut borderline = 0;
    let mut failures = Vec::new();

    let mut score_distribution: BTreeMap<String, usize> = BTreeMap::new();
    score_distribution.insert("0.0-0.3".to_string(), 0);
    score_distribution.insert("0.3-0.6".to_string(), 0);
    score_distribution.insert("0.6+".to_string(), 0);

    for decision in decisions {
        match decision.verdict {
            Verdict::Keep => kept += 1,
            Verdict::Quarantine => quarantined += 1,
            Verdict::Discard => discarded += 1,
        }

        *category_counts
            .entry(decision.category.to_string())
            .or_insert(0) += 1;

        for reason in &decision.reasons {
            *reason_histogram.entry(reason.clone()).or_insert(0) += 1;
            if reason == "no_input" {
                failures.push(format!("{}: no signals and no candidates", decision.chunk_id));
            }
        }

        score_sum += decision.final_score;

        let bucket = if decision.final_score < 0.3 {
            "0.0-0.3"
        } else if decision.final_score < 0.6 {
            "0.3-0.6"
        } else {
            "0.6+"
        };
        *score_distribution.entry(bucket.to_string()).or_insert(0) += 1;

        if verdict_flips(decision.final_score, config) {
            borderline += 1;
        }
    }

    RunSummary {
        total_chunks: total,
        kept,
        quarantined,
        discarded,
        keep_rate: if total > 0 { kept as f64 / total as f64 } else { 0.0 },
        avg_final_score: if total > 0 { score_sum / total as f64 } else { 0.0 },
        category_counts,
        reason_histogram,
        borderline_chunks: borderline,
        sensitivity: if total > 0 {
            borderline as f64 / total as f64
        } else {
            0.0
        },
        score_distribution,
        failures,
        discard_threshold: config.discard_threshold,
        keep_threshold: config.keep_threshold,
    }
}

/// Whether a +/-0.05 perturbation of the final score relative to the nearest
/// threshold would flip the verdict. Evaluated by re-banding the perturbed
/// scores so the closed lower bounds are honored exactly.
fn verdict_flips(final_score: f64, config: &DeciderConfig) -> bool {
    let base = band(final_score, config);
    band(final_score + SENSITIVITY_BAND, config) != base
        || band(final_score - SENSITIVITY_BAND, config) != base
}

fn band(score: f64, config: &DeciderConfig) -> Verdict {
    if score < config.discard_threshold {
        Verdict::Discard
    } else if score < config.keep_threshold {
        Verdict::Quarantine
    } else {
        Verdict::Keep
    }
}
