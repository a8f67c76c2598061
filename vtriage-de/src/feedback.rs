//! Feedback export for external heuristics tooling
//!
//! Emits the run's decision records and aggregate reason frequencies as a
//! single JSON document. The engine is a pass-through here: it neither
//! proposes nor applies new heuristics, it only hands evidence to whatever
//! consumes the export.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vtriage_common::types::DecisionRecord;

/// Everything an external heuristics proposer needs from one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackExport {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub total_chunks: usize,
    /// How often each reason code appeared across all decisions
    pub reason_frequencies: BTreeMap<String, usize>,
    /// Verdict counts keyed by verdict name
    pub verdict_counts: BTreeMap<String, usize>,
    /// Decisions attributed to the fallback classifier rather than the
    /// keyword fast path. These are the candidates for new heuristics.
    pub classifier_attributed: Vec<DecisionRecord>,
    pub decisions: Vec<DecisionRecord>,
}

/// Build the feedback document from a run's decision records.
pub fn export(decisions: &[DecisionRecord]) -> FeedbackExport {
    let mut reason_frequencies: BTreeMap<String, usize> = BTreeMap::new();
    let mut verdict_counts: BTreeMap<String, usize> = BTreeMap::new();
    for decision in decisions {
        for reason in &decision.reasons {
            *reason_frequencies.entry(reason.clone()).or_insert(0) += 1;
        }
        *verdict_counts
            .entry(decision.verdict.as_str().to_string())
            .or_insert(0) += 1;
    }

    let classifier_attributed = decisions
        .iter()
        .filter(|d| {
            matches!(
                d.provenance,
                Some(vtriage_common::types::Provenance::Classifier)
            )
        })
        .cloned()
        .collect();

    FeedbackExport {
        generated_at: chrono::Utc::now(),
        total_chunks: decisions.len(),
        reason_frequencies,
        verdict_counts,
        classifier_attributed,
        decisions: decisions.to_vec(),
    }
}
