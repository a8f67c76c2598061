//! Run explainer: renders decisions, analytics, and the action log into a
//! run-level narrative and per-chunk justifications
//!
//! Pure rendering over immutable inputs. No judgment logic lives here; it
//! must never alter a verdict.

use std::collections::BTreeMap;
use vtriage_common::types::{
    ActionLogEntry, ChunkId, ClipExplanation, DecisionRecord, RunSummary,
};

/// Render the run narrative and one explanation per chunk.
pub fn explain(
    decisions: &[DecisionRecord],
    summary: &RunSummary,
    action_log: &[ActionLogEntry],
) -> (String, BTreeMap<ChunkId, ClipExplanation>) {
    // Last log entry per chunk is the ground truth of what happened to it.
    let mut final_actions: BTreeMap<&ChunkId, &ActionLogEntry> = BTreeMap::new();
    for entry in action_log {
        final_actions.insert(&entry.chunk_id, entry);
    }

    let mut explanations = BTreeMap::new();
    for decision in decisions {
        let action = final_actions.get(&decision.chunk_id);
        let why: Vec<String> = decision.reasons.iter().map(|r| humanize(r)).collect();

        explanations.insert(
            decision.chunk_id.clone(),
            ClipExplanation {
                chunk_id: decision.chunk_id.clone(),
                verdict: decision.verdict,
                final_score: decision.final_score,
                category: decision.category.clone(),
                why,
                outcome: action.map(|a| a.outcome),
                destination: action.and_then(|a| a.destination.clone()),
            },
        );
    }

    (narrative(summary), explanations)
}

fn narrative(summary: &RunSummary) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Analysis complete. {} chunks were analyzed.",
        summary.total_chunks
    ));

    if summary.kept > 0 {
        lines.push(format!(
            "{} chunks were selected with high confidence (keep rate {:.0}%).",
            summary.kept,
            summary.keep_rate * 100.0
        ));
    } else {
        lines.push("No chunks met the keep threshold.".to_string());
    }

    if summary.quarantined > 0 {
        lines.push(format!(
            "{} chunks were borderline and moved to quarantine for review.",
            summary.quarantined
        ));
    }

    if summary.discarded > 0 {
        lines.push(format!("{} chunks were discarded.", summary.discarded));
    }

    let top_reasons = top_rejection_reasons(summary, 3);
    if !top_reasons.is_empty() {
        lines.push(format!(
            "Most rejections were due to: {}.",
            top_reasons.join(", ")
        ));
    }

    lines.push(format!(
        "The average final score across all chunks was {:.2} (thresholds {:.2}/{:.2}).",
        summary.avg_final_score, summary.discard_threshold, summary.keep_threshold
    ));

    if summary.borderline_chunks > 0 {
        lines.push(format!(
            "{} chunks sat within 0.05 of a threshold; small policy changes would flip them.",
            summary.borderline_chunks
        ));
    }

    if !summary.failures.is_empty() {
        lines.push(format!(
            "{} chunks reported failures; see per-chunk explanations.",
            summary.failures.len()
        ));
    }

    lines.join("\n")
}

/// Most frequent rejection-flavored reason codes, humanized.
fn top_rejection_reasons(summary: &RunSummary, limit: usize) -> Vec<String> {
    let mut rejections: Vec<(&String, &usize)> = summary
        .reason_histogram
        .iter()
        .filter(|(reason, _)| {
            reason.starts_with("low:") || reason.starts_with("missing:") || *reason == "no_input"
        })
        .collect();
    rejections.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    rejections
        .into_iter()
        .take(limit)
        .map(|(reason, _)| humanize(reason))
        .collect()
}

/// Turn a machine-readable reason code into a human-readable phrase.
fn humanize(reason: &str) -> String {
    if let Some(signal) = reason.strip_prefix("low:") {
        return format!("low {signal} signal");
    }
    if let Some(signal) = reason.strip_prefix("missing:") {
        return format!("no {signal} signal recorded");
    }
    if let Some(rest) = reason.strip_prefix("category:") {
        return match rest.rsplit_once(':') {
            Some((category, "default")) => {
                format!("defaulted to {category} (no semantic candidates)")
            }
            Some((category, "keyword")) => {
                format!("categorized {category} via keyword match")
            }
            Some((category, "classifier")) => {
                format!("categorized {category} via fallback classifier")
            }
            _ => format!("categorized {rest}"),
        };
    }
    if reason == "no_input" {
        return "no signals or candidates were supplied".to_string();
    }
    reason.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics;
    use chrono::Utc;
    use vtriage_common::config::DeciderConfig;
    use vtriage_common::types::{ActionKind, ActionOutcome, Category, Verdict};

    fn decision(chunk: &str, final_score: f64, verdict: Verdict, reasons: &[&str]) -> DecisionRecord {
        DecisionRecord {
            chunk_id: ChunkId::new(chunk),
            aggregate_score: final_score,
            final_score,
            category: Category::General,
            category_confidence: 0.0,
            provenance: None,
            verdict,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_narrative_mentions_key_figures() {
        let decisions = vec![
            decision("a.mp4", 0.9, Verdict::Keep, &[]),
            decision("b.mp4", 0.5, Verdict::Quarantine, &["low:speech"]),
            decision("c.mp4", 0.1, Verdict::Discard, &["low:face", "low:speech"]),
        ];
        let summary = analytics::summarize(&decisions, &DeciderConfig::default());
        let (narrative, _) = explain(&decisions, &summary, &[]);

        assert!(narrative.contains("3 chunks were analyzed"));
        assert!(narrative.contains("1 chunks were selected"));
        assert!(narrative.contains("quarantine"));
        assert!(narrative.contains("low speech signal"));
    }

    #[test]
    fn test_clip_explanation_carries_action_outcome() {
        let decisions = vec![decision("a.mp4", 0.9, Verdict::Keep, &["category:general:default"])];
        let summary = analytics::summarize(&decisions, &DeciderConfig::default());
        let log = vec![ActionLogEntry {
            chunk_id: ChunkId::new("a.mp4"),
            kind: ActionKind::Move,
            outcome: ActionOutcome::Applied,
            destination: Some("out/general/a.mp4".to_string()),
            detail: None,
            executed_at: Utc::now(),
        }];

        let (_, explanations) = explain(&decisions, &summary, &log);
        let clip = &explanations[&ChunkId::new("a.mp4")];
        assert_eq!(clip.outcome, Some(ActionOutcome::Applied));
        assert_eq!(clip.destination.as_deref(), Some("out/general/a.mp4"));
        assert_eq!(clip.verdict, Verdict::Keep);
        assert!(clip.why[0].contains("defaulted to general"));
    }

    #[test]
    fn test_explainer_does_not_alter_verdicts() {
        let decisions = vec![decision("a.mp4", 0.2, Verdict::Discard, &["no_input"])];
        let summary = analytics::summarize(&decisions, &DeciderConfig::default());
        let (_, explanations) = explain(&decisions, &summary, &[]);
        assert_eq!(
            explanations[&ChunkId::new("a.mp4")].verdict,
            decisions[0].verdict
        );
    }

    #[test]
    fn test_humanize_reason_codes() {
        assert_eq!(humanize("low:motion"), "low motion signal");
        assert_eq!(humanize("missing:face"), "no face signal recorded");
        assert_eq!(
            humanize("category:product_related:keyword"),
            "categorized product_related via keyword match"
        );
        assert_eq!(
            humanize("no_input"),
            "no signals or candidates were supplied"
        );
    }
}
