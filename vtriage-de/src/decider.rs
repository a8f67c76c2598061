//! The Decider: pure function mapping (scores, candidates, config) to a
//! decision record
//!
//! Deterministic and free of I/O: recomputing with identical inputs and
//! config reproduces an identical record, including reason-code ordering.
//! Independently testable without any filesystem or database dependency.

use std::collections::BTreeMap;
use vtriage_common::config::EngineConfig;
use vtriage_common::types::{
    Category, ChunkId, DecisionRecord, ScoreRecord, SemanticCandidate, Signal, Verdict,
};
use vtriage_common::{Error, Result};

/// Decide one chunk's verdict from its signal scores and semantic candidates.
///
/// Algorithm:
/// 1. Aggregate = weighted sum over configured signals; a missing signal
///    contributes zero and earns a `missing:` reason code.
/// 2. Category = candidate with the highest confidence x category weight,
///    ties broken by the fixed priority order. No candidate defaults to
///    `general` with zero bonus.
/// 3. Final = aggregate + category weight x chosen confidence, clamped to
///    the configured ceiling.
/// 4. Verdict bands with closed lower bounds: exactly `discard_threshold`
///    is QUARANTINE, exactly `keep_threshold` is KEEP.
pub fn decide(
    chunk_id: &ChunkId,
    scores: &[ScoreRecord],
    candidates: &[SemanticCandidate],
    config: &EngineConfig,
) -> Result<DecisionRecord> {
    check_policy(config)?;

    if scores.is_empty() && candidates.is_empty() {
        return Err(Error::IncompleteInput(chunk_id.to_string()));
    }

    // Deterministic signal -> value map; the store returns records ordered
    // by (signal, stage), so later stages win when a signal was re-scored.
    let mut values: BTreeMap<&Signal, f64> = BTreeMap::new();
    for record in scores {
        values.insert(&record.signal, record.value);
    }

    let mut reasons: Vec<String> = Vec::new();
    let mut aggregate = 0.0;

    for (signal, weight) in &config.decider.signal_weights {
        match values.get(signal) {
            Some(value) => {
                aggregate += weight * value;
                if *value < config.decider.low_marker(signal) {
                    reasons.push(format!("low:{signal}"));
                }
            }
            None => reasons.push(format!("missing:{signal}")),
        }
    }

    // Signals scored but not weighted still surface a low marker so the
    // explanation covers everything the perception layer reported.
    for (&signal, value) in &values {
        if !config.decider.signal_weights.contains_key(signal)
            && *value < config.decider.low_marker(signal)
        {
            reasons.push(format!("low:{signal}"));
        }
    }

    let chosen = select_candidate(candidates, config);
    let (category, confidence, bonus, provenance) = match chosen {
        Some(candidate) => {
            let weight = config.semantic.weight(&candidate.category);
            reasons.push(format!(
                "category:{}:{}",
                candidate.category,
                candidate.provenance.as_str()
            ));
            (
                candidate.category.clone(),
                candidate.confidence,
                weight * candidate.confidence,
                Some(candidate.provenance),
            )
        }
        None => {
            reasons.push("category:general:default".to_string());
            (Category::General, 0.0, 0.0, None)
        }
    };

    let final_score = (aggregate + bonus).min(config.decider.score_ceiling);

    let verdict = if final_score < config.decider.discard_threshold {
        Verdict::Discard
    } else if final_score < config.decider.keep_threshold {
        Verdict::Quarantine
    } else {
        Verdict::Keep
    };

    reasons.sort();
    reasons.dedup();

    Ok(DecisionRecord {
        chunk_id: chunk_id.clone(),
        aggregate_score: aggregate,
        final_score,
        category,
        category_confidence: confidence,
        provenance,
        verdict,
        reasons,
    })
}

/// Select the candidate with the highest weighted confidence. Ties break by
/// category priority, then raw confidence, then provenance (keyword before
/// classifier) so the choice is total and reproducible.
fn select_candidate<'a>(
    candidates: &'a [SemanticCandidate],
    config: &EngineConfig,
) -> Option<&'a SemanticCandidate> {
    candidates.iter().fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(current) => {
            if prefers(candidate, current, config) {
                Some(candidate)
            } else {
                Some(current)
            }
        }
    })
}

fn prefers(a: &SemanticCandidate, b: &SemanticCandidate, config: &EngineConfig) -> bool {
    let wa = a.confidence * config.semantic.weight(&a.category);
    let wb = b.confidence * config.semantic.weight(&b.category);
    if wa != wb {
        return wa > wb;
    }
    if a.category != b.category {
        return a.category < b.category; // lower rank = higher priority
    }
    if a.confidence != b.confidence {
        return a.confidence > b.confidence;
    }
    a.provenance < b.provenance
}

/// Policy sanity checks the decider re-asserts on every call: it is pure and
/// may be handed an unvalidated config in isolation.
fn check_policy(config: &EngineConfig) -> Result<()> {
    for (signal, weight) in &config.decider.signal_weights {
        if *weight < 0.0 {
            return Err(Error::Config(format!(
                "negative weight for signal '{signal}': {weight}"
            )));
        }
    }
    for (category, weight) in &config.semantic.category_weights {
        if *weight < 0.0 {
            return Err(Error::Config(format!(
                "negative weight for category '{category}': {weight}"
            )));
        }
    }
    if config.decider.discard_threshold >= config.decider.keep_threshold {
        return Err(Error::Config(format!(
            "discard_threshold ({}) must be below keep_threshold ({})",
            config.decider.discard_threshold, config.decider.keep_threshold
        )));
    }
    Ok(())
}
