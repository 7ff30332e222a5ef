//! Rule classification pipeline.
//!
//! Consumes word-chunk associations, orders the candidate chunks by
//! their position in the source document, runs the classifier over each
//! one, and keeps only confident rule verdicts. Output stays in document
//! order so downstream consumers read rules the way the book presents
//! them, not ranked by confidence.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    associations::AssociationIndex,
    chunk_store::{Chunk, ChunkStore},
    classifier::{Classification, Classifier, ClassifierInput},
};

/// Minimum classifier confidence for a chunk to be accepted as a rule.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Association score a word must reach to become a candidate term.
pub const HIGH_SCORE_THRESHOLD: f32 = 0.7;

/// Terms always worth probing for, regardless of corpus statistics.
const SEED_TERMS: &[&str] = &[
    "rule",
    "system",
    "mechanic",
    "dice",
    "roll",
    "difficulty",
    "success",
    "failure",
];

/// An accepted rule chunk with its classification and provenance.
#[derive(Debug, Clone, Serialize)]
pub struct RuleChunk {
    pub chunk: Chunk,
    pub classification: Classification,
    pub associated_words: Vec<String>,
    pub tfidf_score: f32,
}

/// Aggregate view over a discovery run's accepted rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleStats {
    pub total_rules: usize,
    pub by_type: HashMap<String, usize>,
    /// Confidence 0.8 and above.
    pub high_confidence: usize,
    /// Confidence in [0.6, 0.8).
    pub medium_confidence: usize,
    /// Below 0.6 (possible when the caller lowers the threshold).
    pub low_confidence: usize,
    pub average_confidence: f32,
}

/// Candidate terms for a discovery run: every high-scoring corpus word
/// plus the fixed seed terms, deduplicated.
pub fn candidate_words(associations: &AssociationIndex) -> Vec<String> {
    let mut words: Vec<String> = associations
        .high_scoring_words(HIGH_SCORE_THRESHOLD)
        .into_iter()
        .map(|(word, _)| word)
        .collect();
    for seed in SEED_TERMS {
        if !words.iter().any(|w| w == seed) {
            words.push(seed.to_string());
        }
    }
    words
}

/// Classify every chunk associated with the candidate words.
///
/// Chunks are visited in document order. A classifier failure on one
/// chunk is logged and skipped; it never aborts the batch. Accepted
/// chunks satisfy `is_rule && confidence >= confidence_threshold` and
/// come back in document order.
pub fn run(
    store: &ChunkStore,
    associations: &AssociationIndex,
    words: &[String],
    classifier: &dyn Classifier,
    confidence_threshold: f32,
) -> Vec<RuleChunk> {
    let appearances = associations.chunks_ordered_by_appearance(words);
    debug!(
        candidates = appearances.len(),
        classifier = classifier.name(),
        "classifying candidate chunks"
    );

    let mut rules = Vec::new();
    for appearance in appearances {
        let Some(chunk) = store.get(appearance.chunk_id) else {
            warn!(
                chunk = %appearance.chunk_id,
                "associated chunk missing from store, skipping"
            );
            continue;
        };

        let input = ClassifierInput {
            content: &chunk.content,
            order: chunk.order,
            associated_words: &appearance.associated_words,
        };
        let classification = match classifier.classify(&input) {
            Ok(classification) => classification,
            Err(err) => {
                warn!(
                    chunk = %chunk.id,
                    %err,
                    "classification failed, skipping chunk"
                );
                continue;
            }
        };

        if classification.is_rule
            && classification.confidence >= confidence_threshold
        {
            rules.push(RuleChunk {
                chunk: chunk.clone(),
                classification,
                associated_words: appearance.associated_words,
                tfidf_score: appearance.best_score,
            });
        }
    }

    rules
}

/// Summarize an accepted rule list by type and confidence band.
pub fn summarize(rules: &[RuleChunk]) -> RuleStats {
    let mut stats = RuleStats {
        total_rules: rules.len(),
        ..Default::default()
    };
    if rules.is_empty() {
        return stats;
    }

    let mut total_confidence = 0.0f32;
    for rule in rules {
        let rule_type = if rule.classification.rule_type.is_empty() {
            "other".to_string()
        } else {
            rule.classification.rule_type.clone()
        };
        *stats.by_type.entry(rule_type).or_insert(0) += 1;

        let confidence = rule.classification.confidence;
        if confidence >= 0.8 {
            stats.high_confidence += 1;
        } else if confidence >= 0.6 {
            stats.medium_confidence += 1;
        } else {
            stats.low_confidence += 1;
        }
        total_confidence += confidence;
    }
    stats.average_confidence = total_confidence / rules.len() as f32;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunk_store::ChunkRecord,
        classifier::NoopClassifier,
        error::{Error, Result},
    };

    /// Scripted classifier: verdicts keyed by chunk order, errors for
    /// the orders named in `fail_orders`.
    struct ScriptedClassifier {
        verdicts: HashMap<u64, (bool, f32)>,
        fail_orders: Vec<u64>,
    }

    impl Classifier for ScriptedClassifier {
        fn classify(
            &self,
            input: &ClassifierInput<'_>,
        ) -> Result<Classification> {
            if self.fail_orders.contains(&input.order) {
                return Err(Error::NotFound {
                    kind: "verdict",
                    name: input.order.to_string(),
                });
            }
            let (is_rule, confidence) = self
                .verdicts
                .get(&input.order)
                .copied()
                .unwrap_or((false, 0.0));
            Ok(Classification {
                is_rule,
                confidence,
                rule_name: format!("rule-{}", input.order),
                rule_type: "combat".to_string(),
                reasoning: String::new(),
            })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn corpus() -> (ChunkStore, AssociationIndex, Vec<String>) {
        let mut store = ChunkStore::new();
        let mut associations = AssociationIndex::new();
        let contents = [
            "soak rolls reduce incoming damage",
            "the tavern smelled of rain",
            "botches occur when no successes remain",
        ];
        for (order, content) in contents.iter().enumerate() {
            let chunk = ChunkRecord {
                source_id: "book".to_string(),
                order: order as u64,
                content: content.to_string(),
                section_context: String::new(),
                word_range: (0, 0),
            }
            .into_chunk();
            associations.record(
                chunk.id,
                chunk.order,
                &[("soak".to_string(), 0.8)],
            );
            store.add(chunk).unwrap();
        }
        (store, associations, vec!["soak".to_string()])
    }

    #[test]
    fn accepts_only_confident_rules() {
        let (store, associations, words) = corpus();
        let classifier = ScriptedClassifier {
            verdicts: HashMap::from([
                (0, (true, 0.9)),
                (1, (true, 0.3)),
                (2, (false, 0.9)),
            ]),
            fail_orders: vec![],
        };

        let rules = run(&store, &associations, &words, &classifier, 0.6);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].chunk.order, 0);
        assert_eq!(rules[0].classification.confidence, 0.9);
    }

    #[test]
    fn results_preserve_document_order() {
        let (store, associations, words) = corpus();
        let classifier = ScriptedClassifier {
            verdicts: HashMap::from([
                (0, (true, 0.7)),
                (1, (true, 0.99)),
                (2, (true, 0.8)),
            ]),
            fail_orders: vec![],
        };

        let rules = run(&store, &associations, &words, &classifier, 0.6);
        let orders: Vec<u64> =
            rules.iter().map(|r| r.chunk.order).collect();
        // Document order, not confidence order.
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn classifier_failure_skips_chunk_but_continues() {
        let (store, associations, words) = corpus();
        let classifier = ScriptedClassifier {
            verdicts: HashMap::from([
                (0, (true, 0.9)),
                (2, (true, 0.9)),
            ]),
            fail_orders: vec![1],
        };

        let rules = run(&store, &associations, &words, &classifier, 0.6);
        let orders: Vec<u64> =
            rules.iter().map(|r| r.chunk.order).collect();
        assert_eq!(orders, vec![0, 2]);
    }

    #[test]
    fn noop_classifier_accepts_nothing() {
        let (store, associations, words) = corpus();
        let rules =
            run(&store, &associations, &words, &NoopClassifier, 0.6);
        assert!(rules.is_empty());
    }

    #[test]
    fn candidate_words_include_seeds_and_high_scorers() {
        let (_store, associations, _words) = corpus();
        let words = candidate_words(&associations);
        assert!(words.iter().any(|w| w == "soak"));
        assert!(words.iter().any(|w| w == "dice"));
        // No duplicates.
        let mut deduped = words.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), words.len());
    }

    #[test]
    fn summarize_buckets_by_confidence() {
        let (store, associations, words) = corpus();
        let classifier = ScriptedClassifier {
            verdicts: HashMap::from([
                (0, (true, 0.9)),
                (1, (true, 0.65)),
                (2, (true, 0.7)),
            ]),
            fail_orders: vec![],
        };
        let rules = run(&store, &associations, &words, &classifier, 0.6);

        let stats = summarize(&rules);
        assert_eq!(stats.total_rules, 3);
        assert_eq!(stats.high_confidence, 1);
        assert_eq!(stats.medium_confidence, 2);
        assert_eq!(stats.low_confidence, 0);
        assert_eq!(stats.by_type["combat"], 3);
        assert!((stats.average_confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn summarize_empty_run() {
        let stats = summarize(&[]);
        assert_eq!(stats.total_rules, 0);
        assert_eq!(stats.average_confidence, 0.0);
    }
}
