//! Word-chunk association index.
//!
//! Maps vocabulary words to the chunks they appear in with a meaningful
//! TF-IDF weight, built incrementally as chunks are embedded. Confidence
//! is the score normalized to `[0, 1]` by the highest score observed for
//! that word, so it is renormalized whenever a new maximum appears.

use std::collections::HashMap;

use crate::chunk_id::ChunkId;

/// One word-to-chunk link with its relevance scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    pub chunk_id: ChunkId,
    pub order: u64,
    pub tfidf_score: f32,
    pub confidence: f32,
}

/// A deduplicated chunk reference in document order, carrying the words
/// that led to it. Input to the rule classification pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkAppearance {
    pub chunk_id: ChunkId,
    pub order: u64,
    pub associated_words: Vec<String>,
    /// Highest TF-IDF score among the associations that matched.
    pub best_score: f32,
}

#[derive(Debug, Default)]
pub struct AssociationIndex {
    by_word: HashMap<String, Vec<Association>>,
}

impl AssociationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one embedded chunk's per-word TF-IDF scores.
    ///
    /// Each word's list is re-sorted descending by score and its
    /// confidences renormalized against the new maximum.
    pub fn record(
        &mut self,
        chunk_id: ChunkId,
        order: u64,
        scores: &[(String, f32)],
    ) {
        for (word, score) in scores {
            if *score <= 0.0 {
                continue;
            }
            let list = self.by_word.entry(word.clone()).or_default();
            list.push(Association {
                chunk_id,
                order,
                tfidf_score: *score,
                confidence: 0.0,
            });
            renormalize(list);
        }
    }

    /// Drop every association pointing at a removed chunk. Words left
    /// with no associations are removed; the rest are renormalized.
    pub fn remove_chunk(&mut self, chunk_id: ChunkId) {
        self.by_word.retain(|_, list| {
            list.retain(|a| a.chunk_id != chunk_id);
            if list.is_empty() {
                false
            } else {
                renormalize(list);
                true
            }
        });
    }

    /// Associations for each requested word that has any.
    pub fn get_associations(
        &self,
        words: &[String],
    ) -> HashMap<String, Vec<Association>> {
        let mut result = HashMap::new();
        for word in words {
            if let Some(list) = self.by_word.get(word) {
                result.insert(word.clone(), list.clone());
            }
        }
        result
    }

    /// Unique chunks referenced by any of the words, sorted by chunk
    /// order ascending with ties broken by chunk id. The sort is total,
    /// so the output is stable for a given index state.
    pub fn chunks_ordered_by_appearance(
        &self,
        words: &[String],
    ) -> Vec<ChunkAppearance> {
        let mut by_chunk: HashMap<ChunkId, ChunkAppearance> = HashMap::new();

        for word in words {
            let Some(list) = self.by_word.get(word) else {
                continue;
            };
            for assoc in list {
                let entry = by_chunk
                    .entry(assoc.chunk_id)
                    .or_insert_with(|| ChunkAppearance {
                        chunk_id: assoc.chunk_id,
                        order: assoc.order,
                        associated_words: Vec::new(),
                        best_score: 0.0,
                    });
                if !entry.associated_words.contains(word) {
                    entry.associated_words.push(word.clone());
                }
                entry.best_score = entry.best_score.max(assoc.tfidf_score);
            }
        }

        let mut appearances: Vec<ChunkAppearance> =
            by_chunk.into_values().collect();
        for appearance in &mut appearances {
            appearance.associated_words.sort();
        }
        appearances.sort_by(|a, b| {
            a.order.cmp(&b.order).then(a.chunk_id.cmp(&b.chunk_id))
        });
        appearances
    }

    /// Words whose best association score meets the threshold, sorted
    /// by that score descending. Feeds rule discovery candidate terms.
    pub fn high_scoring_words(&self, threshold: f32) -> Vec<(String, f32)> {
        let mut words: Vec<(String, f32)> = self
            .by_word
            .iter()
            .filter_map(|(word, list)| {
                let best = list
                    .iter()
                    .map(|a| a.tfidf_score)
                    .fold(f32::MIN, f32::max);
                (best >= threshold).then(|| (word.clone(), best))
            })
            .collect();
        words.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        words
    }

    pub fn word_count(&self) -> usize {
        self.by_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_word.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_word.clear();
    }
}

fn renormalize(list: &mut [Association]) {
    let max = list.iter().map(|a| a.tfidf_score).fold(0.0f32, f32::max);
    for assoc in list.iter_mut() {
        assoc.confidence = if max > 0.0 {
            (assoc.tfidf_score / max).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
    list.sort_by(|a, b| {
        b.tfidf_score
            .partial_cmp(&a.tfidf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> ChunkId {
        ChunkId::from_u64(n)
    }

    fn scores(pairs: &[(&str, f32)]) -> Vec<(String, f32)> {
        pairs.iter().map(|(w, s)| (w.to_string(), *s)).collect()
    }

    #[test]
    fn associations_sorted_by_score_descending() {
        let mut index = AssociationIndex::new();
        index.record(id(1), 0, &scores(&[("dice", 0.4)]));
        index.record(id(2), 1, &scores(&[("dice", 0.9)]));
        index.record(id(3), 2, &scores(&[("dice", 0.6)]));

        let assocs = index.get_associations(&["dice".to_string()]);
        let list = &assocs["dice"];
        assert_eq!(list[0].chunk_id, id(2));
        assert_eq!(list[1].chunk_id, id(3));
        assert_eq!(list[2].chunk_id, id(1));
    }

    #[test]
    fn confidence_normalized_by_word_maximum() {
        let mut index = AssociationIndex::new();
        index.record(id(1), 0, &scores(&[("dice", 0.5)]));

        let assocs = index.get_associations(&["dice".to_string()]);
        assert_eq!(assocs["dice"][0].confidence, 1.0);

        // A new maximum renormalizes the earlier entry.
        index.record(id(2), 1, &scores(&[("dice", 1.0)]));
        let assocs = index.get_associations(&["dice".to_string()]);
        let list = &assocs["dice"];
        assert_eq!(list[0].confidence, 1.0);
        assert!((list[1].confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn appearance_order_is_document_order() {
        let mut index = AssociationIndex::new();
        index.record(id(10), 5, &scores(&[("roll", 0.9)]));
        index.record(id(11), 1, &scores(&[("dice", 0.8)]));
        index.record(id(12), 3, &scores(&[("roll", 0.7), ("dice", 0.2)]));

        let words = vec!["roll".to_string(), "dice".to_string()];
        let appearances = index.chunks_ordered_by_appearance(&words);

        let orders: Vec<u64> = appearances.iter().map(|a| a.order).collect();
        assert_eq!(orders, vec![1, 3, 5]);

        // The chunk matched by both words lists both, sorted.
        assert_eq!(appearances[1].associated_words, vec!["dice", "roll"]);
        assert!((appearances[1].best_score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn appearances_are_deduplicated() {
        let mut index = AssociationIndex::new();
        index.record(id(1), 0, &scores(&[("dice", 0.9), ("roll", 0.8)]));

        let words = vec!["dice".to_string(), "roll".to_string()];
        let appearances = index.chunks_ordered_by_appearance(&words);
        assert_eq!(appearances.len(), 1);
    }

    #[test]
    fn remove_chunk_drops_associations() {
        let mut index = AssociationIndex::new();
        index.record(id(1), 0, &scores(&[("dice", 0.9)]));
        index.record(id(2), 1, &scores(&[("dice", 0.4), ("roll", 0.3)]));

        index.remove_chunk(id(1));

        let assocs = index.get_associations(&["dice".to_string()]);
        let list = &assocs["dice"];
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].chunk_id, id(2));
        // Remaining entry is the new maximum.
        assert_eq!(list[0].confidence, 1.0);
    }

    #[test]
    fn remove_last_association_drops_word() {
        let mut index = AssociationIndex::new();
        index.record(id(1), 0, &scores(&[("dice", 0.9)]));
        index.remove_chunk(id(1));
        assert!(index.is_empty());
    }

    #[test]
    fn high_scoring_words_filtered_and_sorted() {
        let mut index = AssociationIndex::new();
        index.record(id(1), 0, &scores(&[("soak", 0.95)]));
        index.record(id(2), 1, &scores(&[("dice", 0.75)]));
        index.record(id(3), 2, &scores(&[("page", 0.2)]));

        let words = index.high_scoring_words(0.7);
        let names: Vec<&str> =
            words.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(names, vec!["soak", "dice"]);
    }

    #[test]
    fn zero_score_contributions_are_ignored() {
        let mut index = AssociationIndex::new();
        index.record(id(1), 0, &scores(&[("damage", 0.0)]));
        assert!(index.is_empty());
    }
}
