//! TF-IDF embedding model: capped vocabulary, document frequencies, and
//! deterministic fixed-length vector computation.
//!
//! The vocabulary maps words to stable indices in `[0, capacity)`. Once a
//! word has an index it keeps it for the lifetime of the process. Words
//! seen after the vocabulary is full are never indexed and contribute
//! nothing to embeddings. That is a documented degradation, not an error.
//!
//! IDF values are only refreshed by [`TfIdfModel::recompute_idf`], which
//! bumps the vocabulary epoch. Vectors embedded under different epochs
//! remain valid but are not directly comparable for ranking.

use std::collections::HashMap;

use tracing::warn;

use crate::tokenize::tokenize;

/// Default vocabulary capacity, which is also the embedding dimension.
pub const DEFAULT_VOCAB_CAPACITY: usize = 4096;

/// A chunk embedding plus the per-word TF-IDF scores that produced it.
///
/// The scores feed the word-chunk association index; only words with a
/// non-zero contribution appear, sorted by vocabulary index so the output
/// is deterministic.
#[derive(Debug, Clone)]
pub struct Embedded {
    pub vector: Vec<f32>,
    pub scores: Vec<(String, f32)>,
}

pub struct TfIdfModel {
    capacity: usize,
    vocabulary: HashMap<String, usize>,
    document_frequency: HashMap<String, u64>,
    idf: HashMap<String, f32>,
    total_chunks: u64,
    epoch: u32,
    capacity_warned: bool,
}

impl TfIdfModel {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            vocabulary: HashMap::new(),
            document_frequency: HashMap::new(),
            idf: HashMap::new(),
            total_chunks: 0,
            epoch: 0,
            capacity_warned: false,
        }
    }

    /// The embedding dimension `V`.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current vocabulary epoch. Starts at 0 and increments on every
    /// [`recompute_idf`](Self::recompute_idf).
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Whether any corpus text has been seen. Embedding queries against
    /// an uninitialized model is an error at the engine level.
    pub fn is_initialized(&self) -> bool {
        !self.vocabulary.is_empty()
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    /// Register one chunk's text: assign vocabulary indices to new words
    /// (up to capacity) and increment each unique word's document
    /// frequency exactly once.
    pub fn update_vocabulary(&mut self, text: &str) {
        let tokens = tokenize(text);
        let mut unique: Vec<&str> =
            tokens.iter().map(String::as_str).collect();
        unique.sort_unstable();
        unique.dedup();

        for token in unique {
            *self
                .document_frequency
                .entry(token.to_string())
                .or_insert(0) += 1;

            if !self.vocabulary.contains_key(token) {
                if self.vocabulary.len() < self.capacity {
                    let index = self.vocabulary.len();
                    self.vocabulary.insert(token.to_string(), index);
                } else if !self.capacity_warned {
                    self.capacity_warned = true;
                    warn!(
                        capacity = self.capacity,
                        "vocabulary capacity reached, new words will not \
                         be indexed"
                    );
                }
            }
        }

        self.total_chunks += 1;
    }

    /// Forget one chunk's contribution to document frequencies. Words
    /// keep their vocabulary indices; only the counts shrink.
    pub fn forget_document(&mut self, text: &str) {
        let tokens = tokenize(text);
        let mut unique: Vec<&str> =
            tokens.iter().map(String::as_str).collect();
        unique.sort_unstable();
        unique.dedup();

        for token in unique {
            if let Some(df) = self.document_frequency.get_mut(token) {
                *df = df.saturating_sub(1);
            }
        }
        self.total_chunks = self.total_chunks.saturating_sub(1);
    }

    /// Recompute IDF for every known word from the current document
    /// frequencies and chunk count, and advance the vocabulary epoch.
    ///
    /// Call after a batch of vocabulary updates; embeddings computed
    /// before the recompute belong to the previous epoch.
    pub fn recompute_idf(&mut self) {
        self.idf.clear();
        for (word, df) in &self.document_frequency {
            let idf = if self.total_chunks > 0 && *df > 0 {
                (self.total_chunks as f32 / *df as f32).ln()
            } else {
                0.0
            };
            self.idf.insert(word.clone(), idf);
        }
        self.epoch += 1;
    }

    pub fn idf(&self, word: &str) -> f32 {
        self.idf.get(word).copied().unwrap_or(0.0)
    }

    /// Embed text into an L2-normalized vector of length `capacity`.
    ///
    /// Term frequency is `count / max_count_in_text`; each term's score
    /// lands at its vocabulary index. Words without an index (capacity
    /// exceeded) and words with zero IDF contribute nothing. Degenerate
    /// input with no indexable terms yields the zero vector.
    ///
    /// Deterministic: the same text against unchanged vocabulary and IDF
    /// state produces a bit-identical vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_with_scores(text).vector
    }

    /// [`embed`](Self::embed), also returning the per-word scores.
    pub fn embed_with_scores(&self, text: &str) -> Embedded {
        let tokens = tokenize(text);

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }
        let max_count = counts.values().copied().max().unwrap_or(0);

        let mut vector = vec![0.0f32; self.capacity];
        let mut scores: Vec<(usize, String, f32)> = Vec::new();

        if max_count > 0 {
            for (token, count) in &counts {
                let Some(&index) = self.vocabulary.get(*token) else {
                    continue;
                };
                let tf = *count as f32 / max_count as f32;
                let tfidf = tf * self.idf(token);
                if tfidf > 0.0 {
                    vector[index] = tfidf;
                    scores.push((index, token.to_string(), tfidf));
                }
            }
        }

        l2_normalize(&mut vector);
        scores.sort_by_key(|(index, _, _)| *index);

        Embedded {
            vector,
            scores: scores
                .into_iter()
                .map(|(_, word, score)| (word, score))
                .collect(),
        }
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
