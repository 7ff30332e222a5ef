//! Chunk-id to embedding map with hybrid similarity search.
//!
//! Search scores every stored vector against the query embedding and
//! blends cosine similarity with query keyword overlap. Stored vectors
//! whose dimension no longer matches the configured capacity belong to a
//! stale vocabulary configuration; they are excluded from scoring with a
//! warning rather than treated as fatal, so search degrades to fewer
//! results instead of failing.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{chunk_id::ChunkId, chunk_store::ChunkStore, tokenize};

/// Weight of cosine similarity in the hybrid score.
pub const SEMANTIC_WEIGHT: f32 = 0.7;

/// Weight of keyword overlap in the hybrid score.
pub const KEYWORD_WEIGHT: f32 = 0.3;

#[derive(Debug, Clone)]
struct StoredVector {
    values: Vec<f32>,
    epoch: u32,
}

/// A scored search candidate, before chunk content is attached.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: ChunkId,
    pub order: u64,
    pub semantic_score: f32,
    pub keyword_score: f32,
    pub hybrid_score: f32,
}

#[derive(Debug)]
pub struct VectorIndex {
    vectors: HashMap<ChunkId, StoredVector>,
    dimension: usize,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimension,
        }
    }

    /// Store a vector with the vocabulary epoch it was embedded under.
    /// Inserting over an existing id replaces it.
    pub fn insert(&mut self, chunk_id: ChunkId, values: Vec<f32>, epoch: u32) {
        self.vectors.insert(chunk_id, StoredVector { values, epoch });
    }

    pub fn remove(&mut self, chunk_id: ChunkId) -> bool {
        self.vectors.remove(&chunk_id).is_some()
    }

    pub fn contains(&self, chunk_id: ChunkId) -> bool {
        self.vectors.contains_key(&chunk_id)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
    }

    pub fn get(&self, chunk_id: ChunkId) -> Option<(&[f32], u32)> {
        self.vectors
            .get(&chunk_id)
            .map(|v| (v.values.as_slice(), v.epoch))
    }

    /// Score every stored vector against the query and return ranked
    /// results.
    ///
    /// `hybrid = 0.7 * cosine + 0.3 * keyword_overlap`, clamped to
    /// `[0, 1]`. Entries below `threshold` are dropped; the rest are
    /// sorted by hybrid score descending with ties broken by chunk order
    /// ascending, truncated to `limit`.
    pub fn search(
        &self,
        query_vector: &[f32],
        query_keywords: &[String],
        store: &ChunkStore,
        current_epoch: u32,
        limit: usize,
        threshold: f32,
    ) -> Vec<ScoredChunk> {
        let entries: Vec<(&ChunkId, &StoredVector)> =
            self.vectors.iter().collect();

        let scored: Vec<ScoredChunk> = entries
            .par_iter()
            .filter_map(|(chunk_id, stored)| {
                if stored.values.len() != self.dimension {
                    warn!(
                        chunk = %chunk_id,
                        expected = self.dimension,
                        got = stored.values.len(),
                        "skipping vector with stale dimension"
                    );
                    return None;
                }
                let chunk = store.get(**chunk_id)?;

                let semantic = cosine(query_vector, &stored.values);
                let keyword =
                    keyword_overlap(query_keywords, &chunk.content);
                let hybrid = (SEMANTIC_WEIGHT * semantic
                    + KEYWORD_WEIGHT * keyword)
                    .clamp(0.0, 1.0);

                Some(ScoredChunk {
                    chunk_id: **chunk_id,
                    order: chunk.order,
                    semantic_score: semantic,
                    keyword_score: keyword,
                    hybrid_score: hybrid,
                })
            })
            .collect();

        let stale_epochs = entries
            .iter()
            .filter(|(_, stored)| {
                stored.values.len() == self.dimension
                    && stored.epoch != current_epoch
            })
            .count();
        if stale_epochs > 0 {
            debug!(
                stale_epochs,
                current_epoch,
                "scored vectors embedded under an older vocabulary epoch"
            );
        }

        let mut results: Vec<ScoredChunk> = scored
            .into_iter()
            .filter(|s| s.hybrid_score >= threshold)
            .collect();
        results.sort_by(|a, b| {
            b.hybrid_score
                .partial_cmp(&a.hybrid_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.order.cmp(&b.order))
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        results.truncate(limit);
        results
    }
}

/// Cosine similarity. Defined as 0 when either vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Fraction of query keywords present in the chunk text. Zero when the
/// query has no keywords.
fn keyword_overlap(query_keywords: &[String], content: &str) -> f32 {
    if query_keywords.is_empty() {
        return 0.0;
    }
    let chunk_tokens: HashSet<String> =
        tokenize::tokenize(content).into_iter().collect();
    let matching = query_keywords
        .iter()
        .filter(|k| chunk_tokens.contains(*k))
        .count();
    matching as f32 / query_keywords.len() as f32
}
