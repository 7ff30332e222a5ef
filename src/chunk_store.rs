use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{
    chunk_id::ChunkId,
    error::{Error, Result},
};

/// An immutable span of source-document text, the atomic retrieval unit.
///
/// Created on ingestion and never mutated afterwards; removed only by
/// explicit deletion, which also removes its vector and associations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub content: String,
    /// Position within the source document, monotonic per source.
    pub order: u64,
    pub source_id: String,
    #[serde(default)]
    pub section_context: String,
    /// Word offsets of this chunk within the source document.
    #[serde(default)]
    pub word_range: (usize, usize),
    /// Unix timestamp (seconds) of ingestion.
    pub created_at: u64,
    /// Whitespace-separated word count, cached at creation.
    pub word_count: usize,
    /// Corpus-wide ingestion sequence number. Vocabulary indices depend
    /// on the order chunks were first seen, so reloads replay chunks in
    /// this order to regrow the same word-to-index mapping.
    #[serde(default)]
    pub seq: u64,
}

/// A chunk as handed over by the external extraction/chunking
/// collaborator, before an id or timestamp is assigned.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkRecord {
    pub source_id: String,
    pub order: u64,
    pub content: String,
    #[serde(default)]
    pub section_context: String,
    #[serde(default)]
    pub word_range: (usize, usize),
}

impl ChunkRecord {
    pub(crate) fn into_chunk(self) -> Chunk {
        let word_count = self.content.split_whitespace().count();
        Chunk {
            id: ChunkId::new(&self.source_id, self.order),
            content: self.content,
            order: self.order,
            source_id: self.source_id,
            section_context: self.section_context,
            word_range: self.word_range,
            created_at: unix_now(),
            word_count,
            seq: 0,
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Corpus-level counts reported by [`ChunkStore::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_chunks: usize,
    pub total_words: usize,
    pub unique_documents: usize,
}

/// In-memory record of text chunks, keyed by chunk id.
///
/// The store is authoritative for reads; durability is the persistence
/// scheduler's responsibility, not the store's.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: HashMap<ChunkId, Chunk>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk. Fails if the id is already present; callers that
    /// want idempotent ingestion check [`contains`](Self::contains)
    /// first.
    pub fn add(&mut self, chunk: Chunk) -> Result<()> {
        if self.chunks.contains_key(&chunk.id) {
            return Err(Error::ChunkExists(chunk.id.to_string()));
        }
        self.chunks.insert(chunk.id, chunk);
        Ok(())
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(&id)
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.chunks.contains_key(&id)
    }

    /// All chunks from one source document, sorted by chunk order.
    pub fn list_by_document(&self, source_id: &str) -> Vec<&Chunk> {
        let mut chunks: Vec<&Chunk> = self
            .chunks
            .values()
            .filter(|c| c.source_id == source_id)
            .collect();
        chunks.sort_by_key(|c| c.order);
        chunks
    }

    pub fn remove(&mut self, id: ChunkId) -> bool {
        self.chunks.remove(&id).is_some()
    }

    pub fn stats(&self) -> StoreStats {
        let total_words = self.chunks.values().map(|c| c.word_count).sum();
        let unique_documents = self
            .chunks
            .values()
            .map(|c| c.source_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        StoreStats {
            total_chunks: self.chunks.len(),
            total_words,
            unique_documents,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(source: &str, order: u64, content: &str) -> Chunk {
        ChunkRecord {
            source_id: source.to_string(),
            order,
            content: content.to_string(),
            section_context: String::new(),
            word_range: (0, 0),
        }
        .into_chunk()
    }

    #[test]
    fn add_and_get() {
        let mut store = ChunkStore::new();
        let chunk = make_chunk("book", 0, "fire damage ignites target");
        let id = chunk.id;
        store.add(chunk).unwrap();

        let got = store.get(id).unwrap();
        assert_eq!(got.content, "fire damage ignites target");
        assert_eq!(got.word_count, 4);
    }

    #[test]
    fn duplicate_add_fails() {
        let mut store = ChunkStore::new();
        store.add(make_chunk("book", 0, "first")).unwrap();
        let err = store.add(make_chunk("book", 0, "second")).unwrap_err();
        assert!(matches!(err, Error::ChunkExists(_)));
    }

    #[test]
    fn list_by_document_is_ordered() {
        let mut store = ChunkStore::new();
        store.add(make_chunk("book", 2, "third")).unwrap();
        store.add(make_chunk("book", 0, "first")).unwrap();
        store.add(make_chunk("book", 1, "second")).unwrap();
        store.add(make_chunk("other", 0, "elsewhere")).unwrap();

        let chunks = store.list_by_document("book");
        let orders: Vec<u64> = chunks.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = ChunkStore::new();
        let chunk = make_chunk("book", 0, "content");
        let id = chunk.id;
        store.add(chunk).unwrap();

        assert!(store.remove(id));
        assert!(!store.remove(id));
        assert!(store.get(id).is_none());
    }

    #[test]
    fn stats_count_words_and_documents() {
        let mut store = ChunkStore::new();
        store.add(make_chunk("book", 0, "one two three")).unwrap();
        store.add(make_chunk("book", 1, "four five")).unwrap();
        store.add(make_chunk("guide", 0, "six")).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.total_words, 6);
        assert_eq!(stats.unique_documents, 2);
    }

    #[test]
    fn empty_store_stats() {
        let store = ChunkStore::new();
        let stats = store.stats();
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.total_words, 0);
        assert_eq!(stats.unique_documents, 0);
    }
}
