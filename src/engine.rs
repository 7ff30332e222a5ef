//! The indexing and retrieval service object.
//!
//! An [`Engine`] owns one corpus: the chunk store, the TF-IDF model, the
//! association index, the vector index, the durable state database, and
//! the persistence scheduler. There are no process-wide globals; callers
//! construct an engine and pass it where it is needed.
//!
//! In-memory state is authoritative and immediately consistent: any
//! mutation is visible to the very next read. Durable storage catches up
//! asynchronously, lagging by at most one debounce window plus retry
//! delay.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    associations::AssociationIndex,
    chunk_id::ChunkId,
    chunk_store::{ChunkRecord, ChunkStore, unix_now},
    classifier::Classifier,
    embedding::{DEFAULT_VOCAB_CAPACITY, TfIdfModel},
    error::{Error, Result},
    pipeline::{self, RuleChunk},
    scheduler::{
        DEFAULT_DEBOUNCE_WINDOW, FlushSnapshot, PendingOp,
        PersistenceScheduler,
    },
    state_db::{FlushBatch, StateDb},
    tokenize,
    vector_index::VectorIndex,
};

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Vocabulary capacity, which is also the embedding dimension.
    pub vocab_capacity: usize,
    /// Quiet period before pending writes are flushed.
    pub debounce_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vocab_capacity: DEFAULT_VOCAB_CAPACITY,
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub content: String,
    pub source_id: String,
    pub section_context: String,
    pub order: u64,
    pub semantic_score: f32,
    pub keyword_score: f32,
    pub hybrid_score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_chunks: usize,
    pub total_words: usize,
    pub unique_documents: usize,
    pub vocabulary_size: usize,
    pub vocabulary_epoch: u32,
    pub indexed_vectors: usize,
    pub pending_writes: usize,
}

pub struct Engine {
    config: EngineConfig,
    store: ChunkStore,
    model: TfIdfModel,
    associations: AssociationIndex,
    vectors: VectorIndex,
    state_db: StateDb,
    scheduler: PersistenceScheduler,
    next_seq: u64,
}

impl Engine {
    /// Open an engine over a state database, loading any persisted
    /// corpus into memory.
    pub fn open(state_db: StateDb, config: EngineConfig) -> Result<Self> {
        let mut engine = Self {
            config,
            store: ChunkStore::new(),
            model: TfIdfModel::new(config.vocab_capacity),
            associations: AssociationIndex::new(),
            vectors: VectorIndex::new(config.vocab_capacity),
            state_db,
            scheduler: PersistenceScheduler::new(config.debounce_window),
            next_seq: 0,
        };
        engine.load()?;
        Ok(engine)
    }

    /// Rebuild in-memory state from the persisted corpus.
    ///
    /// The vocabulary is regrown in ingestion-sequence order so word
    /// indices come out the same as when the vectors were first
    /// embedded; stored vectors are reused as-is with their recorded
    /// epoch, and the association index is recomputed against the
    /// refreshed IDF.
    fn load(&mut self) -> Result<()> {
        let mut state = self.state_db.load()?;
        if state.chunks.is_empty() {
            return Ok(());
        }

        state.chunks.sort_by(|a, b| {
            a.seq
                .cmp(&b.seq)
                .then_with(|| a.source_id.cmp(&b.source_id))
                .then(a.order.cmp(&b.order))
        });
        self.next_seq = state
            .chunks
            .iter()
            .map(|c| c.seq + 1)
            .max()
            .unwrap_or(0);
        for chunk in &state.chunks {
            self.model.update_vocabulary(&chunk.content);
        }
        self.model.recompute_idf();

        let chunk_count = state.chunks.len();
        for chunk in state.chunks {
            if let Err(err) = self.store.add(chunk) {
                warn!(%err, "skipping duplicate persisted chunk");
            }
        }

        let mut vector_count = 0;
        for (id, values, epoch) in state.vectors {
            if !self.store.contains(id) {
                warn!(chunk = %id, "dropping vector with no chunk record");
                continue;
            }
            self.vectors.insert(id, values, epoch);
            vector_count += 1;
        }

        for chunk in self.store.iter() {
            let embedded = self.model.embed_with_scores(&chunk.content);
            self.associations.record(chunk.id, chunk.order, &embedded.scores);
        }

        info!(
            chunks = chunk_count,
            vectors = vector_count,
            vocabulary = self.model.vocabulary_len(),
            "loaded persisted corpus"
        );
        Ok(())
    }

    /// Ingest a single chunk incrementally.
    ///
    /// The chunk is embedded against the current IDF state; call
    /// [`refresh_idf`](Self::refresh_idf) after a run of additions to
    /// re-stabilize embeddings for ranking. Prefer
    /// [`ingest_batch`](Self::ingest_batch) when the chunks arrive
    /// together, which keeps the whole batch on one epoch.
    pub fn add_chunk(&mut self, record: ChunkRecord) -> Result<ChunkId> {
        let mut chunk = record.into_chunk();
        let id = chunk.id;
        if self.store.contains(id) {
            return Err(Error::ChunkExists(id.to_string()));
        }
        chunk.seq = self.next_seq;
        self.next_seq += 1;

        self.model.update_vocabulary(&chunk.content);
        let embedded = self.model.embed_with_scores(&chunk.content);
        self.associations.record(id, chunk.order, &embedded.scores);
        self.vectors.insert(id, embedded.vector, self.model.epoch());
        self.store.add(chunk)?;
        self.scheduler.enqueue(id, PendingOp::Upsert, Instant::now());
        Ok(id)
    }

    /// Ingest a batch of chunks in two passes: grow the vocabulary from
    /// every chunk, recompute IDF once, then embed everything under the
    /// fresh epoch. Duplicate ids are skipped with a warning rather than
    /// aborting the batch.
    pub fn ingest_batch(
        &mut self,
        records: Vec<ChunkRecord>,
    ) -> Result<Vec<ChunkId>> {
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let mut chunk = record.into_chunk();
            if self.store.contains(chunk.id) {
                warn!(chunk = %chunk.id, "skipping duplicate chunk");
                continue;
            }
            chunk.seq = self.next_seq;
            self.next_seq += 1;
            self.model.update_vocabulary(&chunk.content);
            ids.push(chunk.id);
            self.store.add(chunk)?;
        }

        self.model.recompute_idf();
        let epoch = self.model.epoch();
        let now = Instant::now();

        for id in &ids {
            let Some(chunk) = self.store.get(*id) else {
                continue;
            };
            let embedded = self.model.embed_with_scores(&chunk.content);
            self.associations.record(*id, chunk.order, &embedded.scores);
            self.vectors.insert(*id, embedded.vector, epoch);
            self.scheduler.enqueue(*id, PendingOp::Upsert, now);
        }

        Ok(ids)
    }

    /// Recompute IDF from the current corpus, advancing the epoch.
    pub fn refresh_idf(&mut self) {
        self.model.recompute_idf();
    }

    /// Hybrid search over the corpus.
    ///
    /// Fails fast with [`Error::NotInitialized`] when nothing has ever
    /// been ingested; otherwise degrades gracefully, returning fewer
    /// results when some vectors are unusable.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        if !self.model.is_initialized() {
            return Err(Error::NotInitialized(
                "ingest a document before searching",
            ));
        }

        let query_vector = self.model.embed(query);
        let keywords = tokenize::query_keywords(query);
        let scored = self.vectors.search(
            &query_vector,
            &keywords,
            &self.store,
            self.model.epoch(),
            limit,
            threshold,
        );

        Ok(scored
            .into_iter()
            .filter_map(|s| {
                let chunk = self.store.get(s.chunk_id)?;
                Some(SearchHit {
                    chunk_id: s.chunk_id,
                    content: chunk.content.clone(),
                    source_id: chunk.source_id.clone(),
                    section_context: chunk.section_context.clone(),
                    order: chunk.order,
                    semantic_score: s.semantic_score,
                    keyword_score: s.keyword_score,
                    hybrid_score: s.hybrid_score,
                })
            })
            .collect())
    }

    /// Remove one chunk everywhere: store, vector index, associations,
    /// document frequencies, and (eventually) durable storage.
    pub fn remove_chunk(&mut self, id: ChunkId) -> bool {
        let Some(content) =
            self.store.get(id).map(|c| c.content.clone())
        else {
            return false;
        };
        self.store.remove(id);
        self.vectors.remove(id);
        self.associations.remove_chunk(id);
        self.model.forget_document(&content);
        self.scheduler.enqueue(id, PendingOp::Remove, Instant::now());
        true
    }

    /// Remove every chunk of one source document. Returns the count.
    pub fn remove_source(&mut self, source_id: &str) -> usize {
        let ids: Vec<ChunkId> = self
            .store
            .list_by_document(source_id)
            .iter()
            .map(|c| c.id)
            .collect();
        for id in &ids {
            self.remove_chunk(*id);
        }
        ids.len()
    }

    /// Run rule discovery over the whole corpus with automatically
    /// selected candidate words.
    pub fn discover_rules(
        &self,
        classifier: &dyn Classifier,
        confidence_threshold: f32,
    ) -> Vec<RuleChunk> {
        let words = pipeline::candidate_words(&self.associations);
        pipeline::run(
            &self.store,
            &self.associations,
            &words,
            classifier,
            confidence_threshold,
        )
    }

    /// Rule discovery restricted to caller-supplied candidate words.
    pub fn discover_rules_for_words(
        &self,
        words: &[String],
        classifier: &dyn Classifier,
        confidence_threshold: f32,
    ) -> Vec<RuleChunk> {
        pipeline::run(
            &self.store,
            &self.associations,
            &words,
            classifier,
            confidence_threshold,
        )
    }

    pub fn get_chunk(&self, id: ChunkId) -> Option<&crate::chunk_store::Chunk> {
        self.store.get(id)
    }

    pub fn list_by_document(
        &self,
        source_id: &str,
    ) -> Vec<&crate::chunk_store::Chunk> {
        self.store.list_by_document(source_id)
    }

    pub fn stats(&self) -> EngineStats {
        let store = self.store.stats();
        EngineStats {
            total_chunks: store.total_chunks,
            total_words: store.total_words,
            unique_documents: store.unique_documents,
            vocabulary_size: self.model.vocabulary_len(),
            vocabulary_epoch: self.model.epoch(),
            indexed_vectors: self.vectors.len(),
            pending_writes: self.scheduler.pending_len(),
        }
    }

    // -- Persistence --

    fn build_batch(&self, snapshot: &FlushSnapshot) -> FlushBatch {
        let mut batch = FlushBatch {
            vocabulary_epoch: self.model.epoch(),
            last_updated: unix_now(),
            ..Default::default()
        };
        for (id, op) in snapshot.ops() {
            match op {
                PendingOp::Remove => batch.removals.push(id),
                PendingOp::Upsert => {
                    match (self.store.get(id), self.vectors.get(id)) {
                        (Some(chunk), Some((values, epoch))) => {
                            batch.upserts.push((
                                chunk.clone(),
                                values.to_vec(),
                                epoch,
                            ));
                        }
                        // The chunk vanished between enqueue and flush;
                        // tombstone it instead of dropping the write.
                        _ => batch.removals.push(id),
                    }
                }
            }
        }
        batch
    }

    fn flush_now(&mut self, now: Instant) -> Result<bool> {
        let Some(snapshot) = self.scheduler.begin_flush() else {
            return Ok(false);
        };
        let written = snapshot.len();
        let batch = self.build_batch(&snapshot);
        match self.state_db.apply(&batch) {
            Ok(()) => {
                self.scheduler.flush_succeeded(now);
                debug!(written, "flushed pending writes");
                Ok(true)
            }
            Err(err) => {
                warn!(%err, pending = written, "flush failed, will retry");
                self.scheduler.flush_failed(snapshot, now);
                Err(err)
            }
        }
    }

    /// Flush if the debounce deadline has passed. Returns whether a
    /// write happened.
    pub fn flush_due(&mut self, now: Instant) -> Result<bool> {
        if !self.scheduler.due(now) {
            return Ok(false);
        }
        self.flush_now(now)
    }

    /// Flush immediately, short-circuiting the debounce timer. Used at
    /// shutdown.
    pub fn force_flush(&mut self) -> Result<()> {
        self.flush_now(Instant::now()).map(|_| ())
    }

    /// Drive the debounce timer until nothing is pending.
    ///
    /// On a failed write the pending set is retained and the error
    /// returned; calling again resumes the retry cycle.
    pub async fn flush_pending(&mut self) -> Result<()> {
        while let Some(deadline) = self.scheduler.deadline() {
            tokio::time::sleep_until(tokio::time::Instant::from_std(
                deadline,
            ))
            .await;
            // The timer has carried us to the deadline even when the
            // runtime's clock is virtual, so clamp "now" up to it.
            let now = Instant::now().max(deadline);
            if self.scheduler.due(now) {
                self.flush_now(now)?;
            }
        }
        Ok(())
    }

    /// Drop the whole corpus, in memory and on disk.
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear();
        self.associations.clear();
        self.vectors.clear();
        self.model = TfIdfModel::new(self.config.vocab_capacity);
        self.scheduler =
            PersistenceScheduler::new(self.config.debounce_window);
        self.next_seq = 0;
        self.state_db.clear()
    }
}
