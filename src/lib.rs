//! rulepedia - a local TF-IDF indexing and rule discovery engine.
//!
//! rulepedia ingests pre-chunked rulebook text, maintains a TF-IDF
//! vocabulary with per-chunk vector embeddings, answers hybrid
//! (semantic + keyword) similarity queries, and feeds a rule
//! classification pipeline with ordered, word-associated chunks.
//! In-memory state is authoritative; durable storage catches up through
//! a debounced write scheduler.
//!
//! # Quick start
//!
//! ```no_run
//! use rulepedia::{ChunkRecord, Engine, EngineConfig, StateDb};
//! use rulepedia::classifier::KeywordClassifier;
//!
//! let db = StateDb::open("state.redb".as_ref()).unwrap();
//! let mut engine = Engine::open(db, EngineConfig::default()).unwrap();
//!
//! engine
//!     .ingest_batch(vec![ChunkRecord {
//!         source_id: "core-rules".to_string(),
//!         order: 0,
//!         content: "Roll the dice pool against difficulty 6.".to_string(),
//!         section_context: String::new(),
//!         word_range: (0, 0),
//!     }])
//!     .unwrap();
//!
//! let hits = engine.search("dice difficulty", 10, 0.0).unwrap();
//! for hit in &hits {
//!     println!("{} (score: {:.3})", hit.chunk_id, hit.hybrid_score);
//! }
//!
//! let rules = engine.discover_rules(&KeywordClassifier, 0.6);
//! engine.force_flush().unwrap();
//! # let _ = rules;
//! ```

pub mod associations;
pub mod chunk_id;
pub mod chunk_store;
pub mod classifier;
pub mod cli;
pub mod data_dir;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod state_db;
pub mod tokenize;
pub mod vector_index;

pub use chunk_id::ChunkId;
pub use chunk_store::{Chunk, ChunkRecord, ChunkStore};
pub use classifier::{Classification, Classifier};
pub use data_dir::DataDir;
pub use engine::{Engine, EngineConfig, SearchHit};
pub use error::{Error, Result};
pub use pipeline::RuleChunk;
pub use state_db::StateDb;
