use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

/// A stable chunk identifier derived from (source_id, order).
///
/// Once assigned, an id is never recycled while the chunk is referenced
/// anywhere in the index. The numeric value is used as the key in redb
/// tables; the short hex form is for human display.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ChunkId(u64);

impl ChunkId {
    /// Generate a stable chunk id from the source document id and the
    /// chunk's position within it.
    pub fn new(source_id: &str, order: u64) -> Self {
        let mut hasher = DefaultHasher::new();
        source_id.hash(&mut hasher);
        order.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Short hex string for display (e.g. "a1b2c3").
    pub fn short(&self) -> String {
        let full = format!("{:016x}", self.0);
        full[..6].to_string()
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short())
    }
}
