use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::warn;

use crate::{
    chunk_id::ChunkId,
    chunk_store::Chunk,
    error::Result,
};

const CHUNKS: TableDefinition<u64, &[u8]> = TableDefinition::new("chunks");
const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

/// Header size: 4 bytes dimension + 4 bytes vocabulary epoch.
const HEADER_SIZE: usize = 8;

/// Storage format version written to the meta table.
pub const FORMAT_VERSION: &str = "1";

/// Durable record of the corpus, applied to in batches by the
/// persistence scheduler.
///
/// Three tables:
/// - `chunks`: chunk id to serde_json chunk record
/// - `vectors`: chunk id to binary embedding. Format per entry:
///   4 bytes dimension (u32 LE), 4 bytes vocabulary epoch (u32 LE),
///   then dimension * 4 bytes of f32 LE values
/// - `meta`: format version, vocabulary epoch, last-updated timestamp
///
/// In-memory state is always authoritative; this database may lag by up
/// to one debounce window plus retry delay.
pub struct StateDb {
    db: Database,
}

/// One batch of writes, produced by snapshotting the pending-save set.
#[derive(Debug, Default)]
pub struct FlushBatch {
    pub upserts: Vec<(Chunk, Vec<f32>, u32)>,
    pub removals: Vec<ChunkId>,
    pub vocabulary_epoch: u32,
    pub last_updated: u64,
}

/// Everything read back from disk on open.
#[derive(Debug, Default)]
pub struct PersistedState {
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<(ChunkId, Vec<f32>, u32)>,
    pub vocabulary_epoch: u32,
}

impl StateDb {
    /// Open or create the state database at the given path.
    ///
    /// A malformed database file is replaced with a fresh empty one
    /// rather than surfaced as an error.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use rulepedia::StateDb;
    ///
    /// let db = StateDb::open(&tmp.path().join("state.redb")).unwrap();
    /// assert!(db.load().unwrap().chunks.is_empty());
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let db = match Database::create(path) {
            Ok(db) => db,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    %err,
                    "state database unreadable, starting empty"
                );
                std::fs::remove_file(path)?;
                Database::create(path).map_err(redb::Error::from)?
            }
        };

        let txn = db.begin_write()?;
        txn.open_table(CHUNKS)?;
        txn.open_table(VECTORS)?;
        txn.open_table(META)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Apply one flush batch in a single write transaction.
    ///
    /// Upserts and removals land atomically together with the updated
    /// meta entries; a failure leaves the previous on-disk state intact.
    pub fn apply(&self, batch: &FlushBatch) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut chunks = txn.open_table(CHUNKS)?;
            let mut vectors = txn.open_table(VECTORS)?;

            for id in &batch.removals {
                chunks.remove(id.as_u64())?;
                vectors.remove(id.as_u64())?;
            }

            for (chunk, vector, epoch) in &batch.upserts {
                let record = serde_json::to_vec(chunk)?;
                chunks.insert(chunk.id.as_u64(), record.as_slice())?;

                let payload = encode_vector(vector, *epoch);
                vectors.insert(chunk.id.as_u64(), payload.as_slice())?;
            }

            let mut meta = txn.open_table(META)?;
            meta.insert("version", FORMAT_VERSION)?;
            meta.insert(
                "vocabulary_epoch",
                batch.vocabulary_epoch.to_string().as_str(),
            )?;
            meta.insert(
                "last_updated",
                batch.last_updated.to_string().as_str(),
            )?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Load the persisted corpus. Malformed entries are skipped with a
    /// warning; a missing or empty database yields an empty state.
    pub fn load(&self) -> Result<PersistedState> {
        let txn = self.db.begin_read()?;

        let mut state = PersistedState::default();

        let chunks = txn.open_table(CHUNKS)?;
        for entry in chunks.iter()? {
            let (key, value) = entry?;
            match serde_json::from_slice::<Chunk>(value.value()) {
                Ok(chunk) => state.chunks.push(chunk),
                Err(err) => {
                    warn!(
                        chunk = key.value(),
                        %err,
                        "skipping malformed chunk record"
                    );
                }
            }
        }

        let vectors = txn.open_table(VECTORS)?;
        for entry in vectors.iter()? {
            let (key, value) = entry?;
            let id = ChunkId::from_u64(key.value());
            match decode_vector(value.value()) {
                Some((values, epoch)) => {
                    state.vectors.push((id, values, epoch));
                }
                None => {
                    warn!(
                        chunk = key.value(),
                        "skipping malformed vector record"
                    );
                }
            }
        }

        let meta = txn.open_table(META)?;
        state.vocabulary_epoch = meta
            .get("vocabulary_epoch")?
            .and_then(|v| v.value().parse().ok())
            .unwrap_or(0);

        Ok(state)
    }

    /// Remove every persisted chunk, vector, and meta entry.
    pub fn clear(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(CHUNKS)?;
        txn.delete_table(VECTORS)?;
        txn.delete_table(META)?;
        txn.open_table(CHUNKS)?;
        txn.open_table(VECTORS)?;
        txn.open_table(META)?;
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for StateDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDb").finish_non_exhaustive()
    }
}

fn encode_vector(values: &[f32], epoch: u32) -> Vec<u8> {
    let mut payload =
        Vec::with_capacity(HEADER_SIZE + std::mem::size_of_val(values));
    payload.extend_from_slice(&(values.len() as u32).to_le_bytes());
    payload.extend_from_slice(&epoch.to_le_bytes());
    payload.extend_from_slice(bytemuck::cast_slice(values));
    payload
}

fn decode_vector(bytes: &[u8]) -> Option<(Vec<f32>, u32)> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    let dimension = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
    let epoch = u32::from_le_bytes(bytes[4..8].try_into().ok()?);

    let expected_len = HEADER_SIZE + (dimension as usize) * 4;
    if bytes.len() != expected_len {
        return None;
    }

    let values: Vec<f32> =
        bytemuck::cast_slice(&bytes[HEADER_SIZE..]).to_vec();
    Some((values, epoch))
}
