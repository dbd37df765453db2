//! Bounded retention of envelopes.
//!
//! [RetentionStore] keeps the most recent envelopes up to a fixed capacity. Appending assigns the
//! envelope its identity and evicts whatever falls outside the window in the same backend commit,
//! so the persisted window never exceeds capacity once a write completes.

use crate::error::{BoxError, EquipStatError};
use crate::metrics::{ENVELOPES_EVICTED, ENVELOPES_INGESTED};
use crate::models::{AggregateEnvelope, EnvelopeSummary};

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Number of envelopes kept when no capacity is configured.
pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(5) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// Persistence backend for a [RetentionStore].
///
/// Implementations need not be ordered or bounded themselves; the store decides what to keep.
/// Methods may block: the store calls them from the blocking thread pool once it is running.
pub trait EnvelopeBackend: Debug + Send + Sync {
    /// Returns the next value of a strictly increasing id sequence.
    fn next_id(&self) -> Result<u64, BoxError>;

    /// Load every persisted envelope, in any order.
    fn load(&self) -> Result<Vec<AggregateEnvelope>, BoxError>;

    /// Persist `insert`, if any, and remove the envelopes with ids in `evict`, as one atomic
    /// change. On error nothing may have been applied.
    fn commit(&self, insert: Option<&AggregateEnvelope>, evict: &[u64]) -> Result<(), BoxError>;
}

/// Process-local backend. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sequence: AtomicU64,
    envelopes: Mutex<BTreeMap<u64, AggregateEnvelope>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EnvelopeBackend for MemoryBackend {
    fn next_id(&self) -> Result<u64, BoxError> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn load(&self) -> Result<Vec<AggregateEnvelope>, BoxError> {
        let envelopes = self
            .envelopes
            .lock()
            .map_err(|_| "memory backend lock poisoned")?;
        Ok(envelopes.values().cloned().collect())
    }

    fn commit(&self, insert: Option<&AggregateEnvelope>, evict: &[u64]) -> Result<(), BoxError> {
        let mut envelopes = self
            .envelopes
            .lock()
            .map_err(|_| "memory backend lock poisoned")?;
        if let Some(envelope) = insert {
            envelopes.insert(envelope.id, envelope.clone());
        }
        for id in evict {
            envelopes.remove(id);
        }
        Ok(())
    }
}

/// Backend persisting envelopes as JSON in an embedded [sled] database.
///
/// Envelopes live in the `envelopes` tree keyed by big-endian id. Ids come from sled's
/// monotonic id generator, which never repeats across restarts.
#[derive(Debug)]
pub struct SledBackend {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledBackend {
    /// Open or create a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EquipStatError> {
        Self::from_db(sled::open(path)?)
    }

    /// Create a database that is deleted when dropped.
    pub fn temporary() -> Result<Self, EquipStatError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, EquipStatError> {
        let tree = db.open_tree("envelopes")?;
        Ok(Self { db, tree })
    }
}

impl EnvelopeBackend for SledBackend {
    fn next_id(&self) -> Result<u64, BoxError> {
        // Start at 1 so that ids match the memory backend.
        Ok(self.db.generate_id()? + 1)
    }

    fn load(&self) -> Result<Vec<AggregateEnvelope>, BoxError> {
        let mut envelopes = Vec::new();
        for value in self.tree.iter().values() {
            envelopes.push(serde_json::from_slice(&value?)?);
        }
        Ok(envelopes)
    }

    fn commit(&self, insert: Option<&AggregateEnvelope>, evict: &[u64]) -> Result<(), BoxError> {
        let mut batch = sled::Batch::default();
        if let Some(envelope) = insert {
            batch.insert(&envelope.id.to_be_bytes(), serde_json::to_vec(envelope)?);
        }
        for id in evict {
            batch.remove(&id.to_be_bytes());
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        Ok(())
    }
}

/// Source of creation timestamps.
pub type Clock = Box<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// Ordering of the window: most recent first, ties broken by the larger id.
fn newest_first(a: &AggregateEnvelope, b: &AggregateEnvelope) -> std::cmp::Ordering {
    (b.created_at, b.id).cmp(&(a.created_at, a.id))
}

/// A bounded window of the most recent envelopes.
///
/// Appends are serialised by a write lock held across id assignment, the backend commit and the
/// in-memory update. Reads take the read lock and so observe the window either before or after
/// an append, never in between.
pub struct RetentionStore {
    backend: Arc<dyn EnvelopeBackend>,
    capacity: NonZeroUsize,
    clock: Clock,
    /// Retained envelopes, most recent first
    window: Arc<RwLock<Vec<AggregateEnvelope>>>,
}

impl Debug for RetentionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionStore")
            .field("backend", &self.backend)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl RetentionStore {
    /// Open a store over `backend`, using the system clock.
    ///
    /// Envelopes already persisted are loaded; any beyond `capacity` are evicted.
    pub fn open(
        backend: Box<dyn EnvelopeBackend>,
        capacity: NonZeroUsize,
    ) -> Result<Self, EquipStatError> {
        Self::with_clock(backend, capacity, Box::new(OffsetDateTime::now_utc))
    }

    /// Open a store over `backend` taking creation times from `clock`.
    pub fn with_clock(
        backend: Box<dyn EnvelopeBackend>,
        capacity: NonZeroUsize,
        clock: Clock,
    ) -> Result<Self, EquipStatError> {
        let mut window = backend.load().map_err(EquipStatError::StorageUnavailable)?;
        window.sort_by(newest_first);
        if window.len() > capacity.get() {
            let evict: Vec<u64> = window[capacity.get()..].iter().map(|e| e.id).collect();
            tracing::info!("Trimming {} persisted envelopes beyond capacity", evict.len());
            backend
                .commit(None, &evict)
                .map_err(EquipStatError::StorageUnavailable)?;
            window.truncate(capacity.get());
        }
        Ok(Self {
            backend: Arc::from(backend),
            capacity,
            clock,
            window: Arc::new(RwLock::new(window)),
        })
    }

    /// Maximum number of envelopes retained.
    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Persist a new envelope for `summary` and evict the oldest beyond capacity.
    ///
    /// Returns the envelope with its assigned id and creation time. The creation time is never
    /// earlier than that of the newest retained envelope, so the new envelope always heads the
    /// window and survives its own eviction pass even if the clock steps backwards.
    ///
    /// The backend work runs on the blocking thread pool together with the window update, so the
    /// two complete together even if the returned future is dropped part way.
    #[tracing::instrument(level = "DEBUG", skip(self, summary))]
    pub async fn append(&self, summary: EnvelopeSummary) -> Result<AggregateEnvelope, EquipStatError> {
        let mut window = self.window.clone().write_owned().await;
        let backend = self.backend.clone();
        let keep = self.capacity.get() - 1;
        let now = (self.clock)();
        let span = tracing::Span::current();

        tokio::task::spawn_blocking(move || -> Result<AggregateEnvelope, EquipStatError> {
            let _entered = span.enter();
            let id = backend
                .next_id()
                .map_err(EquipStatError::StorageUnavailable)?;
            let created_at = match window.first() {
                Some(newest) if newest.created_at > now => newest.created_at,
                _ => now,
            };
            let envelope = AggregateEnvelope {
                id,
                created_at,
                summary,
            };

            let evict: Vec<u64> = window.iter().skip(keep).map(|e| e.id).collect();
            backend
                .commit(Some(&envelope), &evict)
                .map_err(EquipStatError::StorageUnavailable)?;

            window.truncate(keep);
            window.insert(0, envelope.clone());

            ENVELOPES_INGESTED.inc();
            ENVELOPES_EVICTED.inc_by(evict.len() as u64);
            tracing::info!(id, evicted = ?evict, "Appended envelope");
            Ok(envelope)
        })
        .await
        .map_err(EquipStatError::storage)?
    }

    /// Returns up to `limit` envelopes, most recent first.
    pub async fn list(&self, limit: usize) -> Vec<AggregateEnvelope> {
        let window = self.window.read().await;
        window.iter().take(limit).cloned().collect()
    }

    /// Returns the retained envelope with the given id.
    pub async fn get(&self, id: u64) -> Result<AggregateEnvelope, EquipStatError> {
        let window = self.window.read().await;
        window
            .iter()
            .find(|envelope| envelope.id == id)
            .cloned()
            .ok_or(EquipStatError::NotFound { id })
    }

    /// Number of envelopes currently retained.
    pub async fn len(&self) -> usize {
        self.window.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.window.read().await.is_empty()
    }
}
