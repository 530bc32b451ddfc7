//! StateStore: redb-backed state persistence for arbor.
//!
//! Provides typed JSON access over the tables in [`crate::tables`]. The
//! collaborator trait implementations (`resources`, `artifacts`, `pipeline`,
//! `workloads`) are thin layers over the helpers defined here. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, TableHandle, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::{self, JsonTable};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}
pub(crate) use map_err;

/// Registry stage images are published to unless configured otherwise.
pub const DEFAULT_REGISTRY: &str = "127.0.0.1:30500/apps";

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    /// Monotonic counter mixed into generated identifiers.
    seq: Arc<AtomicU64>,
    registry: Arc<str>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Use `registry` for image URLs of new stage records.
    pub fn with_registry(mut self, registry: &str) -> Self {
        self.registry = Arc::from(registry.trim_end_matches('/'));
        self
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            seq: Arc::new(AtomicU64::new(0)),
            registry: Arc::from(DEFAULT_REGISTRY),
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in tables::ALL {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON access ────────────────────────────────────────

    /// Run `f` inside one write transaction and commit on success.
    /// An error drops the transaction, which aborts it.
    pub(crate) fn write_with<R>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> StateResult<R>,
    ) -> StateResult<R> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let result = f(&txn)?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(result)
    }

    /// Get one record by key.
    pub(crate) fn get_json<T: DeserializeOwned>(
        &self,
        def: JsonTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let record = match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Some(decode(guard.value())?),
            None => None,
        };
        Ok(record)
    }

    /// Get raw bytes by key.
    pub(crate) fn get_raw(&self, def: JsonTable, key: &str) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let bytes = table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_vec());
        Ok(bytes)
    }

    /// All records whose key starts with `prefix` (empty prefix: all).
    pub(crate) fn scan_json<T: DeserializeOwned>(
        &self,
        def: JsonTable,
        prefix: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                results.push(decode(value.value())?);
            }
        }
        Ok(results)
    }

    /// Insert or overwrite one record.
    pub(crate) fn put_json<T: Serialize>(
        &self,
        def: JsonTable,
        key: &str,
        value: &T,
    ) -> StateResult<()> {
        let bytes = encode(value)?;
        self.write_with(|txn| {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
            Ok(())
        })
    }

    /// Insert a record only if the key is free. Returns `false` (and writes
    /// nothing) when it was already taken.
    pub(crate) fn insert_new<T: Serialize>(
        &self,
        def: JsonTable,
        key: &str,
        value: &T,
    ) -> StateResult<bool> {
        let bytes = encode(value)?;
        self.write_with(|txn| {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            if table.get(key).map_err(map_err!(Read))?.is_some() {
                return Ok(false);
            }
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
            Ok(true)
        })
    }

    /// Read-modify-write of one record inside a single transaction.
    /// Returns the updated record, or `None` if the key was absent.
    pub(crate) fn modify_json<T, F>(&self, def: JsonTable, key: &str, f: F) -> StateResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        self.write_with(|txn| {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            let current: Option<T> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let Some(mut record) = current else {
                return Ok(None);
            };
            f(&mut record);
            let bytes = encode(&record)?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
            Ok(Some(record))
        })
    }

    /// Delete by key. Returns true if it existed.
    pub(crate) fn remove(&self, def: JsonTable, key: &str) -> StateResult<bool> {
        let existed = self.write_with(|txn| {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            let existed = table.remove(key).map_err(map_err!(Write))?.is_some();
            Ok(existed)
        })?;
        debug!(table = def.name(), %key, existed, "record deleted");
        Ok(existed)
    }

    /// Fresh hex identifier of `len` characters, unique per store instance
    /// and seeded with caller context so ids differ across stores too.
    pub(crate) fn generate_id(&self, seed: &str, content: &[u8], len: usize) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(content);
        hasher.update(nanos.to_le_bytes());
        hasher.update(seq.to_le_bytes());
        let mut id = hex::encode(hasher.finalize());
        id.truncate(len);
        id
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}
