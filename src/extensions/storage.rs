//! Persisted state backends for the extension registry.
//!
//! State is a set of keyed JSON records. Writes arrive as batches that are
//! applied all-or-nothing, so a registry change spanning several records is
//! either fully visible after a restart or not at all.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use thiserror::Error;

/// Errors raised by a state backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("state record '{key}' is corrupt: {message}")]
    Corrupt { key: String, message: String },

    #[error("state backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A batch of record writes, applied atomically.
pub type StoreBatch = Vec<(String, Value)>;

/// Keyed record storage used by the registry.
pub trait StateStore: Send + Sync {
    /// Load a record, `None` if it was never written.
    fn load(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Apply every write in `batch` or none of them.
    fn commit(&self, batch: StoreBatch) -> StoreResult<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State backed by a single JSON document on disk.
///
/// Records are cached in memory. A commit serializes the updated document to
/// a sibling temp file and renames it over the original, so a crash mid-write
/// leaves the previous document intact.
pub struct JsonFileStore {
    /// Path to the state file.
    path: PathBuf,
    /// In-memory cache of committed records.
    cache: Mutex<HashMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing records.
    ///
    /// A missing file starts an empty store. An unreadable or corrupt file is
    /// an error rather than silently discarded state.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let cache = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            if contents.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
                    key: path.display().to_string(),
                    message: e.to_string(),
                })?
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_document(&self, document: &HashMap<String, Value>) -> StoreResult<()> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let contents = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            io_err(source)
        })
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(lock(&self.cache).get(key).cloned())
    }

    fn commit(&self, batch: StoreBatch) -> StoreResult<()> {
        let mut cache = lock(&self.cache);

        let mut next = cache.clone();
        for (key, value) in batch {
            next.insert(key, value);
        }

        self.write_document(&next)?;
        *cache = next;
        Ok(())
    }
}

/// In-process state, lost when dropped.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(lock(&self.records).get(key).cloned())
    }

    fn commit(&self, batch: StoreBatch) -> StoreResult<()> {
        let mut records = lock(&self.records);
        records.extend(batch);
        Ok(())
    }
}
