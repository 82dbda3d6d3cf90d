//! Session cache: terminal analysis records keyed by (viewpoint, document).
//!
//! The key is the hex BLAKE3 digest of `"{viewpoint}|{text}"` with both parts
//! trimmed. Reads never mutate; writes overwrite. Store failures are logged
//! and degrade to a miss or a skipped write, so a broken cache never breaks
//! a screening run.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::AnalysisRecord;

/// Errors from a cache store.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Stored value: the terminal record plus when it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: DateTime<Utc>,
    pub data: AnalysisRecord,
    /// Prompt templates that produced `data`, when the writer tracked them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_version: Option<String>,
}

/// Backing storage for [`AnalysisCache`].
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn store(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Flat `key → {timestamp, data}` JSON file.
///
/// The whole map is held in memory and rewritten on every store
/// (temp file + rename). Malformed entries are skipped on read.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open a cache file. A missing file starts empty; an unreadable or
    /// corrupted one is logged and also starts empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match Self::read_file(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache file unreadable, starting empty");
                BTreeMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(path: &Path) -> Result<BTreeMap<String, Value>, CacheError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(path).map_err(|e| CacheError::io(path, e))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Write to a temp file beside the target, then rename over it.
    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&temp_path, content).map_err(|e| CacheError::io(&temp_path, e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| CacheError::io(&self.path, e))?;
        Ok(())
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(raw) => Ok(Some(serde_json::from_value(raw.clone())?)),
            None => Ok(None),
        }
    }

    fn store(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), serde_json::to_value(&entry)?);
        self.persist(&entries)
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        self.persist(&entries)
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Cache of terminal analysis records.
pub struct AnalysisCache {
    store: Box<dyn CacheStore>,
    prompt_version: Option<String>,
}

impl AnalysisCache {
    pub fn new(store: Box<dyn CacheStore>) -> Self {
        Self {
            store,
            prompt_version: None,
        }
    }

    /// Stamp writes with `version` and treat entries from any other version
    /// as misses.
    pub fn with_prompt_version(mut self, version: impl Into<String>) -> Self {
        self.prompt_version = Some(version.into());
        self
    }

    pub fn prompt_version(&self) -> Option<&str> {
        self.prompt_version.as_deref()
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    /// File-backed cache at `path`.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::new(Box::new(JsonFileStore::open(path)))
    }

    /// Deterministic key for a (viewpoint, document text) pair.
    pub fn key(viewpoint: &str, text: &str) -> String {
        let material = format!("{}|{}", viewpoint.trim(), text.trim());
        blake3::hash(material.as_bytes()).to_hex().to_string()
    }

    /// Cached record for the pair, if any.
    pub fn get(&self, viewpoint: &str, text: &str) -> Option<AnalysisRecord> {
        let key = Self::key(viewpoint, text);
        match self.store.load(&key) {
            Ok(Some(entry))
                if self.prompt_version.is_some() && entry.prompt_version != self.prompt_version =>
            {
                debug!(
                    key = %key,
                    cached = ?entry.prompt_version,
                    current = ?self.prompt_version,
                    "cache entry from other prompt version, treating as miss"
                );
                None
            }
            Ok(Some(entry)) => {
                debug!(key = %key, cached_at = %entry.timestamp, "cache hit");
                Some(entry.data)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store `record` for the pair, overwriting any previous entry.
    pub fn set(&self, viewpoint: &str, text: &str, record: &AnalysisRecord) {
        let key = Self::key(viewpoint, text);
        let entry = CacheEntry {
            timestamp: Utc::now(),
            data: record.clone(),
            prompt_version: self.prompt_version.clone(),
        };
        if let Err(e) = self.store.store(&key, entry) {
            warn!(key = %key, error = %e, "cache write failed, skipping");
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "cache clear failed");
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("entries", &self.store.len())
            .field("prompt_version", &self.prompt_version)
            .finish()
    }
}
