//! Shared state store.
//!
//! All simulation state is kept in a handful of independent JSON documents.
//! Engines, timers and every UI surface read and write through this store;
//! nothing holds authoritative state in memory.
//!
//! Every read-modify-write goes through [`SharedStateStore::update`], which
//! performs an optimistic compare-and-swap against the document revision and
//! retries on conflict. Two ticks touching the same document therefore
//! serialize instead of silently dropping one another's mutation.
//! Documents never share a write unit, so cross-document consistency is
//! eventual.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Maximum compare-and-swap attempts before giving up on an update.
const MAX_CAS_ATTEMPTS: u32 = 16;

/// Logical storage keys shared with every front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    SessionState,
    ForestState,
    FocusMetrics,
    ApiConfig,
    DistractionSites,
    WebsiteClassifications,
}

impl DocumentKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKey::SessionState => "sessionState",
            DocumentKey::ForestState => "forestState",
            DocumentKey::FocusMetrics => "focusMetrics",
            DocumentKey::ApiConfig => "apiConfig",
            DocumentKey::DistractionSites => "distractionSites",
            DocumentKey::WebsiteClassifications => "websiteClassifications",
        }
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted document with a well-defined default used whenever the
/// stored value is missing or unreadable.
pub trait Document: Serialize + DeserializeOwned + Default {
    const KEY: DocumentKey;
}

/// Raw stored value plus its revision counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: String,
    pub revision: u64,
}

/// Persistence backend. Implementations only need atomic single-key
/// operations; the retry loop lives in [`SharedStateStore`].
pub trait StoreBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Versioned>, StoreError>;

    /// Unconditional write. Returns the new revision.
    fn write(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// Write only if the stored revision still equals `expected`
    /// (`None` = key absent). Returns the new revision, or `None` when
    /// another writer got there first.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &str,
    ) -> Result<Option<u64>, StoreError>;
}

/// In-process backend used by tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Versioned>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let revision = entries.get(key).map(|v| v.revision + 1).unwrap_or(1);
        entries.insert(
            key.to_string(),
            Versioned {
                value: value.to_string(),
                revision,
            },
        );
        Ok(revision)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &str,
    ) -> Result<Option<u64>, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let current = entries.get(key).map(|v| v.revision);
        if current != expected {
            return Ok(None);
        }
        let revision = current.map(|r| r + 1).unwrap_or(1);
        entries.insert(
            key.to_string(),
            Versioned {
                value: value.to_string(),
                revision,
            },
        );
        Ok(Some(revision))
    }
}

/// Cheaply cloneable handle over a [`StoreBackend`].
#[derive(Clone)]
pub struct SharedStateStore {
    backend: Arc<dyn StoreBackend>,
}

impl std::fmt::Debug for SharedStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStateStore").finish_non_exhaustive()
    }
}

impl SharedStateStore {
    pub fn new(backend: impl StoreBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Store backed by a fresh [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Read a document. Missing or undecodable documents read as the default.
    pub fn get<D: Document>(&self) -> Result<D, StoreError> {
        Ok(self.read_versioned::<D>()?.0)
    }

    /// Replace a document wholesale (last write wins).
    pub fn set<D: Document>(&self, doc: &D) -> Result<(), StoreError> {
        let json = encode(D::KEY, doc)?;
        self.backend.write(D::KEY.as_str(), &json)?;
        Ok(())
    }

    /// Read-modify-write a document with optimistic concurrency.
    ///
    /// `f` may run more than once if another writer commits in between, so
    /// it must derive its result from the document it is handed.
    pub fn update<D, R, F>(&self, mut f: F) -> Result<R, StoreError>
    where
        D: Document,
        F: FnMut(&mut D) -> R,
    {
        let key = D::KEY;
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (mut doc, revision) = self.read_versioned::<D>()?;
            let result = f(&mut doc);
            let json = encode(key, &doc)?;
            if self
                .backend
                .compare_and_swap(key.as_str(), revision, &json)?
                .is_some()
            {
                return Ok(result);
            }
            debug!(%key, attempt, "lost compare-and-swap race, retrying");
        }
        Err(StoreError::Conflict {
            key: key.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Shallow-merge top-level fields of `patch` into the stored document.
    pub fn merge<D: Document>(&self, patch: serde_json::Value) -> Result<D, StoreError> {
        let key = D::KEY;
        let patch = match patch {
            serde_json::Value::Object(map) => map,
            _ => {
                return Err(StoreError::Codec {
                    key: key.to_string(),
                    source: serde::de::Error::custom("merge patch must be a JSON object"),
                })
            }
        };

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (doc, revision) = self.read_versioned::<D>()?;
            let mut value = serde_json::to_value(&doc).map_err(|source| StoreError::Codec {
                key: key.to_string(),
                source,
            })?;
            if let Some(obj) = value.as_object_mut() {
                for (field, v) in &patch {
                    obj.insert(field.clone(), v.clone());
                }
            }
            let merged: D = serde_json::from_value(value).map_err(|source| StoreError::Codec {
                key: key.to_string(),
                source,
            })?;
            let json = encode(key, &merged)?;
            if self
                .backend
                .compare_and_swap(key.as_str(), revision, &json)?
                .is_some()
            {
                return Ok(merged);
            }
            debug!(%key, attempt, "lost compare-and-swap race during merge, retrying");
        }
        Err(StoreError::Conflict {
            key: key.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Put a document back to its default. The revision keeps counting up,
    /// so writers holding an older revision still lose their swap.
    pub fn reset<D: Document>(&self) -> Result<(), StoreError> {
        self.set(&D::default())
    }

    /// Current revision of a document, `None` if it was never written.
    pub fn revision<D: Document>(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.backend.read(D::KEY.as_str())?.map(|v| v.revision))
    }

    fn read_versioned<D: Document>(&self) -> Result<(D, Option<u64>), StoreError> {
        let key = D::KEY;
        match self.backend.read(key.as_str())? {
            None => Ok((D::default(), None)),
            Some(stored) => match serde_json::from_str::<D>(&stored.value) {
                Ok(doc) => Ok((doc, Some(stored.revision))),
                Err(e) => {
                    warn!(%key, error = %e, "stored document unreadable, using default");
                    Ok((D::default(), Some(stored.revision)))
                }
            },
        }
    }
}

fn encode<D: Serialize>(key: DocumentKey, doc: &D) -> Result<String, StoreError> {
    serde_json::to_string(doc).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })
}
