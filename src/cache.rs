//! Persistent OMDb lookup cache.
//!
//! The cache file is a JSON object mapping cache keys (see
//! [`crate::normalize::cache_key`]) to the OMDb payload, or `null` when a
//! lookup was attempted and came back empty. It is read once when the run
//! starts and written once after the movie loop; entries learned by a run
//! that dies before that point are lost.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::models::MetadataPayload;

/// Result of consulting the cache for one key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheLookup<'a> {
    /// Never looked up
    Miss,
    /// Looked up before, OMDb had nothing
    NoResult,
    Hit(&'a MetadataPayload),
}

#[derive(Debug, Default)]
pub struct LookupCache {
    entries: BTreeMap<String, Option<MetadataPayload>>,
    learned: usize,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the cache file. A missing, unreadable or corrupt file yields an
    /// empty cache; this never fails.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no lookup cache found, starting empty");
                return Self::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "lookup cache unreadable, starting empty");
                return Self::new();
            }
        };

        match serde_json::from_str::<BTreeMap<String, Option<MetadataPayload>>>(&text) {
            Ok(entries) => {
                info!(path = %path.display(), entries = entries.len(), "lookup cache loaded");
                Self { entries, learned: 0 }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "lookup cache corrupt, starting empty");
                Self::new()
            }
        }
    }

    pub fn get(&self, key: &str) -> CacheLookup<'_> {
        match self.entries.get(key) {
            None => CacheLookup::Miss,
            Some(None) => CacheLookup::NoResult,
            Some(Some(payload)) => CacheLookup::Hit(payload),
        }
    }

    /// Store the outcome of a lookup. `None` is the "no result" marker.
    pub fn record(&mut self, key: String, payload: Option<MetadataPayload>) {
        if self.entries.insert(key, payload).is_none() {
            self.learned += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys added since the cache was loaded
    pub fn learned(&self) -> usize {
        self.learned
    }

    /// Write the whole cache to `path`, replacing its contents.
    /// Takes the cache by value: a run saves it exactly once.
    pub fn save(self, path: &Path) -> Result<usize> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write lookup cache {}", path.display()))?;
        info!(path = %path.display(), entries = self.entries.len(), learned = self.learned, "lookup cache saved");
        Ok(self.entries.len())
    }
}
