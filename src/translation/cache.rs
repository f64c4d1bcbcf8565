/*!
 * Machine translation cache.
 *
 * Raw MT output is cached per (engine, source language, target language,
 * source text) so that re-running a document, or a document sharing
 * paragraphs with an earlier one, does not pay for MT twice. The cache sits
 * in front of the MT engine only: post-editing always runs on cache hits.
 *
 * Keys are SHA-256 digests so the persisted file does not grow with the
 * length of the source text it indexes.
 */

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::StoreError;
use crate::file_utils::{load_json_store, save_json_store};

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: usize,
    /// Lookups that had to go to the engine
    pub misses: usize,
    /// hits / (hits + misses), 0.0 before the first lookup
    pub hit_rate: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCache {
    entries: HashMap<String, String>,
}

/// MT output cache, cheap to clone and share between batch workers
#[derive(Debug, Clone)]
pub struct MtCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
    hits: Arc<AtomicUsize>,
    misses: Arc<AtomicUsize>,
    dirty: Arc<AtomicBool>,
    enabled: bool,
}

impl MtCache {
    /// Create an empty cache
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            hits: Arc::new(AtomicUsize::new(0)),
            misses: Arc::new(AtomicUsize::new(0)),
            dirty: Arc::new(AtomicBool::new(false)),
            enabled,
        }
    }

    /// Load the cache file. A missing file starts an empty cache, an
    /// unreadable one is reported as corrupt.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let cache = Self::new(true);
        if let Some(stored) = load_json_store::<StoredCache>(path)? {
            debug!("Loaded {} MT cache entries from {:?}", stored.entries.len(), path);
            *cache.entries.write() = stored.entries;
        }
        Ok(cache)
    }

    /// Atomically rewrite the cache file if anything changed since the last save
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let stored = StoredCache {
            entries: self.entries.read().clone(),
        };
        if let Err(e) = save_json_store(path, &stored) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Cached MT output for `source_text`
    pub fn get(&self, engine: &str, source_language: &str, target_language: &str, source_text: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let key = cache_key(engine, source_language, target_language, source_text);
        match self.entries.read().get(&key) {
            Some(translation) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("MT cache hit for '{}'", truncate_text(source_text, 30));
                Some(translation.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store MT output for `source_text`
    pub fn store(&self, engine: &str, source_language: &str, target_language: &str, source_text: &str, translation: &str) {
        if !self.enabled {
            return;
        }

        let key = cache_key(engine, source_language, target_language, source_text);
        self.entries.write().insert(key, translation.to_string());
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Hit/miss counters since creation
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }

    /// Number of cached translations
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether lookups and stores are active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for MtCache {
    fn default() -> Self {
        Self::new(true)
    }
}

fn cache_key(engine: &str, source_language: &str, target_language: &str, source_text: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [engine, source_language, target_language, source_text] {
        hasher.update(part.as_bytes());
        hasher.update([0x1fu8]);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Truncate text to a maximum number of characters with ellipsis
fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
