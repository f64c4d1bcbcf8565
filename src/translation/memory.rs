/*!
 * Translation memory store.
 *
 * Maps previously translated segments to their translations so that repeated
 * paragraphs skip MT and post-editing entirely. Entries are keyed by the
 * normalized source text (trimmed, lowercased, whitespace collapsed).
 *
 * Lookups are exact on the normalized key by default. When a fuzzy threshold
 * is configured, a miss falls back to normalized Levenshtein similarity over
 * the punctuation-stripped form of the text, and the best candidate at or
 * above the threshold is returned.
 *
 * The store is persisted as a JSON document rewritten atomically, so a crash
 * during a flush leaves the previous file intact.
 */

use chrono::{DateTime, Utc};
use log::debug;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

use crate::errors::StoreError;
use crate::file_utils::{FileManager, load_json_store, save_json_store};

const STORE_VERSION: u32 = 1;

/// Normalize a segment into its memory key: NFKC, whitespace collapsed,
/// lowercased
pub fn normalize_key(text: &str) -> String {
    let composed: String = text.nfkc().collect();
    composed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Key with punctuation and symbols removed, used for similarity scoring
fn comparison_form(text: &str) -> String {
    let stripped: String = normalize_key(text)
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// How a memory match was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Same normalized key
    Exact,
    /// Similarity at or above the configured threshold
    Fuzzy,
}

/// A translation retrieved from memory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TmMatch {
    /// Source text of the stored entry
    pub source: String,
    /// Stored translation
    pub translation: String,
    /// 1.0 for exact matches
    pub similarity: f32,
    /// Exact or fuzzy
    pub kind: MatchKind,
}

/// One stored translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmEntry {
    /// Source text as it was first seen
    pub source: String,
    /// Translation (last write wins)
    pub translation: String,
    /// Number of times the entry was reused
    #[serde(default)]
    pub uses: u32,
    /// First time the entry was stored
    pub created_at: DateTime<Utc>,
    /// Last time the translation was written
    pub updated_at: DateTime<Utc>,
    /// Last time the entry served a lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredMemory {
    version: u32,
    entries: BTreeMap<String, TmEntry>,
}

/// Memory statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// Number of entries
    pub entries: usize,
    /// Sum of the usage counters
    pub total_uses: u64,
}

/// In-memory translation memory
#[derive(Debug, Clone, Default)]
pub struct TranslationMemory {
    entries: BTreeMap<String, TmEntry>,
    fuzzy_threshold: Option<f32>,
    dirty: bool,
}

impl TranslationMemory {
    /// Create an empty memory with exact matching only
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable fuzzy matching at the given similarity (0.0-1.0). `None`
    /// restores exact-only matching.
    pub fn with_fuzzy_threshold(mut self, threshold: Option<f32>) -> Self {
        self.fuzzy_threshold = threshold.map(|t| t.clamp(0.0, 1.0));
        self
    }

    /// Currently configured fuzzy threshold
    pub fn fuzzy_threshold(&self) -> Option<f32> {
        self.fuzzy_threshold
    }

    /// Load a memory file.
    ///
    /// A missing file is a cold start and yields an empty memory. A file that
    /// exists but cannot be parsed (including an empty file) is reported as
    /// [`StoreError::Corrupt`]; it is never silently replaced.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let stored: Option<StoredMemory> = load_json_store(path)?;
        let Some(stored) = stored else {
            debug!("No translation memory at {:?}, cold start", path);
            return Ok(Self::new());
        };

        if stored.version > STORE_VERSION {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("unsupported store version {}", stored.version),
            });
        }

        debug!("Loaded {} memory entries from {:?}", stored.entries.len(), path);
        Ok(Self {
            entries: stored.entries,
            fuzzy_threshold: None,
            dirty: false,
        })
    }

    /// Atomically rewrite the memory file
    pub fn save(&mut self, path: &Path) -> Result<(), StoreError> {
        let stored = StoredMemory {
            version: STORE_VERSION,
            entries: self.entries.clone(),
        };
        save_json_store(path, &stored)?;
        self.dirty = false;
        Ok(())
    }

    /// Whether there are changes not yet saved
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the memory holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry stored under the normalized form of `text`
    pub fn get(&self, text: &str) -> Option<&TmEntry> {
        self.entries.get(&normalize_key(text))
    }

    /// Find the best stored translation for `text`
    pub fn find(&self, text: &str) -> Option<TmMatch> {
        let key = normalize_key(text);
        if key.is_empty() {
            return None;
        }

        if let Some(entry) = self.entries.get(&key) {
            return Some(TmMatch {
                source: entry.source.clone(),
                translation: entry.translation.clone(),
                similarity: 1.0,
                kind: MatchKind::Exact,
            });
        }

        let threshold = self.fuzzy_threshold?;
        self.scored(&comparison_form(text), threshold)
            .into_iter()
            .next()
    }

    /// Every entry whose similarity to `text` is at least `min_similarity`,
    /// best first
    pub fn search(&self, text: &str, min_similarity: f32) -> Vec<TmMatch> {
        let key = normalize_key(text);
        let mut matches = self.scored(&comparison_form(text), min_similarity);
        for m in &mut matches {
            if normalize_key(&m.source) == key {
                m.kind = MatchKind::Exact;
            }
        }
        matches
    }

    /// Insert or overwrite the translation of `text`. Blank segments are not
    /// stored.
    pub fn store(&mut self, text: &str, translation: &str) {
        let key = normalize_key(text);
        if key.is_empty() {
            return;
        }

        let now = Utc::now();
        self.entries
            .entry(key)
            .and_modify(|entry| {
                entry.translation = translation.to_string();
                entry.updated_at = now;
            })
            .or_insert_with(|| TmEntry {
                source: text.trim().to_string(),
                translation: translation.to_string(),
                uses: 0,
                created_at: now,
                updated_at: now,
                last_used: None,
            });
        self.dirty = true;
    }

    /// Record that the entry for `source` served a lookup
    pub fn record_use(&mut self, source: &str) {
        if let Some(entry) = self.entries.get_mut(&normalize_key(source)) {
            entry.uses = entry.uses.saturating_add(1);
            entry.last_used = Some(Utc::now());
            self.dirty = true;
        }
    }

    /// Entry count and total reuse
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            entries: self.entries.len(),
            total_uses: self.entries.values().map(|e| u64::from(e.uses)).sum(),
        }
    }

    /// Write the memory as a TMX 1.4 document. Returns the number of
    /// translation units written.
    pub fn export_tmx(&self, path: &Path, source_language: &str, target_language: &str) -> Result<usize, StoreError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        writer
            .write_event(Event::Start(BytesStart::new("tmx").with_attributes([("version", "1.4")])))
            .map_err(xml_error)?;
        writer
            .write_event(Event::Empty(BytesStart::new("header").with_attributes([
                ("creationtool", env!("CARGO_PKG_NAME")),
                ("creationtoolversion", env!("CARGO_PKG_VERSION")),
                ("datatype", "plaintext"),
                ("segtype", "paragraph"),
                ("adminlang", "en"),
                ("srclang", source_language),
                ("o-tmf", "json"),
            ])))
            .map_err(xml_error)?;
        writer
            .write_event(Event::Start(BytesStart::new("body")))
            .map_err(xml_error)?;

        for entry in self.entries.values() {
            writer
                .write_event(Event::Start(BytesStart::new("tu")))
                .map_err(xml_error)?;
            for (lang, text) in [(source_language, &entry.source), (target_language, &entry.translation)] {
                writer
                    .write_event(Event::Start(BytesStart::new("tuv").with_attributes([("xml:lang", lang)])))
                    .map_err(xml_error)?;
                writer
                    .write_event(Event::Start(BytesStart::new("seg")))
                    .map_err(xml_error)?;
                writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(xml_error)?;
                writer
                    .write_event(Event::End(BytesEnd::new("seg")))
                    .map_err(xml_error)?;
                writer
                    .write_event(Event::End(BytesEnd::new("tuv")))
                    .map_err(xml_error)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("tu")))
                .map_err(xml_error)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("body")))
            .map_err(xml_error)?;
        writer
            .write_event(Event::End(BytesEnd::new("tmx")))
            .map_err(xml_error)?;

        FileManager::write_atomic(path, &writer.into_inner()).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(self.entries.len())
    }

    fn scored(&self, probe: &str, min_similarity: f32) -> Vec<TmMatch> {
        if probe.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<TmMatch> = self
            .entries
            .values()
            .filter_map(|entry| {
                let sim = similarity(probe, &comparison_form(&entry.source));
                (sim >= min_similarity).then(|| TmMatch {
                    source: entry.source.clone(),
                    translation: entry.translation.clone(),
                    similarity: sim,
                    kind: MatchKind::Fuzzy,
                })
            })
            .collect();

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches
    }
}

fn xml_error<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Serialize(format!("TMX: {}", e))
}

/// Normalized Levenshtein similarity (0.0-1.0) over characters
fn similarity(a: &str, b: &str) -> f32 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein_distance(a, b) as f32 / max_len as f32)
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev_row: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr_row: Vec<usize> = vec![0; b_chars.len() + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_chars.len()]
}
