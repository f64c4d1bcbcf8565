/*!
 * Glossary store and term enforcement.
 *
 * The glossary maps source-language terms to the renderings that must be
 * used in the translation. It is applied at three points of the pipeline:
 *
 * - before MT, optionally masking source terms with placeholder tokens
 *   (`mask` / `unmask`);
 * - after MT and on translation-memory hits, substituting any source term
 *   left in the text with its mandated rendering (`apply_to`);
 * - before post-editing, producing the list of renderings the editor must
 *   preserve verbatim (`constraints_for`, plus the constraints returned by
 *   `apply_to`).
 *
 * Matching resolution is the same everywhere: candidates are taken in order
 * of earliest start, then longest span, then first position in the
 * glossary, and a candidate overlapping an already accepted one is dropped.
 * A term that is a substring of a longer term therefore never shadows it.
 */

use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;

use crate::errors::StoreError;
use crate::file_utils::{load_json_store, save_json_store};

/// Upper bound on substitution passes in `Glossary::apply_to`
const MAX_APPLY_PASSES: usize = 4;

/// How a source term has to sit in the text to count as a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchScope {
    /// Anywhere, including inside longer words (inflected names, compounds)
    #[default]
    Substring,
    /// Only where the term is delimited by word boundaries
    WholeWord,
}

/// One glossary mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlossaryEntry {
    /// Source-language term
    pub source: String,
    /// Mandated target-language rendering
    pub target: String,
    /// Whether the source term must match with the same letter case
    pub case_sensitive: bool,
    /// Substring or whole-word matching
    pub scope: MatchScope,
}

impl GlossaryEntry {
    /// Create a case-insensitive substring entry
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.trim().to_string(),
            target: target.trim().to_string(),
            case_sensitive: false,
            scope: MatchScope::default(),
        }
    }

    /// Set case sensitivity
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Set the match scope
    pub fn scope(mut self, scope: MatchScope) -> Self {
        self.scope = scope;
        self
    }

    fn build_matcher(&self) -> Option<Regex> {
        let mut pattern = regex::escape(&self.source);
        if self.scope == MatchScope::WholeWord {
            // \b only makes sense next to a word character
            if self.source.chars().next().is_some_and(is_word_char) {
                pattern = format!(r"\b{}", pattern);
            }
            if self.source.chars().last().is_some_and(is_word_char) {
                pattern = format!(r"{}\b", pattern);
            }
        }

        match RegexBuilder::new(&pattern)
            .case_insensitive(!self.case_sensitive)
            .build()
        {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Glossary term '{}' cannot be matched: {}", self.source, e);
                None
            }
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A mandated rendering located in a text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermConstraint {
    /// Source term that triggered the constraint
    pub source: String,
    /// Rendering that has to appear verbatim
    pub target: String,
    /// Byte span of the match in the text the constraint was computed on
    pub span: Range<usize>,
}

/// Result of applying the glossary to a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedText {
    /// Text with every resolved source term replaced by its rendering
    pub text: String,
    /// Renderings present in `text`, spans relative to `text`
    pub constraints: Vec<TermConstraint>,
}

/// A mandated rendering missing from a finished translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceIssue {
    /// Source term
    pub source: String,
    /// Rendering that was expected but not found
    pub expected: String,
}

impl ComplianceIssue {
    /// Get a human-readable description of the issue.
    pub fn description(&self) -> String {
        format!(
            "Term '{}' should be rendered as '{}' but the rendering is missing",
            self.source, self.expected
        )
    }
}

/// Placeholder slot produced by [`Glossary::mask`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskSlot {
    /// Token inserted in place of the term
    pub token: String,
    /// Source term that was masked
    pub source: String,
    /// Rendering the token is restored to
    pub target: String,
}

/// Source text with glossary terms replaced by placeholder tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermMask {
    /// Masked text to send to the MT engine
    pub text: String,
    /// One slot per replaced term, in text order
    pub slots: Vec<MaskSlot>,
}

/// Counts returned by a bulk import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Entries that did not exist before
    pub added: usize,
    /// Entries whose mapping was overwritten
    pub updated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum HitKind {
    /// The rendering is already present; keep the text as it is
    Keep,
    /// A source term to replace
    Substitute,
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    start: usize,
    end: usize,
    entry: usize,
    kind: HitKind,
}

/// Persisted value of a glossary file entry: a bare rendering, or the
/// rendering with its match options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Plain(String),
    Detailed {
        target: String,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(default)]
        scope: MatchScope,
    },
}

/// In-memory glossary
///
/// Source terms are unique (by exact text); entries keep their insertion
/// order, which breaks ties between equally long matches.
#[derive(Debug, Clone, Default)]
pub struct Glossary {
    entries: Vec<GlossaryEntry>,
    matchers: Vec<Option<Regex>>,
}

impl Glossary {
    /// Create an empty glossary
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a glossary file.
    ///
    /// A missing file yields an empty glossary. A file that exists but does
    /// not parse is reported as corrupt.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let stored: Option<serde_json::Map<String, serde_json::Value>> = load_json_store(path)?;
        let mut glossary = Self::new();

        let Some(stored) = stored else {
            debug!("No glossary at {:?}, starting empty", path);
            return Ok(glossary);
        };

        for (source, value) in stored {
            let entry = match serde_json::from_value::<StoredEntry>(value) {
                Ok(StoredEntry::Plain(target)) => GlossaryEntry::new(&source, &target),
                Ok(StoredEntry::Detailed {
                    target,
                    case_sensitive,
                    scope,
                }) => GlossaryEntry::new(&source, &target)
                    .case_sensitive(case_sensitive)
                    .scope(scope),
                Err(e) => {
                    return Err(StoreError::Corrupt {
                        path: path.to_path_buf(),
                        reason: format!("entry '{}': {}", source, e),
                    });
                }
            };
            glossary.insert(entry);
        }

        debug!("Loaded {} glossary entries from {:?}", glossary.len(), path);
        Ok(glossary)
    }

    /// Write the glossary to disk atomically, in insertion order
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let mut stored = serde_json::Map::new();
        for entry in &self.entries {
            let value = if !entry.case_sensitive && entry.scope == MatchScope::Substring {
                StoredEntry::Plain(entry.target.clone())
            } else {
                StoredEntry::Detailed {
                    target: entry.target.clone(),
                    case_sensitive: entry.case_sensitive,
                    scope: entry.scope,
                }
            };
            let value = serde_json::to_value(value).map_err(|e| StoreError::Serialize(e.to_string()))?;
            stored.insert(entry.source.clone(), value);
        }
        save_json_store(path, &stored)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the glossary has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add or overwrite a case-insensitive substring mapping.
    ///
    /// Returns the previous mapping for the same term, if any.
    pub fn add(&mut self, source: &str, target: &str) -> Option<GlossaryEntry> {
        self.insert(GlossaryEntry::new(source, target))
    }

    /// Add or overwrite an entry (last write wins; the original position is
    /// kept). Entries with an empty source term are ignored.
    pub fn insert(&mut self, entry: GlossaryEntry) -> Option<GlossaryEntry> {
        let entry = GlossaryEntry {
            source: entry.source.trim().to_string(),
            target: entry.target.trim().to_string(),
            ..entry
        };
        if entry.source.is_empty() {
            warn!("Ignoring glossary entry with an empty source term");
            return None;
        }

        let matcher = entry.build_matcher();
        match self.position(&entry.source) {
            Some(idx) => {
                self.matchers[idx] = matcher;
                Some(std::mem::replace(&mut self.entries[idx], entry))
            }
            None => {
                self.entries.push(entry);
                self.matchers.push(matcher);
                None
            }
        }
    }

    /// Remove a term. Returns `None` when the term was not in the glossary.
    pub fn remove(&mut self, source: &str) -> Option<GlossaryEntry> {
        let idx = self.position(source.trim())?;
        self.matchers.remove(idx);
        Some(self.entries.remove(idx))
    }

    /// All entries in insertion order
    pub fn list(&self) -> &[GlossaryEntry] {
        &self.entries
    }

    /// Merge entries into the glossary (last write wins per term)
    pub fn import_from<I>(&mut self, entries: I) -> ImportSummary
    where
        I: IntoIterator<Item = GlossaryEntry>,
    {
        let mut summary = ImportSummary::default();
        for entry in entries {
            if entry.source.trim().is_empty() {
                continue;
            }
            match self.insert(entry) {
                Some(_) => summary.updated += 1,
                None => summary.added += 1,
            }
        }
        summary
    }

    /// Snapshot of every entry, suitable for `import_from` on another glossary
    pub fn export_to(&self) -> Vec<GlossaryEntry> {
        self.entries.clone()
    }

    /// Look up the rendering of a term.
    ///
    /// An exact match always wins; otherwise case-insensitive entries are
    /// compared ignoring case.
    pub fn lookup(&self, term: &str) -> Option<&str> {
        let term = term.trim();
        if let Some(idx) = self.position(term) {
            return Some(self.entries[idx].target.as_str());
        }

        let lowered = term.to_lowercase();
        self.entries
            .iter()
            .find(|e| !e.case_sensitive && e.source.to_lowercase() == lowered)
            .map(|e| e.target.as_str())
    }

    /// Substitute source terms in `text` with their renderings.
    ///
    /// Renderings already present in the text are kept as they are and are
    /// reported as constraints too, so applying the result a second time
    /// changes nothing. A substitution can complete a new source term
    /// ("Mr Mr Smith" with "Mr Smith" -> "Smith"), so passes repeat until
    /// the text settles, at most `MAX_APPLY_PASSES` times.
    pub fn apply_to(&self, text: &str) -> AnnotatedText {
        let mut current = self.substitute_once(text);
        for _ in 1..MAX_APPLY_PASSES {
            let next = self.substitute_once(&current.text);
            if next.text == current.text {
                return next;
            }
            current = next;
        }
        debug!("Glossary substitution did not settle after {} passes", MAX_APPLY_PASSES);
        current
    }

    fn substitute_once(&self, text: &str) -> AnnotatedText {
        let hits = self.resolve(text, true);

        let mut out = String::with_capacity(text.len());
        let mut constraints = Vec::with_capacity(hits.len());
        let mut cursor = 0;

        for hit in hits {
            out.push_str(&text[cursor..hit.start]);
            let entry = &self.entries[hit.entry];
            let start = out.len();
            match hit.kind {
                HitKind::Keep => out.push_str(&text[hit.start..hit.end]),
                HitKind::Substitute => out.push_str(&entry.target),
            }
            constraints.push(TermConstraint {
                source: entry.source.clone(),
                target: entry.target.clone(),
                span: start..out.len(),
            });
            cursor = hit.end;
        }
        out.push_str(&text[cursor..]);

        AnnotatedText {
            text: out,
            constraints,
        }
    }

    /// Renderings mandated by the source terms found in `source_text`,
    /// spans relative to `source_text`. The text itself is not modified.
    pub fn constraints_for(&self, source_text: &str) -> Vec<TermConstraint> {
        self.resolve(source_text, false)
            .into_iter()
            .map(|hit| {
                let entry = &self.entries[hit.entry];
                TermConstraint {
                    source: entry.source.clone(),
                    target: entry.target.clone(),
                    span: hit.start..hit.end,
                }
            })
            .collect()
    }

    /// Replace the source terms of `text` with placeholder tokens so the MT
    /// engine cannot mistranslate them
    pub fn mask(&self, text: &str) -> TermMask {
        let hits = self.resolve(text, false);
        let mut out = String::with_capacity(text.len());
        let mut slots = Vec::with_capacity(hits.len());
        let mut cursor = 0;

        for (n, hit) in hits.into_iter().enumerate() {
            let entry = &self.entries[hit.entry];
            let token = format!("⟦T{}⟧", n + 1);
            out.push_str(&text[cursor..hit.start]);
            out.push_str(&token);
            slots.push(MaskSlot {
                token,
                source: entry.source.clone(),
                target: entry.target.clone(),
            });
            cursor = hit.end;
        }
        out.push_str(&text[cursor..]);

        TermMask { text: out, slots }
    }

    /// Restore the placeholder tokens of `mask` in a translated text to their
    /// mandated renderings. Tokens the MT engine dropped stay missing and
    /// surface later as compliance issues.
    pub fn unmask(translated: &str, mask: &TermMask) -> String {
        let mut out = translated.to_string();
        for slot in &mask.slots {
            if out.contains(&slot.token) {
                out = out.replacen(&slot.token, &slot.target, 1);
            } else {
                debug!("Placeholder {} for '{}' lost in translation", slot.token, slot.source);
            }
        }
        out
    }

    /// List the constraints whose rendering does not appear in `text`
    pub fn check_compliance(constraints: &[TermConstraint], text: &str) -> Vec<ComplianceIssue> {
        let mut seen = HashSet::new();
        constraints
            .iter()
            .filter(|c| !c.target.is_empty() && seen.insert(c.target.as_str()))
            .filter(|c| !text.contains(&c.target))
            .map(|c| ComplianceIssue {
                source: c.source.clone(),
                expected: c.target.clone(),
            })
            .collect()
    }

    fn position(&self, source: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.source == source)
    }

    /// Collect every candidate hit and keep the non-overlapping ones: earliest
    /// start first, then the longest span, then renderings already in place,
    /// then glossary order.
    fn resolve(&self, text: &str, keep_renderings: bool) -> Vec<Hit> {
        let mut candidates = Vec::new();

        for (idx, (entry, matcher)) in self.entries.iter().zip(&self.matchers).enumerate() {
            if let Some(re) = matcher {
                candidates.extend(re.find_iter(text).filter(|m| m.start() < m.end()).map(|m| Hit {
                    start: m.start(),
                    end: m.end(),
                    entry: idx,
                    kind: HitKind::Substitute,
                }));
            }
            if keep_renderings && !entry.target.is_empty() {
                candidates.extend(text.match_indices(entry.target.as_str()).map(|(start, s)| Hit {
                    start,
                    end: start + s.len(),
                    entry: idx,
                    kind: HitKind::Keep,
                }));
            }
        }

        candidates.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
                .then_with(|| a.kind.cmp(&b.kind))
                .then_with(|| a.entry.cmp(&b.entry))
        });

        let mut accepted: Vec<Hit> = Vec::new();
        let mut cursor = 0;
        for hit in candidates {
            if hit.start >= cursor {
                cursor = hit.end;
                accepted.push(hit);
            }
        }
        accepted
    }
}

impl PartialEq for Glossary {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}
