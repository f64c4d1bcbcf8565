/*!
 * Batch translation processing.
 *
 * A batch is a contiguous run of segments that goes through one MT call and
 * then segment-by-segment post-editing. `BatchTranslator` drives a single
 * batch through its stages and retries it as a unit; the orchestrator runs
 * several of them concurrently and commits their results.
 *
 * Every segment remembers the last stage it completed, so a retry only
 * repeats the work that was lost: a segment whose MT draft survived a
 * failing post-edit is not sent to the MT engine again.
 */

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::RwLock;

use crate::document::Segment;
use crate::errors::{FailureKind, ProviderError};
use crate::providers::{ContextWindow, MtEngine, PostEditRequest, PostEditor};
use crate::translation::cache::MtCache;
use crate::translation::glossary::{AnnotatedText, ComplianceIssue, Glossary, TermConstraint, TermMask};
use crate::translation::memory::{MatchKind, TranslationMemory};
use crate::translation::pipeline::report::{SegmentState, Stage};

/// A contiguous run of segments translated together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based batch number
    pub number: usize,
    /// Position of the first segment in the segment list
    pub start: usize,
    /// Segments of the batch, in document order
    pub segments: Vec<Segment>,
}

impl Batch {
    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the batch has no segments
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Document indices of the segments
    pub fn indices(&self) -> Vec<usize> {
        self.segments.iter().map(|s| s.index).collect()
    }
}

/// Split `segments` into contiguous batches of `batch_size`.
///
/// A batch that is full but whose last segment does not end a sentence is
/// extended until it does, up to twice `batch_size`.
pub fn partition_batches(segments: &[Segment], batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let hard_limit = batch_size.saturating_mul(2);

    let mut batches = Vec::new();
    let mut current: Vec<Segment> = Vec::with_capacity(batch_size);
    let mut start = 0;

    for (position, segment) in segments.iter().enumerate() {
        current.push(segment.clone());

        let full = current.len() >= batch_size;
        let closes = segment.is_blank() || ends_sentence(&segment.text);
        if (full && closes) || current.len() >= hard_limit {
            batches.push(Batch {
                number: batches.len() + 1,
                start,
                segments: std::mem::take(&mut current),
            });
            start = position + 1;
        }
    }

    if !current.is_empty() {
        batches.push(Batch {
            number: batches.len() + 1,
            start,
            segments: current,
        });
    }

    batches
}

/// Whether `text` ends with sentence-final punctuation, ignoring trailing
/// closing quotes and brackets
pub fn ends_sentence(text: &str) -> bool {
    let trimmed = text
        .trim_end()
        .trim_end_matches(['"', '\'', '»', '”', '’', ')', ']', '}', '」', '』', '）']);

    trimmed
        .chars()
        .next_back()
        .is_some_and(|c| matches!(c, '.' | '!' | '?' | '…' | '。' | '！' | '？'))
}

/// Options shared by every batch of a run
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Source language code
    pub source_language: String,
    /// Target language code
    pub target_language: String,
    /// Mask glossary terms before MT
    pub protect_terms: bool,
    /// Retries after the first attempt
    pub retry_count: u32,
    /// Backoff before the first retry, doubled on each further retry
    pub retry_backoff: Duration,
    /// Bound on a single adapter call
    pub adapter_timeout: Duration,
    /// Neighbouring segments given to the post-editor on each side
    pub context_segments: usize,
}

/// How a segment of a batch ended up
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentOutcome {
    /// Went through MT and post-editing
    Translated {
        /// Final text
        text: String,
        /// Mandated renderings missing from `text`
        compliance: Vec<ComplianceIssue>,
    },
    /// Served from the translation memory
    FromMemory {
        /// Stored translation with the glossary re-applied
        text: String,
        /// Source text of the memory entry that matched
        matched_source: String,
        /// Similarity of the match (1.0 for exact matches)
        similarity: f32,
    },
    /// Blank segment copied through
    Unchanged {
        /// Original text
        text: String,
    },
    /// Gave up on the segment
    Failed {
        /// Last stage the segment completed
        last_completed: Stage,
        /// Error of the final attempt
        reason: String,
        /// Transient (retries exhausted) or permanent
        kind: FailureKind,
    },
}

/// Result for one segment of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentResult {
    /// Segment index in the document
    pub index: usize,
    /// Source text
    pub source: String,
    /// What happened to the segment
    pub outcome: SegmentOutcome,
}

/// Result of a whole batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// 1-based batch number
    pub number: usize,
    /// One result per segment, in batch order
    pub results: Vec<SegmentResult>,
    /// Retries performed
    pub retries: usize,
}

impl BatchOutcome {
    /// Number of failed segments
    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, SegmentOutcome::Failed { .. }))
            .count()
    }
}

/// Per-segment working state
#[derive(Debug)]
struct Slot {
    position: usize,
    state: SegmentState,
    mt_text: String,
    draft: Option<AnnotatedText>,
    outcome: Option<SegmentOutcome>,
    last_error: Option<String>,
}

impl Slot {
    fn new(position: usize) -> Self {
        Self {
            position,
            state: SegmentState::pending(),
            mt_text: String::new(),
            draft: None,
            outcome: None,
            last_error: None,
        }
    }

    fn is_open(&self) -> bool {
        self.outcome.is_none() && !self.state.is_failed()
    }

    fn is_at(&self, stage: Stage) -> bool {
        self.is_open() && self.state.stage() == stage
    }

    fn advance(&mut self, stage: Stage) {
        self.state = SegmentState::Active { stage };
    }

    fn fail(&mut self, reason: String, kind: FailureKind) {
        let last_completed = self.state.stage();
        self.state = SegmentState::Failed {
            last_completed,
            reason: reason.clone(),
        };
        self.outcome = Some(SegmentOutcome::Failed {
            last_completed,
            reason,
            kind,
        });
    }
}

/// Batch translator driving segments through MT, glossary enforcement and
/// post-editing
#[derive(Debug, Clone)]
pub struct BatchTranslator {
    mt: Arc<dyn MtEngine>,
    editor: Arc<dyn PostEditor>,
    glossary: Option<Arc<Glossary>>,
    memory: Option<Arc<RwLock<TranslationMemory>>>,
    mt_cache: Option<MtCache>,
    document: Arc<[Segment]>,
    options: BatchOptions,
}

impl BatchTranslator {
    /// Create a new batch translator over the segments of one document
    pub fn new(
        mt: Arc<dyn MtEngine>,
        editor: Arc<dyn PostEditor>,
        document: Arc<[Segment]>,
        options: BatchOptions,
    ) -> Self {
        Self {
            mt,
            editor,
            glossary: None,
            memory: None,
            mt_cache: None,
            document,
            options,
        }
    }

    /// Enforce renderings from `glossary`
    pub fn with_glossary(mut self, glossary: Option<Arc<Glossary>>) -> Self {
        self.glossary = glossary;
        self
    }

    /// Serve segments from `memory` when possible
    pub fn with_memory(mut self, memory: Option<Arc<RwLock<TranslationMemory>>>) -> Self {
        self.memory = memory;
        self
    }

    /// Put `cache` in front of the MT engine
    pub fn with_mt_cache(mut self, cache: Option<MtCache>) -> Self {
        self.mt_cache = cache;
        self
    }

    /// Translate a batch, retrying it as a unit on transient failures.
    ///
    /// Never fails as a whole: segments that could not be translated are
    /// reported as [`SegmentOutcome::Failed`].
    pub async fn translate_batch(&self, batch: &Batch) -> BatchOutcome {
        info!("Translating batch {} ({} segments)", batch.number, batch.len());

        let mut slots: Vec<Slot> = (0..batch.len()).map(|i| Slot::new(batch.start + i)).collect();
        self.prepare(batch, &mut slots);

        let max_attempts = self.options.retry_count.saturating_add(1);
        let mut retries = 0;

        for attempt in 1..=max_attempts {
            if !slots.iter().any(Slot::is_open) {
                break;
            }

            let mut last_error = self.run_mt(batch, &mut slots).await.err();
            self.enforce_glossary(&mut slots);
            if let Some(e) = self.run_post_edit(batch, &mut slots).await {
                last_error = Some(e);
            }

            let open = slots.iter().filter(|s| s.is_open()).count();
            if open == 0 {
                break;
            }

            let reason = last_error.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".to_string());
            if attempt == max_attempts {
                error!(
                    "Batch {} gave up after {} attempts, {} segments failed: {}",
                    batch.number, attempt, open, reason
                );
                for slot in slots.iter_mut().filter(|s| s.is_open()) {
                    let reason = slot.last_error.take().unwrap_or_else(|| reason.clone());
                    slot.fail(reason, FailureKind::Transient);
                }
                break;
            }

            let delay = self
                .options
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(attempt - 1));
            warn!(
                "Batch {} attempt {}/{} failed ({}), retrying {} segments in {:?}",
                batch.number, attempt, max_attempts, reason, open, delay
            );
            tokio::time::sleep(delay).await;
            retries += 1;
        }

        let results = batch
            .segments
            .iter()
            .zip(slots)
            .map(|(segment, slot)| SegmentResult {
                index: segment.index,
                source: segment.text.clone(),
                outcome: slot.outcome.unwrap_or_else(|| SegmentOutcome::Failed {
                    last_completed: Stage::Pending,
                    reason: "no attempt was made".to_string(),
                    kind: FailureKind::Transient,
                }),
            })
            .collect();

        BatchOutcome {
            number: batch.number,
            results,
            retries,
        }
    }

    /// Settle blank segments and translation memory hits before any
    /// adapter is called
    fn prepare(&self, batch: &Batch, slots: &mut [Slot]) {
        for (segment, slot) in batch.segments.iter().zip(slots.iter_mut()) {
            if segment.is_blank() {
                slot.outcome = Some(SegmentOutcome::Unchanged {
                    text: segment.text.clone(),
                });
                continue;
            }

            let Some(memory) = &self.memory else {
                continue;
            };
            let found = memory.read().find(&segment.text);
            match found {
                Some(m) => {
                    debug!(
                        "TM {} hit for segment {} ({:.2})",
                        if m.kind == MatchKind::Exact { "exact" } else { "fuzzy" },
                        segment.index,
                        m.similarity
                    );
                    let text = match &self.glossary {
                        Some(glossary) => glossary.apply_to(&m.translation).text,
                        None => m.translation,
                    };
                    slot.outcome = Some(SegmentOutcome::FromMemory {
                        text,
                        matched_source: m.source,
                        similarity: m.similarity,
                    });
                }
                None => debug!("TM miss for segment {}", segment.index),
            }
        }
    }

    /// MT stage: one engine call for every segment still waiting for a draft
    async fn run_mt(&self, batch: &Batch, slots: &mut [Slot]) -> Result<(), ProviderError> {
        let pending: Vec<usize> = (0..slots.len()).filter(|&i| slots[i].is_at(Stage::Pending)).collect();
        if pending.is_empty() {
            return Ok(());
        }

        let masks: Vec<Option<TermMask>> = pending
            .iter()
            .map(|&i| match (&self.glossary, self.options.protect_terms) {
                (Some(glossary), true) => Some(glossary.mask(&batch.segments[i].text)),
                _ => None,
            })
            .collect();
        let inputs: Vec<String> = pending
            .iter()
            .zip(&masks)
            .map(|(&i, mask)| match mask {
                Some(mask) => mask.text.clone(),
                None => batch.segments[i].text.clone(),
            })
            .collect();

        let mut raw: Vec<Option<String>> = inputs.iter().map(|text| self.cached_translation(text)).collect();
        let misses: Vec<usize> = (0..raw.len()).filter(|&i| raw[i].is_none()).collect();

        if !misses.is_empty() {
            let texts: Vec<String> = misses.iter().map(|&i| inputs[i].clone()).collect();
            match self.call_mt(&texts).await {
                Ok(translated) => {
                    for (&i, translation) in misses.iter().zip(translated) {
                        if let Some(cache) = &self.mt_cache {
                            cache.store(
                                self.mt.name(),
                                &self.options.source_language,
                                &self.options.target_language,
                                &inputs[i],
                                &translation,
                            );
                        }
                        raw[i] = Some(translation);
                    }
                }
                Err(e) => {
                    let kind = e.kind();
                    for &i in &pending {
                        let slot = &mut slots[i];
                        if kind == FailureKind::Permanent {
                            slot.fail(format!("MT: {}", e), kind);
                        } else {
                            slot.last_error = Some(format!("MT: {}", e));
                        }
                    }
                    if kind == FailureKind::Permanent {
                        error!("Batch {}: MT engine rejected the batch: {}", batch.number, e);
                    }
                    return Err(e);
                }
            }
        }

        for ((&i, mask), translation) in pending.iter().zip(&masks).zip(raw) {
            let translation = translation.unwrap_or_default();
            let slot = &mut slots[i];
            slot.mt_text = match mask {
                Some(mask) => Glossary::unmask(&translation, mask),
                None => translation,
            };
            slot.advance(Stage::MtDone);
        }

        Ok(())
    }

    fn cached_translation(&self, text: &str) -> Option<String> {
        self.mt_cache.as_ref()?.get(
            self.mt.name(),
            &self.options.source_language,
            &self.options.target_language,
            text,
        )
    }

    /// Call the MT engine and check that it answered one non-empty text per
    /// input
    async fn call_mt(&self, texts: &[String]) -> Result<Vec<String>, ProviderError> {
        let translated = self
            .bounded(self.mt.translate(texts, &self.options.source_language, &self.options.target_language))
            .await?;

        if translated.len() != texts.len() {
            return Err(ProviderError::MisalignedBatch {
                expected: texts.len(),
                actual: translated.len(),
            });
        }
        if let Some(pos) = translated
            .iter()
            .zip(texts)
            .position(|(out, input)| out.trim().is_empty() && !input.trim().is_empty())
        {
            return Err(ProviderError::ParseError(format!(
                "MT engine returned an empty translation for entry {}",
                pos + 1
            )));
        }

        Ok(translated)
    }

    /// Glossary stage: substitute mandated renderings into every MT draft
    fn enforce_glossary(&self, slots: &mut [Slot]) {
        for slot in slots.iter_mut().filter(|s| s.is_at(Stage::MtDone)) {
            let draft = match &self.glossary {
                Some(glossary) => glossary.apply_to(&slot.mt_text),
                None => AnnotatedText {
                    text: slot.mt_text.clone(),
                    constraints: Vec::new(),
                },
            };
            slot.draft = Some(draft);
            slot.advance(Stage::GlossaryEnforced);
        }
    }

    /// Post-edit stage, one editor call per segment. Returns the last
    /// transient error, if any.
    async fn run_post_edit(&self, batch: &Batch, slots: &mut [Slot]) -> Option<ProviderError> {
        let mut last_error = None;

        for (segment, slot) in batch.segments.iter().zip(slots.iter_mut()) {
            if !slot.is_at(Stage::GlossaryEnforced) {
                continue;
            }
            let Some(draft) = &slot.draft else {
                continue;
            };

            let request = self.post_edit_request(segment, slot.position, draft);
            match self.call_editor(&request).await {
                Ok(edited) => {
                    slot.advance(Stage::PostEdited);
                    let text = match &self.glossary {
                        Some(glossary) => glossary.apply_to(&edited).text,
                        None => edited,
                    };
                    let compliance = Glossary::check_compliance(&request.constraints, &text);
                    slot.outcome = Some(SegmentOutcome::Translated { text, compliance });
                }
                Err(e) if !e.is_transient() => {
                    error!("Segment {}: post-editor rejected the segment: {}", segment.index, e);
                    slot.fail(format!("post-edit: {}", e), FailureKind::Permanent);
                }
                Err(e) => {
                    debug!("Segment {}: post-edit failed: {}", segment.index, e);
                    slot.last_error = Some(format!("post-edit: {}", e));
                    last_error = Some(e);
                }
            }
        }

        last_error
    }

    async fn call_editor(&self, request: &PostEditRequest) -> Result<String, ProviderError> {
        let edited = self.bounded(self.editor.post_edit(request)).await?;
        if edited.trim().is_empty() {
            return Err(ProviderError::ParseError("post-editor returned an empty text".to_string()));
        }
        Ok(edited)
    }

    fn post_edit_request(&self, segment: &Segment, position: usize, draft: &AnnotatedText) -> PostEditRequest {
        let mut constraints = draft.constraints.clone();
        if let Some(glossary) = &self.glossary {
            let extra: Vec<TermConstraint> = glossary
                .constraints_for(&segment.text)
                .into_iter()
                .filter(|c| !constraints.iter().any(|d| d.target == c.target))
                .collect();
            constraints.extend(extra);
        }

        PostEditRequest {
            source_text: segment.text.clone(),
            mt_text: draft.text.clone(),
            constraints,
            context: self.context_window(position),
            source_language: self.options.source_language.clone(),
            target_language: self.options.target_language.clone(),
        }
    }

    /// Source text of the non-blank neighbours of the segment at `position`
    fn context_window(&self, position: usize) -> ContextWindow {
        let radius = self.options.context_segments;
        if radius == 0 {
            return ContextWindow::default();
        }

        let before = position.saturating_sub(radius)..position.min(self.document.len());
        let after = (position + 1).min(self.document.len())..(position + 1 + radius).min(self.document.len());
        let collect = |range: std::ops::Range<usize>| -> Vec<String> {
            self.document[range]
                .iter()
                .filter(|s| !s.is_blank())
                .map(|s| s.text.clone())
                .collect()
        };

        ContextWindow {
            previous: collect(before),
            following: collect(after),
        }
    }

    /// Bound an adapter call by the configured timeout
    async fn bounded<T>(&self, call: impl Future<Output = Result<T, ProviderError>>) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.options.adapter_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.options.adapter_timeout)),
        }
    }
}
