/*!
 * Pipeline orchestrator.
 *
 * Partitions the document into batches, runs up to
 * `max_concurrent_batches` of them at once and commits every finished batch
 * from a single coordinating loop: output segments, translation memory
 * updates, report counters and store flushes all happen there, so the
 * translation memory has exactly one writer and results land at their
 * original index whatever order the batches complete in.
 */

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::app_config::Config;
use crate::document::{DocumentSink, Segment};
use crate::errors::PipelineError;
use crate::providers::{MtEngine, PostEditor};
use crate::translation::batch::{Batch, BatchOptions, BatchOutcome, BatchTranslator, SegmentOutcome, partition_batches};
use crate::translation::cache::MtCache;
use crate::translation::glossary::Glossary;
use crate::translation::memory::TranslationMemory;

use super::report::{ComplianceWarning, RunReport, SegmentFailure, SegmentState, Stage};

/// Settings of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Source language code
    pub source_language: String,
    /// Target language code
    pub target_language: String,
    /// Segments per batch
    pub batch_size: usize,
    /// Enforce glossary renderings
    pub use_glossary: bool,
    /// Consult and update the translation memory
    pub use_translation_memory: bool,
    /// Mask glossary terms before MT
    pub protect_terms: bool,
    /// Put the MT cache in front of the engine
    pub use_mt_cache: bool,
    /// Batches in flight at the same time
    pub max_concurrent_batches: usize,
    /// Retries after the first attempt of a batch
    pub retry_count: u32,
    /// Backoff before the first retry
    pub retry_backoff: Duration,
    /// Bound on a single adapter call
    pub adapter_timeout: Duration,
    /// Neighbouring segments given to the post-editor on each side
    pub context_segments: usize,
    /// Replacement for failed segments, `{batch}` and `{index}` substituted
    pub failure_marker: Option<String>,
    /// Where the translation memory is flushed
    pub memory_path: Option<PathBuf>,
    /// Where the MT cache is flushed
    pub mt_cache_path: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            source_language: "ru".to_string(),
            target_language: "en".to_string(),
            batch_size: 4,
            use_glossary: true,
            use_translation_memory: true,
            protect_terms: false,
            use_mt_cache: true,
            max_concurrent_batches: 1,
            retry_count: 3,
            retry_backoff: Duration::from_millis(1000),
            adapter_timeout: Duration::from_secs(120),
            context_segments: 1,
            failure_marker: None,
            memory_path: None,
            mt_cache_path: None,
        }
    }
}

impl PipelineSettings {
    /// Create settings for a language pair with default values otherwise.
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            ..Default::default()
        }
    }

    /// Settings described by the application configuration
    pub fn from_config(config: &Config) -> Self {
        let pipeline = &config.pipeline;
        Self {
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
            batch_size: pipeline.batch_size,
            use_glossary: pipeline.use_glossary,
            use_translation_memory: pipeline.use_translation_memory,
            protect_terms: pipeline.protect_terms,
            use_mt_cache: pipeline.use_mt_cache,
            max_concurrent_batches: pipeline.max_concurrent_batches,
            retry_count: pipeline.retry_count,
            retry_backoff: Duration::from_millis(pipeline.retry_backoff_ms),
            adapter_timeout: Duration::from_secs(pipeline.adapter_timeout_secs),
            context_segments: pipeline.context_segments,
            failure_marker: pipeline.failure_marker.clone(),
            memory_path: Some(config.storage.memory_path.clone()),
            mt_cache_path: Some(config.storage.mt_cache_path.clone()),
        }
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of concurrent batches.
    pub fn with_concurrency(mut self, max_concurrent_batches: usize) -> Self {
        self.max_concurrent_batches = max_concurrent_batches;
        self
    }

    /// Set the retry policy.
    pub fn with_retries(mut self, retry_count: u32, retry_backoff: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_backoff = retry_backoff;
        self
    }

    /// Check the settings before a run
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.source_language.trim().is_empty() || self.target_language.trim().is_empty() {
            return Err(PipelineError::Config("source and target languages are required".to_string()));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch size must be at least 1".to_string()));
        }
        if self.max_concurrent_batches == 0 {
            return Err(PipelineError::Config("at least one concurrent batch is required".to_string()));
        }
        if self.adapter_timeout.is_zero() {
            return Err(PipelineError::Config("adapter timeout must be positive".to_string()));
        }
        Ok(())
    }

    fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            protect_terms: self.protect_terms,
            retry_count: self.retry_count,
            retry_backoff: self.retry_backoff,
            adapter_timeout: self.adapter_timeout,
            context_segments: self.context_segments,
        }
    }
}

/// Shared flag asking a run to stop issuing batches
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress information during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineProgress {
    /// Batches committed or skipped
    pub batches_done: usize,
    /// Batches in the document
    pub batches_total: usize,
    /// Segments committed or skipped
    pub segments_done: usize,
    /// Segments in the document
    pub segments_total: usize,
}

impl PipelineProgress {
    /// Completed fraction of the segments (0.0 - 1.0)
    pub fn fraction(&self) -> f32 {
        if self.segments_total == 0 {
            1.0
        } else {
            self.segments_done as f32 / self.segments_total as f32
        }
    }
}

/// Translation pipeline orchestrator
#[derive(Debug)]
pub struct TranslationPipeline {
    mt: Arc<dyn MtEngine>,
    editor: Arc<dyn PostEditor>,
    settings: PipelineSettings,
    glossary: Option<Arc<Glossary>>,
    memory: Option<Arc<RwLock<TranslationMemory>>>,
    mt_cache: Option<MtCache>,
}

impl TranslationPipeline {
    /// Create a pipeline without stores
    pub fn new(mt: Arc<dyn MtEngine>, editor: Arc<dyn PostEditor>, settings: PipelineSettings) -> Self {
        Self {
            mt,
            editor,
            settings,
            glossary: None,
            memory: None,
            mt_cache: None,
        }
    }

    /// Attach the glossary
    pub fn with_glossary(mut self, glossary: Arc<Glossary>) -> Self {
        self.glossary = Some(glossary);
        self
    }

    /// Attach the translation memory
    pub fn with_memory(mut self, memory: Arc<RwLock<TranslationMemory>>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Attach the MT cache
    pub fn with_mt_cache(mut self, cache: MtCache) -> Self {
        self.mt_cache = Some(cache);
        self
    }

    /// Settings of the pipeline
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The attached translation memory
    pub fn memory(&self) -> Option<&Arc<RwLock<TranslationMemory>>> {
        self.memory.as_ref()
    }

    fn active_glossary(&self) -> Option<Arc<Glossary>> {
        self.glossary.clone().filter(|g| self.settings.use_glossary && !g.is_empty())
    }

    fn active_memory(&self) -> Option<&Arc<RwLock<TranslationMemory>>> {
        self.memory.as_ref().filter(|_| self.settings.use_translation_memory)
    }

    fn active_cache(&self) -> Option<&MtCache> {
        self.mt_cache
            .as_ref()
            .filter(|c| self.settings.use_mt_cache && c.is_enabled())
    }

    /// Translate `segments` and write every one of them to `sink`.
    ///
    /// Segment failures do not fail the run: they are listed in the returned
    /// report and the sink receives the source text (or the failure marker)
    /// in their place. After cancellation no new batch is started, batches
    /// in flight are committed, and the remaining segments are written
    /// untranslated and reported as skipped. Errors are reserved for store
    /// flushes and sink writes.
    pub async fn run<S>(
        &self,
        segments: Vec<Segment>,
        sink: &mut S,
        cancel: &CancellationToken,
        progress: impl Fn(&PipelineProgress),
    ) -> Result<RunReport, PipelineError>
    where
        S: DocumentSink + ?Sized,
    {
        self.settings.validate()?;
        let start_time = Instant::now();

        let document: Arc<[Segment]> = Arc::from(segments);
        let batches = partition_batches(&document, self.settings.batch_size);

        let mut report = RunReport {
            total: document.len(),
            batches_total: batches.len(),
            states: vec![SegmentState::pending(); document.len()],
            ..Default::default()
        };
        let mut current = PipelineProgress {
            batches_total: batches.len(),
            segments_total: document.len(),
            ..Default::default()
        };

        info!(
            "Translating {} segments in {} batches ({} -> {}, {} at a time)",
            report.total,
            report.batches_total,
            self.settings.source_language,
            self.settings.target_language,
            self.settings.max_concurrent_batches
        );

        let translator = BatchTranslator::new(
            self.mt.clone(),
            self.editor.clone(),
            document.clone(),
            self.settings.batch_options(),
        )
        .with_glossary(self.active_glossary())
        .with_memory(self.active_memory().cloned())
        .with_mt_cache(self.active_cache().cloned());

        let mut outcomes = stream::iter(batches.iter())
            .map(|batch| {
                let translator = &translator;
                async move {
                    // Checked on first poll, i.e. when the batch would start
                    if cancel.is_cancelled() {
                        return (batch, None);
                    }
                    (batch, Some(translator.translate_batch(batch).await))
                }
            })
            .buffer_unordered(self.settings.max_concurrent_batches);

        while let Some((batch, outcome)) = outcomes.next().await {
            match outcome {
                Some(outcome) => {
                    report.batches_issued += 1;
                    self.commit(batch, outcome, sink, &mut report)?;
                    self.flush()?;
                }
                None => {
                    debug!("Skipping batch {} after cancellation", batch.number);
                    for segment in &batch.segments {
                        sink.write_segment(segment.index, &segment.text)?;
                    }
                    report.skipped.extend(batch.indices());
                }
            }

            current.batches_done += 1;
            current.segments_done += batch.len();
            progress(&current);
        }
        drop(outcomes);

        self.flush()?;

        report.failed.sort_by_key(|f| f.index);
        report.skipped.sort_unstable();
        report.compliance_warnings.sort_by_key(|w| w.index);
        report.cancelled = cancel.is_cancelled() && !report.skipped.is_empty();
        report.mt_cache = self.active_cache().map(MtCache::stats);
        report.duration_ms = start_time.elapsed().as_millis();

        if report.is_complete() {
            info!("Translation finished: {}", report.summary());
        } else {
            warn!("Translation finished with gaps: {}", report.summary());
        }

        Ok(report)
    }

    /// Write a finished batch to the sink and the translation memory
    fn commit<S>(
        &self,
        batch: &Batch,
        outcome: BatchOutcome,
        sink: &mut S,
        report: &mut RunReport,
    ) -> Result<(), PipelineError>
    where
        S: DocumentSink + ?Sized,
    {
        report.retries += outcome.retries;
        let mut memory = self.active_memory().map(|m| m.write());

        for result in outcome.results {
            let mut committed = SegmentState::Active { stage: Stage::Committed };
            let text = match result.outcome {
                SegmentOutcome::Translated { text, compliance } => {
                    if let Some(memory) = memory.as_mut() {
                        memory.store(&result.source, &text);
                    }
                    if !compliance.is_empty() {
                        for issue in &compliance {
                            warn!("Segment {}: {}", result.index, issue.description());
                        }
                        report.compliance_warnings.push(ComplianceWarning {
                            index: result.index,
                            issues: compliance,
                        });
                    }
                    report.translated += 1;
                    text
                }
                SegmentOutcome::FromMemory {
                    text, matched_source, ..
                } => {
                    if let Some(memory) = memory.as_mut() {
                        memory.record_use(&matched_source);
                    }
                    report.from_memory += 1;
                    text
                }
                SegmentOutcome::Unchanged { text } => {
                    report.unchanged += 1;
                    text
                }
                SegmentOutcome::Failed {
                    last_completed,
                    reason,
                    kind,
                } => {
                    committed = SegmentState::Failed {
                        last_completed,
                        reason: reason.clone(),
                    };
                    report.failed.push(SegmentFailure {
                        index: result.index,
                        batch: outcome.number,
                        last_completed,
                        reason,
                        kind,
                    });
                    self.failure_text(outcome.number, result.index, result.source)
                }
            };

            sink.write_segment(result.index, &text)?;
            if let Some(state) = report.states.get_mut(result.index) {
                *state = committed;
            }
        }

        debug!("Batch {} committed ({} segments)", batch.number, batch.len());
        Ok(())
    }

    fn failure_text(&self, batch: usize, index: usize, source: String) -> String {
        match &self.settings.failure_marker {
            Some(marker) => marker
                .replace("{batch}", &batch.to_string())
                .replace("{index}", &index.to_string()),
            None => source,
        }
    }

    /// Persist the translation memory and MT cache if they changed
    fn flush(&self) -> Result<(), PipelineError> {
        if let (Some(memory), Some(path)) = (&self.memory, &self.settings.memory_path) {
            let mut memory = memory.write();
            if memory.is_dirty() {
                memory.save(path)?;
                debug!("Translation memory flushed to {:?} ({} entries)", path, memory.len());
            }
        }
        if let (Some(cache), Some(path)) = (&self.mt_cache, &self.settings.mt_cache_path) {
            cache.save(path)?;
        }
        Ok(())
    }
}
