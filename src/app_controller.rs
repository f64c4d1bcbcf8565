use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_config::Config;
use crate::document::{DocumentSource, SegmentBuffer, TextDocument};
use crate::file_utils::FileManager;
use crate::language_utils;
use crate::providers::create_adapters;
use crate::translation::glossary::{Glossary, GlossaryEntry, ImportSummary};
use crate::translation::memory::{MemoryStats, TmMatch, TranslationMemory};
use crate::translation::pipeline::{CancellationToken, PipelineSettings, RunReport, TranslationPipeline};
use crate::translation::cache::MtCache;

// @module: Application controller for document translation and store curation

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self { config })
    }

    /// Configuration the controller runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load the glossary; a missing file is an empty glossary
    pub fn load_glossary(&self) -> Result<Glossary> {
        let path = &self.config.storage.glossary_path;
        Glossary::load(path).with_context(|| format!("Failed to load glossary from {:?}", path))
    }

    /// Load the translation memory with the configured fuzzy threshold
    pub fn load_memory(&self) -> Result<TranslationMemory> {
        let path = &self.config.storage.memory_path;
        let memory = TranslationMemory::load(path)
            .with_context(|| format!("Failed to load translation memory from {:?}", path))?;
        Ok(memory.with_fuzzy_threshold(self.config.pipeline.fuzzy_threshold))
    }

    /// Load the MT cache, or an empty disabled one when caching is off
    pub fn load_mt_cache(&self) -> Result<MtCache> {
        if !self.config.pipeline.use_mt_cache {
            return Ok(MtCache::new(false));
        }
        let path = &self.config.storage.mt_cache_path;
        MtCache::load(path).with_context(|| format!("Failed to load MT cache from {:?}", path))
    }

    /// Build the pipeline described by the configuration, with its adapters
    /// and stores. A corrupt store aborts here, before any work is done.
    pub fn build_pipeline(&self) -> Result<TranslationPipeline> {
        let (mt, editor) = create_adapters(&self.config)?;
        let settings = PipelineSettings::from_config(&self.config);

        let mut pipeline_glossary = None;
        if self.config.pipeline.use_glossary {
            let glossary = self.load_glossary()?;
            info!("Glossary: {} terms", glossary.len());
            pipeline_glossary = Some(Arc::new(glossary));
        }

        let mut pipeline = TranslationPipeline::new(mt, editor, settings);
        if self.config.pipeline.use_translation_memory {
            let memory = self.load_memory()?;
            info!("Translation memory: {} entries", memory.len());
            pipeline = pipeline.with_memory(Arc::new(RwLock::new(memory)));
        }
        if let Some(glossary) = pipeline_glossary {
            pipeline = pipeline.with_glossary(glossary);
        }
        if self.config.pipeline.use_mt_cache {
            pipeline = pipeline.with_mt_cache(self.load_mt_cache()?);
        }

        Ok(pipeline)
    }

    /// Translate a plain-text document.
    ///
    /// Returns `None` when the output already exists and `force_overwrite`
    /// is not set.
    pub async fn translate_file(
        &self,
        input_file: &Path,
        output_file: Option<PathBuf>,
        force_overwrite: bool,
    ) -> Result<Option<RunReport>> {
        if !FileManager::file_exists(input_file) {
            return Err(anyhow!("Input file does not exist: {:?}", input_file));
        }

        let output_path =
            output_file.unwrap_or_else(|| FileManager::generate_output_path(input_file, &self.config.target_language));
        if output_path.exists() && !force_overwrite {
            warn!(
                "Skipping {:?}, translation already exists (use -f to force overwrite)",
                output_path
            );
            return Ok(None);
        }

        let pipeline = self.build_pipeline()?;
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted: finishing batches in flight, no new batch will start");
                    cancel.cancel();
                }
            })
        };

        let result = Self::translate_document(&pipeline, input_file, &output_path, &cancel, true).await;
        watcher.abort();

        let report = result?;
        info!("Success: {}", output_path.display());
        Ok(Some(report))
    }

    /// Run `pipeline` over `input_file` and write the result atomically to
    /// `output_path`
    pub async fn translate_document(
        pipeline: &TranslationPipeline,
        input_file: &Path,
        output_path: &Path,
        cancel: &CancellationToken,
        show_progress: bool,
    ) -> Result<RunReport> {
        let segments = TextDocument::new(input_file)
            .read_segments()
            .with_context(|| format!("Failed to read document {:?}", input_file))?;
        let mut sink = SegmentBuffer::new(segments.len());

        let progress_bar = if show_progress {
            let bar = ProgressBar::new(segments.len() as u64);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({percent}%) {msg} {eta}")
                .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%)"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style.progress_chars("█▓▒░"));
            bar
        } else {
            ProgressBar::hidden()
        };

        let report = pipeline
            .run(segments, &mut sink, cancel, |p| {
                progress_bar.set_position(p.segments_done as u64);
                progress_bar.set_message(format!("batch {}/{}", p.batches_done, p.batches_total));
            })
            .await
            .context("Translation run failed")?;
        progress_bar.finish_and_clear();

        if let Some(parent) = output_path.parent() {
            FileManager::ensure_dir(parent)?;
        }
        sink.finish(output_path)
            .with_context(|| format!("Failed to write translated document {:?}", output_path))?;

        for failure in &report.failed {
            warn!(
                "Segment {} (batch {}) failed after {}: {}",
                failure.index, failure.batch, failure.last_completed, failure.reason
            );
        }
        info!(
            "Translation completed in {}: {}",
            Self::format_duration(report.duration()),
            report.summary()
        );

        Ok(report)
    }

    /// Write the run report as pretty JSON
    pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
        FileManager::write_atomic(path, json.as_bytes())
            .with_context(|| format!("Failed to write run report to {:?}", path))
    }

    // Format duration in a human-readable format
    fn format_duration(duration: std::time::Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }

    /// Glossary entries in insertion order
    pub fn glossary_list(&self) -> Result<Vec<GlossaryEntry>> {
        Ok(self.load_glossary()?.export_to())
    }

    /// Add or overwrite a glossary entry and save the glossary
    pub fn glossary_add(&self, entry: GlossaryEntry) -> Result<bool> {
        let mut glossary = self.load_glossary()?;
        let replaced = glossary.insert(entry).is_some();
        self.save_glossary(&glossary)?;
        Ok(replaced)
    }

    /// Remove a glossary entry; `false` when the term was not in the glossary
    pub fn glossary_remove(&self, source: &str) -> Result<bool> {
        let mut glossary = self.load_glossary()?;
        if glossary.remove(source).is_none() {
            return Ok(false);
        }
        self.save_glossary(&glossary)?;
        Ok(true)
    }

    /// Merge the entries of another glossary file into the glossary
    pub fn glossary_import(&self, path: &Path) -> Result<ImportSummary> {
        if !FileManager::file_exists(path) {
            return Err(anyhow!("Glossary file does not exist: {:?}", path));
        }
        let incoming = Glossary::load(path).with_context(|| format!("Failed to read glossary {:?}", path))?;
        let mut glossary = self.load_glossary()?;
        let summary = glossary.import_from(incoming.export_to());
        self.save_glossary(&glossary)?;
        Ok(summary)
    }

    /// Write the glossary to another file
    pub fn glossary_export(&self, path: &Path) -> Result<usize> {
        let glossary = self.load_glossary()?;
        glossary
            .save(path)
            .with_context(|| format!("Failed to export glossary to {:?}", path))?;
        Ok(glossary.len())
    }

    fn save_glossary(&self, glossary: &Glossary) -> Result<()> {
        let path = &self.config.storage.glossary_path;
        glossary
            .save(path)
            .with_context(|| format!("Failed to save glossary to {:?}", path))
    }

    /// Entry count and reuse of the translation memory
    pub fn memory_stats(&self) -> Result<MemoryStats> {
        Ok(self.load_memory()?.stats())
    }

    /// Memory entries similar to `text`, best first
    pub fn memory_search(&self, text: &str, min_similarity: f32) -> Result<Vec<TmMatch>> {
        if !(0.0..=1.0).contains(&min_similarity) {
            return Err(anyhow!("Similarity must be between 0.0 and 1.0, got {}", min_similarity));
        }
        Ok(self.load_memory()?.search(text, min_similarity))
    }

    /// Export the translation memory as TMX
    pub fn memory_export_tmx(&self, path: &Path) -> Result<usize> {
        let memory = self.load_memory()?;
        let source_language = language_utils::normalize_to_part1_or_part2t(&self.config.source_language)?;
        let target_language = language_utils::normalize_to_part1_or_part2t(&self.config.target_language)?;
        memory
            .export_tmx(path, &source_language, &target_language)
            .with_context(|| format!("Failed to export translation memory to {:?}", path))
    }
}
