/*!
 * Translation pipeline for documents.
 *
 * The pipeline moves every segment through:
 * 1. **Translation memory lookup**: reuse a stored translation when possible
 * 2. **Machine translation**: one MT call per batch, optionally cached and with masked terms
 * 3. **Glossary enforcement**: substitute mandated renderings into the draft
 * 4. **Post-editing**: refine each draft with the LLM editor
 * 5. **Commit**: write the output and update the translation memory
 */

pub mod orchestrator;
pub mod report;

// Re-export types used externally
pub use orchestrator::{CancellationToken, PipelineProgress, PipelineSettings, TranslationPipeline};
pub use report::{ComplianceWarning, RunReport, SegmentFailure, SegmentState, Stage};
