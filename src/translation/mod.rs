/*!
 * Translation core: consistency stores and the batch pipeline.
 *
 * It is split into several submodules:
 *
 * - `glossary`: Mandated term renderings, substitution and compliance checks
 * - `memory`: Translation memory with exact and fuzzy reuse
 * - `cache`: Cache of raw MT output
 * - `batch`: Batching and the per-batch stage machine
 * - `pipeline`: Run orchestration and the end-of-run report
 * - `prompts`: Prompt templates for the LLM adapters
 */

// Re-export main types for easier usage
pub use self::batch::{Batch, BatchTranslator, partition_batches};
pub use self::cache::MtCache;
pub use self::glossary::{Glossary, GlossaryEntry, MatchScope};
pub use self::memory::TranslationMemory;
pub use self::pipeline::{CancellationToken, RunReport, TranslationPipeline};

// Submodules
pub mod batch;
pub mod cache;
pub mod glossary;
pub mod memory;
pub mod pipeline;
pub mod prompts;
