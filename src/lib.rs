/*!
 * # mtpe - Machine Translation with LLM Post-Editing
 *
 * A Rust library for translating long documents through a machine
 * translation pass followed by an LLM post-editing pass.
 *
 * ## Features
 *
 * - Glossary enforcement with longest-match substitution
 * - Translation memory reuse (exact by default, optional fuzzy threshold)
 * - Batched MT calls with a persistent MT cache
 * - Retries with exponential backoff and per-segment failure isolation
 * - Bounded concurrent batches with order-preserving output
 * - Cancellation that keeps finished work and flushes the stores
 * - ISO 639-1 and ISO 639-2 language code support
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `document`: Segments, document sources and sinks
 * - `translation`: Consistency stores and the pipeline:
 *   - `translation::glossary`: Glossary store
 *   - `translation::memory`: Translation memory store
 *   - `translation::cache`: MT output cache
 *   - `translation::batch`: Batching and per-batch processing
 *   - `translation::pipeline`: Orchestration and the run report
 * - `providers`: MT engine and post-editor adapters:
 *   - `providers::anthropic`: Anthropic API client
 *   - `providers::passthrough`: No-op adapters
 *   - `providers::mock`: Scriptable adapters for tests
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod document;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod providers;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use document::{DocumentSink, DocumentSource, Segment, SegmentBuffer, TextDocument};
pub use errors::{FailureKind, PipelineError, ProviderError, StoreError};
pub use language_utils::{get_language_name, language_codes_match};
pub use translation::{Glossary, MtCache, RunReport, TranslationMemory, TranslationPipeline};
