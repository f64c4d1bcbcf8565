/*!
 * Prompts for LLM-backed adapters.
 *
 * This module provides:
 * - System prompt templates for the MT and post-editing roles
 * - The marker format used to send a batch of segments in one request
 * - The post-editing prompt built from a [`PostEditRequest`](crate::providers::PostEditRequest)
 */

pub mod templates;

// Re-export main types
pub use templates::{PostEditPromptBuilder, PromptTemplate, build_batch_prompt, parse_batch_response};
