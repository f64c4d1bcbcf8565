/*!
 * MT engine and post-editor adapters.
 *
 * The orchestrator only knows the two capability traits defined here:
 * - [`MtEngine`]: a batch of source texts in, the same number of raw
 *   translations out;
 * - [`PostEditor`]: one MT draft plus its glossary constraints and
 *   surrounding context in, a refined translation out.
 *
 * Implementations:
 * - `anthropic`: Anthropic messages API, usable as both roles
 * - `passthrough`: no-op adapters (skip MT or skip post-editing)
 * - `mock`: deterministic adapters with scripted failures, for tests
 */

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;

use crate::app_config::{Config, EditorKind, MtEngineKind};
use crate::errors::ProviderError;
use crate::translation::glossary::TermConstraint;

pub mod anthropic;
pub mod mock;
pub mod passthrough;

/// Machine translation capability
#[async_trait]
pub trait MtEngine: Send + Sync + Debug {
    /// Engine identifier, part of the MT cache key
    fn name(&self) -> &str;

    /// Translate every text of `texts`.
    ///
    /// The result must have exactly one translation per input, in input
    /// order; anything else is a [`ProviderError::MisalignedBatch`].
    async fn translate(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Source text of the segments around the one being post-edited
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextWindow {
    /// Preceding segments, oldest first
    pub previous: Vec<String>,
    /// Following segments, nearest first
    pub following: Vec<String>,
}

impl ContextWindow {
    /// Whether there is no surrounding text at all
    pub fn is_empty(&self) -> bool {
        self.previous.is_empty() && self.following.is_empty()
    }
}

/// Everything a post-editor receives for one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostEditRequest {
    /// Original source text
    pub source_text: String,
    /// MT draft with glossary renderings already substituted
    pub mt_text: String,
    /// Renderings that must appear verbatim in the result
    pub constraints: Vec<TermConstraint>,
    /// Surrounding source paragraphs
    pub context: ContextWindow,
    /// Source language code
    pub source_language: String,
    /// Target language code
    pub target_language: String,
}

/// LLM post-editing capability
#[async_trait]
pub trait PostEditor: Send + Sync + Debug {
    /// Editor identifier, for logs and reports
    fn name(&self) -> &str;

    /// Refine the MT draft of one segment
    async fn post_edit(&self, request: &PostEditRequest) -> Result<String, ProviderError>;
}

/// Build the MT engine and post-editor selected by the configuration
pub fn create_adapters(config: &Config) -> Result<(Arc<dyn MtEngine>, Arc<dyn PostEditor>)> {
    let anthropic = match (config.pipeline.mt_engine, config.pipeline.llm_editor) {
        (MtEngineKind::Anthropic, _) | (_, EditorKind::Anthropic) => {
            let api_key = config.anthropic.resolved_api_key();
            if api_key.is_empty() {
                return Err(anyhow!(
                    "An Anthropic API key is required (config anthropic.api_key or ANTHROPIC_API_KEY)"
                ));
            }
            Some(Arc::new(anthropic::AnthropicAdapter::from_config(&config.anthropic, api_key)))
        }
        _ => None,
    };

    let mt: Arc<dyn MtEngine> = match (config.pipeline.mt_engine, &anthropic) {
        (MtEngineKind::Anthropic, Some(adapter)) => adapter.clone(),
        _ => Arc::new(passthrough::PassthroughMt),
    };
    let editor: Arc<dyn PostEditor> = match (config.pipeline.llm_editor, &anthropic) {
        (EditorKind::Anthropic, Some(adapter)) => adapter.clone(),
        _ => Arc::new(passthrough::PassthroughEditor),
    };

    Ok((mt, editor))
}
