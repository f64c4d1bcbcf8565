//! No-op adapters.
//!
//! `PassthroughMt` hands the source text straight to the post-editor, which
//! then does the whole translation. `PassthroughEditor` keeps the MT draft as
//! the final translation.

use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::providers::{MtEngine, PostEditRequest, PostEditor};

/// MT engine that returns its input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughMt;

#[async_trait]
impl MtEngine for PassthroughMt {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn translate(
        &self,
        texts: &[String],
        _source_language: &str,
        _target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(texts.to_vec())
    }
}

/// Post-editor that accepts the MT draft as is
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughEditor;

#[async_trait]
impl PostEditor for PassthroughEditor {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn post_edit(&self, request: &PostEditRequest) -> Result<String, ProviderError> {
        Ok(request.mt_text.clone())
    }
}
