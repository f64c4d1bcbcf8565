/*!
 * Mock adapter implementations for testing.
 *
 * Both mocks are deterministic and share their counters between clones:
 * - `MockMt::working()` - translates every text as `[<target>] <text>`
 * - `MockEditor::working()` - returns the MT draft unchanged
 *
 * Failures are scripted through the behavior mode, `failing_first(n)` or
 * `failing_on(fragment, kind)`, and latency through `slow(ms)` or
 * `with_delay(fn)`.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::{FailureKind, ProviderError};
use crate::providers::{MtEngine, PostEditRequest, PostEditor};

/// Behavior mode for the mock adapters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails with a transient error every Nth call
    Intermittent { fail_every: usize },
    /// Always fails with a transient server error
    Failing,
    /// Always fails with a permanent authentication error
    Rejecting,
    /// MT: returns one translation fewer than requested; editor: empty text
    Misaligned,
    /// Succeeds after sleeping
    Slow { delay_ms: u64 },
}

#[derive(Debug, Clone, Default)]
struct FailurePlan {
    fail_first: usize,
    fail_on: Option<(String, FailureKind)>,
}

impl FailurePlan {
    fn check<'a>(&self, call: usize, mut texts: impl Iterator<Item = &'a str>) -> Result<(), ProviderError> {
        if call < self.fail_first {
            return Err(simulated_error(FailureKind::Transient, &format!("scripted failure on call #{}", call + 1)));
        }
        if let Some((fragment, kind)) = &self.fail_on {
            if texts.any(|t| t.contains(fragment.as_str())) {
                return Err(simulated_error(*kind, &format!("scripted failure on '{}'", fragment)));
            }
        }
        Ok(())
    }
}

fn simulated_error(kind: FailureKind, detail: &str) -> ProviderError {
    match kind {
        FailureKind::Transient => ProviderError::ApiError {
            status_code: 503,
            message: format!("Simulated transient failure: {}", detail),
        },
        FailureKind::Permanent => ProviderError::AuthenticationError(format!("Simulated permanent failure: {}", detail)),
    }
}

async fn apply_behavior(behavior: MockBehavior, call: usize) -> Result<(), ProviderError> {
    match behavior {
        MockBehavior::Intermittent { fail_every } if fail_every > 0 && call % fail_every == fail_every - 1 => {
            Err(simulated_error(FailureKind::Transient, &format!("intermittent (request #{})", call + 1)))
        }
        MockBehavior::Failing => Err(ProviderError::ApiError {
            status_code: 500,
            message: "Simulated provider failure".to_string(),
        }),
        MockBehavior::Rejecting => Err(simulated_error(FailureKind::Permanent, "rejected")),
        MockBehavior::Slow { delay_ms } => {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Mock MT engine
#[derive(Debug, Clone)]
pub struct MockMt {
    behavior: MockBehavior,
    plan: FailurePlan,
    request_count: Arc<AtomicUsize>,
    texts_translated: Arc<AtomicUsize>,
    translator: Option<fn(&str, &str) -> String>,
    delay: Option<fn(&[String]) -> u64>,
}

impl MockMt {
    /// Create a new mock engine with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            plan: FailurePlan::default(),
            request_count: Arc::new(AtomicUsize::new(0)),
            texts_translated: Arc::new(AtomicUsize::new(0)),
            translator: None,
            delay: None,
        }
    }

    /// Engine that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Engine failing transiently on every `fail_every`-th call
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    /// Engine that always fails transiently
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Engine that always fails permanently
    pub fn rejecting() -> Self {
        Self::new(MockBehavior::Rejecting)
    }

    /// Engine returning fewer translations than requested
    pub fn misaligned() -> Self {
        Self::new(MockBehavior::Misaligned)
    }

    /// Engine sleeping `delay_ms` on every call
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Fail the first `calls` calls transiently
    pub fn failing_first(mut self, calls: usize) -> Self {
        self.plan.fail_first = calls;
        self
    }

    /// Fail every call whose input contains `fragment`
    pub fn failing_on(mut self, fragment: &str, kind: FailureKind) -> Self {
        self.plan.fail_on = Some((fragment.to_string(), kind));
        self
    }

    /// Replace the default translation, called as `f(text, target_language)`
    pub fn with_translator(mut self, translator: fn(&str, &str) -> String) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Sleep for `f(texts)` milliseconds before answering
    pub fn with_delay(mut self, delay: fn(&[String]) -> u64) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `translate` calls so far
    pub fn calls(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Number of texts successfully translated so far
    pub fn texts_translated(&self) -> usize {
        self.texts_translated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MtEngine for MockMt {
    fn name(&self) -> &str {
        "mock"
    }

    async fn translate(
        &self,
        texts: &[String],
        _source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let call = self.request_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(Duration::from_millis(delay(texts))).await;
        }
        self.plan.check(call, texts.iter().map(String::as_str))?;
        apply_behavior(self.behavior, call).await?;

        let mut translated: Vec<String> = texts
            .iter()
            .map(|text| match self.translator {
                Some(f) => f(text, target_language),
                None => format!("[{}] {}", target_language, text),
            })
            .collect();

        if self.behavior == MockBehavior::Misaligned {
            translated.pop();
        }
        self.texts_translated.fetch_add(translated.len(), Ordering::SeqCst);
        Ok(translated)
    }
}

/// Mock post-editor
#[derive(Debug, Clone)]
pub struct MockEditor {
    behavior: MockBehavior,
    plan: FailurePlan,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<PostEditRequest>>>,
    editor: Option<fn(&PostEditRequest) -> String>,
}

impl MockEditor {
    /// Create a new mock editor with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            plan: FailurePlan::default(),
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            editor: None,
        }
    }

    /// Editor that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Editor that always fails transiently
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Editor that always fails permanently
    pub fn rejecting() -> Self {
        Self::new(MockBehavior::Rejecting)
    }

    /// Editor sleeping `delay_ms` on every call
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Fail the first `calls` calls transiently
    pub fn failing_first(mut self, calls: usize) -> Self {
        self.plan.fail_first = calls;
        self
    }

    /// Fail every request whose source text contains `fragment`
    pub fn failing_on(mut self, fragment: &str, kind: FailureKind) -> Self {
        self.plan.fail_on = Some((fragment.to_string(), kind));
        self
    }

    /// Replace the default edit (returning the draft unchanged)
    pub fn with_editor(mut self, editor: fn(&PostEditRequest) -> String) -> Self {
        self.editor = Some(editor);
        self
    }

    /// Number of `post_edit` calls so far
    pub fn calls(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Every request received so far, in call order
    pub fn requests(&self) -> Vec<PostEditRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PostEditor for MockEditor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn post_edit(&self, request: &PostEditRequest) -> Result<String, ProviderError> {
        let call = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        self.plan.check(call, std::iter::once(request.source_text.as_str()))?;
        apply_behavior(self.behavior, call).await?;

        if self.behavior == MockBehavior::Misaligned {
            return Ok(String::new());
        }
        Ok(match self.editor {
            Some(f) => f(request),
            None => request.mt_text.clone(),
        })
    }
}
