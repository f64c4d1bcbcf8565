/*!
 * End-to-end pipeline runs with mock adapters
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use mtpe::document::{DocumentSink, SegmentBuffer};
use mtpe::errors::{FailureKind, ProviderError};
use mtpe::providers::MtEngine;
use mtpe::providers::mock::{MockEditor, MockMt};
use mtpe::translation::cache::MtCache;
use mtpe::translation::glossary::Glossary;
use mtpe::translation::memory::TranslationMemory;
use mtpe::translation::pipeline::{CancellationToken, PipelineSettings, RunReport, Stage, TranslationPipeline};

use crate::common;

fn fast_settings(batch_size: usize) -> PipelineSettings {
    PipelineSettings::new("ru", "en")
        .with_batch_size(batch_size)
        .with_retries(2, Duration::from_millis(1))
}

fn shared_memory() -> Arc<RwLock<TranslationMemory>> {
    Arc::new(RwLock::new(TranslationMemory::new()))
}

async fn run(
    pipeline: &TranslationPipeline,
    segments: Vec<mtpe::Segment>,
) -> (RunReport, Vec<String>) {
    let mut sink = SegmentBuffer::new(segments.len());
    let report = pipeline
        .run(segments, &mut sink, &CancellationToken::new(), |_| {})
        .await
        .unwrap();
    (report, sink.into_segments().unwrap())
}

fn expected_outputs(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("[en] Абзац номер {}.", i)).collect()
}

/// MT engine whose first call hangs longer than any sane timeout
#[derive(Debug, Default)]
struct HangingOnceMt {
    calls: AtomicUsize,
}

#[async_trait]
impl MtEngine for HangingOnceMt {
    fn name(&self) -> &str {
        "hanging-once"
    }

    async fn translate(
        &self,
        texts: &[String],
        _source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(texts.iter().map(|t| format!("[{}] {}", target_language, t)).collect())
    }
}

/// Sink that records the order in which segments arrive
#[derive(Debug, Default)]
struct ArrivalLog {
    inner: Vec<(usize, String)>,
}

impl DocumentSink for ArrivalLog {
    fn write_segment(&mut self, index: usize, text: &str) -> Result<(), mtpe::errors::DocumentError> {
        self.inner.push((index, text.to_string()));
        Ok(())
    }
}

/// 6 segments in batches of 3 through deterministic stubs
#[tokio::test]
async fn test_run_sixSegmentsBatchOfThree_shouldIssueTwoBatchesAndFillMemory() {
    let mt = MockMt::working();
    let memory = shared_memory();
    let pipeline = TranslationPipeline::new(Arc::new(mt.clone()), Arc::new(MockEditor::working()), fast_settings(3))
        .with_memory(memory.clone());

    let (report, output) = run(&pipeline, common::numbered_segments(6)).await;

    assert_eq!(report.batches_issued, 2);
    assert_eq!(report.translated, 6);
    assert_eq!(mt.calls(), 2);
    assert_eq!(memory.read().len(), 6);
    assert_eq!(output, expected_outputs(6));
}

/// Output order must not depend on batch completion order
#[tokio::test]
async fn test_run_concurrentBatchesWithReversedLatency_shouldPreserveOrder() {
    // Later paragraphs answer faster, so batches complete in reverse order
    fn reversed_latency(texts: &[String]) -> u64 {
        let number: u64 = texts[0]
            .trim_end_matches('.')
            .rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        (12 - number.min(12)) * 15
    }

    let mt = MockMt::working().with_delay(reversed_latency);
    let pipeline = TranslationPipeline::new(
        Arc::new(mt.clone()),
        Arc::new(MockEditor::working()),
        fast_settings(1).with_concurrency(4),
    );

    let segments = common::numbered_segments(12);
    let mut arrivals = ArrivalLog::default();
    let report = pipeline
        .run(segments, &mut arrivals, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert!(report.is_complete());
    let arrival_order: Vec<usize> = arrivals.inner.iter().map(|(i, _)| *i).collect();
    assert_ne!(arrival_order, (0..12).collect::<Vec<_>>(), "batches should finish out of order");

    let mut placed = arrivals.inner.clone();
    placed.sort_by_key(|(i, _)| *i);
    let texts: Vec<String> = placed.into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, expected_outputs(12));
}

/// Batch 3 of 10 exhausting its retries must not affect the others
#[tokio::test]
async fn test_run_thirdBatchExhaustsRetries_shouldIsolateFailure() {
    common::init_test_logging();
    let mt = MockMt::working().failing_on("номер 8.", FailureKind::Transient);
    let pipeline = TranslationPipeline::new(
        Arc::new(mt.clone()),
        Arc::new(MockEditor::working()),
        fast_settings(3).with_concurrency(2),
    );

    let (report, output) = run(&pipeline, common::numbered_segments(30)).await;

    assert_eq!(report.batches_issued, 10);
    assert_eq!(report.failed_indices(), vec![6, 7, 8]);
    assert!(report.failed.iter().all(|f| f.batch == 3 && f.kind == FailureKind::Transient));
    assert_eq!(report.translated, 27);
    assert_eq!(report.retries, 2);
    // 10 first attempts plus 2 retries of batch 3
    assert_eq!(mt.calls(), 12);

    let expected = expected_outputs(30);
    for (i, text) in output.iter().enumerate() {
        if (6..9).contains(&i) {
            assert_eq!(text, &format!("Абзац номер {}.", i + 1), "failed segment keeps its source");
        } else {
            assert_eq!(text, &expected[i]);
        }
    }
}

/// A timed out call is retried like any transient failure
#[tokio::test]
async fn test_run_adapterTimeout_shouldRetryAndSucceed() {
    let mt = Arc::new(HangingOnceMt::default());
    let mut settings = fast_settings(2);
    settings.adapter_timeout = Duration::from_millis(50);
    let pipeline = TranslationPipeline::new(mt.clone(), Arc::new(MockEditor::working()), settings);

    let (report, output) = run(&pipeline, common::numbered_segments(2)).await;

    assert!(report.is_complete());
    assert_eq!(report.retries, 1);
    assert_eq!(mt.calls.load(Ordering::SeqCst), 2);
    assert_eq!(output, expected_outputs(2));
}

/// Permanent failures fail the segment without retrying
#[tokio::test]
async fn test_run_permanentEditorFailure_shouldNotRetry() {
    let mt = MockMt::working();
    let editor = MockEditor::working().failing_on("номер 2.", FailureKind::Permanent);
    let pipeline = TranslationPipeline::new(Arc::new(mt.clone()), Arc::new(editor.clone()), fast_settings(3));

    let (report, output) = run(&pipeline, common::numbered_segments(3)).await;

    assert_eq!(report.retries, 0);
    assert_eq!(editor.calls(), 3);
    assert_eq!(mt.calls(), 1);
    assert_eq!(report.failed_indices(), vec![1]);
    assert_eq!(report.failed[0].kind, FailureKind::Permanent);
    assert_eq!(report.failed[0].last_completed, Stage::GlossaryEnforced);
    assert_eq!(output[0], "[en] Абзац номер 1.");
    assert_eq!(output[1], "Абзац номер 2.");
}

/// Cancellation stops new batches but keeps and flushes finished work
#[tokio::test]
async fn test_run_cancelledAfterFirstBatch_shouldSkipRestAndFlushMemory() {
    let dir = common::create_temp_dir().unwrap();
    let memory_path = dir.path().join("tm.json");
    let mut settings = fast_settings(2);
    settings.memory_path = Some(memory_path.clone());

    let mt = MockMt::working();
    let pipeline = TranslationPipeline::new(Arc::new(mt.clone()), Arc::new(MockEditor::working()), settings)
        .with_memory(shared_memory());

    let cancel = CancellationToken::new();
    let mut sink = SegmentBuffer::new(8);
    let report = pipeline
        .run(common::numbered_segments(8), &mut sink, &cancel, |p| {
            if p.batches_done == 1 {
                cancel.cancel();
            }
        })
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.batches_issued, 1);
    assert_eq!(report.skipped, vec![2, 3, 4, 5, 6, 7]);
    assert_eq!(mt.calls(), 1);
    assert_eq!(sink.get(5), Some("Абзац номер 6."));

    let flushed = TranslationMemory::load(&memory_path).unwrap();
    assert_eq!(flushed.len(), 2);
    assert_eq!(flushed.find("Абзац номер 2.").unwrap().translation, "[en] Абзац номер 2.");
}

/// A second run is served from the translation memory
#[tokio::test]
async fn test_run_secondRun_shouldReuseMemory() {
    let memory = shared_memory();
    let mt = MockMt::working();
    let editor = MockEditor::working();
    let pipeline = TranslationPipeline::new(Arc::new(mt.clone()), Arc::new(editor.clone()), fast_settings(2))
        .with_memory(memory.clone());

    run(&pipeline, common::numbered_segments(4)).await;
    let (report, output) = run(&pipeline, common::numbered_segments(4)).await;

    assert_eq!(report.from_memory, 4);
    assert_eq!(report.translated, 0);
    assert_eq!(mt.calls(), 2);
    assert_eq!(editor.calls(), 4);
    assert_eq!(output, expected_outputs(4));
    assert_eq!(memory.read().stats().total_uses, 4);
}

/// Without a memory the MT cache still saves the second MT call
#[tokio::test]
async fn test_run_withMtCache_shouldSkipSecondMtCall() {
    let cache = MtCache::new(true);
    let mt = MockMt::working();
    let editor = MockEditor::working();
    let pipeline = TranslationPipeline::new(Arc::new(mt.clone()), Arc::new(editor.clone()), fast_settings(3))
        .with_mt_cache(cache.clone());

    run(&pipeline, common::numbered_segments(3)).await;
    let (report, output) = run(&pipeline, common::numbered_segments(3)).await;

    assert_eq!(mt.calls(), 1);
    assert_eq!(editor.calls(), 6);
    assert_eq!(output, expected_outputs(3));
    let stats = report.mt_cache.unwrap();
    assert_eq!(stats.hits, 3);
}

/// Identical paragraphs in concurrent batches end up as one memory entry
#[tokio::test]
async fn test_run_duplicateSegmentsConcurrently_shouldStoreOnce() {
    let memory = shared_memory();
    let pipeline = TranslationPipeline::new(
        Arc::new(MockMt::working()),
        Arc::new(MockEditor::working()),
        fast_settings(1).with_concurrency(3),
    )
    .with_memory(memory.clone());

    let segments = common::segments_from(&["Повтор.", "Другое.", "Повтор."]);
    let (report, output) = run(&pipeline, segments).await;

    assert!(report.is_complete());
    assert_eq!(memory.read().len(), 2);
    assert_eq!(output[0], output[2]);
}

/// Glossary renderings reach the editor, and dropped ones are reported
#[tokio::test]
async fn test_run_editorDropsMandatedTerm_shouldWarn() {
    fn careless(_request: &mtpe::providers::PostEditRequest) -> String {
        "The company released an update.".to_string()
    }

    let mut glossary = Glossary::new();
    glossary.add("Пинтек", "Pintek");
    let editor = MockEditor::working().with_editor(careless);
    let pipeline = TranslationPipeline::new(Arc::new(MockMt::working()), Arc::new(editor.clone()), fast_settings(2))
        .with_glossary(Arc::new(glossary));

    let segments = common::segments_from(&["Пинтек выпустил обновление."]);
    let (report, _) = run(&pipeline, segments).await;

    let request = &editor.requests()[0];
    assert!(request.mt_text.contains("Pintek"));
    assert!(request.constraints.iter().any(|c| c.target == "Pintek"));
    assert_eq!(report.compliance_warnings.len(), 1);
    assert_eq!(report.compliance_warnings[0].issues[0].expected, "Pintek");
}

/// Fuzzy reuse only happens when a threshold is configured
#[tokio::test]
async fn test_run_withFuzzyThreshold_shouldReuseNearMatch() {
    let mut stored = TranslationMemory::new();
    stored.store("Абзац номер 1!", "Paragraph number 1!");

    let exact_only = TranslationPipeline::new(Arc::new(MockMt::working()), Arc::new(MockEditor::working()), fast_settings(1))
        .with_memory(Arc::new(RwLock::new(stored.clone())));
    let (report, _) = run(&exact_only, common::numbered_segments(1)).await;
    assert_eq!(report.from_memory, 0);

    let fuzzy = TranslationPipeline::new(Arc::new(MockMt::working()), Arc::new(MockEditor::working()), fast_settings(1))
        .with_memory(Arc::new(RwLock::new(stored.with_fuzzy_threshold(Some(0.9)))));
    let (report, output) = run(&fuzzy, common::numbered_segments(1)).await;
    assert_eq!(report.from_memory, 1);
    assert_eq!(output[0], "Paragraph number 1!");
}

/// Blank segments are copied through without adapter calls
#[tokio::test]
async fn test_run_blankSegments_shouldStayUnchanged() {
    let mt = MockMt::working();
    let pipeline = TranslationPipeline::new(Arc::new(mt.clone()), Arc::new(MockEditor::working()), fast_settings(2));

    let (report, output) = run(&pipeline, common::segments_from(&["   ", "\t"])).await;

    assert_eq!(report.unchanged, 2);
    assert_eq!(mt.calls(), 0);
    assert_eq!(output, vec!["   ".to_string(), "\t".to_string()]);
}

/// A memory hit gets the current glossary rendering without any adapter call
#[tokio::test]
async fn test_run_memoryHitWithSourceTerm_shouldApplyGlossaryWithoutAdapters() {
    let mut stored = TranslationMemory::new();
    stored.store("Пинтек выпустил обновление.", "Пинтек released an update.");
    let mut glossary = Glossary::new();
    glossary.add("Пинтек", "Pintek");

    let mt = MockMt::working();
    let editor = MockEditor::working();
    let pipeline = TranslationPipeline::new(Arc::new(mt.clone()), Arc::new(editor.clone()), fast_settings(2))
        .with_memory(Arc::new(RwLock::new(stored)))
        .with_glossary(Arc::new(glossary));

    let (report, output) = run(&pipeline, common::segments_from(&["Пинтек выпустил обновление."])).await;

    assert_eq!(report.from_memory, 1);
    assert_eq!(mt.calls(), 0);
    assert_eq!(editor.calls(), 0);
    assert_eq!(output[0], "Pintek released an update.");
}

/// An MT engine that is always down fails its batch after the retries
#[tokio::test]
async fn test_run_mtAlwaysDown_shouldFailBatchBeforeEditing() {
    let mt = MockMt::failing();
    let editor = MockEditor::working();
    let pipeline = TranslationPipeline::new(Arc::new(mt.clone()), Arc::new(editor.clone()), fast_settings(2));

    let (report, output) = run(&pipeline, common::numbered_segments(2)).await;

    assert_eq!(mt.calls(), 3);
    assert_eq!(editor.calls(), 0);
    assert_eq!(report.retries, 2);
    assert_eq!(report.failed_indices(), vec![0, 1]);
    assert!(report.failed.iter().all(|f| f.kind == FailureKind::Transient && f.last_completed == Stage::Pending));
    assert!(report.states.iter().all(|s| s.is_failed()));
    assert_eq!(output, vec!["Абзац номер 1.".to_string(), "Абзац номер 2.".to_string()]);
}

/// Retries after an editor failure resume at post-editing, not at MT
#[tokio::test]
async fn test_run_editorAlwaysDown_shouldRetryOnlyPostEditing() {
    let mt = MockMt::working();
    let editor = MockEditor::failing();
    let pipeline = TranslationPipeline::new(Arc::new(mt.clone()), Arc::new(editor.clone()), fast_settings(2));

    let (report, output) = run(&pipeline, common::numbered_segments(2)).await;

    assert_eq!(mt.calls(), 1);
    // 2 segments, 3 attempts each
    assert_eq!(editor.calls(), 6);
    assert_eq!(report.failed_indices(), vec![0, 1]);
    assert!(report.failed.iter().all(|f| f.last_completed == Stage::GlossaryEnforced));
    assert!(report.failed[0].reason.starts_with("post-edit:"));
    assert_eq!(report.state(1).map(|s| s.stage()), Some(Stage::GlossaryEnforced));
    assert_eq!(output[0], "Абзац номер 1.");
}

/// An editor slower than the adapter timeout is cut off on every attempt
#[tokio::test]
async fn test_run_editorSlowerThanTimeout_shouldFailAsTransient() {
    let editor = MockEditor::slow(2_000);
    let mut settings = fast_settings(1).with_retries(1, Duration::from_millis(1));
    settings.adapter_timeout = Duration::from_millis(30);
    let pipeline = TranslationPipeline::new(Arc::new(MockMt::working()), Arc::new(editor.clone()), settings);

    let (report, output) = run(&pipeline, common::numbered_segments(1)).await;

    assert_eq!(editor.calls(), 2);
    assert_eq!(report.retries, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].kind, FailureKind::Transient);
    assert_eq!(output[0], "Абзац номер 1.");
}
