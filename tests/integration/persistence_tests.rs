/*!
 * Store persistence across runs, crashes and damaged files
 */

use std::fs;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use mtpe::document::SegmentBuffer;
use mtpe::errors::StoreError;
use mtpe::file_utils::FileManager;
use mtpe::providers::mock::{MockEditor, MockMt};
use mtpe::translation::cache::MtCache;
use mtpe::translation::glossary::Glossary;
use mtpe::translation::memory::TranslationMemory;
use mtpe::translation::pipeline::{CancellationToken, PipelineSettings, TranslationPipeline};

use crate::common;

/// A save interrupted halfway through its write leaves the previous store readable
#[test]
fn test_memory_saveInterruptedMidWrite_shouldKeepPreviousFile() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("tm.json");

    let mut memory = TranslationMemory::new();
    memory.store("Привет.", "Hello.");
    memory.save(&path).unwrap();
    let before = fs::read(&path).unwrap();

    memory.store("Пока.", "Bye.");
    let scratch = dir.path().join("next.json");
    memory.save(&scratch).unwrap();
    let next = fs::read(&scratch).unwrap();

    // Same write path the stores use, dying after half of the new content
    let result = FileManager::write_atomic_with(&path, |file| {
        file.write_all(&next[..next.len() / 2])?;
        Err(io::Error::other("simulated power loss"))
    });

    assert!(result.is_err());
    assert_eq!(fs::read(&path).unwrap(), before);
    let reloaded = TranslationMemory::load(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.find("привет.").unwrap().translation, "Hello.");
    // No half-written temporary file is left next to the stores
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
}

/// A failed save reports the error and keeps the changes pending
#[test]
fn test_memory_saveFails_shouldStayDirty() {
    let dir = common::create_temp_dir().unwrap();
    let blocker = common::create_test_file(dir.path(), "blocker", "not a directory").unwrap();

    let mut memory = TranslationMemory::new();
    memory.store("Привет.", "Hello.");

    let result = memory.save(&blocker.join("tm.json"));

    assert!(matches!(result, Err(StoreError::Io { .. })));
    assert!(memory.is_dirty());
    assert_eq!(fs::read_to_string(&blocker).unwrap(), "not a directory");
}

/// A later save replaces the file as a whole
#[test]
fn test_memory_saveTwice_shouldReplaceWholeFile() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("tm.json");

    let mut memory = TranslationMemory::new();
    memory.store("Раз.", "One.");
    memory.save(&path).unwrap();
    memory.store("Два.", "Two.");
    memory.save(&path).unwrap();

    let reloaded = TranslationMemory::load(&path).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert!(!reloaded.is_dirty());
}

/// Missing files are a cold start for every store
#[test]
fn test_stores_missingFiles_shouldStartEmpty() {
    let dir = common::create_temp_dir().unwrap();

    assert!(TranslationMemory::load(&dir.path().join("tm.json")).unwrap().is_empty());
    assert!(Glossary::load(&dir.path().join("glossary.json")).unwrap().is_empty());
    assert!(MtCache::load(&dir.path().join("cache.json")).unwrap().is_empty());
}

/// Damaged files are reported and left exactly as they were
#[test]
fn test_stores_corruptFiles_shouldFailWithoutTouchingThem() {
    let dir = common::create_temp_dir().unwrap();
    let tm = common::create_test_file(dir.path(), "tm.json", "{\"version\": 1, \"entries\": {").unwrap();
    let glossary = common::create_test_file(dir.path(), "glossary.json", "[1, 2").unwrap();
    let cache = common::create_test_file(dir.path(), "cache.json", "").unwrap();

    assert!(matches!(TranslationMemory::load(&tm), Err(StoreError::Corrupt { .. })));
    assert!(matches!(Glossary::load(&glossary), Err(StoreError::Corrupt { .. })));
    assert!(matches!(MtCache::load(&cache), Err(StoreError::Corrupt { .. })));

    assert_eq!(fs::read_to_string(&tm).unwrap(), "{\"version\": 1, \"entries\": {");
    assert_eq!(fs::read_to_string(&cache).unwrap(), "");
}

/// Glossary entries and their matching options survive a save/load cycle
#[test]
fn test_glossary_saveAndLoad_shouldKeepOptions() {
    use mtpe::translation::glossary::{GlossaryEntry, MatchScope};

    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("glossary.json");

    let mut glossary = Glossary::new();
    glossary.add("Пинтек", "Pintek");
    glossary.insert(GlossaryEntry::new("ИИ", "AI").case_sensitive(true).scope(MatchScope::WholeWord));
    glossary.save(&path).unwrap();

    let reloaded = Glossary::load(&path).unwrap();
    assert_eq!(reloaded.export_to(), glossary.export_to());
}

/// Translations from one run are reused by the next one through the file
#[tokio::test]
async fn test_pipeline_secondRunFromDisk_shouldUseMemory() {
    let dir = common::create_temp_dir().unwrap();
    let memory_path = dir.path().join("tm.json");
    let cache_path = dir.path().join("mt_cache.json");

    let settings = || {
        let mut settings = PipelineSettings::new("ru", "en")
            .with_batch_size(2)
            .with_retries(1, Duration::from_millis(1));
        settings.memory_path = Some(memory_path.clone());
        settings.mt_cache_path = Some(cache_path.clone());
        settings
    };

    let first_mt = MockMt::working();
    let first = TranslationPipeline::new(Arc::new(first_mt.clone()), Arc::new(MockEditor::working()), settings())
        .with_memory(Arc::new(RwLock::new(TranslationMemory::new())))
        .with_mt_cache(MtCache::new(true));
    let mut sink = SegmentBuffer::new(4);
    first
        .run(common::numbered_segments(4), &mut sink, &CancellationToken::new(), |_| {})
        .await
        .unwrap();
    assert_eq!(first_mt.calls(), 2);
    assert_eq!(MtCache::load(&cache_path).unwrap().len(), 4);

    let second_mt = MockMt::working();
    let memory = TranslationMemory::load(&memory_path).unwrap();
    assert_eq!(memory.len(), 4);
    let second = TranslationPipeline::new(Arc::new(second_mt.clone()), Arc::new(MockEditor::working()), settings())
        .with_memory(Arc::new(RwLock::new(memory)));
    let mut sink = SegmentBuffer::new(4);
    let report = second
        .run(common::numbered_segments(4), &mut sink, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(report.from_memory, 4);
    assert_eq!(second_mt.calls(), 0);
    assert_eq!(sink.into_text().unwrap().lines().next(), Some("[en] Абзац номер 1."));

    let reused = TranslationMemory::load(&memory_path).unwrap();
    assert_eq!(reused.stats().total_uses, 4);
}
