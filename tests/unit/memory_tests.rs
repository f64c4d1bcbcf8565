/*!
 * Tests for the translation memory store
 */

use mtpe::StoreError;
use mtpe::translation::memory::{MatchKind, TranslationMemory, normalize_key};

use crate::common;

/// Test the basic round trip
#[test]
fn test_store_thenFind_shouldReturnTranslation() {
    let mut memory = TranslationMemory::new();
    memory.store("Доброе утро.", "Good morning.");

    let found = memory.find("Доброе утро.").unwrap();
    assert_eq!(found.translation, "Good morning.");
    assert_eq!(found.kind, MatchKind::Exact);
}

/// Test normalization of whitespace and case
#[test]
fn test_find_withDifferentSpacingAndCase_shouldMatchExactly() {
    let mut memory = TranslationMemory::new();
    memory.store("Доброе   утро.", "Good morning.");

    assert_eq!(normalize_key("  Доброе\nУТРО. "), normalize_key("доброе утро."));
    assert!(memory.find("ДОБРОЕ утро.").is_some());
}

/// Test compatibility forms collapse to the same key
#[test]
fn test_find_withCompatibilityForms_shouldMatchExactly() {
    let mut memory = TranslationMemory::new();
    memory.store("\u{FB01}le \u{FF30}\u{FF49}\u{FF4E}\u{FF54}\u{FF45}\u{FF4B}", "File Pintek");

    assert_eq!(normalize_key("\u{FB01}le"), "file");
    let found = memory.find("file Pintek").unwrap();
    assert_eq!(found.kind, MatchKind::Exact);
    assert_eq!(found.translation, "File Pintek");
}

/// Test fuzzy matching is off unless configured
#[test]
fn test_find_nearMatch_shouldRequireThreshold() {
    let mut memory = TranslationMemory::new();
    memory.store("Сервер перезапущен успешно.", "The server restarted successfully.");

    assert!(memory.find("Сервер перезапущен успешно!").is_none());

    let memory = memory.with_fuzzy_threshold(Some(0.9));
    let found = memory.find("Сервер перезапущен успешно!").unwrap();
    assert_eq!(found.kind, MatchKind::Fuzzy);
    assert!(found.similarity >= 0.9);

    assert!(memory.find("Совсем другой текст.").is_none());
}

/// Test last write wins
#[test]
fn test_store_sameKeyTwice_shouldKeepLatest() {
    let mut memory = TranslationMemory::new();
    memory.store("Привет.", "Hi.");
    memory.store("привет.", "Hello.");

    assert_eq!(memory.len(), 1);
    assert_eq!(memory.find("Привет.").unwrap().translation, "Hello.");
}

/// Test blank text is never stored
#[test]
fn test_store_blankText_shouldBeIgnored() {
    let mut memory = TranslationMemory::new();
    memory.store("   ", "nothing");

    assert!(memory.is_empty());
    assert!(!memory.is_dirty());
    assert!(memory.find("").is_none());
}

/// Test usage counters
#[test]
fn test_recordUse_shouldCountReuse() {
    let mut memory = TranslationMemory::new();
    memory.store("Привет.", "Hello.");
    memory.record_use("Привет.");
    memory.record_use("ПРИВЕТ.");

    let entry = memory.get("привет.").unwrap();
    assert_eq!(entry.uses, 2);
    assert!(entry.last_used.is_some());
    assert_eq!(memory.stats().total_uses, 2);
}

/// Test save and load keep every entry
#[test]
fn test_save_thenLoad_shouldRoundTrip() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("tm.json");

    let mut memory = TranslationMemory::new();
    memory.store("Один.", "One.");
    memory.store("Два.", "Two.");
    memory.save(&path).unwrap();
    assert!(!memory.is_dirty());

    let loaded = TranslationMemory::load(&path).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.find("Два.").unwrap().translation, "Two.");
}

/// Test cold start versus corrupt store
#[test]
fn test_load_shouldDistinguishMissingFromCorrupt() {
    let dir = common::create_temp_dir().unwrap();

    let cold = TranslationMemory::load(&dir.path().join("none.json")).unwrap();
    assert!(cold.is_empty());

    let empty = common::create_test_file(dir.path(), "empty.json", "").unwrap();
    assert!(matches!(TranslationMemory::load(&empty), Err(StoreError::Corrupt { .. })));

    let garbage = common::create_test_file(dir.path(), "garbage.json", "[1, 2").unwrap();
    assert!(matches!(TranslationMemory::load(&garbage), Err(StoreError::Corrupt { .. })));
}

/// Test search returns the best matches first
#[test]
fn test_search_shouldRankBySimilarity() {
    let mut memory = TranslationMemory::new();
    memory.store("Кошка спит на диване.", "The cat sleeps on the sofa.");
    memory.store("Кошка спит.", "The cat sleeps.");
    memory.store("Собака лает.", "The dog barks.");

    let matches = memory.search("Кошка спит на диване!", 0.5);

    assert!(!matches.is_empty());
    assert_eq!(matches[0].translation, "The cat sleeps on the sofa.");
    assert!(matches.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    assert!(matches.iter().all(|m| m.translation != "The dog barks."));
}

/// Test TMX export
#[test]
fn test_exportTmx_shouldWriteOneUnitPerEntry() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("memory.tmx");

    let mut memory = TranslationMemory::new();
    memory.store("Один & два.", "One & two.");
    memory.store("Три.", "Three.");

    let count = memory.export_tmx(&path, "ru", "en").unwrap();
    let xml = std::fs::read_to_string(&path).unwrap();

    assert_eq!(count, 2);
    assert_eq!(xml.matches("<tu>").count(), 2);
    assert!(xml.contains(r#"xml:lang="ru""#));
    assert!(xml.contains("One &amp; two."));
}
