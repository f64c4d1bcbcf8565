/*!
 * Common test utilities for the mtpe test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use mtpe::document::Segment;

/// Route library logs to the test output; safe to call from every test
pub fn init_test_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Numbered Russian paragraphs, each ending a sentence
pub fn numbered_segments(count: usize) -> Vec<Segment> {
    (0..count)
        .map(|i| Segment::new(i, format!("Абзац номер {}.", i + 1)))
        .collect()
}

/// Segments built from the given texts
pub fn segments_from(texts: &[&str]) -> Vec<Segment> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| Segment::new(i, *text))
        .collect()
}

/// Creates a sample plain-text document for testing
pub fn create_test_document(dir: &Path, filename: &str) -> Result<PathBuf> {
    let content = "Пинтек выпустил новую версию.\n\n\
                   Пользователи довольны.\n\n\
                   Пинтек благодарит всех за отзывы.\n";
    create_test_file(dir, filename, content)
}
