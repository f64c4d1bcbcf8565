/*!
 * Tests for document sources and sinks
 */

use mtpe::document::{DocumentSink, DocumentSource, SegmentBuffer, TextDocument};
use mtpe::errors::DocumentError;

use crate::common;

/// Test reading a plain-text document
#[test]
fn test_readSegments_shouldNumberParagraphsInOrder() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_document(dir.path(), "doc.txt").unwrap();

    let segments = TextDocument::new(&path).read_segments().unwrap();

    assert_eq!(segments.len(), 3);
    assert_eq!(segments[0].index, 0);
    assert_eq!(segments[2].text, "Пинтек благодарит всех за отзывы.");
}

/// Test a missing document surfaces as an I/O error
#[test]
fn test_readSegments_missingFile_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let result = TextDocument::new(dir.path().join("missing.txt")).read_segments();

    assert!(matches!(result, Err(DocumentError::Io(_))));
}

/// Test the buffer refuses to finish with holes
#[test]
fn test_finish_withUnwrittenSegment_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let out = dir.path().join("out.txt");
    let mut buffer = SegmentBuffer::new(2);
    buffer.write_segment(1, "two").unwrap();

    assert!(matches!(buffer.finish(&out), Err(DocumentError::MissingSegment(0))));
    assert!(!out.exists());
}

/// Test a finished buffer can be read back as the same segments
#[test]
fn test_finish_thenRead_shouldKeepParagraphs() {
    let dir = common::create_temp_dir().unwrap();
    let out = dir.path().join("out.txt");
    let mut buffer = SegmentBuffer::new(2);
    buffer.write_segment(1, "Second paragraph.").unwrap();
    buffer.write_segment(0, "First line\nstill first.").unwrap();
    assert_eq!(buffer.written(), 2);

    buffer.finish(&out).unwrap();
    let segments = TextDocument::new(&out).read_segments().unwrap();

    assert_eq!(segments[0].text, "First line\nstill first.");
    assert_eq!(segments[1].text, "Second paragraph.");
}
