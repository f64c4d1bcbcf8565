/*!
 * Document sources and sinks.
 *
 * The pipeline only sees an ordered list of [`Segment`]s and writes results
 * back by index; the container format lives behind [`DocumentSource`] and
 * [`DocumentSink`]. The plain-text implementation treats every paragraph
 * (text separated by one or more blank lines) as a segment.
 */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;

use crate::errors::DocumentError;
use crate::file_utils::FileManager;

/// A position-stable unit of translatable text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position in the document, 0-based
    pub index: usize,
    /// Source text
    pub text: String,
    /// Opaque formatting data carried through untouched
    pub metadata: BTreeMap<String, String>,
}

impl Segment {
    /// Create a segment without metadata
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Whether there is nothing to translate
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Produces the segments of a document
pub trait DocumentSource {
    /// Read every segment, in document order
    fn read_segments(&self) -> Result<Vec<Segment>, DocumentError>;
}

/// Receives translated segments, in any order
pub trait DocumentSink: Send {
    /// Place the text of segment `index`
    fn write_segment(&mut self, index: usize, text: &str) -> Result<(), DocumentError>;
}

/// Plain-text document made of blank-line separated paragraphs
#[derive(Debug, Clone)]
pub struct TextDocument {
    path: PathBuf,
}

impl TextDocument {
    /// Document backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentSource for TextDocument {
    fn read_segments(&self) -> Result<Vec<Segment>, DocumentError> {
        let content = std::fs::read_to_string(&self.path)?;
        let segments = split_paragraphs(&content);
        debug!("Read {} paragraphs from {:?}", segments.len(), self.path);
        Ok(segments)
    }
}

/// Split text into paragraph segments. Line breaks inside a paragraph are
/// kept; surrounding whitespace is not.
pub fn split_paragraphs(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                segments.push(Segment::new(segments.len(), current.join("\n").trim()));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        segments.push(Segment::new(segments.len(), current.join("\n").trim()));
    }

    segments
}

/// In-memory sink collecting segments by index
#[derive(Debug, Clone, Default)]
pub struct SegmentBuffer {
    slots: Vec<Option<String>>,
}

impl SegmentBuffer {
    /// Buffer for a document of `len` segments
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Text written for `index`, if any
    pub fn get(&self, index: usize) -> Option<&str> {
        self.slots.get(index).and_then(|s| s.as_deref())
    }

    /// Number of slots already written
    pub fn written(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// All segments in order. Fails on the first slot never written.
    pub fn into_segments(self) -> Result<Vec<String>, DocumentError> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| slot.ok_or(DocumentError::MissingSegment(idx)))
            .collect()
    }

    /// Join the segments back into paragraphs
    pub fn into_text(self) -> Result<String, DocumentError> {
        let mut text = self.into_segments()?.join("\n\n");
        text.push('\n');
        Ok(text)
    }

    /// Write the joined document to `path` atomically
    pub fn finish(self, path: &Path) -> Result<(), DocumentError> {
        let text = self.into_text()?;
        FileManager::write_atomic(path, text.as_bytes())?;
        Ok(())
    }
}

impl DocumentSink for SegmentBuffer {
    fn write_segment(&mut self, index: usize, text: &str) -> Result<(), DocumentError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(DocumentError::IndexOutOfRange { index, len })?;
        *slot = Some(text.to_string());
        Ok(())
    }
}
