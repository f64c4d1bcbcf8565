/*!
 * Segment lifecycle and end-of-run report.
 */

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::errors::FailureKind;
use crate::translation::cache::CacheStats;
use crate::translation::glossary::ComplianceIssue;

/// Processing stage of a segment
///
/// Stages are ordered: a segment only ever moves forward through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing done yet
    Pending,
    /// Raw MT output available
    MtDone,
    /// Glossary renderings substituted into the MT draft
    GlossaryEnforced,
    /// Post-editor returned the refined text
    PostEdited,
    /// Written to the output and the memory
    Committed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::MtDone => "mt_done",
            Self::GlossaryEnforced => "glossary_enforced",
            Self::PostEdited => "post_edited",
            Self::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// State of a segment, including the failed state reachable from any stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SegmentState {
    /// In progress (or done) at the given stage
    Active { stage: Stage },
    /// Gave up after completing `last_completed`
    Failed { last_completed: Stage, reason: String },
}

impl SegmentState {
    /// Fresh segment
    pub fn pending() -> Self {
        Self::Active { stage: Stage::Pending }
    }

    /// Last stage reached
    pub fn stage(&self) -> Stage {
        match self {
            Self::Active { stage } => *stage,
            Self::Failed { last_completed, .. } => *last_completed,
        }
    }

    /// Whether the segment has failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// A segment that could not be translated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentFailure {
    /// Segment index in the document
    pub index: usize,
    /// 1-based batch number
    pub batch: usize,
    /// Last stage the segment completed
    pub last_completed: Stage,
    /// Error message of the final attempt
    pub reason: String,
    /// Whether the final error was transient (retries exhausted) or permanent
    pub kind: FailureKind,
}

/// Glossary renderings missing from a committed translation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceWarning {
    /// Segment index in the document
    pub index: usize,
    /// Missing renderings
    pub issues: Vec<ComplianceIssue>,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Segments in the document
    pub total: usize,
    /// Segments translated through MT and post-editing
    pub translated: usize,
    /// Segments served from the translation memory
    pub from_memory: usize,
    /// Blank segments copied through
    pub unchanged: usize,
    /// Segments that failed, in document order
    pub failed: Vec<SegmentFailure>,
    /// Segments never started because the run was cancelled
    pub skipped: Vec<usize>,
    /// Batches started
    pub batches_issued: usize,
    /// Batches in the document
    pub batches_total: usize,
    /// Adapter retries across all batches
    pub retries: usize,
    /// Committed translations missing mandated renderings
    pub compliance_warnings: Vec<ComplianceWarning>,
    /// MT cache counters, when a cache was used
    pub mt_cache: Option<CacheStats>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u128,
    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
    /// Final state of every segment by document index: committed, failed,
    /// or still pending when skipped
    pub states: Vec<SegmentState>,
}

impl RunReport {
    /// Segments with a usable output
    pub fn succeeded(&self) -> usize {
        self.translated + self.from_memory + self.unchanged
    }

    /// Final state of the segment at `index`
    pub fn state(&self, index: usize) -> Option<&SegmentState> {
        self.states.get(index)
    }

    /// Indices of the failed segments
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failed.iter().map(|f| f.index).collect()
    }

    /// Whether every segment was translated
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Run duration
    pub fn duration(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.duration_ms).unwrap_or(u64::MAX))
    }

    /// Get a one-line summary of the run
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{}/{} segments done", self.succeeded(), self.total),
            format!("{} translated", self.translated),
            format!("{} from memory", self.from_memory),
            format!("{} failed", self.failed.len()),
        ];

        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }
        parts.push(format!("{}/{} batches", self.batches_issued, self.batches_total));
        if self.retries > 0 {
            parts.push(format!("{} retries", self.retries));
        }
        if !self.compliance_warnings.is_empty() {
            parts.push(format!("{} glossary warnings", self.compliance_warnings.len()));
        }
        if let Some(cache) = &self.mt_cache {
            parts.push(format!("MT cache {:.0}% hits", cache.hit_rate * 100.0));
        }
        parts.push(format!("{:.2}s", self.duration().as_secs_f32()));
        if self.cancelled {
            parts.push("cancelled".to_string());
        }

        parts.join(" | ")
    }
}
