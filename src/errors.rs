/*!
 * Error types for the mtpe pipeline.
 *
 * Library code returns the typed errors below (built with thiserror);
 * application glue in the controller and the binary wraps them in anyhow.
 *
 * Adapter failures are classified as transient (retry with backoff) or
 * permanent (give up on the affected segments). Store corruption is fatal
 * at pipeline start. Per-segment failures never surface here: they are
 * collected into the run report instead.
 */

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Whether a failed adapter call is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Network, timeout, rate limit, server-side error
    Transient,
    /// Authentication, invalid input, other client-side error
    Permanent,
}

/// Errors that can occur when calling an MT engine or a post-editor
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The adapter did not answer within the configured bound
    #[error("Adapter call timed out after {0:?}")]
    Timeout(Duration),

    /// A batch call returned a different number of texts than it was given
    #[error("Batch misaligned: sent {expected} segments, received {actual}")]
    MisalignedBatch {
        /// Number of texts sent
        expected: usize,
        /// Number of texts received
        actual: usize,
    },

    /// The adapter refused the input itself
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ProviderError {
    /// Classify the failure for the retry policy
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AuthenticationError(_) | Self::InvalidInput(_) => FailureKind::Permanent,
            Self::ApiError { status_code, .. } => {
                if *status_code == 429 || *status_code == 408 || *status_code >= 500 {
                    FailureKind::Transient
                } else {
                    FailureKind::Permanent
                }
            }
            Self::RequestFailed(_)
            | Self::ParseError(_)
            | Self::ConnectionError(_)
            | Self::RateLimitExceeded(_)
            | Self::Timeout(_)
            | Self::MisalignedBatch { .. } => FailureKind::Transient,
        }
    }

    /// Shorthand for `kind() == FailureKind::Transient`
    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}

/// Errors that can occur when loading or persisting a glossary, translation
/// memory or MT cache
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store file exists but cannot be parsed; history must not be discarded
    #[error("Store at {path:?} exists but is unreadable: {reason}")]
    Corrupt {
        /// Path of the damaged file
        path: PathBuf,
        /// Parser or I/O message
        reason: String,
    },

    /// Reading or writing the store file failed
    #[error("Store I/O error at {path:?}: {source}")]
    Io {
        /// Path of the file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Serializing the in-memory store failed
    #[error("Failed to serialize store: {0}")]
    Serialize(String),
}

/// Errors raised by document sources and sinks
#[derive(Error, Debug)]
pub enum DocumentError {
    /// Reading or writing the document failed
    #[error("Document I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A segment index outside the document was written
    #[error("Segment index {index} out of range (document has {len} segments)")]
    IndexOutOfRange {
        /// Offending index
        index: usize,
        /// Number of segments in the document
        len: usize,
    },

    /// Finishing a document with segments that were never written
    #[error("Segment {0} was never written")]
    MissingSegment(usize),
}

/// Errors that abort a pipeline run as a whole
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Persisted state could not be loaded or flushed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The document source or sink failed
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Invalid pipeline settings
    #[error("Invalid pipeline configuration: {0}")]
    Config(String),
}
