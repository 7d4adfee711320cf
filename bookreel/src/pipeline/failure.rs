//! Chunk failure records.
//!
//! A failed chunk never stops the book run: it is recorded here and left out
//! of the final video.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::HardFailure;
use crate::events::iso_timestamp;
use crate::retry::RetryOutcome;

/// The five steps a chunk goes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Scene analysis.
    Analyze,
    /// Image generation.
    Illustrate,
    /// Speech synthesis.
    Narrate,
    /// Transcription into captions.
    Caption,
    /// Video composition.
    Assemble,
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ALL: [Self; 5] = [
        Self::Analyze,
        Self::Illustrate,
        Self::Narrate,
        Self::Caption,
        Self::Assemble,
    ];

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Illustrate => "illustrate",
            Self::Narrate => "narrate",
            Self::Caption => "caption",
            Self::Assemble => "assemble",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Every attempt hit a quota or rate limit.
    Soft {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },
    /// A non-capacity error, not retried.
    Hard {
        /// Attempts made.
        attempts: u32,
        /// The error.
        error: String,
    },
    /// A reply could not be parsed.
    Parse {
        /// Parser message.
        message: String,
    },
    /// A local file operation failed.
    Io {
        /// IO error message.
        message: String,
    },
}

impl FailureKind {
    /// Converts a governor result into a value or a failure kind.
    pub fn from_governed<T>(result: Result<RetryOutcome<T>, HardFailure>) -> Result<T, Self> {
        match result {
            Ok(RetryOutcome::Success { value, .. }) => Ok(value),
            Ok(RetryOutcome::Exhausted {
                attempts,
                last_error,
            }) => Err(Self::Soft {
                attempts,
                last_error: last_error.to_string(),
            }),
            Err(HardFailure { error, attempts }) => Err(Self::Hard {
                attempts,
                error: error.to_string(),
            }),
        }
    }

    /// Creates a parse failure.
    #[must_use]
    pub fn parse(message: impl fmt::Display) -> Self {
        Self::Parse {
            message: message.to_string(),
        }
    }

    /// Creates an IO failure.
    #[must_use]
    pub fn io(err: &std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }

    /// Returns the kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Soft { .. } => "soft",
            Self::Hard { .. } => "hard",
            Self::Parse { .. } => "parse",
            Self::Io { .. } => "io",
        }
    }

    /// Returns true when retries ran out on capacity errors.
    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(self, Self::Soft { .. })
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soft {
                attempts,
                last_error,
            } => write!(f, "gave up after {attempts} attempt(s): {last_error}"),
            Self::Hard { attempts, error } => {
                write!(f, "failed on attempt {attempts}: {error}")
            }
            Self::Parse { message } => write!(f, "unparseable reply: {message}"),
            Self::Io { message } => write!(f, "file error: {message}"),
        }
    }
}

/// A chunk that was left out of the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedChunk {
    /// Chunk index.
    pub index: usize,
    /// Stage that failed.
    pub stage: PipelineStage,
    /// Failure details.
    pub failure: FailureKind,
    /// When the failure was recorded.
    pub timestamp: String,
}

impl SkippedChunk {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(index: usize, stage: PipelineStage, failure: FailureKind) -> Self {
        Self {
            index,
            stage,
            failure,
            timestamp: iso_timestamp(),
        }
    }
}

/// Collects chunk outcomes during a book run.
#[derive(Debug, Default)]
pub struct FailureCollector {
    completed: Vec<usize>,
    skipped: Vec<SkippedChunk>,
}

impl FailureCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed chunk.
    pub fn record_failure(&mut self, record: SkippedChunk) {
        self.skipped.push(record);
    }

    /// Records a completed chunk.
    pub fn record_completion(&mut self, index: usize) {
        self.completed.push(index);
    }

    /// Fraction of `total` chunks that completed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        self.completed.len() as f64 / total as f64
    }

    /// Consumes the collector.
    #[must_use]
    pub fn into_parts(self) -> (Vec<usize>, Vec<SkippedChunk>) {
        (self.completed, self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CapabilityError;

    #[test]
    fn test_stage_order() {
        let names: Vec<_> = PipelineStage::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, ["analyze", "illustrate", "narrate", "caption", "assemble"]);
    }

    #[test]
    fn test_from_governed() {
        let ok: Result<RetryOutcome<u8>, HardFailure> =
            Ok(RetryOutcome::Success { value: 7, attempts: 1 });
        assert_eq!(FailureKind::from_governed(ok), Ok(7));

        let soft: Result<RetryOutcome<u8>, HardFailure> = Ok(RetryOutcome::Exhausted {
            attempts: 10,
            last_error: CapabilityError::quota("insufficient_quota"),
        });
        let kind = FailureKind::from_governed(soft).unwrap_err();
        assert!(kind.is_soft());
        assert_eq!(kind.as_str(), "soft");

        let hard: Result<RetryOutcome<u8>, HardFailure> = Err(HardFailure {
            error: CapabilityError::other("bad request"),
            attempts: 1,
        });
        assert_eq!(
            FailureKind::from_governed(hard),
            Err(FailureKind::Hard {
                attempts: 1,
                error: "bad request".to_string()
            })
        );
    }

    #[test]
    fn test_failure_kind_serialization() {
        let json = serde_json::to_value(FailureKind::parse("missing field `mood`")).unwrap();
        assert_eq!(json["kind"], "parse");
        assert_eq!(json["message"], "missing field `mood`");
    }

    #[test]
    fn test_collector() {
        let mut collector = FailureCollector::new();
        collector.record_completion(1);
        collector.record_completion(2);
        collector.record_failure(SkippedChunk::new(
            3,
            PipelineStage::Analyze,
            FailureKind::parse("bad"),
        ));
        collector.record_completion(4);

        assert!((collector.success_rate(4) - 0.75).abs() < 1e-9);
        assert_eq!(collector.success_rate(0), 0.0);

        let (completed, skipped) = collector.into_parts();
        assert_eq!(completed, vec![1, 2, 4]);
        assert_eq!(skipped[0].stage, PipelineStage::Analyze);
    }
}
