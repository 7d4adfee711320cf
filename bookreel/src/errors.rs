//! Error types for bookreel.
//!
//! Capability adapters report failures as [`CapabilityError`], whose variants
//! carry the retry classification: capacity exhaustion (quota or rate limit)
//! is recoverable by waiting, everything else is not. Orchestration-level
//! failures surface as [`BookreelError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why an external service refused a call for capacity reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityReason {
    /// The account quota or credit balance is exhausted.
    Quota,
    /// The request rate limit was exceeded.
    RateLimit,
}

impl CapacityReason {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quota => "quota",
            Self::RateLimit => "rate_limit",
        }
    }
}

impl fmt::Display for CapacityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by an external capability (scene analysis, TTS, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The service refused the call because a quota or rate limit was hit.
    #[error("capacity exhausted ({reason}): {message}")]
    CapacityExhausted {
        /// Whether a quota or a rate limit was hit.
        reason: CapacityReason,
        /// Message reported by the service.
        message: String,
    },

    /// Any other failure.
    #[error("{message}")]
    Other {
        /// Description of the failure.
        message: String,
    },
}

impl CapabilityError {
    /// Creates a quota-exceeded error.
    #[must_use]
    pub fn quota(message: impl Into<String>) -> Self {
        Self::CapacityExhausted {
            reason: CapacityReason::Quota,
            message: message.into(),
        }
    }

    /// Creates a rate-limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::CapacityExhausted {
            reason: CapacityReason::RateLimit,
            message: message.into(),
        }
    }

    /// Creates a non-capacity error.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Returns true for quota and rate-limit failures.
    #[must_use]
    pub const fn is_capacity_exhausted(&self) -> bool {
        matches!(self, Self::CapacityExhausted { .. })
    }

    /// Returns the capacity reason, if any.
    #[must_use]
    pub const fn capacity_reason(&self) -> Option<CapacityReason> {
        match self {
            Self::CapacityExhausted { reason, .. } => Some(*reason),
            Self::Other { .. } => None,
        }
    }
}

impl From<std::io::Error> for CapabilityError {
    fn from(err: std::io::Error) -> Self {
        Self::other(format!("IO error: {err}"))
    }
}

/// A non-capacity error that stopped an operation without retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct HardFailure {
    /// The error raised by the operation.
    pub error: CapabilityError,
    /// Attempts made, including the failing one.
    pub attempts: u32,
}

/// The main error type for bookreel operations.
#[derive(Debug, Error)]
pub enum BookreelError {
    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A chunk size of zero was requested.
    #[error("Invalid chunk size {0}: must be at least 1 character")]
    InvalidChunkSize(usize),

    /// No chunk produced a video, so there is nothing to concatenate.
    #[error("No video segments produced for '{title}' ({skipped} of {total} chunks skipped)")]
    NothingToAssemble {
        /// Book title.
        title: String,
        /// Number of chunks in the book.
        total: usize,
        /// Number of chunks that failed.
        skipped: usize,
    },

    /// The book text could not be fetched.
    #[error("Failed to fetch source text: {0}")]
    Source(String),

    /// Concatenating the chunk videos failed.
    #[error("Failed to concatenate video segments: {0}")]
    Compositor(#[source] CapabilityError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for bookreel operations.
pub type Result<T, E = BookreelError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_classification() {
        assert!(CapabilityError::quota("insufficient_quota").is_capacity_exhausted());
        assert!(CapabilityError::rate_limited("slow down").is_capacity_exhausted());
        assert!(!CapabilityError::other("bad request").is_capacity_exhausted());

        assert_eq!(
            CapabilityError::quota("x").capacity_reason(),
            Some(CapacityReason::Quota)
        );
        assert_eq!(CapabilityError::other("x").capacity_reason(), None);
    }

    #[test]
    fn test_capability_error_display() {
        let err = CapabilityError::rate_limited("Too many requests");
        assert_eq!(err.to_string(), "capacity exhausted (rate_limit): Too many requests");

        let err = CapabilityError::other("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_hard_failure_display() {
        let failure = HardFailure {
            error: CapabilityError::other("invalid prompt"),
            attempts: 1,
        };
        assert_eq!(failure.to_string(), "invalid prompt (after 1 attempt(s))");
    }

    #[test]
    fn test_io_error_converts_to_other() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = CapabilityError::from(io);
        assert!(!err.is_capacity_exhausted());
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_nothing_to_assemble_display() {
        let err = BookreelError::NothingToAssemble {
            title: "Emma".to_string(),
            total: 3,
            skipped: 3,
        };
        assert!(err.to_string().contains("3 of 3 chunks skipped"));
    }
}
