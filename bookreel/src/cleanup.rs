//! Best-effort removal of intermediate files.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

/// A file that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    /// The file that was left behind.
    pub path: PathBuf,
    /// Why removal failed.
    pub error: String,
}

/// Registry of files to delete once a run no longer needs them.
///
/// Files are removed in LIFO order. Missing files are not failures.
#[derive(Default)]
pub struct CleanupRegistry {
    paths: RwLock<Vec<PathBuf>>,
}

impl CleanupRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers several files.
    pub fn register_all<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.paths.write().extend(paths.into_iter().map(Into::into));
    }

    /// Deletes every registered file and empties the registry.
    ///
    /// Failures are collected and logged; they never stop the remaining
    /// removals.
    pub async fn run_all(&self) -> Vec<CleanupFailure> {
        let paths = std::mem::take(&mut *self.paths.write());
        let mut failures = Vec::new();

        for path in paths.into_iter().rev() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed intermediate file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove intermediate file");
                    failures.push(CleanupFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        failures
    }

    /// Returns the number of pending files.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.paths.read().len()
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}
