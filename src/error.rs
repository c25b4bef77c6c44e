use std::path::PathBuf;
use thiserror::Error;

/// Failure categories that callers need to tell apart.
///
/// Step failures and locator misses are not errors at this level: they are
/// reported through `ScenarioResult` and `LocateOutcome`.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Malformed instruction, missing parameter or unusable input file
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("scenario '{0}' not found")]
    ScenarioNotFound(String),

    /// An optional backend (OCR, UI tree, input tools) is absent
    #[error("{backend} is unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },

    #[error("failed to access {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("another suite run is in progress (pid {0})")]
    RunInProgress(u32),
}

impl HarnessError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
        HarnessError::Unavailable {
            backend,
            reason: reason.into(),
        }
    }
}
