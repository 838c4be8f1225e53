//! Coordination error types
//!
//! Infrastructure failures only. A structurally broken artifact or a failing
//! test suite is a normal verdict, never an error.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Errors that can occur while checking, deciding on, or quarantining artifacts
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// Artifact id was empty or tried to escape the artifacts root
    #[error("Invalid artifact id: {id:?}")]
    InvalidArtifactId { id: String },

    /// Retry budget must allow at least one attempt
    #[error("Invalid retry budget: max_retries must be greater than zero")]
    InvalidRetryBudget,

    /// Relocating the artifact or writing the failure report failed
    #[error("Quarantine failed at {path}: {message}")]
    QuarantineIo { path: PathBuf, message: String },

    /// Check command could not be parsed into argv
    #[error("Invalid check command: {command:?}")]
    InvalidCommand { command: String },

    /// Check command could not be started
    #[error("Failed to spawn `{command}`: {message}")]
    CommandSpawn { command: String, message: String },

    /// Check command exceeded its time budget
    #[error("`{command}` timed out after {secs}s")]
    CommandTimeout { command: String, secs: u64 },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoordinationError {
    /// Create an invalid artifact id error
    pub fn invalid_artifact_id(id: impl Into<String>) -> Self {
        Self::InvalidArtifactId { id: id.into() }
    }

    /// Create a quarantine IO error
    pub fn quarantine(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::QuarantineIo {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoordinationError::quarantine("/tmp/q/001_x", "permission denied");
        assert_eq!(
            err.to_string(),
            "Quarantine failed at /tmp/q/001_x: permission denied"
        );

        let err = CoordinationError::CommandTimeout {
            command: "pytest".into(),
            secs: 30,
        };
        assert_eq!(err.to_string(), "`pytest` timed out after 30s");
    }
}
