//! Errors that abort a run.
//!
//! Artifact defects and collaborator outages are not errors here: they are
//! failed attempts charged against the retry budget. Only conditions that no
//! retry can fix end up in [`OrchestratorError`].

use coordination::CoordinationError;
use thiserror::Error;

use crate::state_machine::IllegalTransition;

/// Longest slice of a producer response kept in a parse error.
const EXCERPT_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Neither run state nor the producer response names an artifact.
    #[error("Could not determine artifact id from run state or producer response: {response_excerpt:?}")]
    ParseFailure { response_excerpt: String },

    /// Topic or description vanished before repair; an upstream defect.
    #[error(
        "Missing task metadata before repairing {artifact_id}: topic={topic:?}, description={description:?}"
    )]
    MissingMetadata {
        artifact_id: String,
        topic: String,
        description: String,
    },

    /// The loop tried an edge the lifecycle graph does not allow.
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    /// Invalid seed or configuration detected at run start.
    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}

impl OrchestratorError {
    pub fn parse_failure(response: &str) -> Self {
        Self::ParseFailure {
            response_excerpt: response.chars().take(EXCERPT_CHARS).collect(),
        }
    }
}
