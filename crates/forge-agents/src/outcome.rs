use std::fmt;
use std::path::PathBuf;

use coordination::{ArtifactId, CombinedResult};
use serde::{Deserialize, Serialize};

use crate::state_machine::TransitionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Quarantined,
}

/// Terminal result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub artifact_id: ArtifactId,
    pub status: RunStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Decision that ended the run.
    #[serde(rename = "final")]
    pub final_result: CombinedResult,
    pub quarantine_path: Option<PathBuf>,
    /// Set when relocation or report writing failed.
    pub quarantine_error: Option<String>,
    pub transitions: Vec<TransitionRecord>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            RunStatus::Succeeded => write!(
                f,
                "Artifact {} kept after {} retries",
                self.artifact_id, self.retry_count
            ),
            RunStatus::Quarantined => {
                write!(
                    f,
                    "Artifact {} failed after {}/{} retries",
                    self.artifact_id, self.retry_count, self.max_retries
                )?;
                match (&self.quarantine_path, &self.quarantine_error) {
                    (Some(path), _) => write!(f, ", quarantined at {}", path.display()),
                    (None, Some(err)) => write!(f, ", quarantine failed: {err}"),
                    (None, None) => Ok(()),
                }
            }
        }
    }
}
