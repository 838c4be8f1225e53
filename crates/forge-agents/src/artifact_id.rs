//! Resolve which artifact a producer worked on.
//!
//! Fallback order:
//! 1. the id already pinned in run state,
//! 2. the `artifact_id` field of a structured reply,
//! 3. a `<artifacts_dir>/<id>` path mentioned in the reply text,
//! 4. any bare `NNN_name` token in the reply text.
//!
//! Nothing else in the crate inspects producer text for ids.

use std::sync::LazyLock;

use coordination::ArtifactId;
use regex::Regex;
use tracing::{debug, warn};

use crate::agents::CollaboratorResponse;
use crate::error::OrchestratorError;

static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{3}_[a-z0-9_]+)").unwrap());

/// Which fallback produced the id. Logged for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    Pinned,
    Structured,
    Path,
    Bare,
}

pub fn resolve_artifact_id(
    pinned: Option<&ArtifactId>,
    response: &CollaboratorResponse,
    artifacts_dir_name: &str,
) -> Result<(ArtifactId, IdSource), OrchestratorError> {
    if let Some(id) = pinned {
        if let Some(reported) = response.artifact_id.as_deref() {
            if reported != id.as_str() {
                warn!(
                    pinned = %id,
                    reported,
                    "producer reported a different artifact id; keeping pinned id"
                );
            }
        }
        return Ok((id.clone(), IdSource::Pinned));
    }

    if let Some(id) = response
        .artifact_id
        .as_deref()
        .and_then(|s| ArtifactId::new(s).ok())
    {
        debug!(artifact_id = %id, "artifact id from structured reply");
        return Ok((id, IdSource::Structured));
    }

    if let Some(id) = scan_path(&response.text, artifacts_dir_name) {
        return Ok((id, IdSource::Path));
    }

    if let Some(id) = BARE_ID
        .captures(&response.text)
        .and_then(|c| ArtifactId::new(&c[1]).ok())
    {
        return Ok((id, IdSource::Bare));
    }

    Err(OrchestratorError::parse_failure(&response.text))
}

fn scan_path(text: &str, artifacts_dir_name: &str) -> Option<ArtifactId> {
    if artifacts_dir_name.is_empty() {
        return None;
    }
    let pattern = format!(r"{}/(\d{{3}}_[a-z0-9_]+)", regex::escape(artifacts_dir_name));
    let re = Regex::new(&pattern).ok()?;
    re.captures(text).and_then(|c| ArtifactId::new(&c[1]).ok())
}
