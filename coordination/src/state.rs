//! Run-scoped state carried across the retry loop.
//!
//! One `RunState` per run, owned by the orchestrator and never shared between
//! runs. It survives the loop-back edge from repair to generation so metadata
//! and the pinned artifact id never depend on a collaborator echoing them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::artifact::ArtifactId;
use crate::error::{CoordinationError, CoordinationResult};
use crate::verdict::{TaskMetadata, TestVerdict, ValidationVerdict};

/// Caller-supplied seed for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSeed {
    /// Pinned artifact id, if the caller already knows it.
    pub artifact_id: Option<ArtifactId>,
    pub metadata: TaskMetadata,
    pub max_retries: u32,
    /// Explicit first-attempt generation prompt. Built from metadata when absent.
    #[serde(default)]
    pub prompt: Option<String>,
}

impl RunSeed {
    pub fn new(
        artifact_id: Option<ArtifactId>,
        metadata: TaskMetadata,
        max_retries: u32,
    ) -> CoordinationResult<Self> {
        if max_retries == 0 {
            return Err(CoordinationError::InvalidRetryBudget);
        }
        Ok(Self {
            artifact_id,
            metadata,
            max_retries,
            prompt: None,
        })
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// Run-scoped store of metadata, retry bookkeeping and latest verdicts.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    run_id: Uuid,
    artifact_id: Option<ArtifactId>,
    metadata: TaskMetadata,
    retry_count: u32,
    max_retries: u32,
    validations: HashMap<ArtifactId, ValidationVerdict>,
    tests: HashMap<ArtifactId, TestVerdict>,
    raw_outputs: HashMap<ArtifactId, String>,
    failure_reasons: HashMap<ArtifactId, Vec<String>>,
}

impl RunState {
    /// Seed a fresh run with `retry_count = 0`.
    pub fn new(seed: &RunSeed) -> Self {
        let run_id = Uuid::new_v4();
        debug!(%run_id, artifact_id = ?seed.artifact_id, topic = %seed.metadata.topic, "run state seeded");
        Self {
            run_id,
            artifact_id: seed.artifact_id.clone(),
            metadata: seed.metadata.clone(),
            retry_count: 0,
            max_retries: seed.max_retries.max(1),
            validations: HashMap::new(),
            tests: HashMap::new(),
            raw_outputs: HashMap::new(),
            failure_reasons: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The artifact id pinned for this run, if any.
    pub fn artifact_id(&self) -> Option<&ArtifactId> {
        self.artifact_id.as_ref()
    }

    /// Pin the artifact id. The first pinned id wins; later calls are ignored
    /// so retries can never drift to a different artifact.
    pub fn pin_artifact_id(&mut self, id: ArtifactId) -> &ArtifactId {
        if self.artifact_id.is_none() {
            debug!(run_id = %self.run_id, artifact_id = %id, "artifact id pinned");
        }
        self.artifact_id.get_or_insert(id)
    }

    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Replace the latest validation verdict for its artifact.
    pub fn record_validation(&mut self, verdict: ValidationVerdict) {
        self.validations.insert(verdict.artifact_id.clone(), verdict);
    }

    pub fn latest_validation(&self, id: &ArtifactId) -> Option<&ValidationVerdict> {
        self.validations.get(id)
    }

    /// Replace the latest test verdict for its artifact.
    ///
    /// Raw output is replaced only when the new verdict carries some, so a
    /// collaborator crash does not erase the last captured output.
    pub fn record_test(&mut self, verdict: TestVerdict) {
        if let Some(raw) = &verdict.raw_output {
            self.raw_outputs
                .insert(verdict.artifact_id.clone(), raw.clone());
        }
        self.tests.insert(verdict.artifact_id.clone(), verdict);
    }

    pub fn latest_test(&self, id: &ArtifactId) -> Option<&TestVerdict> {
        self.tests.get(id)
    }

    pub fn raw_output(&self, id: &ArtifactId) -> Option<&str> {
        self.raw_outputs.get(id).map(String::as_str)
    }

    /// Record a failed attempt: stores its reasons and increments the retry
    /// count by exactly one. Returns the new count.
    pub fn record_failure(&mut self, id: &ArtifactId, reasons: Vec<String>) -> u32 {
        self.retry_count += 1;
        self.failure_reasons.insert(id.clone(), reasons);
        debug!(
            run_id = %self.run_id,
            artifact_id = %id,
            retry_count = self.retry_count,
            max_retries = self.max_retries,
            "failure recorded"
        );
        self.retry_count
    }

    pub fn failure_reasons(&self, id: &ArtifactId) -> Option<&[String]> {
        self.failure_reasons.get(id).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactLocation;
    use crate::verdict::TestOutcome;
    use std::path::PathBuf;

    fn seed() -> RunSeed {
        RunSeed::new(
            Some(ArtifactId::new("003_volumes").unwrap()),
            TaskMetadata {
                topic: "Volumes".into(),
                description: "Persistent storage".into(),
                difficulty: "BEGINNER".into(),
                objective: "Mount a volume".into(),
            },
            3,
        )
        .unwrap()
    }

    fn loc() -> ArtifactLocation {
        ArtifactLocation {
            id: ArtifactId::new("003_volumes").unwrap(),
            path: PathBuf::from("/tmp/a/003_volumes"),
        }
    }

    #[test]
    fn test_seed_rejects_zero_budget() {
        let err = RunSeed::new(None, TaskMetadata::default(), 0).unwrap_err();
        assert!(matches!(err, CoordinationError::InvalidRetryBudget));
    }

    #[test]
    fn test_new_state_starts_at_zero() {
        let state = RunState::new(&seed());
        assert_eq!(state.retry_count(), 0);
        assert_eq!(state.max_retries(), 3);
        assert_eq!(state.metadata().topic, "Volumes");
        assert_eq!(state.artifact_id().unwrap().as_str(), "003_volumes");
    }

    #[test]
    fn test_pinned_id_is_not_replaced() {
        let mut state = RunState::new(&seed());
        let pinned = state
            .pin_artifact_id(ArtifactId::new("999_other").unwrap())
            .clone();
        assert_eq!(pinned.as_str(), "003_volumes");
    }

    #[test]
    fn test_record_failure_is_strictly_monotonic() {
        let mut state = RunState::new(&seed());
        let id = ArtifactId::new("003_volumes").unwrap();
        let counts: Vec<u32> = (0..4)
            .map(|i| state.record_failure(&id, vec![format!("attempt {i}")]))
            .collect();
        assert_eq!(counts, vec![1, 2, 3, 4]);
        assert_eq!(state.failure_reasons(&id).unwrap(), ["attempt 3"]);
    }

    #[test]
    fn test_later_verdict_supersedes_earlier() {
        let mut state = RunState::new(&seed());
        let l = loc();
        state.record_validation(ValidationVerdict::new(&l, false, "missing files"));
        state.record_validation(ValidationVerdict::new(&l, true, "ok"));
        assert!(state.latest_validation(&l.id).unwrap().valid);
    }

    #[test]
    fn test_missing_raw_output_keeps_previous_capture() {
        let mut state = RunState::new(&seed());
        let l = loc();
        state.record_test(TestVerdict::new(
            &l,
            TestOutcome::Failed,
            "assertion failed",
            Some("E   assert 1 == 2".into()),
        ));
        state.record_test(TestVerdict::collaborator_error(&l, "runner crashed"));
        assert_eq!(state.raw_output(&l.id), Some("E   assert 1 == 2"));
        assert_eq!(
            state.latest_test(&l.id).unwrap().outcome,
            TestOutcome::CollaboratorError
        );
    }

    #[test]
    fn test_empty_raw_output_is_recorded() {
        let mut state = RunState::new(&seed());
        let l = loc();
        state.record_test(TestVerdict::new(&l, TestOutcome::Passed, "ok", Some(String::new())));
        assert_eq!(state.raw_output(&l.id), Some(""));
    }
}
