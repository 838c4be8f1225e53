//! Pass/fail verdicts, produced once per check call.
//!
//! A verdict is immutable once built. Each retry produces a fresh verdict that
//! replaces the previous one in [`RunState`](crate::state::RunState); nothing
//! is appended.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactId, ArtifactLocation};

/// Reason attached to a validation verdict that was never actually produced.
pub const ASSUMED_VALIDATION_REASON: &str = "Validation passed (assumed)";

/// Structural verdict from the Validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub reason: String,
    pub artifact_id: ArtifactId,
    pub location: PathBuf,
    /// True when no validation ran and a pass was assumed.
    #[serde(default)]
    pub assumed: bool,
}

impl ValidationVerdict {
    pub fn new(location: &ArtifactLocation, valid: bool, reason: impl Into<String>) -> Self {
        Self {
            valid,
            reason: reason.into(),
            artifact_id: location.id.clone(),
            location: location.path.clone(),
            assumed: false,
        }
    }

    /// Stand-in pass for entry points that skipped explicit validation.
    ///
    /// Flagged so the assumption shows up in decisions and failure reports.
    pub fn assumed(artifact_id: &ArtifactId, location: impl Into<PathBuf>) -> Self {
        Self {
            valid: true,
            reason: ASSUMED_VALIDATION_REASON.to_string(),
            artifact_id: artifact_id.clone(),
            location: location.into(),
            assumed: true,
        }
    }
}

/// Classification of a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// The runner reported a clean success signal.
    Passed,
    /// Checks executed and at least one failed.
    Failed,
    /// The runner executed no checks at all. Usually a structural problem.
    NoChecksExecuted,
    /// The final check passed even with the solution withheld.
    Vacuous,
    /// The runner could not be reached or crashed.
    CollaboratorError,
}

impl std::fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::NoChecksExecuted => write!(f, "no_checks_executed"),
            Self::Vacuous => write!(f, "vacuous"),
            Self::CollaboratorError => write!(f, "collaborator_error"),
        }
    }
}

/// Per-step status parsed from runner output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Outcome of one named verification step (e.g. `test_05_check.py`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    pub status: StepStatus,
}

/// Execution verdict from the TestRunner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVerdict {
    pub valid: bool,
    pub outcome: TestOutcome,
    pub reason: String,
    pub artifact_id: ArtifactId,
    pub location: PathBuf,
    /// Verbatim runner output. `None` means no output was captured at all,
    /// which is not the same as an empty output from a passing run.
    pub raw_output: Option<String>,
    /// Steps the runner reported, in step-name order. Empty when the output
    /// named no steps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepOutcome>,
}

impl TestVerdict {
    /// Build a verdict; `valid` is derived from the outcome.
    pub fn new(
        location: &ArtifactLocation,
        outcome: TestOutcome,
        reason: impl Into<String>,
        raw_output: Option<String>,
    ) -> Self {
        Self {
            valid: outcome == TestOutcome::Passed,
            outcome,
            reason: reason.into(),
            artifact_id: location.id.clone(),
            location: location.path.clone(),
            raw_output,
            steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<StepOutcome>) -> Self {
        self.steps = steps;
        self
    }

    /// Status of the named step, if the runner reported it.
    pub fn step_status(&self, step: &str) -> Option<StepStatus> {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .map(|s| s.status)
    }

    /// Failed verdict for an unreachable or crashed collaborator.
    pub fn collaborator_error(location: &ArtifactLocation, error: impl std::fmt::Display) -> Self {
        Self::new(
            location,
            TestOutcome::CollaboratorError,
            format!("collaborator error: {error}"),
            None,
        )
    }
}

/// Free-text task metadata threaded through every attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub topic: String,
    pub description: String,
    pub difficulty: String,
    pub objective: String,
}

/// Both verdicts plus retry bookkeeping, rebuilt fresh at every decision point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedResult {
    pub validation: ValidationVerdict,
    pub test: TestVerdict,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(flatten)]
    pub metadata: TaskMetadata,
}

impl CombinedResult {
    /// Keep the artifact only if both checks passed.
    pub fn should_keep(&self) -> bool {
        self.validation.valid && self.test.valid
    }

    /// Retry only a failed artifact with budget left.
    pub fn should_retry(&self) -> bool {
        !self.should_keep() && self.retry_count < self.max_retries
    }

    pub fn artifact_id(&self) -> &ArtifactId {
        &self.test.artifact_id
    }

    /// Human-readable failure causes, validation first.
    pub fn failure_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if !self.validation.valid {
            reasons.push(format!("Validation failed: {}", self.validation.reason));
        }
        if !self.test.valid {
            reasons.push(format!("Tests failed: {}", self.test.reason));
        }
        reasons
    }

    /// Copy with an updated retry count (used when a failure is recorded).
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}
