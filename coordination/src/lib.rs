//! Artifact Coordination Library
//!
//! Deterministic core of the artifact lifecycle, with no model calls:
//! - Artifact identity and on-disk location
//! - Validation and test verdicts, plus the adapters that produce them
//! - Concrete file-structure validator and command-based test runner
//! - Run-scoped state carried across retries
//! - Decision engine enforcing the retry budget
//! - Quarantine area with durable failure reports
//!
//! The generation side (model-backed generator and fixer, the orchestrator
//! loop) lives in the `forge-agents` crate and drives these pieces.

#![allow(clippy::uninlined_format_args)]

pub mod artifact;
pub mod checks;
pub mod decision;
pub mod error;
pub mod quarantine;
pub mod state;
pub mod verdict;

pub use artifact::{ArtifactId, ArtifactLocation, ArtifactStore};
pub use checks::command::{CommandRunnerConfig, SolutionSuppression};
pub use checks::{
    ArtifactLayout, CommandTestRunner, FileStructureValidator, TestMode, TestRun, TestRunner,
    TestRunnerAdapter, ValidationDetail, ValidationReport, Validator, ValidatorAdapter,
};
pub use decision::{decide, select_action, select_loop_action, Action, LoopAction};
pub use error::{CoordinationError, CoordinationResult};
pub use quarantine::{FailureReport, QuarantineArea, QuarantineRequest};
pub use state::{RunSeed, RunState};
pub use verdict::{
    CombinedResult, StepOutcome, StepStatus, TaskMetadata, TestOutcome, TestVerdict,
    ValidationVerdict,
};
