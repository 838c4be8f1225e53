//! Decision Engine: combines the latest verdicts into keep/retry/quarantine.
//!
//! Everything here is pure. The orchestrator owns all mutation of
//! [`RunState`]; this module only reads it.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::RunState;
use crate::verdict::{CombinedResult, TestVerdict, ValidationVerdict};

/// Outcome of the keep/fail branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Keep,
    Fail,
}

/// Outcome of the budget check after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopAction {
    Repair,
    Terminate,
}

/// Build a fresh [`CombinedResult`] for the artifact the test verdict names.
///
/// The validation verdict comes from `state`. If none was recorded for this
/// artifact, an assumed pass is substituted and flagged as such.
pub fn decide(test: TestVerdict, state: &RunState) -> CombinedResult {
    let validation = match state.latest_validation(&test.artifact_id) {
        Some(v) => v.clone(),
        None => {
            warn!(
                artifact_id = %test.artifact_id,
                "no validation verdict recorded, assuming pass"
            );
            ValidationVerdict::assumed(&test.artifact_id, test.location.clone())
        }
    };

    CombinedResult {
        validation,
        test,
        retry_count: state.retry_count(),
        max_retries: state.max_retries(),
        metadata: state.metadata().clone(),
    }
}

pub fn select_action(combined: &CombinedResult) -> Action {
    if combined.should_keep() {
        Action::Keep
    } else {
        Action::Fail
    }
}

pub fn select_loop_action(combined: &CombinedResult) -> LoopAction {
    if combined.should_retry() {
        LoopAction::Repair
    } else {
        LoopAction::Terminate
    }
}
