//! Negative verification: re-run the checks with the solution withheld and
//! confirm the final check step actually fails.

use coordination::{
    ArtifactLayout, ArtifactLocation, SolutionSuppression, StepStatus, TestMode, TestOutcome,
    TestRunnerAdapter, TestVerdict,
};
use tracing::{info, warn};

/// Result of negative verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegativeOutcome {
    /// The check step failed without the solution, as it should.
    Meaningful,
    /// The checks did not fail. Carries the failing verdict to feed back into
    /// the decision engine.
    Vacuous(TestVerdict),
}

/// Judge a suppressed-mode verdict.
///
/// With per-step results, only the check step matters: it must be reported
/// and must have failed. Without per-step results, the run as a whole must
/// have failed.
pub fn judge(
    verdict: TestVerdict,
    layout: &ArtifactLayout,
    suppression: &SolutionSuppression,
) -> NegativeOutcome {
    if !verdict.steps.is_empty() {
        match verdict.step_status(&layout.solution_step) {
            Some(StepStatus::Skipped) | None => {}
            Some(status) => warn!(
                artifact_id = %verdict.artifact_id,
                step = %layout.solution_step,
                %status,
                "solution step was not skipped with the solution withheld"
            ),
        }
    }

    let check_failed = if verdict.steps.is_empty() {
        verdict.outcome == TestOutcome::Failed
    } else {
        verdict.step_status(&layout.check_step) == Some(StepStatus::Failed)
    };

    if check_failed {
        return NegativeOutcome::Meaningful;
    }

    let reason = format!(
        "{} did not fail when solution was withheld ({}={})",
        layout.check_step, suppression.env_var, suppression.value
    );
    let steps = verdict.steps.clone();
    let location = ArtifactLocation {
        id: verdict.artifact_id.clone(),
        path: verdict.location.clone(),
    };
    let raw = verdict.raw_output.clone();
    NegativeOutcome::Vacuous(
        TestVerdict::new(&location, TestOutcome::Vacuous, reason, raw).with_steps(steps),
    )
}

/// Run the checks in solution-suppressed mode and judge the result.
///
/// Infrastructure errors propagate; the caller charges them as a failed
/// attempt.
pub async fn verify_checks_are_meaningful(
    runner: &TestRunnerAdapter,
    location: &ArtifactLocation,
    layout: &ArtifactLayout,
    suppression: &SolutionSuppression,
) -> anyhow::Result<NegativeOutcome> {
    let verdict = runner.run(location, TestMode::SolutionSuppressed).await?;
    let outcome = judge(verdict, layout, suppression);
    match &outcome {
        NegativeOutcome::Meaningful => {
            info!(artifact_id = %location.id, "checks fail without the solution")
        }
        NegativeOutcome::Vacuous(v) => {
            warn!(artifact_id = %location.id, reason = %v.reason, "vacuous checks")
        }
    }
    Ok(outcome)
}
