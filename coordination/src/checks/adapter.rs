//! Adapters from raw collaborator results to verdicts.
//!
//! This is the only place that inspects collaborator free text. Everything
//! downstream works on [`ValidationVerdict`] and [`TestVerdict`].

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactLocation;
use crate::checks::{TestMode, TestRun, TestRunner, ValidationReport, Validator};
use crate::verdict::{StepOutcome, StepStatus, TestOutcome, TestVerdict, ValidationVerdict};

/// Maximum number of failure causes spelled out in a validation reason.
pub const MAX_LISTED_FAILURES: usize = 3;

/// Detail reasons that are bookkeeping entries, never failure causes.
const BOOKKEEPING_REASONS: &[&str] = &["Validation completed", "Directory listing"];

const NO_CHECKS_MARKERS: &[&str] = &["no tests collected", "no tests ran", "collected 0 items"];

/// `path/test_05_check.py::test_name PASSED`
static VERBOSE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<file>[\w./-]*?test_\w+\.py)(?:::\S+)?\s+(?P<status>PASSED|FAILED|ERROR|SKIPPED|XFAIL|XPASS)\b")
        .unwrap()
});

/// `FAILED path/test_05_check.py::test_name - AssertionError`
/// `SKIPPED [1] path/test_03_answer.py:12: reason`
static SUMMARY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<status>PASSED|FAILED|ERROR|SKIPPED|XFAIL|XPASS)\s+(?:\[\d+\]\s+)?(?P<file>[\w./-]*?test_\w+\.py)")
        .unwrap()
});

/// `path/test_05_check.py .F.s`
static SHORT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>[\w./-]*?test_\w+\.py)\s+(?P<chars>[.FEsxX]+)(?:\s+\[\s*\d+%\])?\s*$").unwrap()
});

/// Wraps a [`Validator`] so that every call yields a verdict.
#[derive(Clone)]
pub struct ValidatorAdapter {
    inner: Arc<dyn Validator>,
}

impl ValidatorAdapter {
    pub fn new(inner: Arc<dyn Validator>) -> Self {
        Self { inner }
    }

    /// Validate one artifact. Collaborator errors become invalid verdicts.
    pub async fn validate(&self, location: &ArtifactLocation) -> ValidationVerdict {
        match self.inner.validate(location).await {
            Ok(report) => {
                let reason = summarize_report(&report);
                info!(
                    artifact_id = %location.id,
                    valid = report.valid,
                    reason = %reason,
                    "validation finished"
                );
                ValidationVerdict::new(location, report.valid, reason)
            }
            Err(e) => {
                warn!(artifact_id = %location.id, error = %e, "validator errored");
                ValidationVerdict::new(location, false, format!("Validator error: {e:#}"))
            }
        }
    }
}

/// Collapse a report into a single reason: the first few failing detail
/// reasons joined by `"; "`, plus a count of the rest.
pub fn summarize_report(report: &ValidationReport) -> String {
    let failures: Vec<&str> = if report.valid {
        Vec::new()
    } else {
        report
            .details
            .iter()
            .filter(|d| !d.valid)
            .map(|d| d.reason.as_str())
            .filter(|r| !BOOKKEEPING_REASONS.contains(r))
            .collect()
    };

    if failures.is_empty() {
        return if report.valid {
            "All validation checks passed".to_string()
        } else if !report.reason.is_empty() && !BOOKKEEPING_REASONS.contains(&report.reason.as_str())
        {
            report.reason.clone()
        } else {
            "Validation failed - check file structure and syntax".to_string()
        };
    }

    let mut summary = failures
        .iter()
        .take(MAX_LISTED_FAILURES)
        .copied()
        .collect::<Vec<_>>()
        .join("; ");
    if failures.len() > MAX_LISTED_FAILURES {
        summary.push_str(&format!(
            " (and {} more errors)",
            failures.len() - MAX_LISTED_FAILURES
        ));
    }
    summary
}

/// Wraps a [`TestRunner`] and classifies its results.
#[derive(Clone)]
pub struct TestRunnerAdapter {
    inner: Arc<dyn TestRunner>,
}

impl TestRunnerAdapter {
    pub fn new(inner: Arc<dyn TestRunner>) -> Self {
        Self { inner }
    }

    /// Run the artifact's checks in `mode`.
    ///
    /// Returns `Err` only for infrastructure failure; the caller decides how
    /// that is charged against the retry budget.
    pub async fn run(
        &self,
        location: &ArtifactLocation,
        mode: TestMode,
    ) -> anyhow::Result<TestVerdict> {
        let run = self.inner.run(location, mode).await?;
        let verdict = classify(location, run);
        info!(
            artifact_id = %location.id,
            ?mode,
            outcome = %verdict.outcome,
            reason = %verdict.reason,
            steps = verdict.steps.len(),
            "test run finished"
        );
        Ok(verdict)
    }
}

/// Turn a raw run into a verdict with an outcome and parsed step statuses.
pub fn classify(location: &ArtifactLocation, run: TestRun) -> TestVerdict {
    let steps = run
        .raw_output
        .as_deref()
        .map(parse_step_outcomes)
        .unwrap_or_default();

    let outcome = if run.valid {
        TestOutcome::Passed
    } else if reports_no_checks(&run) {
        TestOutcome::NoChecksExecuted
    } else {
        TestOutcome::Failed
    };

    let reason = if run.reason.trim().is_empty() {
        match outcome {
            TestOutcome::Passed => "All tests passed".to_string(),
            TestOutcome::NoChecksExecuted => "No tests collected".to_string(),
            _ => "Tests failed".to_string(),
        }
    } else {
        run.reason
    };

    TestVerdict::new(location, outcome, reason, run.raw_output).with_steps(steps)
}

fn reports_no_checks(run: &TestRun) -> bool {
    let reason = run.reason.to_lowercase();
    if NO_CHECKS_MARKERS.iter().any(|m| reason.contains(m)) {
        return true;
    }
    // A runner that says nothing useful in its reason may still print the
    // marker; only trust that when no step was observed to run.
    run.raw_output.as_deref().is_some_and(|raw| {
        let lower = raw.to_lowercase();
        NO_CHECKS_MARKERS.iter().any(|m| lower.contains(m)) && parse_step_outcomes(raw).is_empty()
    })
}

/// Parse per-step outcomes from verbose, summary, or short-form runner lines.
///
/// A step is the file name of a test script. When a step appears several
/// times, failure dominates pass and pass dominates skip.
pub fn parse_step_outcomes(raw: &str) -> Vec<StepOutcome> {
    let mut steps: BTreeMap<String, StepStatus> = BTreeMap::new();
    let mut record = |file: &str, status: StepStatus| {
        let step = file.rsplit('/').next().unwrap_or(file).to_string();
        steps
            .entry(step)
            .and_modify(|s| *s = merge(*s, status))
            .or_insert(status);
    };

    for line in raw.lines() {
        let line = line.trim();
        if let Some(caps) = SUMMARY_LINE.captures(line) {
            record(&caps["file"], status_from_word(&caps["status"]));
        } else if let Some(caps) = SHORT_LINE.captures(line) {
            for c in caps["chars"].chars() {
                record(&caps["file"], status_from_char(c));
            }
        } else {
            for caps in VERBOSE_LINE.captures_iter(line) {
                record(&caps["file"], status_from_word(&caps["status"]));
            }
        }
    }

    debug!(parsed = steps.len(), "parsed step outcomes");
    steps
        .into_iter()
        .map(|(step, status)| StepOutcome { step, status })
        .collect()
}

fn merge(current: StepStatus, new: StepStatus) -> StepStatus {
    use StepStatus::*;
    match (current, new) {
        (Failed, _) | (_, Failed) => Failed,
        (Passed, _) | (_, Passed) => Passed,
        _ => Skipped,
    }
}

fn status_from_word(word: &str) -> StepStatus {
    match word {
        "PASSED" | "XPASS" => StepStatus::Passed,
        "SKIPPED" | "XFAIL" => StepStatus::Skipped,
        _ => StepStatus::Failed,
    }
}

fn status_from_char(c: char) -> StepStatus {
    match c {
        '.' | 'X' => StepStatus::Passed,
        's' | 'x' => StepStatus::Skipped,
        _ => StepStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactId;
    use crate::checks::ValidationDetail;
    use async_trait::async_trait;
    use std::path::PathBuf;

    fn loc() -> ArtifactLocation {
        ArtifactLocation {
            id: ArtifactId::new("004_secrets").unwrap(),
            path: PathBuf::from("/tmp/a/004_secrets"),
        }
    }

    fn failing_report(n: usize) -> ValidationReport {
        let mut details = vec![ValidationDetail::pass("Directory listing")];
        details.extend((0..n).map(|i| ValidationDetail::fail(format!("problem {i}"))));
        ValidationReport {
            valid: false,
            reason: "Validation completed".into(),
            details,
        }
    }

    #[test]
    fn test_summary_caps_listed_failures() {
        assert_eq!(
            summarize_report(&failing_report(5)),
            "problem 0; problem 1; problem 2 (and 2 more errors)"
        );
        assert_eq!(summarize_report(&failing_report(2)), "problem 0; problem 1");
    }

    #[test]
    fn test_summary_fallbacks() {
        let ok = ValidationReport {
            valid: true,
            reason: "Validation completed".into(),
            details: vec![],
        };
        assert_eq!(summarize_report(&ok), "All validation checks passed");

        let bare = ValidationReport {
            valid: false,
            reason: "Validation completed".into(),
            details: vec![ValidationDetail::fail("Directory listing")],
        };
        assert_eq!(
            summarize_report(&bare),
            "Validation failed - check file structure and syntax"
        );

        let missing_dir = ValidationReport {
            valid: false,
            reason: "Artifact directory not found: /x".into(),
            details: vec![],
        };
        assert_eq!(summarize_report(&missing_dir), "Artifact directory not found: /x");
    }

    struct ErroringValidator;

    #[async_trait]
    impl Validator for ErroringValidator {
        async fn validate(&self, _: &ArtifactLocation) -> anyhow::Result<ValidationReport> {
            anyhow::bail!("disk on fire")
        }
    }

    #[tokio::test]
    async fn test_validator_error_becomes_invalid_verdict() {
        let adapter = ValidatorAdapter::new(Arc::new(ErroringValidator));
        let verdict = adapter.validate(&loc()).await;
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("disk on fire"));
    }

    #[test]
    fn test_classify_distinguishes_no_checks_from_failures() {
        let no_checks = classify(
            &loc(),
            TestRun {
                valid: false,
                reason: "No tests collected".into(),
                raw_output: Some("collected 0 items".into()),
            },
        );
        assert_eq!(no_checks.outcome, TestOutcome::NoChecksExecuted);

        let failed = classify(
            &loc(),
            TestRun {
                valid: false,
                reason: "Tests failed (exit code 1)".into(),
                raw_output: Some("test_05_check.py F".into()),
            },
        );
        assert_eq!(failed.outcome, TestOutcome::Failed);
        assert_ne!(no_checks.reason, failed.reason);
    }

    #[test]
    fn test_classify_keeps_empty_output_distinct_from_missing() {
        let v = classify(
            &loc(),
            TestRun {
                valid: true,
                reason: String::new(),
                raw_output: Some(String::new()),
            },
        );
        assert!(v.valid);
        assert_eq!(v.reason, "All tests passed");
        assert_eq!(v.raw_output.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_verbose_output() {
        let raw = "\
tests/game/004_secrets/test_01_setup.py::test_setup PASSED          [ 20%]
tests/game/004_secrets/test_03_answer.py::test_answer SKIPPED (skip) [ 40%]
tests/game/004_secrets/test_05_check.py::test_value FAILED           [ 60%]
tests/game/004_secrets/test_05_check.py::test_other PASSED           [ 80%]
";
        let steps = parse_step_outcomes(raw);
        let get = |name: &str| steps.iter().find(|s| s.step == name).map(|s| s.status);
        assert_eq!(get("test_01_setup.py"), Some(StepStatus::Passed));
        assert_eq!(get("test_03_answer.py"), Some(StepStatus::Skipped));
        assert_eq!(get("test_05_check.py"), Some(StepStatus::Failed));
    }

    #[test]
    fn test_parse_short_and_summary_output() {
        let raw = "\
collected 5 items

004_secrets/test_01_setup.py .
004_secrets/test_03_answer.py s
004_secrets/test_05_check.py .                                      [100%]

=========================== short test summary info ============================
SKIPPED [1] 004_secrets/test_03_answer.py:9: answer deployment skipped
";
        let steps = parse_step_outcomes(raw);
        let get = |name: &str| steps.iter().find(|s| s.step == name).map(|s| s.status);
        assert_eq!(get("test_03_answer.py"), Some(StepStatus::Skipped));
        assert_eq!(get("test_05_check.py"), Some(StepStatus::Passed));
    }

    #[test]
    fn test_parse_unrelated_output_yields_nothing() {
        assert!(parse_step_outcomes("error: connection refused\n").is_empty());
    }
}
