//! Durable failure report written next to a quarantined artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactId;
use crate::verdict::{CombinedResult, TestVerdict, ValidationVerdict};

/// Text report file name.
pub const REPORT_FILE: &str = "FAILURE_REPORT.txt";
/// Machine-readable report file name.
pub const REPORT_JSON_FILE: &str = "failure_report.json";

const BANNER_WIDTH: usize = 80;

/// An artifact file copied verbatim into the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub artifact_id: ArtifactId,
    pub topic: String,
    pub difficulty: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub failure_reasons: Vec<String>,
    pub validation: ValidationVerdict,
    pub test: TestVerdict,
    /// Full raw test output when any was captured.
    pub raw_output: Option<String>,
    #[serde(default)]
    pub embedded_files: Vec<EmbeddedFile>,
    /// One line per state transition of the run.
    #[serde(default)]
    pub transitions: Option<String>,
    /// Where the runner persisted its output inside the artifact.
    pub test_output_file: String,
    pub quarantined_at: DateTime<Utc>,
}

impl FailureReport {
    /// Build a report from the final decision of a run.
    ///
    /// Empty `reasons` fall back to the reasons derived from the verdicts.
    pub fn new(combined: &CombinedResult, reasons: Vec<String>, raw_output: Option<String>) -> Self {
        let failure_reasons = if reasons.is_empty() {
            combined.failure_reasons()
        } else {
            reasons
        };
        Self {
            artifact_id: combined.artifact_id().clone(),
            topic: combined.metadata.topic.clone(),
            difficulty: combined.metadata.difficulty.clone(),
            retry_count: combined.retry_count,
            max_retries: combined.max_retries,
            failure_reasons,
            validation: combined.validation.clone(),
            test: combined.test.clone(),
            raw_output: raw_output.or_else(|| combined.test.raw_output.clone()),
            embedded_files: Vec::new(),
            transitions: None,
            test_output_file: "test_result.txt".to_string(),
            quarantined_at: Utc::now(),
        }
    }

    pub fn with_embedded_files(mut self, files: Vec<EmbeddedFile>) -> Self {
        self.embedded_files = files;
        self
    }

    pub fn with_transitions(mut self, transitions: Option<String>) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn with_test_output_file(mut self, name: impl Into<String>) -> Self {
        self.test_output_file = name.into();
        self
    }

    /// Render the human-readable report.
    pub fn render_text(&self) -> String {
        let banner = "=".repeat(BANNER_WIDTH);
        let mut out = String::new();

        out.push_str(&format!("Artifact ID: {}\n", self.artifact_id));
        if !self.topic.is_empty() {
            out.push_str(&format!("Topic: {}\n", self.topic));
        }
        if !self.difficulty.is_empty() {
            out.push_str(&format!("Difficulty: {}\n", self.difficulty));
        }
        out.push_str(&format!(
            "Quarantined At: {}\n",
            self.quarantined_at.to_rfc3339()
        ));
        out.push_str(&format!("Total Retry Attempts: {}\n", self.retry_count));
        out.push_str(&format!("Retry Budget: {}\n", self.max_retries));
        out.push_str("Final Failure Reasons:\n");
        for reason in &self.failure_reasons {
            out.push_str(&format!("  - {}\n", reason));
        }

        out.push_str("\nValidation Details:\n");
        out.push_str(&format!("  Valid: {}\n", self.validation.valid));
        out.push_str(&format!("  Reason: {}\n", self.validation.reason));
        if self.validation.assumed {
            out.push_str("  Assumed: true\n");
        }

        out.push_str("\nTest Details:\n");
        out.push_str(&format!("  Valid: {}\n", self.test.valid));
        out.push_str(&format!("  Outcome: {}\n", self.test.outcome));
        out.push_str(&format!("  Reason: {}\n", self.test.reason));
        for step in &self.test.steps {
            out.push_str(&format!("  Step {}: {}\n", step.step, step.status));
        }

        if let Some(transitions) = self.transitions.as_deref().filter(|t| !t.is_empty()) {
            out.push_str("\nTransitions:\n");
            for line in transitions.lines() {
                out.push_str(&format!("  {}\n", line));
            }
        }

        for file in &self.embedded_files {
            out.push_str(&format!("\n{banner}\n"));
            out.push_str(&format!("{} CONTENT:\n", file.name.to_uppercase()));
            out.push_str(&format!("{banner}\n"));
            out.push_str(&file.content);
            out.push_str(&format!("\n{banner}\n"));
        }

        out.push_str(&format!("\n{banner}\n"));
        match self.raw_output.as_deref().filter(|raw| !raw.is_empty()) {
            Some(raw) => {
                out.push_str("FULL TEST OUTPUT:\n");
                out.push_str(&format!("{banner}\n"));
                out.push_str(raw);
                out.push_str(&format!("\n{banner}\n"));
            }
            None => {
                out.push_str(&format!(
                    "Full test output saved in: {}\n",
                    self.test_output_file
                ));
                out.push_str(&format!("{banner}\n"));
            }
        }

        out
    }
}
