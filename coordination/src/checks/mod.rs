//! Validator and TestRunner collaborators plus the adapters that turn their
//! raw results into verdicts.
//!
//! The traits are the narrow seam to whatever actually inspects or executes
//! an artifact. [`FileStructureValidator`] and [`CommandTestRunner`] are the
//! concrete implementations shipped here; tests substitute scripted ones.

pub mod adapter;
pub mod command;
pub mod layout;
pub mod structure;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactLocation;

pub use adapter::{TestRunnerAdapter, ValidatorAdapter};
pub use command::CommandTestRunner;
pub use layout::ArtifactLayout;
pub use structure::FileStructureValidator;

/// One line item of a structural check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationDetail {
    pub valid: bool,
    pub reason: String,
    /// Supporting entries, e.g. the directory listing or missing file names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

impl ValidationDetail {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            valid: true,
            reason: reason.into(),
            items: Vec::new(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
            items: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<String>) -> Self {
        self.items = items;
        self
    }
}

/// Raw Validator result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub reason: String,
    #[serde(default)]
    pub details: Vec<ValidationDetail>,
}

/// Execution mode for a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    Normal,
    /// Solution-deployment step is suppressed.
    SolutionSuppressed,
}

/// Raw TestRunner result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    pub valid: bool,
    pub reason: String,
    pub raw_output: Option<String>,
}

/// Structural checker. Must not mutate the artifact.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, location: &ArtifactLocation) -> anyhow::Result<ValidationReport>;
}

/// Executes an artifact's verification steps.
///
/// `Err` means infrastructure failure (runner unreachable, spawn failure,
/// timeout), never "the checks failed".
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, location: &ArtifactLocation, mode: TestMode) -> anyhow::Result<TestRun>;
}
