//! Expected file layout of an artifact directory.

use serde::{Deserialize, Serialize};

/// Which files an artifact must contain and how each kind is checked.
///
/// Also names the two steps negative verification reasons about and the
/// files embedded into a failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactLayout {
    pub required_files: Vec<String>,
    /// Template YAML files: parsed as YAML after placeholder substitution and
    /// as templates.
    pub yaml_files: Vec<String>,
    pub json_files: Vec<String>,
    /// Step scripts. Checked when present, never required by this list alone.
    pub step_files: Vec<String>,
    /// Step that deploys the solution. Expected to be skipped when the
    /// solution is withheld.
    pub solution_step: String,
    /// Final check step. Must fail when the solution is withheld.
    pub check_step: String,
    /// Artifact files copied verbatim into the failure report when present.
    pub report_embeds: Vec<String>,
    /// File the test runner persists its raw output to.
    pub test_output_file: String,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            required_files: [
                "__init__.py",
                "instruction.md",
                "concept.md",
                "session.json",
                "setup.template.yaml",
                "answer.template.yaml",
                "test_01_setup.py",
                "test_02_ready.py",
                "test_03_answer.py",
                "test_05_check.py",
                "test_06_cleanup.py",
            ]
            .map(String::from)
            .to_vec(),
            yaml_files: ["setup.template.yaml", "answer.template.yaml"]
                .map(String::from)
                .to_vec(),
            json_files: vec!["session.json".to_string()],
            step_files: [
                "test_01_setup.py",
                "test_02_ready.py",
                "test_03_answer.py",
                "test_04_challenge.py",
                "test_05_check.py",
                "test_06_cleanup.py",
            ]
            .map(String::from)
            .to_vec(),
            solution_step: "test_03_answer.py".to_string(),
            check_step: "test_05_check.py".to_string(),
            report_embeds: vec!["session.json".to_string()],
            test_output_file: "test_result.txt".to_string(),
        }
    }
}

impl ArtifactLayout {
    pub fn is_yaml(&self, name: &str) -> bool {
        self.yaml_files.iter().any(|f| f == name)
    }

    pub fn is_json(&self, name: &str) -> bool {
        self.json_files.iter().any(|f| f == name)
    }

    pub fn is_step(&self, name: &str) -> bool {
        self.step_files.iter().any(|f| f == name)
    }
}
