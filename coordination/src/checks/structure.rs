//! File-structure validator: required files, YAML templates, JSON and step
//! scripts, checked without executing anything.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::artifact::ArtifactLocation;
use crate::checks::{ArtifactLayout, ValidationDetail, ValidationReport, Validator};

static TEMPLATE_EXPR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{[^}]+\}\}").unwrap());
static TEMPLATE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%-?[^%]+-?%\}").unwrap());

/// Deterministic structural checks over `<artifacts_root>/<id>/`.
#[derive(Debug, Clone, Default)]
pub struct FileStructureValidator {
    layout: ArtifactLayout,
}

impl FileStructureValidator {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Run every check against `dir`. Reads only.
    pub fn check(&self, dir: &Path) -> ValidationReport {
        if !dir.is_dir() {
            return ValidationReport {
                valid: false,
                reason: format!("Artifact directory not found: {}", dir.display()),
                details: Vec::new(),
            };
        }

        let mut details = Vec::new();

        let listed = match list_files(dir) {
            Ok(files) => {
                details.push(ValidationDetail::pass("Directory listing").with_items(files.clone()));
                files
            }
            Err(e) => {
                details.push(ValidationDetail::fail(format!(
                    "Unable to list files in {}: {e}",
                    dir.display()
                )));
                Vec::new()
            }
        };

        details.push(self.check_required(dir));

        for name in &listed {
            let path = dir.join(name);
            if self.layout.is_yaml(name) {
                details.push(check_yaml(&path));
                details.push(check_template(&path));
            } else if self.layout.is_json(name) {
                details.push(check_json(&path));
            } else if self.layout.is_step(name) {
                details.push(check_step_script(&path));
            } else {
                details.push(ValidationDetail::pass(format!(
                    "Skipped non-validated file: {}",
                    path.display()
                )));
            }
        }

        let valid = details.iter().all(|d| d.valid);
        debug!(dir = %dir.display(), valid, checks = details.len(), "structure checked");
        ValidationReport {
            valid,
            reason: "Validation completed".to_string(),
            details,
        }
    }

    fn check_required(&self, dir: &Path) -> ValidationDetail {
        let missing: Vec<String> = self
            .layout
            .required_files
            .iter()
            .filter(|name| !dir.join(name).exists())
            .cloned()
            .collect();
        if missing.is_empty() {
            ValidationDetail::pass(format!("All required files present in {}", dir.display()))
        } else {
            ValidationDetail::fail(format!("Missing files: {}", missing.join(", "))).with_items(missing)
        }
    }
}

#[async_trait]
impl Validator for FileStructureValidator {
    async fn validate(&self, location: &ArtifactLocation) -> anyhow::Result<ValidationReport> {
        Ok(self.check(&location.path))
    }
}

fn list_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Ok(name) = entry.file_name().into_string() {
                files.push(name);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Replace template expressions so the file parses as plain YAML.
pub fn sanitize_template(text: &str) -> String {
    let text = TEMPLATE_EXPR.replace_all(text, "TEMPLATE_VALUE");
    TEMPLATE_BLOCK
        .replace_all(&text, "# TEMPLATE_BLOCK")
        .into_owned()
}

fn check_yaml(path: &Path) -> ValidationDetail {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => return ValidationDetail::fail(format!("Validation failed for {}: {e}", path.display())),
    };
    let sanitized = sanitize_template(&text);
    for document in serde_yaml::Deserializer::from_str(&sanitized) {
        if let Err(e) = serde_yaml::Value::deserialize(document) {
            return ValidationDetail::fail(format!("YAML invalid in {}: {e}", path.display()));
        }
    }
    ValidationDetail::pass(format!("YAML valid: {}", path.display()))
}

fn check_template(path: &Path) -> ValidationDetail {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => return ValidationDetail::fail(format!("Validation failed for {}: {e}", path.display())),
    };
    let env = minijinja::Environment::new();
    match env.template_from_str(&source) {
        Ok(_) => ValidationDetail::pass(format!("Template syntax valid: {}", path.display())),
        Err(e) => {
            ValidationDetail::fail(format!("Template syntax error in {}: {e}", path.display()))
        }
    }
}

fn check_json(path: &Path) -> ValidationDetail {
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|t| serde_json::from_str::<serde_json::Value>(&t).map_err(|e| e.to_string()));
    match parsed {
        Ok(_) => ValidationDetail::pass(format!("JSON valid: {}", path.display())),
        Err(e) => ValidationDetail::fail(format!("JSON validation failed for {}: {e}", path.display())),
    }
}

// No Python parser in the stack: a step script must be readable UTF-8 and non-empty.
fn check_step_script(path: &Path) -> ValidationDetail {
    match std::fs::read_to_string(path) {
        Ok(source) if source.trim().is_empty() => {
            ValidationDetail::fail(format!("Step script is empty: {}", path.display()))
        }
        Ok(_) => ValidationDetail::pass(format!("Step script readable: {}", path.display())),
        Err(e) => ValidationDetail::fail(format!("Step script unreadable in {}: {e}", path.display())),
    }
}
