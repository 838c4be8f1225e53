//! Quarantine area for artifacts that exhausted their retry budget.
//!
//! Failed artifacts are relocated, never deleted, so systemic generation
//! problems stay diagnosable. Each one gets a text and a JSON failure report.

pub mod report;

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{error, info, warn};

use crate::artifact::ArtifactLocation;
use crate::error::{CoordinationError, CoordinationResult};
use crate::verdict::CombinedResult;

pub use report::{EmbeddedFile, FailureReport, REPORT_FILE, REPORT_JSON_FILE};

/// Everything the quarantine stage needs from a finished run.
#[derive(Debug, Clone)]
pub struct QuarantineRequest<'a> {
    pub source: &'a ArtifactLocation,
    pub combined: &'a CombinedResult,
    /// Reasons recorded for the final failed attempt.
    pub reasons: Vec<String>,
    /// Latest raw test output held in run state.
    pub raw_output: Option<String>,
    pub transitions: Option<String>,
}

/// Directory failed artifacts are moved into (`<root>/<id>/`).
#[derive(Debug, Clone)]
pub struct QuarantineArea {
    root: PathBuf,
    report_embeds: Vec<String>,
    test_output_file: String,
}

impl QuarantineArea {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            report_embeds: vec!["session.json".to_string()],
            test_output_file: "test_result.txt".to_string(),
        }
    }

    /// Artifact files copied into the report when present.
    pub fn with_report_embeds(mut self, embeds: Vec<String>) -> Self {
        self.report_embeds = embeds;
        self
    }

    pub fn with_test_output_file(mut self, name: impl Into<String>) -> Self {
        self.test_output_file = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Move the artifact into quarantine and write its failure report.
    ///
    /// Returns the quarantine location. A missing source directory still gets
    /// a report, in a freshly created directory. If the artifact cannot be
    /// moved, the report is written next to it instead and the error is
    /// still returned.
    pub fn quarantine(&self, request: QuarantineRequest<'_>) -> CoordinationResult<PathBuf> {
        let target = match self.relocate_source(&request) {
            Ok(target) => target,
            Err(e) => {
                self.write_report_in_place(&request);
                return Err(e);
            }
        };
        let report = self.build_report(&request, &target);
        self.write_report(&target, &report)?;
        Ok(target)
    }

    fn relocate_source(&self, request: &QuarantineRequest<'_>) -> CoordinationResult<PathBuf> {
        let id = request.source.id.as_str();
        std::fs::create_dir_all(&self.root)
            .map_err(|e| CoordinationError::quarantine(&self.root, e.to_string()))?;

        let target = self.unique_target(id);
        if request.source.exists() {
            relocate(&request.source.path, &target)?;
            info!(
                artifact_id = %id,
                from = %request.source.path.display(),
                to = %target.display(),
                "artifact moved to quarantine"
            );
        } else {
            warn!(
                artifact_id = %id,
                path = %request.source.path.display(),
                "artifact directory missing, writing report only"
            );
            std::fs::create_dir_all(&target)
                .map_err(|e| CoordinationError::quarantine(&target, e.to_string()))?;
        }
        Ok(target)
    }

    fn build_report(&self, request: &QuarantineRequest<'_>, dir: &Path) -> FailureReport {
        FailureReport::new(
            request.combined,
            request.reasons.clone(),
            request.raw_output.clone(),
        )
        .with_embedded_files(self.read_embeds(dir))
        .with_transitions(request.transitions.clone())
        .with_test_output_file(self.test_output_file.clone())
    }

    fn write_report_in_place(&self, request: &QuarantineRequest<'_>) {
        let dir = &request.source.path;
        if !dir.is_dir() {
            error!(artifact_id = %request.source.id, "no failure report written");
            return;
        }
        let report = self.build_report(request, dir);
        match self.write_report(dir, &report) {
            Ok(()) => warn!(
                artifact_id = %request.source.id,
                path = %dir.display(),
                "artifact not moved; failure report left in place"
            ),
            Err(e) => error!(
                artifact_id = %request.source.id,
                error = %e,
                "no failure report written"
            ),
        }
    }

    /// `<root>/<id>`, or `<root>/<id>_<YYYYmmdd_HHMMSS>` when taken. A counter
    /// is appended if two quarantines land within the same second.
    fn unique_target(&self, id: &str) -> PathBuf {
        let plain = self.root.join(id);
        if !plain.exists() {
            return plain;
        }
        let stamped = format!("{id}_{}", Local::now().format("%Y%m%d_%H%M%S"));
        let mut candidate = self.root.join(&stamped);
        let mut n = 2;
        while candidate.exists() {
            candidate = self.root.join(format!("{stamped}_{n}"));
            n += 1;
        }
        candidate
    }

    fn read_embeds(&self, dir: &Path) -> Vec<EmbeddedFile> {
        self.report_embeds
            .iter()
            .filter_map(|name| {
                let path = dir.join(name);
                if !path.is_file() {
                    return None;
                }
                match std::fs::read_to_string(&path) {
                    Ok(content) => Some(EmbeddedFile {
                        name: name.clone(),
                        content,
                    }),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "could not read file for report");
                        None
                    }
                }
            })
            .collect()
    }

    fn write_report(&self, dir: &Path, report: &FailureReport) -> CoordinationResult<()> {
        let text_path = dir.join(REPORT_FILE);
        std::fs::write(&text_path, report.render_text())
            .map_err(|e| CoordinationError::quarantine(&text_path, e.to_string()))?;

        let json_path = dir.join(REPORT_JSON_FILE);
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&json_path, json)
            .map_err(|e| CoordinationError::quarantine(&json_path, e.to_string()))?;

        info!(path = %text_path.display(), "failure report written");
        Ok(())
    }
}

/// Rename, falling back to copy-then-remove across filesystems.
fn relocate(from: &Path, to: &Path) -> CoordinationResult<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_then_remove(from, to)
}

/// A failed copy leaves nothing behind at `to`.
fn copy_then_remove(from: &Path, to: &Path) -> CoordinationResult<()> {
    if let Err(e) = copy_dir_all(from, to) {
        if to.exists() {
            if let Err(cleanup) = std::fs::remove_dir_all(to) {
                warn!(path = %to.display(), error = %cleanup, "could not remove partial copy");
            }
        }
        return Err(CoordinationError::quarantine(to, e.to_string()));
    }
    std::fs::remove_dir_all(from).map_err(|e| CoordinationError::quarantine(from, e.to_string()))
}

fn copy_dir_all(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactId, ArtifactStore};
    use crate::verdict::{TaskMetadata, TestOutcome, TestVerdict, ValidationVerdict};

    fn combined(loc: &ArtifactLocation) -> CombinedResult {
        CombinedResult {
            validation: ValidationVerdict::new(loc, true, "All validation checks passed"),
            test: TestVerdict::new(loc, TestOutcome::Failed, "Tests failed (exit code 1)", None),
            retry_count: 3,
            max_retries: 3,
            metadata: TaskMetadata::default(),
        }
    }

    #[test]
    fn test_collision_gets_timestamp_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let area = QuarantineArea::new(tmp.path().join("unsuccessful"));
        std::fs::create_dir_all(area.root().join("030_hpa")).unwrap();

        let target = area.unique_target("030_hpa");
        let name = target.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("030_hpa_"));
        assert_eq!(name.len(), "030_hpa_".len() + "YYYYmmdd_HHMMSS".len());
    }

    #[test]
    fn test_missing_source_still_gets_report() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("artifacts"));
        let loc = store.locate(&ArtifactId::new("031_gone").unwrap());
        let area = QuarantineArea::new(tmp.path().join("unsuccessful"));

        let target = area
            .quarantine(QuarantineRequest {
                source: &loc,
                combined: &combined(&loc),
                reasons: vec![],
                raw_output: None,
                transitions: None,
            })
            .unwrap();
        let text = std::fs::read_to_string(target.join(REPORT_FILE)).unwrap();
        assert!(text.contains("Total Retry Attempts: 3"));
        assert!(target.join(REPORT_JSON_FILE).is_file());
    }

    #[test]
    fn test_unusable_root_leaves_report_next_to_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("artifacts"));
        let loc = store.locate(&ArtifactId::new("032_pvc").unwrap());
        std::fs::create_dir_all(&loc.path).unwrap();
        std::fs::write(loc.path.join("session.json"), "{}").unwrap();
        let root = tmp.path().join("unsuccessful");
        std::fs::write(&root, "not a directory").unwrap();

        let err = QuarantineArea::new(&root)
            .quarantine(QuarantineRequest {
                source: &loc,
                combined: &combined(&loc),
                reasons: vec!["Tests failed: Tests failed (exit code 1)".into()],
                raw_output: None,
                transitions: None,
            })
            .unwrap_err();

        assert!(matches!(err, CoordinationError::QuarantineIo { .. }));
        let text = std::fs::read_to_string(loc.path.join(REPORT_FILE)).unwrap();
        assert!(text.contains("Artifact ID: 032_pvc"));
        assert!(text.contains("SESSION.JSON CONTENT:"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_copy_leaves_no_partial_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.txt"), "a").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("nowhere"), src.join("dangling")).unwrap();
        let dst = tmp.path().join("dst");

        let err = copy_then_remove(&src, &dst).unwrap_err();
        assert!(matches!(err, CoordinationError::QuarantineIo { .. }));
        assert!(!dst.exists());
        assert!(src.join("a.txt").is_file());
    }

    #[test]
    fn test_copy_dir_all_copies_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested/a.txt"), "a").unwrap();
        copy_dir_all(&src, &tmp.path().join("dst")).unwrap();
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("dst/nested/a.txt")).unwrap(),
            "a"
        );
    }
}
