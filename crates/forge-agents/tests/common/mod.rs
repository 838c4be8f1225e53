//! Scripted collaborators shared by the integration tests.
//!
//! Each collaborator pops canned results from a Mutex-backed queue and
//! records what it was asked, so tests can assert on both the run outcome
//! and the traffic that produced it.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use coordination::{
    ArtifactLocation, TaskMetadata, TestMode, TestRun, TestRunner, ValidationDetail,
    ValidationReport, Validator,
};
use forge_agents::{CollaboratorResponse, Fixer, GenerationRequest, Generator, Orchestrator};

// ── Producers ────────────────────────────────────────────────────────────────

/// One scripted producer reply: the response (or error) plus files to write.
pub struct Reply {
    pub result: Result<CollaboratorResponse, String>,
    pub files: Vec<(String, String)>,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Self {
            result: Ok(CollaboratorResponse::text(text)),
            files: Vec::new(),
        }
    }

    pub fn structured(id: &str) -> Self {
        Self {
            result: Ok(CollaboratorResponse {
                text: format!("created {id}"),
                artifact_id: Some(id.to_string()),
                files_written: Vec::new(),
            }),
            files: Vec::new(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: &[(&str, &str)]) -> Self {
        self.files = files
            .iter()
            .map(|(n, c)| (n.to_string(), c.to_string()))
            .collect();
        self
    }
}

/// Generator and Fixer in one. Replays `Reply`s in order, then answers with
/// an empty text reply.
pub struct ScriptedProducer {
    artifacts_root: PathBuf,
    replies: Mutex<VecDeque<Reply>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProducer {
    pub fn new(artifacts_root: &Path, replies: Vec<Reply>) -> Self {
        Self {
            artifacts_root: artifacts_root.to_path_buf(),
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    fn answer(&self, request: &GenerationRequest) -> Result<CollaboratorResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::text(""));
        let response = reply.result.map_err(|e| anyhow!(e))?;

        let target = request
            .artifact_id
            .as_ref()
            .map(|id| id.as_str().to_string())
            .or_else(|| response.artifact_id.clone());
        if let Some(id) = target {
            let dir = self.artifacts_root.join(id);
            for (name, content) in &reply.files {
                std::fs::create_dir_all(&dir)?;
                std::fs::write(dir.join(name), content)?;
            }
        }
        Ok(response)
    }
}

#[async_trait]
impl Generator for ScriptedProducer {
    async fn generate(&self, request: &GenerationRequest) -> Result<CollaboratorResponse> {
        self.answer(request)
    }
}

#[async_trait]
impl Fixer for ScriptedProducer {
    async fn repair(&self, request: &GenerationRequest) -> Result<CollaboratorResponse> {
        self.answer(request)
    }
}

// ── Checks ───────────────────────────────────────────────────────────────────

/// Replays validation reports; valid once the queue is empty.
#[derive(Default)]
pub struct ScriptedValidator {
    reports: Mutex<VecDeque<ValidationReport>>,
    pub calls: Mutex<usize>,
}

impl ScriptedValidator {
    pub fn new(reports: Vec<ValidationReport>) -> Self {
        Self {
            reports: Mutex::new(reports.into()),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    async fn validate(&self, _: &ArtifactLocation) -> Result<ValidationReport> {
        *self.calls.lock().unwrap() += 1;
        Ok(self
            .reports
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(valid_report))
    }
}

pub fn valid_report() -> ValidationReport {
    ValidationReport {
        valid: true,
        reason: "Validation completed".into(),
        details: vec![ValidationDetail::pass("All required files present")],
    }
}

pub fn invalid_report(reason: &str) -> ValidationReport {
    ValidationReport {
        valid: false,
        reason: "Validation completed".into(),
        details: vec![
            ValidationDetail::pass("Directory listing"),
            ValidationDetail::fail(reason),
        ],
    }
}

/// Replays test runs per mode. Normal mode passes and suppressed mode
/// produces a meaningful failure once the queues are empty. Creates the
/// artifact directory on every call, the way a real run leaves output there.
#[derive(Default)]
pub struct ScriptedRunner {
    normal: Mutex<VecDeque<TestRun>>,
    suppressed: Mutex<VecDeque<TestRun>>,
    pub modes: Mutex<Vec<TestMode>>,
}

impl ScriptedRunner {
    pub fn new(normal: Vec<TestRun>, suppressed: Vec<TestRun>) -> Self {
        Self {
            normal: Mutex::new(normal.into()),
            suppressed: Mutex::new(suppressed.into()),
            modes: Mutex::new(Vec::new()),
        }
    }

    pub fn modes(&self) -> Vec<TestMode> {
        self.modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TestRunner for ScriptedRunner {
    async fn run(&self, location: &ArtifactLocation, mode: TestMode) -> Result<TestRun> {
        self.modes.lock().unwrap().push(mode);
        std::fs::create_dir_all(&location.path)?;
        let run = match mode {
            TestMode::Normal => self
                .normal
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(passing_run),
            TestMode::SolutionSuppressed => self
                .suppressed
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(meaningful_suppressed_run),
        };
        Ok(run)
    }
}

/// Fails every normal run for the listed artifact ids; everything else
/// behaves like a healthy artifact.
pub struct PerArtifactRunner {
    failing: HashSet<String>,
}

impl PerArtifactRunner {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl TestRunner for PerArtifactRunner {
    async fn run(&self, location: &ArtifactLocation, mode: TestMode) -> Result<TestRun> {
        std::fs::create_dir_all(&location.path)?;
        // Yield so concurrent runs interleave.
        tokio::task::yield_now().await;
        Ok(match mode {
            TestMode::Normal if self.failing.contains(location.id.as_str()) => {
                failing_run("Tests failed (exit code 1)", "E   assert False")
            }
            TestMode::Normal => passing_run(),
            TestMode::SolutionSuppressed => meaningful_suppressed_run(),
        })
    }
}

pub fn passing_run() -> TestRun {
    TestRun {
        valid: true,
        reason: "All tests passed".into(),
        raw_output: Some(
            "x/test_01_setup.py::test_setup PASSED\n\
             x/test_03_answer.py::test_answer PASSED\n\
             x/test_05_check.py::TestCheck::test_001 PASSED"
                .into(),
        ),
    }
}

pub fn failing_run(reason: &str, raw: &str) -> TestRun {
    TestRun {
        valid: false,
        reason: reason.into(),
        raw_output: Some(raw.into()),
    }
}

pub fn meaningful_suppressed_run() -> TestRun {
    TestRun {
        valid: false,
        reason: "Tests failed (exit code 1)".into(),
        raw_output: Some(
            "x/test_01_setup.py::test_setup PASSED\n\
             x/test_03_answer.py::test_answer SKIPPED\n\
             x/test_05_check.py::TestCheck::test_001 FAILED"
                .into(),
        ),
    }
}

pub fn vacuous_suppressed_run() -> TestRun {
    TestRun {
        valid: true,
        reason: "All tests passed".into(),
        raw_output: Some(
            "x/test_01_setup.py::test_setup PASSED\n\
             x/test_03_answer.py::test_answer SKIPPED\n\
             x/test_05_check.py::TestCheck::test_001 PASSED"
                .into(),
        ),
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub fn metadata() -> TaskMetadata {
    TaskMetadata {
        topic: "ConfigMaps".into(),
        description: "Externalize application configuration".into(),
        difficulty: "BEGINNER".into(),
        objective: "Create a ConfigMap with app.name and app.version".into(),
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub producer: Arc<ScriptedProducer>,
}

impl Harness {
    pub fn new(replies: Vec<Reply>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let producer = Arc::new(ScriptedProducer::new(&dir.path().join("exercises"), replies));
        Self { dir, producer }
    }

    pub fn artifacts_root(&self) -> PathBuf {
        self.dir.path().join("exercises")
    }

    pub fn quarantine_root(&self) -> PathBuf {
        self.dir.path().join("unsuccessful")
    }

    /// The same scripted producer acts as Generator and Fixer.
    pub fn orchestrator(
        &self,
        validator: Arc<dyn Validator>,
        runner: Arc<dyn TestRunner>,
    ) -> Orchestrator {
        Orchestrator::new(
            self.producer.clone(),
            self.producer.clone(),
            validator,
            runner,
            self.artifacts_root(),
            self.quarantine_root(),
        )
    }
}
