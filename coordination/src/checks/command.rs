//! Command-based TestRunner
//!
//! Runs a test command (pytest by default) against the artifact directory via
//! `tokio::process::Command`, under `tokio::time::timeout`. Exit codes follow
//! the pytest convention: 0 pass, 5 nothing collected, anything else failed.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::ArtifactLocation;
use crate::checks::{TestMode, TestRun, TestRunner};
use crate::error::{CoordinationError, CoordinationResult};

/// Exit code pytest uses when it collected no tests.
pub const NO_TESTS_COLLECTED_EXIT: i32 = 5;

/// Environment variable set on the child process to withhold the solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionSuppression {
    pub env_var: String,
    pub value: String,
}

impl Default for SolutionSuppression {
    fn default() -> Self {
        Self {
            env_var: "SKIP_ANSWER_TESTS".to_string(),
            value: "True".to_string(),
        }
    }
}

/// Configuration for [`CommandTestRunner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRunnerConfig {
    /// Command line; the artifact directory is appended as the last argument.
    pub command: String,
    /// Working directory for the child. Defaults to the artifact's parent.
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub suppression: SolutionSuppression,
    /// File inside the artifact directory that receives the raw output.
    pub output_file: String,
}

impl Default for CommandRunnerConfig {
    fn default() -> Self {
        Self {
            command: "pytest -s --import-mode=importlib --rootdir=.".to_string(),
            working_dir: None,
            timeout_secs: 900,
            suppression: SolutionSuppression::default(),
            output_file: "test_result.txt".to_string(),
        }
    }
}

/// Runs the configured test command against an artifact directory.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    config: CommandRunnerConfig,
    argv: Vec<String>,
}

impl CommandTestRunner {
    /// Parse the command line up front so a bad command fails at startup.
    pub fn new(config: CommandRunnerConfig) -> CoordinationResult<Self> {
        let argv = shlex::split(&config.command)
            .filter(|argv| !argv.is_empty())
            .ok_or_else(|| CoordinationError::InvalidCommand {
                command: config.command.clone(),
            })?;
        Ok(Self { config, argv })
    }

    /// Execute the command and classify the result by exit code.
    pub async fn execute(
        &self,
        location: &ArtifactLocation,
        mode: TestMode,
    ) -> CoordinationResult<TestRun> {
        let start = Instant::now();
        let working_dir = self
            .config
            .working_dir
            .clone()
            .or_else(|| location.path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        let mut cmd = tokio::process::Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..])
            .arg(format!("{}/", location.path.display()))
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if mode == TestMode::SolutionSuppressed {
            cmd.env(&self.config.suppression.env_var, &self.config.suppression.value);
        }

        info!(
            artifact_id = %location.id,
            command = %self.config.command,
            ?mode,
            working_dir = %working_dir.display(),
            "running tests"
        );

        let spawn_error = |e: std::io::Error| CoordinationError::CommandSpawn {
            command: self.config.command.clone(),
            message: e.to_string(),
        };
        let child = cmd.spawn().map_err(spawn_error)?;
        let pid = child.id();

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(spawn_error(e)),
            Err(_) => {
                // Dropping the child kills only the direct process; the
                // check script may have started its own.
                kill_process_group(pid);
                warn!(
                    artifact_id = %location.id,
                    timeout_secs = self.config.timeout_secs,
                    "test command timed out, process group killed"
                );
                return Err(CoordinationError::CommandTimeout {
                    command: self.config.command.clone(),
                    secs: self.config.timeout_secs,
                });
            }
        };

        let raw = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        self.persist_output(&location.path, &raw);

        let exit_code = output.status.code();
        let (valid, reason) = match exit_code {
            Some(0) => (true, "All tests passed".to_string()),
            Some(NO_TESTS_COLLECTED_EXIT) => (false, "No tests collected".to_string()),
            Some(code) => (false, format!("Tests failed (exit code {code})")),
            None => (false, "Tests failed (terminated by signal)".to_string()),
        };
        debug!(
            artifact_id = %location.id,
            ?exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "test command exited"
        );

        Ok(TestRun {
            valid,
            reason,
            raw_output: Some(raw),
        })
    }

    fn persist_output(&self, dir: &Path, raw: &str) {
        if !dir.is_dir() {
            return;
        }
        let path = dir.join(&self.config.output_file);
        match std::fs::write(&path, raw) {
            Ok(()) => debug!(path = %path.display(), "saved test output"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to save test output"),
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!(pid, error = %e, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[async_trait]
impl TestRunner for CommandTestRunner {
    async fn run(&self, location: &ArtifactLocation, mode: TestMode) -> anyhow::Result<TestRun> {
        Ok(self.execute(location, mode).await?)
    }
}
