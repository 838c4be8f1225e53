use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use coordination::{ArtifactLayout, CommandRunnerConfig, SolutionSuppression};
use serde::Deserialize;

/// OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub model: String,
    /// Sent as a bearer token when present.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Top-level forge configuration.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Model that writes new artifacts.
    pub generator_endpoint: Endpoint,
    /// Model that patches broken artifacts.
    pub fixer_endpoint: Endpoint,
    /// Directory holding one subdirectory per artifact.
    pub artifacts_root: PathBuf,
    /// Where exhausted artifacts are moved.
    pub quarantine_root: PathBuf,
    /// Test command; the artifact directory is appended.
    pub test_command: String,
    /// Failed attempts allowed before quarantine.
    pub max_retries: u32,
    pub collaborator_timeout_secs: u64,
    pub test_timeout_secs: u64,
    /// Extra attempts for transient HTTP failures inside one chat call.
    pub transient_retries: u32,
    pub ideas_path: PathBuf,
    pub ledger_path: PathBuf,
    pub layout: ArtifactLayout,
    pub suppression: SolutionSuppression,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        let api_key = std::env::var("FORGE_API_KEY").ok();
        Self {
            generator_endpoint: Endpoint {
                url: std::env::var("FORGE_GENERATOR_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/v1".into()),
                model: std::env::var("FORGE_GENERATOR_MODEL")
                    .unwrap_or_else(|_| "qwen2.5-coder-32b-instruct".into()),
                api_key: api_key.clone(),
            },
            fixer_endpoint: Endpoint {
                url: std::env::var("FORGE_FIXER_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/v1".into()),
                model: std::env::var("FORGE_FIXER_MODEL")
                    .unwrap_or_else(|_| "qwen2.5-coder-32b-instruct".into()),
                api_key,
            },
            artifacts_root: std::env::var("FORGE_ARTIFACTS_ROOT")
                .unwrap_or_else(|_| "exercises".into())
                .into(),
            quarantine_root: std::env::var("FORGE_QUARANTINE_ROOT")
                .unwrap_or_else(|_| "unsuccessful".into())
                .into(),
            test_command: std::env::var("FORGE_TEST_COMMAND")
                .unwrap_or_else(|_| CommandRunnerConfig::default().command),
            max_retries: env_parse("FORGE_MAX_RETRIES", 3),
            collaborator_timeout_secs: env_parse("FORGE_COLLABORATOR_TIMEOUT_SECS", 600),
            test_timeout_secs: env_parse("FORGE_TEST_TIMEOUT_SECS", 900),
            transient_retries: env_parse("FORGE_TRANSIENT_RETRIES", 2),
            ideas_path: std::env::var("FORGE_IDEAS_PATH")
                .unwrap_or_else(|_| "ideas.json".into())
                .into(),
            ledger_path: std::env::var("FORGE_LEDGER_PATH")
                .unwrap_or_else(|_| "covered.json".into())
                .into(),
            layout: ArtifactLayout::default(),
            suppression: SolutionSuppression::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// On-disk overrides. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    generator: Option<Endpoint>,
    fixer: Option<Endpoint>,
    artifacts_root: Option<PathBuf>,
    quarantine_root: Option<PathBuf>,
    test_command: Option<String>,
    max_retries: Option<u32>,
    collaborator_timeout_secs: Option<u64>,
    test_timeout_secs: Option<u64>,
    transient_retries: Option<u32>,
    ideas_path: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    layout: Option<ArtifactLayout>,
    suppression: Option<SolutionSuppression>,
}

impl ForgeConfig {
    /// Env defaults, overridden by the TOML file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            config.apply_toml(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?;
        }
        Ok(config)
    }

    fn apply_toml(&mut self, text: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(text)?;
        if let Some(v) = file.generator {
            self.generator_endpoint = v;
        }
        if let Some(v) = file.fixer {
            self.fixer_endpoint = v;
        }
        if let Some(v) = file.artifacts_root {
            self.artifacts_root = v;
        }
        if let Some(v) = file.quarantine_root {
            self.quarantine_root = v;
        }
        if let Some(v) = file.test_command {
            self.test_command = v;
        }
        if let Some(v) = file.max_retries {
            self.max_retries = v;
        }
        if let Some(v) = file.collaborator_timeout_secs {
            self.collaborator_timeout_secs = v;
        }
        if let Some(v) = file.test_timeout_secs {
            self.test_timeout_secs = v;
        }
        if let Some(v) = file.transient_retries {
            self.transient_retries = v;
        }
        if let Some(v) = file.ideas_path {
            self.ideas_path = v;
        }
        if let Some(v) = file.ledger_path {
            self.ledger_path = v;
        }
        if let Some(v) = file.layout {
            self.layout = v;
        }
        if let Some(v) = file.suppression {
            self.suppression = v;
        }
        Ok(())
    }

    /// Test runner settings derived from this config.
    pub fn runner_config(&self) -> CommandRunnerConfig {
        CommandRunnerConfig {
            command: self.test_command.clone(),
            working_dir: None,
            timeout_secs: self.test_timeout_secs,
            suppression: self.suppression.clone(),
            output_file: self.layout.test_output_file.clone(),
        }
    }

    /// Last path component of the artifacts root, used to spot
    /// `<dir>/<id>` mentions in free-text replies.
    pub fn artifacts_dir_name(&self) -> String {
        self.artifacts_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "exercises".to_string())
    }
}

/// Check if a chat endpoint is reachable (GET /models).
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{url}/models");
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
