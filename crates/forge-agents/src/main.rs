//! Artifact forge CLI.
//!
//! # Usage
//!
//! ```bash
//! # One artifact from explicit metadata
//! forge-agents run --topic ConfigMaps --description "Externalize config" --artifact-id 081_create_configmap
//!
//! # Next uncovered idea from ideas.json
//! forge-agents next
//!
//! # Several ideas, two at a time
//! forge-agents --config forge.toml batch --count 5 --concurrency 2
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coordination::{ArtifactId, RunSeed, TaskMetadata};
use forge_agents::config::check_endpoint;
use forge_agents::{ForgeConfig, Idea, Orchestrator, OrchestratorError, RunOutcome};
use tracing::{error, info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; values override FORGE_* environment defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Failed attempts allowed before quarantine (overrides config)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Artifacts directory (overrides config)
    #[arg(long)]
    artifacts_root: Option<PathBuf>,

    /// Quarantine directory (overrides config)
    #[arg(long)]
    quarantine_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate one artifact from explicit metadata
    Run {
        #[arg(long)]
        artifact_id: Option<String>,
        #[arg(long)]
        topic: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "BEGINNER")]
        difficulty: String,
        #[arg(long, default_value = "")]
        objective: String,
        /// Use this prompt verbatim for the first generation request
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Generate the next uncovered idea from the idea source
    Next,
    /// Generate several ideas concurrently
    Batch {
        #[arg(long, default_value_t = 3)]
        count: usize,
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Exit code for a finished run: 0 kept, 2 quarantined. Fatal errors are 1.
fn exit_code(outcome: &RunOutcome) -> u8 {
    if outcome.succeeded() {
        0
    } else {
        2
    }
}

fn report(idea: Option<&Idea>, result: Result<RunOutcome, OrchestratorError>) -> u8 {
    let topic = idea.map(|i| i.topic.as_str()).unwrap_or("");
    match result {
        Ok(outcome) => {
            println!("{outcome}");
            exit_code(&outcome)
        }
        Err(e) => {
            error!(topic, error = %e, "Run aborted");
            eprintln!("Run aborted: {e}");
            1
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let mut config = ForgeConfig::load(args.config.as_deref())?;
    if let Some(max) = args.max_retries {
        config.max_retries = max;
    }
    if let Some(root) = args.artifacts_root {
        config.artifacts_root = root;
    }
    if let Some(root) = args.quarantine_root {
        config.quarantine_root = root;
    }

    info!(
        generator = %config.generator_endpoint.url,
        fixer = %config.fixer_endpoint.url,
        artifacts_root = %config.artifacts_root.display(),
        quarantine_root = %config.quarantine_root.display(),
        max_retries = config.max_retries,
        "Artifact forge starting"
    );
    if !check_endpoint(&config.generator_endpoint.url).await {
        warn!(url = %config.generator_endpoint.url, "Generator endpoint not reachable");
    }

    std::fs::create_dir_all(&config.artifacts_root).with_context(|| {
        format!(
            "Failed to create artifacts root {}",
            config.artifacts_root.display()
        )
    })?;
    let orchestrator = Orchestrator::from_config(&config)?;

    let code = match args.command {
        Command::Run {
            artifact_id,
            topic,
            description,
            difficulty,
            objective,
            prompt,
        } => {
            let artifact_id = artifact_id
                .map(ArtifactId::new)
                .transpose()
                .context("Invalid --artifact-id")?;
            let metadata = TaskMetadata {
                topic,
                description,
                difficulty,
                objective,
            };
            let mut seed = RunSeed::new(artifact_id, metadata, config.max_retries)
                .context("Invalid run seed")?;
            if let Some(prompt) = prompt {
                seed = seed.with_prompt(prompt);
            }
            report(None, orchestrator.run(seed).await)
        }
        Command::Next => {
            let (idea, result) = orchestrator.run_next().await?;
            report(Some(&idea), result)
        }
        Command::Batch { count, concurrency } => {
            let results = orchestrator.run_batch(count, concurrency).await?;
            let total = results.len();
            // Worst code wins: any abort is 1, else any quarantine is 2.
            let mut worst = 0u8;
            for (idea, result) in results {
                let code = report(Some(&idea), result);
                worst = match (worst, code) {
                    (1, _) | (_, 1) => 1,
                    (a, b) => a.max(b),
                };
            }
            info!(total, "Batch finished");
            worst
        }
    };

    Ok(ExitCode::from(code))
}
