//! Bounded-retry orchestrator.
//!
//! One call to [`Orchestrator::run`] drives a single artifact through
//! Generate, Parse, Validate, Test and Decide, then either negative
//! verification and success, or the failure path: record the failure, check
//! the budget, and repair in place or quarantine. Every run owns its own
//! [`RunState`] and [`StateMachine`]; nothing is shared between runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use coordination::{
    decide, select_action, select_loop_action, Action, ArtifactId, ArtifactLayout,
    ArtifactLocation, ArtifactStore, CombinedResult, CommandTestRunner, FileStructureValidator,
    LoopAction, QuarantineArea, QuarantineRequest, RunSeed, RunState, SolutionSuppression,
    TestMode, TestRunner, TestRunnerAdapter, TestVerdict, Validator, ValidatorAdapter,
};
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::agents::chat::{ChatCollaborator, Role};
use crate::agents::idea::JsonIdeaSource;
use crate::agents::{
    CollaboratorResponse, Fixer, GenerationRequest, Generator, Idea, IdeaSource, RequestKind,
};
use crate::artifact_id::resolve_artifact_id;
use crate::config::ForgeConfig;
use crate::error::OrchestratorError;
use crate::negative::{verify_checks_are_meaningful, NegativeOutcome};
use crate::outcome::{RunOutcome, RunStatus};
use crate::prompts::{build_generation_request, repair_request};
use crate::state_machine::{LifecycleState, StateMachine};

/// Default budget used when seeding runs from the idea source.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    fixer: Arc<dyn Fixer>,
    validator: ValidatorAdapter,
    runner: TestRunnerAdapter,
    store: ArtifactStore,
    quarantine_root: PathBuf,
    layout: ArtifactLayout,
    suppression: SolutionSuppression,
    ideas: Option<Arc<dyn IdeaSource>>,
    collaborator_timeout: Duration,
    artifacts_dir_name: String,
    max_retries: u32,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        fixer: Arc<dyn Fixer>,
        validator: Arc<dyn Validator>,
        runner: Arc<dyn TestRunner>,
        artifacts_root: impl AsRef<Path>,
        quarantine_root: impl AsRef<Path>,
    ) -> Self {
        let artifacts_root = artifacts_root.as_ref();
        let artifacts_dir_name = artifacts_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            generator,
            fixer,
            validator: ValidatorAdapter::new(validator),
            runner: TestRunnerAdapter::new(runner),
            store: ArtifactStore::new(artifacts_root),
            quarantine_root: quarantine_root.as_ref().to_path_buf(),
            layout: ArtifactLayout::default(),
            suppression: SolutionSuppression::default(),
            ideas: None,
            collaborator_timeout: Duration::from_secs(600),
            artifacts_dir_name,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Wire chat producers, the file-structure validator, the command test
    /// runner and the JSON idea source from configuration.
    pub fn from_config(config: &ForgeConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.collaborator_timeout_secs);
        let generator = ChatCollaborator::new(
            config.generator_endpoint.clone(),
            Role::Generator,
            &config.artifacts_root,
            timeout,
            config.transient_retries,
        )
        .context("Failed to build generator client")?;
        let fixer = ChatCollaborator::new(
            config.fixer_endpoint.clone(),
            Role::Fixer,
            &config.artifacts_root,
            timeout,
            config.transient_retries,
        )
        .context("Failed to build fixer client")?;
        let runner = CommandTestRunner::new(config.runner_config())
            .context("Invalid test command")?;

        Ok(Self::new(
            Arc::new(generator),
            Arc::new(fixer),
            Arc::new(FileStructureValidator::new(config.layout.clone())),
            Arc::new(runner),
            &config.artifacts_root,
            &config.quarantine_root,
        )
        .with_layout(config.layout.clone())
        .with_suppression(config.suppression.clone())
        .with_idea_source(Arc::new(JsonIdeaSource::new(
            &config.ideas_path,
            &config.ledger_path,
        )))
        .with_collaborator_timeout(timeout)
        .with_artifacts_dir_name(config.artifacts_dir_name())
        .with_max_retries(config.max_retries))
    }

    pub fn with_layout(mut self, layout: ArtifactLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_suppression(mut self, suppression: SolutionSuppression) -> Self {
        self.suppression = suppression;
        self
    }

    pub fn with_idea_source(mut self, ideas: Arc<dyn IdeaSource>) -> Self {
        self.ideas = Some(ideas);
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    pub fn with_artifacts_dir_name(mut self, name: impl Into<String>) -> Self {
        self.artifacts_dir_name = name.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Run one artifact to a terminal state.
    ///
    /// Returns `Err` only for fatal conditions (no artifact id, missing
    /// metadata, illegal transition). Quarantine is an `Ok` outcome.
    pub async fn run(&self, seed: RunSeed) -> Result<RunOutcome, OrchestratorError> {
        let mut state = RunState::new(&seed);
        let mut sm = StateMachine::new();
        info!(
            run_id = %state.run_id(),
            artifact_id = ?seed.artifact_id.as_ref().map(|id| id.as_str()),
            topic = %seed.metadata.topic,
            max_retries = state.max_retries(),
            "Starting run"
        );

        let mut request = match seed.prompt {
            Some(prompt) => GenerationRequest {
                kind: RequestKind::Generate,
                artifact_id: seed.artifact_id.clone(),
                prompt,
                attempt: 1,
            },
            None => {
                let covered = self.covered_topics().await;
                build_generation_request(
                    seed.artifact_id.as_ref(),
                    &seed.metadata,
                    &self.layout,
                    &self.artifacts_dir_name,
                    &self.store.existing_ids(),
                    &covered,
                )
            }
        };
        sm.advance(LifecycleState::Generate, Some("run started"))?;

        loop {
            let combined = match self.call_producer(&request).await {
                Ok(response) => {
                    match self.check_attempt(&mut state, &mut sm, &response).await? {
                        AttemptResult::Kept(combined) => {
                            sm.advance(LifecycleState::Succeeded, None)?;
                            return Ok(self.succeed(&state, combined, sm));
                        }
                        AttemptResult::Failed(combined) => combined,
                    }
                }
                Err(e) => {
                    let Some(id) = state.artifact_id().cloned() else {
                        error!(error = %format!("{e:#}"), "producer failed before an artifact id was known");
                        return Err(OrchestratorError::parse_failure(&format!(
                            "producer error: {e:#}"
                        )));
                    };
                    warn!(artifact_id = %id, attempt = sm.attempt(), error = %format!("{e:#}"), "Producer call failed");
                    let location = self.store.locate(&id);
                    let verdict = TestVerdict::collaborator_error(&location, format!("{e:#}"));
                    state.record_test(verdict.clone());
                    let combined = decide(verdict, &state);
                    sm.advance(LifecycleState::Fail, Some(&combined.test.reason))?;
                    combined
                }
            };

            // Fail: exactly one increment per failed attempt.
            let id = combined.artifact_id().clone();
            let reasons = combined.failure_reasons();
            let retry_count = state.record_failure(&id, reasons);
            let combined = combined.with_retry_count(retry_count);
            warn!(
                artifact_id = %id,
                retry_count,
                max_retries = state.max_retries(),
                reasons = ?combined.failure_reasons(),
                "Attempt failed"
            );

            sm.advance(LifecycleState::CheckBudget, None)?;
            match select_loop_action(&combined) {
                LoopAction::Repair => {
                    sm.advance(LifecycleState::Repair, None)?;
                    let location = self.store.locate(&id);
                    request = repair_request(
                        &combined,
                        state.raw_output(&id),
                        location.exists(),
                        &self.artifacts_dir_name,
                        &self.layout,
                    )?;
                    sm.set_attempt(request.attempt);
                    let note = match request.kind {
                        RequestKind::Repair => "repair in place",
                        RequestKind::Generate => "regenerate under pinned id",
                    };
                    info!(artifact_id = %id, attempt = request.attempt, note, "Retrying");
                    sm.advance(LifecycleState::Generate, Some(note))?;
                }
                LoopAction::Terminate => {
                    sm.advance(LifecycleState::Quarantine, Some("retry budget exhausted"))?;
                    let location = self.store.locate(&id);
                    let (quarantine_path, quarantine_error) =
                        self.quarantine(&state, &location, &combined, &sm);
                    sm.advance(LifecycleState::Quarantined, None)?;
                    let path = sm.summary();
                    let outcome = RunOutcome {
                        artifact_id: id,
                        status: RunStatus::Quarantined,
                        retry_count: state.retry_count(),
                        max_retries: state.max_retries(),
                        final_result: combined,
                        quarantine_path,
                        quarantine_error,
                        transitions: sm.into_transitions(),
                    };
                    error!(
                        artifact_id = %outcome.artifact_id,
                        retry_count = outcome.retry_count,
                        quarantine = ?outcome.quarantine_path,
                        %path,
                        "{outcome}"
                    );
                    return Ok(outcome);
                }
            }
        }
    }

    /// Parse, Validate, Test, Decide and, on keep, negative verification.
    async fn check_attempt(
        &self,
        state: &mut RunState,
        sm: &mut StateMachine,
        response: &CollaboratorResponse,
    ) -> Result<AttemptResult, OrchestratorError> {
        sm.advance(LifecycleState::Parse, None)?;
        let (resolved, source) =
            resolve_artifact_id(state.artifact_id(), response, &self.artifacts_dir_name)?;
        let id = state.pin_artifact_id(resolved).clone();
        let location = self.store.locate(&id);
        info!(
            artifact_id = %id,
            ?source,
            files_written = response.files_written.len(),
            attempt = sm.attempt(),
            "Artifact resolved"
        );

        sm.advance(LifecycleState::Validate, None)?;
        let validation = self.validator.validate(&location).await;
        let validation_reason = validation.reason.clone();
        state.record_validation(validation);

        sm.advance(LifecycleState::Test, Some(&validation_reason))?;
        let test = self.run_checks(&location, TestMode::Normal).await;
        state.record_test(test.clone());

        sm.advance(LifecycleState::Decide, Some(&test.reason))?;
        let combined = decide(test, state);
        if select_action(&combined) == Action::Fail {
            sm.advance(LifecycleState::Fail, Some("checks failed"))?;
            return Ok(AttemptResult::Failed(combined));
        }

        sm.advance(LifecycleState::KeepVerify, None)?;
        let failed = match verify_checks_are_meaningful(
            &self.runner,
            &location,
            &self.layout,
            &self.suppression,
        )
        .await
        {
            Ok(NegativeOutcome::Meaningful) => return Ok(AttemptResult::Kept(combined)),
            Ok(NegativeOutcome::Vacuous(verdict)) => verdict,
            Err(e) => {
                warn!(artifact_id = %id, error = %format!("{e:#}"), "Negative verification run failed");
                TestVerdict::collaborator_error(&location, format!("{e:#}"))
            }
        };
        state.record_test(failed.clone());
        let combined = decide(failed, state);
        sm.advance(LifecycleState::Fail, Some(&combined.test.reason))?;
        Ok(AttemptResult::Failed(combined))
    }

    /// Normal-mode test run. Infrastructure errors become a failed verdict.
    async fn run_checks(&self, location: &ArtifactLocation, mode: TestMode) -> TestVerdict {
        match self.runner.run(location, mode).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(artifact_id = %location.id, error = %format!("{e:#}"), "Test runner failed");
                TestVerdict::collaborator_error(location, format!("{e:#}"))
            }
        }
    }

    async fn call_producer(
        &self,
        request: &GenerationRequest,
    ) -> anyhow::Result<CollaboratorResponse> {
        let call = async {
            match request.kind {
                RequestKind::Generate => self.generator.generate(request).await,
                RequestKind::Repair => self.fixer.repair(request).await,
            }
        };
        match tokio::time::timeout(self.collaborator_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "producer timed out after {}s",
                self.collaborator_timeout.as_secs()
            )),
        }
    }

    fn succeed(&self, state: &RunState, combined: CombinedResult, sm: StateMachine) -> RunOutcome {
        let path = sm.summary();
        let outcome = RunOutcome {
            artifact_id: combined.artifact_id().clone(),
            status: RunStatus::Succeeded,
            retry_count: state.retry_count(),
            max_retries: state.max_retries(),
            final_result: combined,
            quarantine_path: None,
            quarantine_error: None,
            transitions: sm.into_transitions(),
        };
        info!(
            artifact_id = %outcome.artifact_id,
            retry_count = outcome.retry_count,
            %path,
            "{outcome}"
        );
        outcome
    }

    /// Relocate the artifact and write the failure report. Failure here is
    /// logged and returned, never fatal.
    fn quarantine(
        &self,
        state: &RunState,
        location: &ArtifactLocation,
        combined: &CombinedResult,
        sm: &StateMachine,
    ) -> (Option<PathBuf>, Option<String>) {
        let area = QuarantineArea::new(&self.quarantine_root)
            .with_report_embeds(self.layout.report_embeds.clone())
            .with_test_output_file(self.layout.test_output_file.clone());
        let request = QuarantineRequest {
            source: location,
            combined,
            reasons: state
                .failure_reasons(&location.id)
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
            raw_output: state.raw_output(&location.id).map(String::from),
            transitions: Some(sm.transition_log()),
        };
        match area.quarantine(request) {
            Ok(path) => (Some(path), None),
            Err(e) => {
                error!(artifact_id = %location.id, error = %e, "Quarantine bookkeeping failed");
                (None, Some(e.to_string()))
            }
        }
    }

    async fn covered_topics(&self) -> Vec<String> {
        let Some(ideas) = &self.ideas else {
            return Vec::new();
        };
        ideas.covered_topics().await.unwrap_or_else(|e| {
            warn!(error = %format!("{e:#}"), "Could not read covered topics");
            Vec::new()
        })
    }

    /// Run independent seeds concurrently, at most `concurrency` at a time.
    /// Results arrive in completion order.
    pub async fn run_many(
        &self,
        seeds: Vec<RunSeed>,
        concurrency: usize,
    ) -> Vec<(RunSeed, Result<RunOutcome, OrchestratorError>)> {
        stream::iter(seeds)
            .map(|seed| async move {
                let result = self.run(seed.clone()).await;
                (seed, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    /// Seed up to `count` runs from the idea source and run them. Topics of
    /// successful runs are recorded as covered.
    pub async fn run_batch(
        &self,
        count: usize,
        concurrency: usize,
    ) -> anyhow::Result<Vec<(Idea, Result<RunOutcome, OrchestratorError>)>> {
        let Some(ideas) = self.ideas.clone() else {
            bail!("No idea source configured");
        };
        let proposed = ideas
            .propose(&self.store.existing_ids(), count)
            .await
            .context("Idea source failed")?;
        if proposed.is_empty() {
            bail!("No uncovered ideas left");
        }

        let mut planned = Vec::with_capacity(proposed.len());
        for idea in proposed {
            let artifact_id = idea.candidate_artifact_id.as_deref().and_then(|s| {
                ArtifactId::new(s)
                    .map_err(|e| warn!(candidate = s, error = %e, "Ignoring invalid candidate id"))
                    .ok()
            });
            let seed = RunSeed::new(artifact_id, idea.metadata(), self.max_retries)?;
            planned.push((idea, seed));
        }

        let results = stream::iter(planned)
            .map(|(idea, seed)| {
                let ideas = Arc::clone(&ideas);
                async move {
                    let result = self.run(seed).await;
                    if matches!(&result, Ok(outcome) if outcome.succeeded()) {
                        if let Err(e) = ideas.record_success(&idea).await {
                            error!(topic = %idea.topic, error = %format!("{e:#}"), "Failed to record covered topic");
                        }
                    }
                    (idea, result)
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        Ok(results)
    }

    /// Seed one run from the idea source.
    pub async fn run_next(&self) -> anyhow::Result<(Idea, Result<RunOutcome, OrchestratorError>)> {
        self.run_batch(1, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No uncovered ideas left"))
    }
}

enum AttemptResult {
    Kept(CombinedResult),
    Failed(CombinedResult),
}
