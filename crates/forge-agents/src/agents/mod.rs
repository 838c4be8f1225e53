//! Producer and idea-source collaborators.
//!
//! The Generator creates an artifact from a brief, the Fixer patches an
//! existing one, and the IdeaSource proposes what to build next. The chat
//! implementations talk to an OpenAI-compatible endpoint; tests swap in
//! scripted or mocked ones.

pub mod chat;
pub mod idea;

use async_trait::async_trait;
use coordination::{ArtifactId, TaskMetadata};
use serde::{Deserialize, Serialize};

/// Whether a request starts over or patches an existing artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Generate,
    Repair,
}

/// A request for a producer collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: RequestKind,
    /// Pinned artifact id, when already known.
    pub artifact_id: Option<ArtifactId>,
    pub prompt: String,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// What a producer reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorResponse {
    /// Free text as returned by the producer.
    pub text: String,
    /// Artifact id from a structured reply, if the producer gave one.
    pub artifact_id: Option<String>,
    /// Files written, relative to the artifact directory.
    #[serde(default)]
    pub files_written: Vec<String>,
}

impl CollaboratorResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Produces a fresh artifact from a brief.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<CollaboratorResponse>;
}

/// Patches only the broken files of an existing artifact.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fixer: Send + Sync {
    async fn repair(&self, request: &GenerationRequest) -> anyhow::Result<CollaboratorResponse>;
}

/// A candidate task to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    pub topic: String,
    pub description: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default, alias = "candidateArtifactId")]
    pub candidate_artifact_id: Option<String>,
}

impl Idea {
    pub fn metadata(&self) -> TaskMetadata {
        TaskMetadata {
            topic: self.topic.clone(),
            description: self.description.clone(),
            difficulty: self.difficulty.clone(),
            objective: self.objective.clone(),
        }
    }
}

/// Proposes ideas and remembers which topics were covered successfully.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdeaSource: Send + Sync {
    /// Up to `count` ideas not yet covered and not colliding with `existing_ids`.
    async fn propose(&self, existing_ids: &[String], count: usize) -> anyhow::Result<Vec<Idea>>;

    /// Topics already covered by successful runs.
    async fn covered_topics(&self) -> anyhow::Result<Vec<String>>;

    /// Record a successful run. Never called for failed runs.
    async fn record_success(&self, idea: &Idea) -> anyhow::Result<()>;
}
