//! OpenAI-compatible chat implementation of [`Generator`] and [`Fixer`].
//!
//! The model answers with an [`ArtifactReply`] JSON object; its files are
//! written under `<artifacts_root>/<artifact_id>/`. A reply that does not
//! parse is returned as raw text so the id resolver can still scan it.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use coordination::ArtifactId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CollaboratorResponse, Fixer, GenerationRequest, Generator, RequestKind};
use crate::config::Endpoint;
use crate::prompts::{FIXER_PREAMBLE, GENERATOR_PREAMBLE, PROMPT_VERSION};

/// Largest single file inlined into a repair prompt.
const MAX_INLINE_FILE_BYTES: u64 = 64 * 1024;

/// Structured reply the model is asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactReply {
    /// Id of the exercise the files belong to (`NNN_descriptive_name`).
    #[serde(default)]
    pub artifact_id: Option<String>,
    /// One or two sentences on what was created or changed.
    #[serde(default)]
    pub summary: String,
    /// Files to write, relative to the exercise directory.
    #[serde(default)]
    pub files: Vec<FileEdit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileEdit {
    pub path: String,
    pub content: String,
}

/// JSON schema of [`ArtifactReply`], appended to the system prompt.
pub fn reply_schema() -> String {
    let schema = schemars::schema_for!(ArtifactReply);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Which preamble a collaborator speaks with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Generator,
    Fixer,
}

/// Chat-completions client that writes the returned files to disk.
pub struct ChatCollaborator {
    client: reqwest::Client,
    endpoint: Endpoint,
    role: Role,
    artifacts_root: PathBuf,
    transient_retries: u32,
}

impl ChatCollaborator {
    pub fn new(
        endpoint: Endpoint,
        role: Role,
        artifacts_root: impl AsRef<Path>,
        timeout: Duration,
        transient_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            role,
            artifacts_root: artifacts_root.as_ref().to_path_buf(),
            transient_retries,
        })
    }

    fn system_prompt(&self) -> String {
        let preamble = match self.role {
            Role::Generator => GENERATOR_PREAMBLE,
            Role::Fixer => FIXER_PREAMBLE,
        };
        format!("{preamble}\n\n## Reply schema\n{}", reply_schema())
    }

    /// User message: the request prompt plus, for repairs, the current files.
    fn user_prompt(&self, request: &GenerationRequest) -> String {
        let mut prompt = request.prompt.clone();
        if request.kind != RequestKind::Repair {
            return prompt;
        }
        let Some(id) = &request.artifact_id else {
            return prompt;
        };
        let dir = self.artifacts_root.join(id.as_str());
        let files = read_artifact_files(&dir);
        if !files.is_empty() {
            prompt.push_str("\n\nCURRENT FILES:");
            for (name, content) in files {
                prompt.push_str(&format!("\n\n--- {name} ---\n{content}"));
            }
        }
        prompt
    }

    async fn send_once(&self, system: &str, user: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.endpoint.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.2,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.endpoint.url.trim_end_matches('/'));
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.context("error sending request")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("chat endpoint returned {status}: {}", truncate(&text, 500));
        }
        let parsed: ChatResponse = resp.json().await.context("JsonError decoding chat response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("response contained no message"))
    }

    /// Send with exponential backoff on transient errors (2s, 4s, 8s, ...).
    async fn send_with_retry(&self, system: &str, user: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.send_once(system, user).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    let err_str = format!("{e:#}");
                    let err_lower = err_str.to_ascii_lowercase();
                    if !is_transient_error(&err_str, &err_lower) || attempt >= self.transient_retries
                    {
                        return Err(e);
                    }
                    let backoff = Duration::from_secs(2u64.pow(attempt + 1));
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.transient_retries,
                        backoff_secs = backoff.as_secs(),
                        error = %err_str,
                        "Transient error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<CollaboratorResponse> {
        info!(
            role = ?self.role,
            model = %self.endpoint.model,
            attempt = request.attempt,
            artifact_id = ?request.artifact_id.as_ref().map(|id| id.as_str()),
            prompt_version = PROMPT_VERSION,
            "calling producer"
        );
        let text = self
            .send_with_retry(&self.system_prompt(), &self.user_prompt(request))
            .await?;

        let reply = match parse_reply(&text) {
            Some(reply) => reply,
            None => {
                warn!(role = ?self.role, "reply was not structured JSON; keeping raw text");
                return Ok(CollaboratorResponse::text(text));
            }
        };

        self.apply_reply(request, reply)
    }

    /// Write a parsed reply's files under the pinned id, or under the id the
    /// reply names when nothing is pinned. An unusable reply id is an error.
    fn apply_reply(
        &self,
        request: &GenerationRequest,
        reply: ArtifactReply,
    ) -> Result<CollaboratorResponse> {
        let target = match (&request.artifact_id, reply.artifact_id.as_deref()) {
            (Some(pinned), _) => Some(pinned.clone()),
            (None, Some(raw)) => Some(ArtifactId::new(raw).with_context(|| {
                format!("reply named an unusable artifact id {raw:?}; files not written")
            })?),
            (None, None) => None,
        };
        let files_written = match target {
            Some(id) => write_files(&self.artifacts_root.join(id.as_str()), &reply.files)?,
            None => {
                warn!("structured reply has no artifact id; files not written");
                Vec::new()
            }
        };
        debug!(files = files_written.len(), summary = %reply.summary, "producer reply applied");

        Ok(CollaboratorResponse {
            text: reply.summary,
            artifact_id: reply.artifact_id,
            files_written,
        })
    }
}

#[async_trait]
impl Generator for ChatCollaborator {
    async fn generate(&self, request: &GenerationRequest) -> Result<CollaboratorResponse> {
        self.complete(request).await
    }
}

#[async_trait]
impl Fixer for ChatCollaborator {
    async fn repair(&self, request: &GenerationRequest) -> Result<CollaboratorResponse> {
        self.complete(request).await
    }
}

/// Parse a model reply, tolerating a surrounding ```json fence.
pub fn parse_reply(text: &str) -> Option<ArtifactReply> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).ok()
}

/// Write `files` under `dir`. Rejects absolute paths and `..` components.
pub fn write_files(dir: &Path, files: &[FileEdit]) -> Result<Vec<String>> {
    let mut written = Vec::new();
    for file in files {
        let rel = Path::new(&file.path);
        if file.path.is_empty()
            || !rel
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            warn!(path = %file.path, "refusing to write file outside the artifact directory");
            continue;
        }
        let target = dir.join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&target, &file.content)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        written.push(file.path.clone());
    }
    Ok(written)
}

/// Text files directly inside `dir`, sorted by name. Large or non-UTF-8 files
/// are skipped.
fn read_artifact_files(dir: &Path) -> Vec<(String, String)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<(String, String)> = entries
        .filter_map(Result::ok)
        .filter(|e| {
            e.metadata()
                .map(|m| m.is_file() && m.len() <= MAX_INLINE_FILE_BYTES)
                .unwrap_or(false)
        })
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            let content = std::fs::read_to_string(e.path()).ok()?;
            Some((name, content))
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn is_transient_error(err_str: &str, err_lower: &str) -> bool {
    // HTTP status codes
    err_str.contains("502")
        || err_str.contains("503")
        || err_str.contains("429")
        // Connection-level failures (reqwest)
        || err_lower.contains("connection")
        || err_lower.contains("timed out")
        || err_lower.contains("timeout")
        || err_lower.contains("error sending request")
        || err_lower.contains("broken pipe")
        || err_lower.contains("reset by peer")
        || err_lower.contains("response contained no message")
        || err_lower.contains("jsonerror")
}
