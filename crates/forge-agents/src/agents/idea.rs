//! JSON-file idea source with a success-only coverage ledger.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Idea, IdeaSource};

/// Reads candidate ideas from a JSON array and tracks covered topics in a
/// separate ledger file (`covered.json`).
pub struct JsonIdeaSource {
    ideas_path: PathBuf,
    ledger_path: PathBuf,
    // Serializes ledger read-modify-write across concurrent runs.
    ledger_lock: Mutex<()>,
}

impl JsonIdeaSource {
    pub fn new(ideas_path: impl AsRef<Path>, ledger_path: impl AsRef<Path>) -> Self {
        Self {
            ideas_path: ideas_path.as_ref().to_path_buf(),
            ledger_path: ledger_path.as_ref().to_path_buf(),
            ledger_lock: Mutex::new(()),
        }
    }

    fn load_ideas(&self) -> Result<Vec<Idea>> {
        let text = std::fs::read_to_string(&self.ideas_path)
            .with_context(|| format!("Failed to read ideas from {}", self.ideas_path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid ideas file {}", self.ideas_path.display()))
    }

    fn load_ledger(&self) -> Result<Vec<String>> {
        if !self.ledger_path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.ledger_path)
            .with_context(|| format!("Failed to read ledger {}", self.ledger_path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid ledger {}", self.ledger_path.display()))
    }

    fn save_ledger(&self, topics: &[String]) -> Result<()> {
        if let Some(parent) = self.ledger_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.ledger_path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(topics)?)?;
        std::fs::rename(&tmp, &self.ledger_path)
            .with_context(|| format!("Failed to write ledger {}", self.ledger_path.display()))
    }
}

fn normalize(topic: &str) -> String {
    topic.trim().to_lowercase()
}

#[async_trait]
impl IdeaSource for JsonIdeaSource {
    async fn propose(&self, existing_ids: &[String], count: usize) -> Result<Vec<Idea>> {
        let ideas = self.load_ideas()?;
        let covered: HashSet<String> = {
            let _guard = self.ledger_lock.lock().await;
            self.load_ledger()?.iter().map(|t| normalize(t)).collect()
        };

        let mut seen_topics = HashSet::new();
        let picked: Vec<Idea> = ideas
            .into_iter()
            .filter(|idea| !covered.contains(&normalize(&idea.topic)))
            .filter(|idea| {
                idea.candidate_artifact_id
                    .as_ref()
                    .map_or(true, |id| !existing_ids.contains(id))
            })
            .filter(|idea| seen_topics.insert(normalize(&idea.topic)))
            .take(count)
            .collect();

        debug!(
            proposed = picked.len(),
            covered = covered.len(),
            "ideas proposed"
        );
        Ok(picked)
    }

    async fn covered_topics(&self) -> Result<Vec<String>> {
        let _guard = self.ledger_lock.lock().await;
        self.load_ledger()
    }

    async fn record_success(&self, idea: &Idea) -> Result<()> {
        let _guard = self.ledger_lock.lock().await;
        let mut topics = self.load_ledger()?;
        if topics.iter().any(|t| normalize(t) == normalize(&idea.topic)) {
            return Ok(());
        }
        topics.push(idea.topic.clone());
        self.save_ledger(&topics)?;
        info!(topic = %idea.topic, covered = topics.len(), "topic recorded as covered");
        Ok(())
    }
}
