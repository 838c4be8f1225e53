//! Artifact identity and on-disk location.
//!
//! An artifact is the file set generated for one exercise. Its id is assigned
//! once per run (by the caller or the generator) and stays fixed across every
//! retry, so all attempts target the same directory.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoordinationError, CoordinationResult};

/// Opaque, externally assigned artifact identifier.
///
/// Used as a directory name, so it must be non-empty and must not contain
/// path separators or parent-directory components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Parse an artifact id, rejecting values that cannot name a directory.
    pub fn new(id: impl Into<String>) -> CoordinationResult<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains('/')
            || trimmed.contains('\\')
        {
            return Err(CoordinationError::invalid_artifact_id(id));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = CoordinationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.0
    }
}

/// An artifact id resolved to its working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub id: ArtifactId,
    pub path: PathBuf,
}

impl ArtifactLocation {
    /// Whether the artifact directory currently exists.
    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }
}

/// Root directory under which in-progress artifacts live (`<root>/<id>/`).
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the working location for an artifact id.
    pub fn locate(&self, id: &ArtifactId) -> ArtifactLocation {
        ArtifactLocation {
            id: id.clone(),
            path: self.root.join(id.as_str()),
        }
    }

    /// Names of artifact directories already present under the root, sorted.
    ///
    /// Fed to the generator so it avoids colliding with existing artifacts.
    /// A missing root yields an empty list.
    pub fn existing_ids(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_id_rejects_path_like_values() {
        assert!(ArtifactId::new("").is_err());
        assert!(ArtifactId::new("   ").is_err());
        assert!(ArtifactId::new("..").is_err());
        assert!(ArtifactId::new("a/b").is_err());
        assert!(ArtifactId::new("a\\b").is_err());
        assert_eq!(
            ArtifactId::new(" 042_config_maps ").unwrap().as_str(),
            "042_config_maps"
        );
    }

    #[test]
    fn test_artifact_id_serde_validates() {
        let id: ArtifactId = serde_json::from_str("\"007_pods\"").unwrap();
        assert_eq!(id.to_string(), "007_pods");
        assert!(serde_json::from_str::<ArtifactId>("\"../etc\"").is_err());
    }

    #[test]
    fn test_store_locate_and_existing_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("002_b")).unwrap();
        std::fs::create_dir_all(dir.path().join("001_a")).unwrap();
        std::fs::create_dir_all(dir.path().join("__pycache__")).unwrap();
        std::fs::write(dir.path().join("003_not_a_dir"), "").unwrap();

        let store = ArtifactStore::new(dir.path());
        assert_eq!(store.existing_ids(), vec!["001_a", "002_b"]);

        let loc = store.locate(&ArtifactId::new("001_a").unwrap());
        assert_eq!(loc.path, dir.path().join("001_a"));
        assert!(loc.exists());
    }

    #[test]
    fn test_existing_ids_missing_root() {
        let store = ArtifactStore::new("/definitely/not/here");
        assert!(store.existing_ids().is_empty());
    }
}
