//! Durable record of which archive members have been processed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::types::IngestError;

/// Persists the processed-member name set as a JSON array of strings.
///
/// Deliberately dumb: `load` and `save` move the whole set, and merging or
/// growing it is the orchestrator's job. Names are written sorted so
/// checkpoint files diff cleanly between runs.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the previously saved set; an absent file is a first run and
    /// yields an empty set.
    pub async fn load(&self) -> Result<HashSet<String>, IngestError> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }
        let raw = fs::read_to_string(&self.path).await?;
        let names: Vec<String> = serde_json::from_str(&raw).map_err(|err| {
            IngestError::Storage(format!(
                "corrupt checkpoint file '{}': {err}",
                self.path.display()
            ))
        })?;
        Ok(names.into_iter().collect())
    }

    /// Overwrites the durable representation with `names`.
    pub async fn save(&self, names: &HashSet<String>) -> Result<(), IngestError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut sorted: Vec<&String> = names.iter().collect();
        sorted.sort();
        let serialized = serde_json::to_string(&sorted)
            .map_err(|err| IngestError::Storage(err.to_string()))?;
        fs::write(&self.path, serialized).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_loads_as_empty_set() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));

        let names: HashSet<String> = ["a.xml", "b.xml"].iter().map(|s| s.to_string()).collect();
        store.save(&names).await.unwrap();
        assert_eq!(store.load().await.unwrap(), names);
    }

    #[tokio::test]
    async fn save_overwrites_previous_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, r#"["old.xml"]"#).unwrap();

        let store = CheckpointStore::new(&path);
        let names: HashSet<String> =
            ["new1.xml", "new2.xml"].iter().map(|s| s.to_string()).collect();
        store.save(&names).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, names);
        assert!(!loaded.contains("old.xml"));
    }

    #[tokio::test]
    async fn save_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("state/nested/checkpoint.json"));
        store.save(&HashSet::new()).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_an_empty_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, "{not an array").unwrap();

        let store = CheckpointStore::new(&path);
        assert!(store.load().await.is_err());
    }
}
