//! Durable storage backends for snapshots and milestones.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::milestone::EvolutionMilestone;
use super::snapshot::CognitiveSnapshot;
use crate::error::{JudgmentError, Result};

const SNAPSHOTS_FILE: &str = "snapshots.json";
const MILESTONES_FILE: &str = "milestones.json";

/// Everything written to or read from durable storage in one go
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedEvolution {
    pub snapshots: Vec<CognitiveSnapshot>,
    pub milestones: Vec<EvolutionMilestone>,
}

#[async_trait]
pub trait EvolutionStorage: Send + Sync {
    /// Missing data is an empty record, not an error.
    async fn load(&self) -> Result<PersistedEvolution>;
    async fn save(&self, data: &PersistedEvolution) -> Result<()>;
    fn describe(&self) -> String;
}

/// Two pretty-printed JSON files under one directory.
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_list<T: serde::de::DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| JudgmentError::Persistence {
                message: format!("{} is corrupt: {}", path.display(), e),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file then rename, so readers never see half a file.
    async fn write_list<T: Serialize>(&self, file: &str, items: &[T]) -> Result<()> {
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{}.tmp", file));
        let body = serde_json::to_vec_pretty(items)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl EvolutionStorage for JsonFileStorage {
    async fn load(&self) -> Result<PersistedEvolution> {
        Ok(PersistedEvolution {
            snapshots: self.read_list(SNAPSHOTS_FILE).await?,
            milestones: self.read_list(MILESTONES_FILE).await?,
        })
    }

    async fn save(&self, data: &PersistedEvolution) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        self.write_list(SNAPSHOTS_FILE, &data.snapshots).await?;
        self.write_list(MILESTONES_FILE, &data.milestones).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Keeps the last saved record in memory and counts saves.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<PersistedEvolution>,
    saves: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the storage as if a previous process had saved `data`.
    pub fn with_data(data: PersistedEvolution) -> Self {
        Self {
            data: Mutex::new(data),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn snapshot_count(&self) -> usize {
        self.data.lock().await.snapshots.len()
    }
}

#[async_trait]
impl EvolutionStorage for MemoryStorage {
    async fn load(&self) -> Result<PersistedEvolution> {
        Ok(self.data.lock().await.clone())
    }

    async fn save(&self, data: &PersistedEvolution) -> Result<()> {
        *self.data.lock().await = data.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("never-written"));
        let data = storage.load().await.unwrap();
        assert!(data.snapshots.is_empty());
        assert!(data.milestones.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(SNAPSHOTS_FILE), b"{not json").await.unwrap();
        let err = JsonFileStorage::new(dir.path()).load().await.unwrap_err();
        assert!(matches!(err, JudgmentError::Persistence { .. }));
    }

    #[tokio::test]
    async fn test_save_creates_directory_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("nested"));
        storage.save(&PersistedEvolution::default()).await.unwrap();
        assert!(storage.dir().join(SNAPSHOTS_FILE).exists());
        assert!(storage.dir().join(MILESTONES_FILE).exists());
        assert!(!storage.dir().join("snapshots.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_memory_storage_counts_saves() {
        let storage = MemoryStorage::new();
        storage.save(&PersistedEvolution::default()).await.unwrap();
        storage.save(&PersistedEvolution::default()).await.unwrap();
        assert_eq!(storage.save_count(), 2);
    }
}
