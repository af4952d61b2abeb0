//! Persistence backends for the identity store.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

use super::record::IdentityRecord;
use crate::error::StoreError;

/// Whole-store snapshot keyed by address.
pub type Snapshot = BTreeMap<String, IdentityRecord>;

/// Load/save-whole interface the identity store persists through.
#[async_trait]
pub trait RecordPersistence: Send + Sync {
    /// Read every record. A missing backing file is an empty store.
    async fn load(&self) -> Result<Snapshot, StoreError>;

    /// Replace the persisted contents with `snapshot`.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Pretty-printed JSON object on disk.
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordPersistence for JsonFile {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No existing data store found at {}, a new one will be created",
                    self.path.display()
                );
                return Ok(Snapshot::new());
            }
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Snapshot::new());
        }

        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(snapshot)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        // Atomic replace via rename.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Process-local backend that keeps the last saved snapshot in memory.
#[derive(Default)]
pub struct InMemory {
    saved: Mutex<Snapshot>,
    saves: AtomicUsize,
}

impl InMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend as if `snapshot` had been saved earlier.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            saved: Mutex::new(snapshot),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn saved(&self) -> Snapshot {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl RecordPersistence for InMemory {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(self.saved.lock().await.clone())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        *self.saved.lock().await = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let file = JsonFile::new(dir.path().join("data.json"));
        assert!(file.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = JsonFile::new(dir.path().join("nested").join("data.json"));

        let mut snapshot = Snapshot::new();
        let mut record = IdentityRecord::new("0xaaa");
        record.token = Some("token-a".into());
        snapshot.insert(record.address.clone(), record);
        let record = IdentityRecord::new("0xbbb");
        snapshot.insert(record.address.clone(), record);

        file.save(&snapshot).await.unwrap();
        let loaded = file.load().await.unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!dir.path().join("nested").join("data.json.tmp").exists());
    }

    #[tokio::test]
    async fn garbage_is_reported_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "{ not json").await.unwrap();
        let err = JsonFile::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
