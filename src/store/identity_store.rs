//! In-memory identity records with save-whole-on-change persistence.
//!
//! Each address is only ever written by its own identity pipeline, so a single
//! map lock is enough; persistence serializes a snapshot taken at write time.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error};

use super::persistence::{RecordPersistence, Snapshot};
use super::record::{IdentityRecord, ResourceProfile};
use crate::error::StoreError;

/// Shared record store plus the ephemeral remote account-id directory.
pub struct IdentityStore {
    backend: Arc<dyn RecordPersistence>,
    records: RwLock<Snapshot>,
    /// Remote account ids, display only and never persisted.
    account_ids: RwLock<HashMap<String, String>>,
    save_lock: Mutex<()>,
}

impl IdentityStore {
    /// Load every record from `backend`.
    pub async fn open(backend: Arc<dyn RecordPersistence>) -> Result<Arc<Self>, StoreError> {
        let records = backend.load().await?;
        debug!(records = records.len(), "Identity store loaded");
        Ok(Arc::new(Self {
            backend,
            records: RwLock::new(records),
            account_ids: RwLock::new(HashMap::new()),
            save_lock: Mutex::new(()),
        }))
    }

    /// Get the record for `address`, creating an empty one on first reference.
    pub async fn get_or_create(&self, address: &str) -> IdentityRecord {
        if let Some(record) = self.records.read().await.get(address) {
            return record.clone();
        }
        self.records
            .write()
            .await
            .entry(address.to_string())
            .or_insert_with(|| IdentityRecord::new(address))
            .clone()
    }

    pub async fn get(&self, address: &str) -> Option<IdentityRecord> {
        self.records.read().await.get(address).cloned()
    }

    /// The stored token, if provisioning has completed for `address`.
    pub async fn token(&self, address: &str) -> Option<String> {
        self.records
            .read()
            .await
            .get(address)
            .and_then(|r| r.token.clone())
            .filter(|t| !t.is_empty())
    }

    /// Store `token` unless one is already present. Persists on change.
    ///
    /// Returns the token now held by the record.
    pub async fn set_token_if_absent(&self, address: &str, token: String) -> String {
        let stored = {
            let mut records = self.records.write().await;
            let record = records
                .entry(address.to_string())
                .or_insert_with(|| IdentityRecord::new(address));
            if record.has_token() {
                return record.token.clone().unwrap_or_default();
            }
            record.token = Some(token.clone());
            token
        };
        self.persist_logged().await;
        stored
    }

    /// Return the resource profile for `address`, assigning `pick()` first if
    /// none is set. An existing profile is never replaced. Persists on change.
    pub async fn ensure_resources_with<F>(&self, address: &str, pick: F) -> ResourceProfile
    where
        F: FnOnce() -> ResourceProfile,
    {
        let assigned = {
            let mut records = self.records.write().await;
            let record = records
                .entry(address.to_string())
                .or_insert_with(|| IdentityRecord::new(address));
            if let Some(existing) = record.resource_profile() {
                return existing;
            }
            let profile = pick();
            record.gpu = Some(profile.gpu.clone());
            record.storage = Some(profile.storage);
            profile
        };
        self.persist_logged().await;
        assigned
    }

    /// Write the whole store through the backend.
    pub async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.save_lock.lock().await;
        let snapshot = self.records.read().await.clone();
        self.backend.save(&snapshot).await
    }

    pub async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            error!("Error writing identity store: {}", e);
        }
    }

    pub async fn set_account_id(&self, address: &str, account_id: String) {
        self.account_ids
            .write()
            .await
            .insert(address.to_string(), account_id);
    }

    pub async fn account_id(&self, address: &str) -> Option<String> {
        self.account_ids.read().await.get(address).cloned()
    }

    /// Account id for log lines, `-` while unknown.
    pub async fn account_label(&self, address: &str) -> String {
        self.account_id(address)
            .await
            .unwrap_or_else(|| "-".to_string())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
