//! Identity records, one per managed credential.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derive the protocol-visible worker identifier from a credential.
///
/// Standard base64 of the address bytes; the same address always maps to the
/// same identifier.
pub fn derive_worker_id(address: &str) -> String {
    STANDARD.encode(address.as_bytes())
}

/// Synthetic hardware capacity reported in heartbeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceProfile {
    /// Compute descriptor from the catalogue.
    pub gpu: String,
    /// Storage quantity in [0, 500) with two decimals.
    pub storage: Decimal,
}

/// Persisted per-identity state.
///
/// Field names on disk follow the store format shared with earlier
/// deployments (`workerID`, `id`, `gpu`, `storage`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub address: String,
    #[serde(rename = "workerID")]
    pub worker_id: String,
    /// Random session identifier sent with REGISTER.
    #[serde(rename = "id")]
    pub session_id: Uuid,
    /// Bearer token, set once by provisioning.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub gpu: Option<String>,
    #[serde(default)]
    pub storage: Option<Decimal>,
}

impl IdentityRecord {
    /// Fresh record for a credential seen for the first time.
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            worker_id: derive_worker_id(address),
            session_id: Uuid::new_v4(),
            token: None,
            gpu: None,
            storage: None,
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// The assigned profile, present only when both halves are set.
    pub fn resource_profile(&self) -> Option<ResourceProfile> {
        match (&self.gpu, self.storage) {
            (Some(gpu), Some(storage)) if !gpu.is_empty() => Some(ResourceProfile {
                gpu: gpu.clone(),
                storage,
            }),
            _ => None,
        }
    }
}
