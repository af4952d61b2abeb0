//! Synthetic capacity profiles attached to identities.

use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use tracing::info;

use crate::store::{IdentityStore, ResourceProfile};

/// Built-in compute descriptors used when no catalogue file is supplied.
pub const DEFAULT_CATALOGUE: &[&str] = &[
    "1x NVIDIA GeForce RTX 4090",
    "1x NVIDIA GeForce RTX 4080",
    "1x NVIDIA GeForce RTX 4070 Ti",
    "1x NVIDIA GeForce RTX 3090",
    "1x NVIDIA GeForce RTX 3080",
    "1x NVIDIA GeForce RTX 3070",
    "1x NVIDIA GeForce RTX 3060",
    "1x NVIDIA RTX A4000",
    "1x NVIDIA RTX A5000",
    "1x NVIDIA RTX A6000",
    "1x NVIDIA A100 80GB PCIe",
    "1x NVIDIA H100 PCIe",
    "1x NVIDIA L4",
    "1x NVIDIA Tesla T4",
    "1x NVIDIA Tesla V100",
    "1x AMD Radeon RX 7900 XTX",
];

/// Storage quantities are drawn from [0, 500.00) in hundredths.
const STORAGE_CENTS_MAX: i64 = 50_000;
/// Available memory is drawn from [0, 32.00) in hundredths.
const MEMORY_CENTS_MAX: i64 = 3_200;

/// Assigns a catalogue entry and storage quantity to an identity, once.
#[derive(Clone)]
pub struct ResourceAssigner {
    catalogue: Arc<[String]>,
    store: Arc<IdentityStore>,
}

impl ResourceAssigner {
    /// `catalogue` must not be empty; startup input loading guarantees this.
    pub fn new(catalogue: Vec<String>, store: Arc<IdentityStore>) -> Self {
        Self {
            catalogue: catalogue.into(),
            store,
        }
    }

    /// Return the identity's profile, assigning a random one if it has none.
    pub async fn ensure_resources(&self, address: &str) -> ResourceProfile {
        self.store
            .ensure_resources_with(address, || self.pick())
            .await
    }

    fn pick(&self) -> ResourceProfile {
        let mut rng = rand::thread_rng();
        let gpu = self
            .catalogue
            .choose(&mut rng)
            .cloned()
            .unwrap_or_default();
        let storage = Decimal::new(rng.gen_range(0..STORAGE_CENTS_MAX), 2);
        info!(gpu = %gpu, storage = %storage, "Assigned resource profile");
        ResourceProfile { gpu, storage }
    }
}

/// Fresh "available memory" figure for one heartbeat.
pub fn random_available_memory() -> Decimal {
    Decimal::new(rand::thread_rng().gen_range(0..MEMORY_CENTS_MAX), 2)
}
