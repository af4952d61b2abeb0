//! Shared dependencies handed to every identity pipeline.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::api::RewardClient;
use crate::config::FleetConfig;
use crate::provision::CredentialProvisioner;
use crate::resources::ResourceAssigner;
use crate::shutdown::Shutdown;
use crate::store::IdentityStore;
use crate::worker::state::SupervisorEvent;

/// Capacity of the supervisor event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Everything a pipeline, periodic job or supervisor needs, built once at startup.
#[derive(Clone)]
pub struct FleetContext {
    pub config: Arc<FleetConfig>,
    pub store: Arc<IdentityStore>,
    pub assigner: ResourceAssigner,
    pub provisioner: CredentialProvisioner,
    pub rewards: RewardClient,
    pub events: broadcast::Sender<SupervisorEvent>,
    pub shutdown: Shutdown,
}

impl FleetContext {
    pub fn new(
        config: FleetConfig,
        store: Arc<IdentityStore>,
        catalogue: Vec<String>,
        shutdown: Shutdown,
    ) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            assigner: ResourceAssigner::new(catalogue, Arc::clone(&store)),
            provisioner: CredentialProvisioner::new(
                Arc::clone(&store),
                config.timing.retry_delay,
                shutdown.clone(),
            ),
            rewards: RewardClient::new(Arc::clone(&store), &config.timing, shutdown.clone()),
            config: Arc::new(config),
            store,
            events,
            shutdown,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }
}
