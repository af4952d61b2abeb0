//! Persistence layer: identity records keyed by credential address.

pub mod identity_store;
pub mod persistence;
pub mod record;

pub use identity_store::IdentityStore;
pub use persistence::{InMemory, JsonFile, RecordPersistence, Snapshot};
pub use record::{IdentityRecord, ResourceProfile, derive_worker_id};
