//! Worker Fleet: keeps a set of wallet identities registered and heartbeating
//! against the OpenLedger orchestrator, and claims their rewards on a schedule.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod inputs;
pub mod prompt;
pub mod provision;
pub mod proxy;
pub mod resources;
pub mod retry;
pub mod shutdown;
pub mod store;
pub mod worker;
