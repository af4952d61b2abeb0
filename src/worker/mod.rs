//! Orchestrator connections and the fleet scheduler.
//!
//! - `state`: connection state machine and supervisor events
//! - `protocol`: REGISTER and HEARTBEAT frames
//! - `dial`: websocket dialing, direct or through a proxy tunnel
//! - `supervisor`: per-identity reconnect loop
//! - `scheduler`: startup passes, pipelines and periodic jobs

pub mod dial;
pub mod protocol;
pub mod scheduler;
pub mod state;
pub mod supervisor;

pub use scheduler::{JobKind, Scheduler};
pub use state::{ConnectionState, SupervisorEvent, SupervisorEventKind};
pub use supervisor::ConnectionSupervisor;
