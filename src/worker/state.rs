//! Connection state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// State of one identity's orchestrator connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport; initial state.
    Disconnected,
    /// Dialing and performing the websocket handshake.
    Connecting,
    /// Transport is up, REGISTER not yet sent.
    Connected,
    /// REGISTER sent; the liveness timer is running.
    Heartbeating,
    /// Transport lost; waiting out the reconnect delay.
    ReconnectScheduled,
    /// Shutdown requested; terminal.
    Stopped,
}

impl ConnectionState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, target),
            (Disconnected, Connecting) |
            (Connecting, Connected) | (Connecting, ReconnectScheduled) |
            (Connected, Heartbeating) | (Connected, ReconnectScheduled) |
            (Heartbeating, ReconnectScheduled) |
            (ReconnectScheduled, Connecting)
        ) || (target == Stopped && *self != Stopped)
    }

    pub fn is_terminal(&self) -> bool {
        *self == Self::Stopped
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Heartbeating => "heartbeating",
            Self::ReconnectScheduled => "reconnect_scheduled",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// What a supervisor reports as it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEventKind {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    RegisterSent,
    HeartbeatSent,
    MessageReceived {
        payload: String,
    },
    ConnectionLost {
        reason: String,
    },
    ReconnectScheduled {
        #[serde(with = "duration_millis")]
        delay: Duration,
    },
}

/// Observable supervisor event for one identity.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorEvent {
    pub index: usize,
    pub worker_id: String,
    pub kind: SupervisorEventKind,
    pub at: DateTime<Utc>,
}

/// Per-identity state tracker; rejects transitions the machine does not allow.
#[derive(Debug)]
pub struct StateTracker {
    state: ConnectionState,
    transitions: u64,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            transitions: 0,
        }
    }
}

impl StateTracker {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Move to `target`, returning the previous state.
    pub fn transition_to(&mut self, target: ConnectionState) -> Result<ConnectionState, String> {
        if !self.state.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.state, target));
        }
        let from = self.state;
        self.state = target;
        self.transitions += 1;
        Ok(from)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
