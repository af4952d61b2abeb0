//! Connection supervisor: one long-lived orchestrator link per identity.
//!
//! The supervisor owns a reconnect loop rather than recursing on close. Each
//! pass dials, registers once, heartbeats on a fixed period, and on any loss
//! waits out the reconnect delay before dialing again with the same session.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tracing::{Instrument, debug, error, info, warn};

use super::dial::{self, WsStream};
use super::protocol::{HeartbeatMessage, RegisterMessage};
use super::state::{ConnectionState, StateTracker, SupervisorEvent, SupervisorEventKind};
use crate::identity::{Identity, Session};
use crate::resources::{ResourceAssigner, random_available_memory};
use crate::shutdown::Shutdown;
use crate::store::IdentityStore;

/// Upper bound on the close frame sent at shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// How one connected pass ended.
#[derive(Debug, PartialEq, Eq)]
enum PassEnd {
    Lost(String),
    Stopped,
}

/// Keeps a single identity's websocket alive until shutdown.
pub struct ConnectionSupervisor {
    identity: Arc<Identity>,
    session: Arc<Session>,
    store: Arc<IdentityStore>,
    assigner: ResourceAssigner,
    events: broadcast::Sender<SupervisorEvent>,
    ws_url: String,
    heartbeat_interval: Duration,
    reconnect_delay: Duration,
    shutdown: Shutdown,
    tracker: StateTracker,
}

impl ConnectionSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Arc<Identity>,
        session: Arc<Session>,
        store: Arc<IdentityStore>,
        assigner: ResourceAssigner,
        events: broadcast::Sender<SupervisorEvent>,
        ws_url: impl Into<String>,
        heartbeat_interval: Duration,
        reconnect_delay: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            identity,
            session,
            store,
            assigner,
            events,
            ws_url: ws_url.into(),
            heartbeat_interval,
            reconnect_delay,
            shutdown,
            tracker: StateTracker::default(),
        }
    }

    /// Run the supervisor on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        let span = self.identity.span();
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(mut self) {
        let dialer = dial::dialer_for(self.identity.proxy.as_ref());
        let url = dial::orchestrator_url(&self.ws_url, &self.session.token);

        while !self.shutdown.is_triggered() {
            self.transition(ConnectionState::Connecting);

            let connected = tokio::select! {
                result = dial::connect(&url, dialer.as_ref()) => result,
                _ = self.shutdown.triggered() => break,
            };

            let reason = match connected {
                Ok(ws) => match self.drive(ws).await {
                    PassEnd::Lost(reason) => reason,
                    PassEnd::Stopped => break,
                },
                Err(e) => {
                    let account_id = self.account_label().await;
                    error!(
                        account_id = %account_id,
                        "AccountID {}: WebSocket error for workerID {}: {}",
                        account_id, self.session.worker_id, e
                    );
                    e.to_string()
                }
            };

            if !self.schedule_reconnect(reason).await {
                break;
            }
        }

        self.transition(ConnectionState::Stopped);
        debug!(
            worker_id = %self.session.worker_id,
            transitions = self.tracker.transitions(),
            "Supervisor stopped"
        );
    }

    /// Record the loss and wait out the reconnect delay. Returns false on shutdown.
    async fn schedule_reconnect(&mut self, reason: String) -> bool {
        self.emit(SupervisorEventKind::ConnectionLost { reason });
        self.transition(ConnectionState::ReconnectScheduled);
        self.emit(SupervisorEventKind::ReconnectScheduled {
            delay: self.reconnect_delay,
        });

        if self.shutdown.sleep(self.reconnect_delay).await.is_err() {
            return false;
        }

        let account_id = self.account_label().await;
        info!(
            account_id = %account_id,
            "AccountID {}: Reconnecting WebSocket for workerID: {}, Proxy: {}",
            account_id,
            self.session.worker_id,
            self.identity.proxy_label()
        );
        true
    }

    /// Register, then heartbeat until the transport drops or shutdown.
    async fn drive(&mut self, ws: WsStream) -> PassEnd {
        let (mut sink, mut stream) = ws.split();
        self.transition(ConnectionState::Connected);

        let account_id = self.account_label().await;
        let worker_id = self.session.worker_id.clone();
        let proxy = self.identity.proxy_label().to_string();
        info!(
            account_id = %account_id,
            "AccountID {}: Connected to WebSocket for workerID: {}, Proxy: {}",
            account_id, worker_id, proxy
        );

        let register = match serde_json::to_string(&RegisterMessage::new(&self.session)) {
            Ok(json) => json,
            Err(e) => return PassEnd::Lost(format!("encode register: {e}")),
        };
        if let Err(end) = send_frame(&mut sink, Message::Text(register.into()), &self.shutdown).await {
            return end;
        }
        self.emit(SupervisorEventKind::RegisterSent);
        self.transition(ConnectionState::Heartbeating);

        let period = self.heartbeat_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let profile = self.assigner.ensure_resources(&self.session.address).await;
                    let heartbeat =
                        HeartbeatMessage::new(&self.session, &profile, random_available_memory());
                    let json = match serde_json::to_string(&heartbeat) {
                        Ok(json) => json,
                        Err(e) => return PassEnd::Lost(format!("encode heartbeat: {e}")),
                    };

                    let account_id = self.account_label().await;
                    info!(
                        account_id = %account_id,
                        "AccountID {}: Sending heartbeat for workerID: {}, Proxy: {}",
                        account_id, worker_id, proxy
                    );
                    if let Err(end) =
                        send_frame(&mut sink, Message::Text(json.into()), &self.shutdown).await
                    {
                        return end;
                    }
                    self.emit(SupervisorEventKind::HeartbeatSent);
                }
                incoming = stream.next() => {
                    let payload = match incoming {
                        Some(Ok(Message::Text(text))) => text.to_string(),
                        Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                        Some(Ok(Message::Close(frame))) => {
                            let account_id = self.account_label().await;
                            info!(
                                account_id = %account_id,
                                "AccountID {}: WebSocket connection closed for workerID {}, Proxy: {}",
                                account_id, worker_id, proxy
                            );
                            let reason = frame
                                .map(|f| format!("closed by peer: {} {}", f.code, f.reason))
                                .unwrap_or_else(|| "closed by peer".to_string());
                            return PassEnd::Lost(reason);
                        }
                        // Ping replies are queued by the transport itself.
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            let account_id = self.account_label().await;
                            error!(
                                account_id = %account_id,
                                "AccountID {}: WebSocket error for workerID {}: {}",
                                account_id, worker_id, e
                            );
                            return PassEnd::Lost(e.to_string());
                        }
                        None => {
                            let account_id = self.account_label().await;
                            info!(
                                account_id = %account_id,
                                "AccountID {}: WebSocket connection closed for workerID {}, Proxy: {}",
                                account_id, worker_id, proxy
                            );
                            return PassEnd::Lost("stream ended".to_string());
                        }
                    };

                    let account_id = self.account_label().await;
                    info!(
                        account_id = %account_id,
                        "AccountID {}: Received for workerID {}: {}, Proxy: {}",
                        account_id, worker_id, payload, proxy
                    );
                    self.emit(SupervisorEventKind::MessageReceived { payload });
                }
                _ = self.shutdown.triggered() => {
                    match tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => debug!(worker_id = %worker_id, "Close frame not sent: {}", e),
                        Err(_) => debug!(worker_id = %worker_id, "Close frame timed out"),
                    }
                    return PassEnd::Stopped;
                }
            }
        }
    }

    async fn account_label(&self) -> String {
        self.store.account_label(&self.session.address).await
    }

    fn transition(&mut self, target: ConnectionState) {
        match self.tracker.transition_to(target) {
            Ok(from) => self.emit(SupervisorEventKind::StateChanged { from, to: target }),
            Err(reason) => warn!(worker_id = %self.session.worker_id, "{}", reason),
        }
    }

    fn emit(&self, kind: SupervisorEventKind) {
        // No subscribers is fine.
        let _ = self.events.send(SupervisorEvent {
            index: self.identity.index,
            worker_id: self.session.worker_id.clone(),
            kind,
            at: Utc::now(),
        });
    }
}

/// Send one frame unless shutdown arrives first. A stalled transport never
/// holds the supervisor past the signal.
async fn send_frame<S>(sink: &mut S, frame: Message, shutdown: &Shutdown) -> Result<(), PassEnd>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    tokio::select! {
        sent = sink.send(frame) => sent.map_err(|e| PassEnd::Lost(e.to_string())),
        _ = shutdown.triggered() => Err(PassEnd::Stopped),
    }
}
