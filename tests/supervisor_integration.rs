//! Integration tests for the connection supervisor.
//!
//! Each test starts the mock orchestrator on a random port and runs real
//! supervisors against it, asserting on the frames the mock received and on
//! the supervisor event stream.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};

use worker_fleet::identity::{Identity, Session};
use worker_fleet::resources::ResourceAssigner;
use worker_fleet::shutdown::{self, Shutdown, ShutdownTrigger};
use worker_fleet::store::{IdentityStore, InMemory};
use worker_fleet::worker::{ConnectionState, ConnectionSupervisor, SupervisorEvent, SupervisorEventKind};

use common::{MockServer, TEST_TIMEOUT, fast_timing, session, token_for, wait_until};

struct Fleet {
    trigger: ShutdownTrigger,
    events: broadcast::Receiver<SupervisorEvent>,
    handles: Vec<JoinHandle<()>>,
    store: Arc<IdentityStore>,
}

impl Fleet {
    async fn stop(self) {
        self.trigger.trigger();
        for handle in self.handles {
            timeout(TEST_TIMEOUT, handle)
                .await
                .expect("supervisor did not stop")
                .unwrap();
        }
    }
}

fn supervisor(
    server: &MockServer,
    index: usize,
    address: &str,
    store: &Arc<IdentityStore>,
    events: &broadcast::Sender<SupervisorEvent>,
    shutdown: &Shutdown,
) -> ConnectionSupervisor {
    let timing = fast_timing();
    let identity = Arc::new(Identity::new(index, address, None, server.endpoints()).unwrap());
    let session: Arc<Session> = Arc::new(session(address));
    ConnectionSupervisor::new(
        identity,
        session,
        Arc::clone(store),
        ResourceAssigner::new(vec!["1x Test GPU".into()], Arc::clone(store)),
        events.clone(),
        server.ws_url.clone(),
        timing.heartbeat_interval,
        timing.reconnect_delay,
        shutdown.clone(),
    )
}

async fn spawn_fleet(server: &MockServer, addresses: &[&str]) -> Fleet {
    let store = IdentityStore::open(Arc::new(InMemory::new())).await.unwrap();
    let (trigger, shutdown) = shutdown::channel();
    let (tx, events) = broadcast::channel(4096);
    let handles = addresses
        .iter()
        .enumerate()
        .map(|(index, address)| {
            supervisor(server, index, address, &store, &tx, &shutdown).spawn()
        })
        .collect();
    Fleet {
        trigger,
        events,
        handles,
        store,
    }
}

/// Drain already-buffered events.
fn drain(events: &mut broadcast::Receiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn register_precedes_heartbeats_exactly_once() {
    let server = common::start().await;
    let fleet = spawn_fleet(&server, &["0xaaa"]).await;

    let state = Arc::clone(&server.state);
    wait_until(|| {
        let state = Arc::clone(&state);
        async move {
            state
                .connections_for(&token_for("0xaaa"))
                .first()
                .is_some_and(|c| c.heartbeats() >= 3)
        }
    })
    .await;

    let connection = &server.state.connections_for(&token_for("0xaaa"))[0];
    let types = connection.msg_types();
    assert_eq!(types[0], "REGISTER");
    assert_eq!(types.iter().filter(|t| *t == "REGISTER").count(), 1);
    assert!(types[1..].iter().all(|t| t == "HEARTBEAT"));

    let register = &connection.frames[0];
    assert_eq!(register["workerType"], "LWEXT");
    assert_eq!(register["message"]["worker"]["ownerAddress"], "0xaaa");

    let heartbeat = &connection.frames[1];
    assert_eq!(heartbeat["message"]["Capacity"]["AvailableGPU"], "1x Test GPU");
    let memory: f64 = heartbeat["message"]["Capacity"]["AvailableMemory"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((0.0..32.0).contains(&memory));

    // The heartbeat tick assigned and persisted a resource profile.
    assert!(fleet.store.get("0xaaa").await.unwrap().resource_profile().is_some());
    fleet.stop().await;
}

#[tokio::test]
async fn close_triggers_one_reconnect_after_delay() {
    let server = common::start().await;
    server.state.close_after_heartbeats(&token_for("0xbbb"), 2);
    let mut fleet = spawn_fleet(&server, &["0xbbb"]).await;

    let state = Arc::clone(&server.state);
    wait_until(|| {
        let state = Arc::clone(&state);
        async move {
            let connections = state.connections_for(&token_for("0xbbb"));
            connections.len() == 2 && connections[1].heartbeats() >= 1
        }
    })
    .await;

    let connections = server.state.connections_for(&token_for("0xbbb"));
    for connection in &connections {
        assert_eq!(connection.msg_types()[0], "REGISTER");
        assert_eq!(
            connection
                .msg_types()
                .iter()
                .filter(|t| *t == "REGISTER")
                .count(),
            1
        );
    }
    assert_eq!(connections[0].heartbeats(), 2);

    let events = drain(&mut fleet.events);
    let reconnects = events
        .iter()
        .filter(|e| matches!(e.kind, SupervisorEventKind::ReconnectScheduled { .. }))
        .count();
    assert_eq!(reconnects, 1);

    let registers: Vec<_> = events
        .iter()
        .filter(|e| e.kind == SupervisorEventKind::RegisterSent)
        .collect();
    assert_eq!(registers.len(), 2);
    let gap = registers[1].at - registers[0].at;
    assert!(gap.to_std().unwrap() >= fast_timing().reconnect_delay);

    fleet.stop().await;
}

#[tokio::test]
async fn failing_identity_does_not_hold_back_others() {
    let server = common::start().await;
    server.state.reject_handshakes(&token_for("0xccc"), 3);
    let mut fleet = spawn_fleet(&server, &["0xaaa", "0xbbb", "0xccc"]).await;

    let state = Arc::clone(&server.state);
    wait_until(|| {
        let state = Arc::clone(&state);
        async move {
            state
                .connections_for(&token_for("0xccc"))
                .first()
                .is_some_and(|c| c.heartbeats() >= 1)
        }
    })
    .await;

    let events = drain(&mut fleet.events);
    let first = |index: usize, kind: &SupervisorEventKind| {
        events
            .iter()
            .position(|e| e.index == index && &e.kind == kind)
            .unwrap()
    };
    let late_register = first(2, &SupervisorEventKind::RegisterSent);
    assert!(first(0, &SupervisorEventKind::HeartbeatSent) < late_register);
    assert!(first(1, &SupervisorEventKind::HeartbeatSent) < late_register);

    let failures = events
        .iter()
        .filter(|e| e.index == 2 && matches!(e.kind, SupervisorEventKind::ConnectionLost { .. }))
        .count();
    assert_eq!(failures, 3);
    assert!(
        events
            .iter()
            .filter(|e| e.index != 2)
            .all(|e| !matches!(e.kind, SupervisorEventKind::ConnectionLost { .. }))
    );

    fleet.stop().await;
}

#[tokio::test]
async fn shutdown_stops_live_connection() {
    let server = common::start().await;
    let mut fleet = spawn_fleet(&server, &["0xddd"]).await;

    let state = Arc::clone(&server.state);
    wait_until(|| {
        let state = Arc::clone(&state);
        async move { !state.connections_for(&token_for("0xddd")).is_empty() }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let started = Instant::now();
    fleet.trigger.trigger();
    for handle in fleet.handles.drain(..) {
        timeout(TEST_TIMEOUT, handle).await.unwrap().unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(2));

    let stopped = drain(&mut fleet.events).into_iter().any(|e| {
        e.kind
            == SupervisorEventKind::StateChanged {
                from: ConnectionState::Heartbeating,
                to: ConnectionState::Stopped,
            }
    });
    assert!(stopped);
}
