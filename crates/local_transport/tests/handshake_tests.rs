//! Integration tests for the connect/accept handshake and listener shutdown
//!
//! These tests drive the transport the way the game server and its bots do:
//! one thread per connecting client and a single accepting thread.

use crossbeam::channel;
use local_transport::{ConnectionPeer, EofState, Registry, TransportConfig, TransportError};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Peer = Arc<ConnectionPeer<Value>>;

/// Polls `condition` until it holds, failing the test after a few seconds
fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

fn spawn_connect(
    registry: &Arc<Registry<Value>>,
    table: &str,
    client: Peer,
) -> thread::JoinHandle<Result<Peer, TransportError>> {
    let registry = registry.clone();
    let table = table.to_string();
    thread::spawn(move || registry.connect_with(&table, client))
}

#[test]
fn test_handshake_cross_links_pair() {
    let registry = Arc::new(Registry::new());
    let listener = registry.create_listener("table-1").unwrap();

    let handle = spawn_connect(&registry, "table-1", ConnectionPeer::new("alice"));
    let server = listener.accept().unwrap();
    let client = handle.join().unwrap().unwrap();

    assert!(Arc::ptr_eq(&client.opposite().unwrap(), &server));
    assert!(Arc::ptr_eq(&server.opposite().unwrap(), &client));
    assert!(client.is_connected());
    assert!(server.is_connected());
    assert_eq!(client.eof_state(), EofState::Open);
}

#[test]
fn test_accept_order_is_fifo() {
    let registry = Arc::new(Registry::new());
    let listener = registry.create_listener("table-1").unwrap();

    let first = ConnectionPeer::new("first");
    let second = ConnectionPeer::new("second");

    let first_handle = spawn_connect(&registry, "table-1", first.clone());
    wait_until("first connector to queue", || listener.pending() == 1);
    let second_handle = spawn_connect(&registry, "table-1", second.clone());
    wait_until("second connector to queue", || listener.pending() == 2);

    let server_one = listener.accept().unwrap();
    let server_two = listener.accept().unwrap();

    assert!(server_one.is_bound_to(&first));
    assert!(server_two.is_bound_to(&second));
    first_handle.join().unwrap().unwrap();
    second_handle.join().unwrap().unwrap();
}

#[test]
fn test_backlog_bound() {
    const CAPACITY: usize = 4;
    let registry = Arc::new(Registry::with_config(TransportConfig {
        backlog_capacity: CAPACITY,
        ..Default::default()
    }));
    let listener = registry.create_listener("table-1").unwrap();

    let handles: Vec<_> = (0..CAPACITY)
        .map(|i| spawn_connect(&registry, "table-1", ConnectionPeer::new(format!("bot-{i}"))))
        .collect();
    wait_until("backlog to fill", || listener.pending() == CAPACITY);

    let err = registry.connect("table-1").unwrap_err();
    assert_eq!(
        err,
        TransportError::QueueFull {
            name: "table-1".to_string(),
            capacity: CAPACITY
        }
    );
    assert!(err.is_retryable());

    for _ in 0..CAPACITY {
        listener.accept().unwrap();
    }
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
}

#[test]
fn test_table_scenario_third_connector_is_refused() {
    let registry = Arc::new(Registry::new());
    let listener = registry
        .create_listener_with_capacity("table-1", 2)
        .unwrap();

    let (tx, rx) = channel::unbounded();
    for i in 0..3 {
        let registry = registry.clone();
        let tx = tx.clone();
        thread::spawn(move || {
            let result = registry.connect_with("table-1", ConnectionPeer::new(format!("seat-{i}")));
            tx.send(result).unwrap();
        });
    }
    drop(tx);

    // Two connectors block in the backlog, so the first to finish is the refused one.
    let refused = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(refused, Err(TransportError::QueueFull { capacity: 2, .. })));
    assert_eq!(listener.pending(), 2);

    let servers = [listener.accept().unwrap(), listener.accept().unwrap()];
    let clients: Vec<Peer> = rx.iter().map(|result| result.unwrap()).collect();
    assert_eq!(clients.len(), 2);

    for client in &clients {
        let server = client.opposite().unwrap();
        assert!(servers.iter().any(|s| Arc::ptr_eq(s, &server)));
        assert!(Arc::ptr_eq(&server.opposite().unwrap(), client));
    }
}

#[test]
fn test_concurrent_connectors_all_complete() {
    const BOTS: usize = 16;
    let registry = Arc::new(Registry::new());
    let listener = registry.create_listener("table-1").unwrap();

    let (tx, rx) = channel::unbounded();
    for _ in 0..BOTS {
        let registry = registry.clone();
        let tx = tx.clone();
        thread::spawn(move || tx.send(registry.connect("table-1")).unwrap());
    }
    drop(tx);

    let servers: Vec<Peer> = (0..BOTS).map(|_| listener.accept().unwrap()).collect();
    let clients: Vec<Peer> = rx.iter().map(|result| result.unwrap()).collect();
    assert_eq!(clients.len(), BOTS);

    let ids: HashSet<_> = clients.iter().map(|c| c.id()).collect();
    assert_eq!(ids.len(), BOTS);
    for client in &clients {
        let server = client.opposite().unwrap();
        assert!(server.is_bound_to(client));
        assert!(servers.iter().any(|s| Arc::ptr_eq(s, &server)));
    }
    assert_eq!(listener.accepted_count(), BOTS);
}

#[test]
fn test_close_refuses_waiting_and_disconnects_accepted() {
    let registry = Arc::new(Registry::new());
    let listener = registry.create_listener("table-1").unwrap();

    let seated = spawn_connect(&registry, "table-1", ConnectionPeer::new("seated"));
    let server = listener.accept().unwrap();
    let seated = seated.join().unwrap().unwrap();

    let waiting: Vec<_> = (0..3)
        .map(|i| spawn_connect(&registry, "table-1", ConnectionPeer::new(format!("waiting-{i}"))))
        .collect();
    wait_until("connectors to queue", || listener.pending() == 3);

    listener.close();

    for handle in waiting {
        assert_eq!(
            handle.join().unwrap().unwrap_err(),
            TransportError::Closed("table-1".to_string())
        );
    }
    for peer in listener.all_accepted() {
        assert_eq!(peer.eof_state(), EofState::FullyClosed);
    }
    assert_eq!(server.eof_state(), EofState::FullyClosed);
    assert_eq!(seated.receive().unwrap(), None);
    assert!(matches!(
        seated.send(json!({"type": "roll"})),
        Err(TransportError::Closed(_))
    ));
}

#[test]
fn test_graceful_eof_keeps_inbound_open() {
    let registry = Arc::new(Registry::new());
    let listener = registry.create_listener("table-1").unwrap();

    let handle = spawn_connect(&registry, "table-1", ConnectionPeer::new("bot"));
    let server = listener.accept().unwrap();
    let client = handle.join().unwrap().unwrap();

    listener.set_eof(false);
    assert!(matches!(listener.accept(), Err(TransportError::Closed(_))));
    assert!(matches!(registry.connect("table-1"), Err(TransportError::Closed(_))));

    assert!(server.is_out_eof());
    assert!(!server.is_in_eof());

    client.send(json!({"type": "end_turn"})).unwrap();
    assert_eq!(server.receive().unwrap(), Some(json!({"type": "end_turn"})));
    assert_eq!(client.receive().unwrap(), None);
}

#[test]
fn test_message_exchange_and_reaping() {
    let registry = Arc::new(Registry::new());
    let listener = registry.create_listener("table-1").unwrap();

    let bot = {
        let registry = registry.clone();
        thread::spawn(move || {
            let conn = registry.connect("table-1").unwrap();
            conn.send(json!({"type": "sit_down", "seat": 2})).unwrap();
            let reply = conn.receive().unwrap();
            conn.set_out_eof();
            reply
        })
    };

    let server = listener.accept().unwrap();
    let request = server.receive().unwrap().unwrap();
    assert_eq!(request["seat"], 2);
    server.send(json!({"type": "seated", "seat": 2})).unwrap();

    let reply = bot.join().unwrap().unwrap();
    assert_eq!(reply["type"], "seated");

    // The bot has hung up; draining its stream marks the server side inbound EOF.
    assert_eq!(server.receive().unwrap(), None);
    let reaped = listener.disconnect_eof_clients();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].eof_state(), EofState::FullyClosed);
    assert_eq!(listener.accepted_count(), 0);
}
