//! Integration tests for the chat server.
//!
//! These tests drive a real `ChatServer` on a loopback port with real TCP
//! clients: registration, relaying, operator commands and shutdown.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jedi::ChatClient;
use jedid::config::ServerConfig;
use jedid::display::{ChatDisplay, NullDisplay};
use jedid::roster::RosterError;
use jedid::server::{ChatServer, ServerError};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on waiting for any single line from the server
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on waiting for the roster to settle
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between roster checks
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Helpers
// ============================================================================

/// Display that records every notification.
#[derive(Default)]
struct RecordingDisplay {
    messages: Mutex<Vec<String>>,
    rosters: Mutex<Vec<Vec<String>>>,
}

impl ChatDisplay for RecordingDisplay {
    fn on_message(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }

    fn on_roster_changed(&self, names: &[String], _count: usize) {
        self.rosters.lock().unwrap().push(names.to_vec());
    }
}

/// Test server bound to an ephemeral loopback port.
struct TestServer {
    server: ChatServer,
    addr: SocketAddr,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with_display(Arc::new(NullDisplay)).await
    }

    async fn spawn_with_display(display: Arc<dyn ChatDisplay>) -> Self {
        let config = ServerConfig::loopback().with_shutdown_grace(Duration::from_secs(2));
        let server = ChatServer::new(config, display);
        let addr = server.start(0).await.expect("start server");
        Self { server, addr }
    }

    /// Connects a client and waits until its own join notice arrives.
    async fn join(&self, name: &str) -> ChatClient {
        let mut client = ChatClient::connect_addr(self.addr, name)
            .await
            .expect("connect to server");
        let expected = format!("{name} has connected");
        assert_eq!(recv(&mut client).await.as_deref(), Some(expected.as_str()));
        client
    }

    /// Waits until the roster holds exactly `names`, in order.
    async fn wait_for_roster(&self, names: &[&str]) {
        let start = tokio::time::Instant::now();
        while start.elapsed() < SETTLE_TIMEOUT {
            if self.server.roster().names() == names {
                return;
            }
            sleep(POLL_INTERVAL).await;
        }
        panic!(
            "roster is {:?}, expected {names:?}",
            self.server.roster().names()
        );
    }
}

/// Next line from the server; `None` once the connection is gone.
async fn recv(client: &mut ChatClient) -> Option<String> {
    timeout(RECV_TIMEOUT, client.next_line())
        .await
        .expect("timed out waiting for a line")
        .unwrap_or(None)
}

// ============================================================================
// Chat Flow Tests
// ============================================================================

#[tokio::test]
async fn test_single_client_round_trip() {
    let display = Arc::new(RecordingDisplay::default());
    let server =
        TestServer::spawn_with_display(Arc::clone(&display) as Arc<dyn ChatDisplay>).await;

    let mut obi = server.join("Obi").await;
    assert_eq!(server.server.roster().names(), vec!["Obi"]);

    obi.send_text("hello").await.unwrap();
    assert_eq!(recv(&mut obi).await.as_deref(), Some("Obi: hello"));

    obi.disconnect().await.unwrap();
    server.wait_for_roster(&[]).await;

    // The departure notice is broadcast after the roster update; give it
    // a moment to reach the display.
    let start = tokio::time::Instant::now();
    while display.messages.lock().unwrap().len() < 3 && start.elapsed() < SETTLE_TIMEOUT {
        sleep(POLL_INTERVAL).await;
    }

    let messages = display.messages.lock().unwrap().clone();
    assert_eq!(
        messages,
        vec!["Obi has connected", "Obi: hello", "Obi has been disconnected"]
    );
    assert_eq!(
        display.rosters.lock().unwrap().last().cloned(),
        Some(Vec::<String>::new())
    );

    server.server.stop().await;
}

#[tokio::test]
async fn test_broadcast_reaches_everyone_including_sender() {
    let server = TestServer::spawn().await;

    let mut obi = server.join("Obi").await;
    let mut ani = server.join("Ani").await;
    assert_eq!(recv(&mut obi).await.as_deref(), Some("Ani has connected"));

    ani.send_text("hello there").await.unwrap();
    assert_eq!(recv(&mut obi).await.as_deref(), Some("Ani: hello there"));
    assert_eq!(recv(&mut ani).await.as_deref(), Some("Ani: hello there"));

    server.server.stop().await;
}

#[tokio::test]
async fn test_lines_arrive_in_the_same_order_for_everyone() {
    let server = TestServer::spawn().await;

    let mut obi = server.join("Obi").await;
    let mut ani = server.join("Ani").await;
    assert_eq!(recv(&mut obi).await.as_deref(), Some("Ani has connected"));

    for n in 0..10 {
        obi.send_text(format!("o{n}")).await.unwrap();
        ani.send_text(format!("a{n}")).await.unwrap();
    }

    let mut seen_by_obi = Vec::new();
    let mut seen_by_ani = Vec::new();
    for _ in 0..20 {
        seen_by_obi.push(recv(&mut obi).await.unwrap());
        seen_by_ani.push(recv(&mut ani).await.unwrap());
    }
    assert_eq!(seen_by_obi, seen_by_ani);

    // Each sender's own lines keep their send order.
    let obi_lines: Vec<_> = seen_by_obi.iter().filter(|l| l.starts_with("Obi: ")).collect();
    let expected: Vec<_> = (0..10).map(|n| format!("Obi: o{n}")).collect();
    assert_eq!(obi_lines, expected.iter().collect::<Vec<_>>());

    server.server.stop().await;
}

#[tokio::test]
async fn test_empty_name_is_accepted() {
    let server = TestServer::spawn().await;

    let mut anon = server.join("").await;
    anon.send_text("who am I").await.unwrap();
    assert_eq!(recv(&mut anon).await.as_deref(), Some(": who am I"));

    server.server.stop().await;
}

// ============================================================================
// Departure Tests
// ============================================================================

#[tokio::test]
async fn test_abrupt_disconnect_is_announced() {
    let server = TestServer::spawn().await;

    let obi = server.join("Obi").await;
    let mut ani = server.join("Ani").await;

    // No disconnect frame, the socket just goes away.
    drop(obi);

    assert_eq!(recv(&mut ani).await.as_deref(), Some("Obi has been disconnected"));
    server.wait_for_roster(&["Ani"]).await;

    server.server.stop().await;
}

#[tokio::test]
async fn test_kick_announces_departure_once() {
    let server = TestServer::spawn().await;

    let mut obi = server.join("Obi").await;
    let mut ani = server.join("Ani").await;
    assert_eq!(recv(&mut obi).await.as_deref(), Some("Ani has connected"));

    let kicked = server.server.kick(0).unwrap();
    assert_eq!(kicked.name, "Obi");
    assert_eq!(server.server.roster().names(), vec!["Ani"]);

    assert_eq!(recv(&mut ani).await.as_deref(), Some("Obi has been disconnected"));
    assert_eq!(recv(&mut obi).await, None);

    // Nothing else was queued for Ani before this line.
    ani.send_text("still here").await.unwrap();
    assert_eq!(recv(&mut ani).await.as_deref(), Some("Ani: still here"));

    server.server.stop().await;
}

#[tokio::test]
async fn test_kick_out_of_range_changes_nothing() {
    let server = TestServer::spawn().await;
    let _obi = server.join("Obi").await;

    let err = server.server.kick(3).unwrap_err();
    assert_eq!(err, RosterError::IndexOutOfRange { index: 3, len: 1 });
    assert_eq!(server.server.roster().names(), vec!["Obi"]);

    server.server.stop().await;
}

#[tokio::test]
async fn test_disconnect_all_keeps_listening() {
    let server = TestServer::spawn().await;

    let mut obi = server.join("Obi").await;
    let mut ani = server.join("Ani").await;

    assert_eq!(server.server.disconnect_all(), 2);
    assert!(server.server.roster().is_empty());

    // Drain until each connection ends.
    while recv(&mut obi).await.is_some() {}
    while recv(&mut ani).await.is_some() {}

    // New clients are still welcome.
    let _yoda = server.join("Yoda").await;
    assert_eq!(server.server.roster().names(), vec!["Yoda"]);

    server.server.stop().await;
}

// ============================================================================
// Listener Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_stop_closes_every_session() {
    let server = TestServer::spawn().await;

    let mut clients = Vec::new();
    for name in ["Obi", "Ani", "Yoda"] {
        clients.push(server.join(name).await);
    }

    let summary = server.server.stop().await.unwrap();
    assert_eq!(summary.sessions_closed, 3);
    assert!(summary.readers_drained);
    assert!(server.server.roster().is_empty());
    assert!(!server.server.is_listening().await);

    for client in &mut clients {
        while recv(client).await.is_some() {}
    }

    // The port no longer accepts connections.
    assert!(TcpStream::connect(server.addr).await.is_err());
}

#[tokio::test]
async fn test_restart_on_same_server() {
    let server = TestServer::spawn().await;
    let _obi = server.join("Obi").await;
    server.server.stop().await.unwrap();

    let addr = server.server.start(0).await.unwrap();
    let mut ani = ChatClient::connect_addr(addr, "Ani").await.unwrap();
    assert_eq!(recv(&mut ani).await.as_deref(), Some("Ani has connected"));
    assert_eq!(server.server.roster().names(), vec!["Ani"]);

    server.server.stop().await;
}

#[tokio::test]
async fn test_bind_error_when_port_in_use() {
    let first = TestServer::spawn().await;

    let second = ChatServer::new(ServerConfig::loopback(), Arc::new(NullDisplay));
    let err = second.start(first.addr.port()).await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }), "got {err:?}");
    assert!(!second.is_listening().await);

    first.server.stop().await;
}

#[tokio::test]
async fn test_session_ids_are_unique() {
    let server = TestServer::spawn().await;

    let mut clients = Vec::new();
    for n in 0..10 {
        clients.push(server.join(&format!("padawan-{n}")).await);
    }

    let ids: HashSet<_> = server.server.roster().infos().iter().map(|i| i.id).collect();
    assert_eq!(ids.len(), 10);

    server.server.stop().await;
}

#[tokio::test]
async fn test_many_concurrent_joins() {
    let server = Arc::new(TestServer::spawn().await);

    let mut tasks = Vec::new();
    for n in 0..20 {
        let addr = server.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = ChatClient::connect_addr(addr, format!("user-{n}"))
                .await
                .unwrap();
            // Wait for our own join notice; others may arrive first.
            let own = format!("user-{n} has connected");
            loop {
                let line = recv(&mut client).await.expect("connection closed early");
                if line == own {
                    break;
                }
            }
            client
        }));
    }

    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap());
    }
    assert_eq!(server.server.roster().len(), 20);

    server.server.stop().await;
}
