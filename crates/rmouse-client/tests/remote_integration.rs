//! End-to-end tests: `RemoteClient` against the real host accept loop.
//!
//! The host runs in-process on a loopback port with a `RecordingInputSink`,
//! so the tests observe both sides: the client's state transitions and the
//! input that would have reached the host OS.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use rmouse_client::application::connection_state::ConnectionState;
use rmouse_client::infrastructure::network::{ClientConfig, ClientError, RemoteClient};
use rmouse_core::keymap::{MouseButton, Platform};
use rmouse_host::application::session_manager::{SessionManager, SessionSettings};
use rmouse_host::infrastructure::input_emulation::{RecordingInputSink, SinkEvent};
use rmouse_host::infrastructure::network::ws_server::{serve, ServerConfig};

const PIN: &str = "123456";

// ── Harness ───────────────────────────────────────────────────────────────────

struct Host {
    addr: SocketAddr,
    sink: Arc<RecordingInputSink>,
    manager: Arc<SessionManager>,
    running: Arc<AtomicBool>,
}

impl Drop for Host {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

async fn start_host() -> Host {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let sink = Arc::new(RecordingInputSink::new());
    let manager = Arc::new(SessionManager::new(
        SessionSettings {
            pin: PIN.to_string(),
            server_name: "Test host".to_string(),
            pointer_speed: 1.0,
            platform: Platform::Windows,
            ..SessionSettings::default()
        },
        sink.clone(),
    ));
    let running = Arc::new(AtomicBool::new(true));
    let config = ServerConfig {
        bind_addr: addr,
        ..ServerConfig::default()
    };
    tokio::spawn(serve(
        listener,
        config,
        Arc::clone(&manager),
        Arc::clone(&running),
    ));

    Host {
        addr,
        sink,
        manager,
        running,
    }
}

fn client_with_backoff(unit: Duration) -> RemoteClient {
    RemoteClient::new(ClientConfig {
        connect_timeout: Duration::from_secs(3),
        settle_delay: Duration::from_millis(10),
        backoff_unit: unit,
    })
}

/// Collects transitions up to and including `last`.
async fn transitions_until(
    rx: &mut broadcast::Receiver<ConnectionState>,
    last: ConnectionState,
) -> Vec<ConnectionState> {
    let mut seen = Vec::new();
    timeout(Duration::from_secs(5), async {
        loop {
            let state = rx.recv().await.unwrap();
            seen.push(state);
            if state == last {
                break;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached {last:?}; saw {seen:?}"));
    seen
}

async fn wait_for_events(sink: &RecordingInputSink, n: usize) -> Vec<SinkEvent> {
    timeout(Duration::from_secs(3), async {
        loop {
            let events = sink.events();
            if events.len() >= n {
                return events;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("host did not receive the input")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_wrong_pin_disconnects_then_schedules_first_reconnect() {
    // Arrange
    let host = start_host().await;
    let client = client_with_backoff(Duration::from_secs(60));
    let mut rx = client.transitions();

    // Act
    client.connect(host.addr, "000000");
    let seen = transitions_until(&mut rx, ConnectionState::Reconnecting(1)).await;

    // Assert
    assert_eq!(
        seen,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Authenticating,
            ConnectionState::Disconnected,
            ConnectionState::Reconnecting(1),
        ]
    );
    let status = client.current_status();
    assert_eq!(status.retry_count, 1);
    assert!(status.last_error.unwrap().contains("invalid pin"));
    assert!(matches!(
        client.send_move(1.0, 1.0),
        Err(ClientError::NotConnected)
    ));
}

#[tokio::test]
async fn test_correct_pin_reaches_active_and_input_arrives_in_order() {
    // Arrange
    let host = start_host().await;
    let client = client_with_backoff(Duration::from_secs(1));
    let mut rx = client.transitions();

    // Act
    client.connect(host.addr, PIN);
    let seen = transitions_until(&mut rx, ConnectionState::Active).await;
    client.send_click(MouseButton::Left, Some(true)).unwrap();
    client.send_move(3.0, 4.0).unwrap();
    client.send_click(MouseButton::Left, Some(false)).unwrap();
    client.send_key("hi").unwrap();
    client.send_scroll(0, 2).unwrap();

    // Assert
    assert_eq!(
        seen,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Authenticating,
            ConnectionState::Active,
        ]
    );
    assert_eq!(
        wait_for_events(&host.sink, 5).await,
        vec![
            SinkEvent::Click(MouseButton::Left, Some(true)),
            SinkEvent::Move(3, 4),
            SinkEvent::Click(MouseButton::Left, Some(false)),
            SinkEvent::Text("hi".into()),
            SinkEvent::Scroll(0, 2),
        ]
    );
    assert_eq!(client.current_status().last_error, None);
}

#[tokio::test]
async fn test_retries_stop_after_five_failures() {
    // Arrange
    let host = start_host().await;
    let client = client_with_backoff(Duration::from_millis(10));
    let mut rx = client.transitions();

    // Act
    client.connect(host.addr, "bad");
    let seen = transitions_until(&mut rx, ConnectionState::GivenUp).await;

    // Assert
    let reconnects: Vec<u32> = seen
        .iter()
        .filter_map(|s| match s {
            ConnectionState::Reconnecting(n) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(reconnects, vec![1, 2, 3, 4, 5]);
    let status = client.current_status();
    assert_eq!(status.state, ConnectionState::GivenUp);
    assert_eq!(status.retry_count, 5);
}

#[tokio::test]
async fn test_manual_retry_after_giving_up_starts_from_zero() {
    // Arrange
    let host = start_host().await;
    let client = client_with_backoff(Duration::from_millis(10));
    let mut rx = client.transitions();
    client.connect(host.addr, "bad");
    transitions_until(&mut rx, ConnectionState::GivenUp).await;

    // Act
    client.retry().unwrap();
    let seen = transitions_until(&mut rx, ConnectionState::Reconnecting(1)).await;

    // Assert
    assert_eq!(seen.first(), Some(&ConnectionState::Connecting));
}

#[tokio::test]
async fn test_disconnect_returns_to_idle_and_frees_the_host_slot() {
    // Arrange
    let host = start_host().await;
    let client = client_with_backoff(Duration::from_secs(1));
    let mut rx = client.transitions();
    client.connect(host.addr, PIN);
    transitions_until(&mut rx, ConnectionState::Active).await;
    assert_eq!(host.manager.session_count(), 1);

    // Act
    client.disconnect();

    // Assert
    assert_eq!(client.current_status().state, ConnectionState::Idle);
    timeout(Duration::from_secs(3), async {
        while host.manager.session_count() != 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("host kept the session");
}

#[tokio::test]
async fn test_switching_hosts_cancels_the_first_attempt() {
    // Arrange
    let first = start_host().await;
    let second = start_host().await;
    let client = client_with_backoff(Duration::from_secs(60));
    let mut status = client.status();

    // Act: a failing attempt on the first host, then a good one elsewhere.
    client.connect(first.addr, "000000");
    client.connect(second.addr, PIN);
    timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.state == ConnectionState::Active),
    )
    .await
    .unwrap()
    .unwrap();
    sleep(Duration::from_millis(200)).await;

    // Assert: the late failure from the first host did not disturb anything.
    let s = client.current_status();
    assert_eq!(s.state, ConnectionState::Active);
    assert_eq!(s.host, Some(second.addr));
    assert_eq!(s.retry_count, 0);
}
