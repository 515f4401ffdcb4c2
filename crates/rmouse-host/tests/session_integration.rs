//! Integration tests for the WebSocket control channel.
//!
//! # Purpose
//!
//! These tests start the real accept loop on a loopback port and talk to it
//! with a `tokio-tungstenite` client, the same way a handheld client does.
//! Injected input is captured by a `RecordingInputSink` so the tests can
//! assert on exactly what would have reached the OS.
//!
//! They verify:
//!
//! - Authentication: a wrong PIN is answered with `invalid pin` and the
//!   channel closes; a non-hello first message is refused the same way.
//! - The session cap: the (N+1)th connection gets an error and is closed.
//! - Ordering: input messages reach the sink in the order they were sent,
//!   including the press / move / release drag sequence.
//! - Timeouts: a silent client is dropped after the authentication timeout,
//!   and an authenticated client is dropped after the idle timeout.
//!
//! # Synchronising with the host
//!
//! The host does not acknowledge input.  Because frames of one session are
//! handled strictly in order, sending `ping` and waiting for `pong` proves
//! every earlier frame has already been applied.

use std::net::SocketAddr;
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use rmouse_core::keymap::{Key, MouseButton, Platform};
use rmouse_core::protocol::{decode_message, encode_message, ControlMessage};
use rmouse_host::application::session_manager::{SessionManager, SessionSettings};
use rmouse_host::infrastructure::input_emulation::{RecordingInputSink, SinkEvent};
use rmouse_host::infrastructure::network::ws_server::{serve, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

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
        self.running
            .store(false, std::sync::atomic::Ordering::Relaxed);
    }
}

async fn start_host(max_sessions: usize, config: ServerConfig) -> Host {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let sink = Arc::new(RecordingInputSink::new());
    let manager = Arc::new(SessionManager::new(
        SessionSettings {
            pin: PIN.to_string(),
            max_sessions,
            server_name: "Test host".to_string(),
            pointer_speed: 1.0,
            platform: Platform::Windows,
            ..SessionSettings::default()
        },
        sink.clone(),
    ));
    let running = Arc::new(AtomicBool::new(true));

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

fn fast_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ping_interval: Duration::from_secs(10),
        ping_timeout: Duration::from_secs(10),
        auth_timeout: Duration::from_secs(5),
    }
}

async fn connect(host: &Host) -> Client {
    let url = format!("ws://{}", host.addr);
    let (ws, _) = timeout(Duration::from_secs(2), connect_async(url))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

async fn send(ws: &mut Client, msg: &ControlMessage) {
    ws.send(WsMessage::Text(encode_message(msg).unwrap()))
        .await
        .unwrap();
}

/// Returns the next control message, or `None` once the channel has closed.
async fn recv(ws: &mut Client) -> Option<ControlMessage> {
    loop {
        let frame = timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("no frame within 3 s");
        match frame {
            Some(Ok(WsMessage::Text(text))) => return Some(decode_message(&text).unwrap()),
            Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        }
    }
}

async fn authenticate(host: &Host) -> Client {
    let mut ws = connect(host).await;
    send(&mut ws, &ControlMessage::Hello { pin: PIN.into() }).await;
    match recv(&mut ws).await {
        Some(ControlMessage::Ok { .. }) => ws,
        other => panic!("expected ok, got {other:?}"),
    }
}

async fn round_trip_ping(ws: &mut Client) {
    send(ws, &ControlMessage::Ping).await;
    assert_eq!(recv(ws).await, Some(ControlMessage::Pong));
}

async fn wait_for_sessions(manager: &SessionManager, expected: usize) {
    for _ in 0..100 {
        if manager.session_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "session count stuck at {} (expected {expected})",
        manager.session_count()
    );
}

// ── Authentication ────────────────────────────────────────────────────────────

/// The end-to-end bad PIN scenario: error reply, then the channel closes.
#[tokio::test]
async fn test_wrong_pin_is_rejected_and_channel_closed() {
    // Arrange
    let host = start_host(4, fast_config()).await;
    let mut ws = connect(&host).await;

    // Act: send the raw frame exactly as a client would.
    ws.send(WsMessage::Text(r#"{"t":"hello","pin":"000000"}"#.into()))
        .await
        .unwrap();
    let reply = timeout(Duration::from_secs(2), ws.next()).await.unwrap();

    // Assert
    match reply {
        Some(Ok(WsMessage::Text(text))) => {
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value, serde_json::json!({"t": "error", "msg": "invalid pin"}));
        }
        other => panic!("expected error frame, got {other:?}"),
    }
    assert_eq!(recv(&mut ws).await, None, "channel must close after a bad PIN");
    wait_for_sessions(&host.manager, 0).await;
    assert!(host.sink.events().is_empty());
}

#[tokio::test]
async fn test_correct_pin_replies_ok_with_server_name() {
    let host = start_host(4, fast_config()).await;
    let mut ws = connect(&host).await;

    send(&mut ws, &ControlMessage::Hello { pin: PIN.into() }).await;

    match recv(&mut ws).await {
        Some(ControlMessage::Ok {
            server,
            capabilities,
        }) => {
            assert_eq!(server.as_deref(), Some("Test host"));
            assert!(capabilities.iter().any(|c| c == "mouse"));
        }
        other => panic!("expected ok, got {other:?}"),
    }
}

#[tokio::test]
async fn test_input_before_hello_is_refused_without_reaching_sink() {
    // Arrange
    let host = start_host(4, fast_config()).await;
    let mut ws = connect(&host).await;

    // Act
    send(&mut ws, &ControlMessage::Move { dx: 5.0, dy: 5.0 }).await;

    // Assert
    assert_eq!(
        recv(&mut ws).await,
        Some(ControlMessage::error("expected hello"))
    );
    assert_eq!(recv(&mut ws).await, None);
    assert!(host.sink.events().is_empty());
}

#[tokio::test]
async fn test_silent_client_hits_authentication_timeout() {
    // Arrange
    let host = start_host(
        4,
        ServerConfig {
            auth_timeout: Duration::from_millis(200),
            ..fast_config()
        },
    )
    .await;
    let mut ws = connect(&host).await;

    // Act: say nothing.
    let first = recv(&mut ws).await;

    // Assert
    assert_eq!(first, Some(ControlMessage::error("authentication timeout")));
    assert_eq!(recv(&mut ws).await, None);
    wait_for_sessions(&host.manager, 0).await;
}

// ── Capacity ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connection_beyond_cap_is_refused_immediately() {
    // Arrange: one slot, occupied by an authenticated client.
    let host = start_host(1, fast_config()).await;
    let first = authenticate(&host).await;

    // Act
    let mut second = connect(&host).await;
    let refusal = recv(&mut second).await;

    // Assert
    match refusal {
        Some(ControlMessage::Error { message }) => {
            assert!(message.contains("session limit"), "{message}")
        }
        other => panic!("expected capacity error, got {other:?}"),
    }
    assert_eq!(recv(&mut second).await, None);
    assert_eq!(host.manager.session_count(), 1);

    // The slot is usable again once the first client leaves.
    drop(first);
    wait_for_sessions(&host.manager, 0).await;
    let mut third = authenticate(&host).await;
    round_trip_ping(&mut third).await;
}

#[tokio::test]
async fn test_unauthenticated_connections_count_against_cap() {
    let host = start_host(1, fast_config()).await;
    let _pending = connect(&host).await;
    wait_for_sessions(&host.manager, 1).await;

    let mut refused = connect(&host).await;

    assert!(matches!(
        recv(&mut refused).await,
        Some(ControlMessage::Error { .. })
    ));
}

// ── Input ordering ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_drag_sequence_reaches_sink_in_order() {
    // Arrange
    let host = start_host(4, fast_config()).await;
    let mut ws = authenticate(&host).await;

    // Act
    send(
        &mut ws,
        &ControlMessage::Click {
            btn: "left".into(),
            down: Some(true),
        },
    )
    .await;
    send(&mut ws, &ControlMessage::Move { dx: 10.0, dy: -5.0 }).await;
    send(&mut ws, &ControlMessage::Move { dx: 3.0, dy: 4.0 }).await;
    send(
        &mut ws,
        &ControlMessage::Click {
            btn: "left".into(),
            down: Some(false),
        },
    )
    .await;
    round_trip_ping(&mut ws).await;

    // Assert
    assert_eq!(
        host.sink.events(),
        vec![
            SinkEvent::Click(MouseButton::Left, Some(true)),
            SinkEvent::Move(10, -5),
            SinkEvent::Move(3, 4),
            SinkEvent::Click(MouseButton::Left, Some(false)),
        ]
    );
}

#[tokio::test]
async fn test_dropped_client_mid_drag_has_its_button_released() {
    // Arrange
    let host = start_host(4, fast_config()).await;
    let mut ws = authenticate(&host).await;
    send(
        &mut ws,
        &ControlMessage::Click {
            btn: "left".into(),
            down: Some(true),
        },
    )
    .await;
    send(&mut ws, &ControlMessage::Move { dx: 4.0, dy: 0.0 }).await;
    round_trip_ping(&mut ws).await;

    // Act: the socket goes away without a release.
    drop(ws);
    wait_for_sessions(&host.manager, 0).await;

    // Assert
    let mut events = host.sink.events();
    for _ in 0..100 {
        if events.len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        events = host.sink.events();
    }
    assert_eq!(
        events,
        vec![
            SinkEvent::Click(MouseButton::Left, Some(true)),
            SinkEvent::Move(4, 0),
            SinkEvent::Click(MouseButton::Left, Some(false)),
        ]
    );
}

#[tokio::test]
async fn test_huge_move_does_not_disable_the_pointer() {
    // Arrange
    let host = start_host(4, fast_config()).await;
    let mut ws = authenticate(&host).await;

    // Act
    ws.send(WsMessage::Text(r#"{"t":"move","dx":1.7e308,"dy":0}"#.to_string()))
        .await
        .unwrap();
    let reply = recv(&mut ws).await;
    send(&mut ws, &ControlMessage::Move { dx: 10.0, dy: 10.0 }).await;
    round_trip_ping(&mut ws).await;

    // Assert
    assert!(matches!(reply, Some(ControlMessage::Error { .. })));
    assert_eq!(host.sink.events(), vec![SinkEvent::Move(10, 10)]);
}

#[tokio::test]
async fn test_text_hotkey_and_scroll_are_translated() {
    let host = start_host(4, fast_config()).await;
    let mut ws = authenticate(&host).await;

    send(&mut ws, &ControlMessage::Key { text: "hi".into() }).await;
    send(
        &mut ws,
        &ControlMessage::Hotkey {
            keys: vec!["cmd".into(), "c".into()],
        },
    )
    .await;
    send(&mut ws, &ControlMessage::Scroll { dx: 0, dy: -2 }).await;
    round_trip_ping(&mut ws).await;

    assert_eq!(
        host.sink.events(),
        vec![
            SinkEvent::Text("hi".into()),
            SinkEvent::Combination(vec![Key::Control, Key::Char('c')]),
            SinkEvent::Scroll(0, -2),
        ]
    );
}

#[tokio::test]
async fn test_bad_messages_after_auth_are_reported_but_session_survives() {
    // Arrange
    let host = start_host(4, fast_config()).await;
    let mut ws = authenticate(&host).await;

    // Act
    ws.send(WsMessage::Text(r#"{"t":"teleport","x":1}"#.into()))
        .await
        .unwrap();
    let unknown = recv(&mut ws).await;
    send(
        &mut ws,
        &ControlMessage::Click {
            btn: "thumb".into(),
            down: None,
        },
    )
    .await;
    let bad_button = recv(&mut ws).await;

    // Assert
    assert!(matches!(unknown, Some(ControlMessage::Error { .. })));
    assert!(matches!(bad_button, Some(ControlMessage::Error { .. })));
    round_trip_ping(&mut ws).await;
    assert!(host.sink.events().is_empty());
}

#[tokio::test]
async fn test_two_sessions_are_independent() {
    // Arrange
    let host = start_host(4, fast_config()).await;
    let mut good = authenticate(&host).await;
    let mut bad = connect(&host).await;

    // Act: one client fails authentication while the other keeps working.
    send(&mut bad, &ControlMessage::Hello { pin: "nope".into() }).await;
    send(&mut good, &ControlMessage::Scroll { dx: 1, dy: 0 }).await;

    // Assert
    assert_eq!(recv(&mut bad).await, Some(ControlMessage::error("invalid pin")));
    round_trip_ping(&mut good).await;
    assert_eq!(host.sink.events(), vec![SinkEvent::Scroll(1, 0)]);
    wait_for_sessions(&host.manager, 1).await;
}

// ── Keepalive ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_idle_session_is_closed_after_ping_timeout() {
    // Arrange
    let host = start_host(
        4,
        ServerConfig {
            ping_timeout: Duration::from_millis(300),
            ..fast_config()
        },
    )
    .await;
    let mut ws = authenticate(&host).await;

    // Act: stay silent; the host never hears a frame from us.
    let next = recv(&mut ws).await;

    // Assert
    assert_eq!(next, None);
    wait_for_sessions(&host.manager, 0).await;
}

#[tokio::test]
async fn test_host_sends_websocket_pings() {
    // Arrange
    let host = start_host(
        4,
        ServerConfig {
            ping_interval: Duration::from_millis(100),
            ..fast_config()
        },
    )
    .await;
    let mut ws = authenticate(&host).await;

    // Act
    let frame = timeout(Duration::from_secs(2), ws.next()).await.unwrap();

    // Assert
    assert!(matches!(frame, Some(Ok(WsMessage::Ping(_)))), "{frame:?}");
}

#[tokio::test]
async fn test_client_disconnect_releases_session() {
    let host = start_host(4, fast_config()).await;
    let mut ws = authenticate(&host).await;
    assert_eq!(host.manager.session_count(), 1);

    ws.close(None).await.unwrap();

    wait_for_sessions(&host.manager, 0).await;
}
