//! Integration tests for the rmouse-core public API.
//!
//! These exercise the codec against literal wire frames as a client would
//! send them, and the discovery types as the client would assemble them.

use std::net::IpAddr;

use rmouse_core::{
    decode_message,
    discovery::{is_discovery_request, DISCOVERY_REQUEST},
    encode_message,
    keymap::{windows_vk, Key, Platform},
    protocol::{decode_message_bounded, MAX_MESSAGE_SIZE},
    ControlMessage, DiscoveryReply, HostList, HostRecord, ProtocolError,
};

#[test]
fn test_every_client_frame_decodes_and_reencodes_identically() {
    // Arrange
    let frames = [
        r#"{"t":"hello","pin":"123456"}"#,
        r#"{"t":"move","dx":4.5,"dy":-2.0}"#,
        r#"{"t":"click","btn":"right"}"#,
        r#"{"t":"click","btn":"left","down":true}"#,
        r#"{"t":"key","text":"hi there"}"#,
        r#"{"t":"hotkey","keys":["cmd","c"]}"#,
        r#"{"t":"scroll","dx":0,"dy":-3}"#,
        r#"{"t":"ping"}"#,
    ];

    for frame in frames {
        // Act
        let msg = decode_message(frame).expect("frame must decode");
        let again = decode_message(&encode_message(&msg).unwrap()).unwrap();

        // Assert
        assert_eq!(msg, again, "frame {frame} changed meaning after re-encode");
    }
}

#[test]
fn test_host_replies_have_expected_wire_shape() {
    assert_eq!(
        encode_message(&ControlMessage::error("invalid pin")).unwrap(),
        r#"{"t":"error","msg":"invalid pin"}"#
    );
    assert_eq!(
        encode_message(&ControlMessage::Pong).unwrap(),
        r#"{"t":"pong"}"#
    );
}

#[test]
fn test_decode_failures_are_distinguishable() {
    assert!(matches!(
        decode_message("{not json"),
        Err(ProtocolError::Malformed(_))
    ));
    assert!(matches!(
        decode_message(r#"{"dx":1}"#),
        Err(ProtocolError::MissingTag)
    ));
    assert!(matches!(
        decode_message(r#"{"t":"warp"}"#),
        Err(ProtocolError::UnknownTag(t)) if t == "warp"
    ));
    assert!(matches!(
        decode_message(r#"{"t":"move","dx":"fast","dy":0}"#),
        Err(ProtocolError::InvalidPayload { tag, .. }) if tag == "move"
    ));
}

#[test]
fn test_oversized_frame_is_rejected_before_parsing() {
    let big = format!(r#"{{"t":"key","text":"{}"}}"#, "a".repeat(64));
    assert!(matches!(
        decode_message_bounded(&big, 32),
        Err(ProtocolError::TooLarge { limit: 32, .. })
    ));
    assert!(decode_message_bounded(&big, MAX_MESSAGE_SIZE).is_ok());
}

#[test]
fn test_discovery_request_and_reply_flow() {
    // Arrange
    assert!(is_discovery_request(DISCOVERY_REQUEST.as_bytes()));
    let reply = DiscoveryReply {
        name: "Study".into(),
        ip: "192.168.0.40".into(),
        port: 8765,
        pin_required: true,
        version: "2.0".into(),
        capabilities: vec!["mouse".into()],
    };
    let source: IpAddr = "192.168.0.40".parse().unwrap();

    // Act
    let parsed = DiscoveryReply::from_datagram(&reply.to_datagram()).unwrap();
    let mut hosts = HostList::new();
    hosts.upsert(HostRecord::from_reply(parsed.clone(), source));
    hosts.upsert(HostRecord::from_reply(parsed, source));

    // Assert
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts.as_slice()[0].control_url(), "ws://192.168.0.40:8765");
}

#[test]
fn test_copy_hotkey_resolves_to_native_codes_on_windows() {
    let keys: Vec<Key> = ["cmd", "c"]
        .iter()
        .map(|n| Key::resolve(n, Platform::Windows).unwrap())
        .collect();
    let vks: Vec<u16> = keys
        .into_iter()
        .map(|k| windows_vk::key_to_vk(k).unwrap())
        .collect();
    assert_eq!(vks, vec![0x11, 0x43]);
}
