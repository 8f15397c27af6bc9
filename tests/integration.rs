//! Integration tests for packetwire.
//!
//! These tests drive real loopback connections with a simple polling
//! driver, the way an external readiness loop would.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use packetwire::capture::{CaptureReader, CaptureWriter};
use packetwire::protocol::{build_frame, encode_header};
use packetwire::{ErrorKind, Packet, Role, Transport, TransportConfig, WireError};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

fn config(role: Role) -> TransportConfig {
    TransportConfig::new(role)
        .hostname("127.0.0.1")
        .timeout(Duration::from_secs(10))
}

/// Poll until `step` reports success or the transport's timeout expires.
fn poll_until(timeout: Duration, mut step: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !step() {
        assert!(Instant::now() < deadline, "driver timed out");
        thread::sleep(POLL_INTERVAL);
    }
}

fn connected_pair(mtu: u32) -> (Transport, Transport) {
    let mut server = Transport::new(config(Role::Listener).mtu(mtu)).unwrap();
    let mut client = Transport::new(
        config(Role::Connector)
            .hostname(server.hostname())
            .port(server.port())
            .mtu(mtu),
    )
    .unwrap();

    let timeout = server.timeout();
    poll_until(timeout, || {
        let client_up = client.is_connected() || client.attempt_connect().unwrap();
        let server_up = server.is_connected() || server.attempt_connect().unwrap();
        client_up && server_up
    });
    (server, client)
}

/// Send every packet from `tx` while draining `rx`, returning what `rx` got.
fn transfer(tx: &mut Transport, rx: &mut Transport, packets: &[Packet]) -> Vec<Packet> {
    let mut received = Vec::new();
    let mut queue = packets.iter().cloned();
    let mut in_flight = false;
    let timeout = tx.timeout();

    poll_until(timeout, || {
        if in_flight {
            in_flight = !tx.send(None).unwrap();
        } else if let Some(packet) = queue.next() {
            in_flight = !tx.send(Some(packet)).unwrap();
        }
        let step = rx.receive().unwrap();
        assert!(!step.end_of_stream);
        received.extend(step.packets);
        received.len() == packets.len()
    });
    received
}

#[test]
fn test_roundtrip_preserves_order_and_content() {
    let (mut server, mut client) = connected_pair(16384);

    let packets: Vec<Packet> = (0..200u32)
        .map(|i| Bytes::from(vec![i as u8; (i as usize * 37) % 1500]))
        .collect();

    let received = transfer(&mut client, &mut server, &packets);
    assert_eq!(received, packets);
}

#[test]
fn test_roundtrip_both_directions() {
    let (mut server, mut client) = connected_pair(16384);

    let upstream = vec![Bytes::from_static(b"request")];
    let downstream = vec![Bytes::from_static(b"reply one"), Bytes::from_static(b"")];

    assert_eq!(transfer(&mut client, &mut server, &upstream), upstream);
    assert_eq!(transfer(&mut server, &mut client, &downstream), downstream);
}

#[test]
fn test_roundtrip_packets_at_mtu() {
    let mtu = 64 * 1024;
    let (mut server, mut client) = connected_pair(mtu);

    let packets: Vec<Packet> = (0..20u8)
        .map(|i| Bytes::from(vec![i; mtu as usize]))
        .collect();

    let received = transfer(&mut client, &mut server, &packets);
    assert_eq!(received.len(), packets.len());
    assert_eq!(received, packets);
}

#[test]
fn test_receive_reassembles_dribbled_bytes() {
    let mut server = Transport::new(config(Role::Listener)).unwrap();
    let mut peer = TcpStream::connect((server.hostname(), server.port())).unwrap();
    peer.set_nodelay(true).unwrap();
    poll_until(server.timeout(), || server.attempt_connect().unwrap());

    let payloads: [&[u8]; 3] = [b"alpha", b"", b"gamma delta"];
    let wire: Vec<u8> = payloads.iter().flat_map(|p| build_frame(p)).collect();

    let mut received = Vec::new();
    for byte in &wire {
        peer.write_all(std::slice::from_ref(byte)).unwrap();
        thread::sleep(Duration::from_micros(200));
        received.extend(server.receive().unwrap().packets);
    }
    drop(peer);

    poll_until(server.timeout(), || {
        let step = server.receive().unwrap();
        received.extend(step.packets);
        step.end_of_stream
    });

    let expected: Vec<Packet> = payloads.iter().map(|p| Bytes::copy_from_slice(p)).collect();
    assert_eq!(received, expected);
}

#[test]
fn test_receive_rejects_frame_over_mtu() {
    let mut server = Transport::new(config(Role::Listener).mtu(1500)).unwrap();
    let mut peer = TcpStream::connect((server.hostname(), server.port())).unwrap();
    poll_until(server.timeout(), || server.attempt_connect().unwrap());

    peer.write_all(&encode_header(1501)).unwrap();
    peer.write_all(&[0u8; 16]).unwrap();

    let deadline = Instant::now() + server.timeout();
    let err = loop {
        assert!(Instant::now() < deadline, "MTU violation not detected");
        match server.receive() {
            Ok(received) => {
                assert!(received.packets.is_empty());
                assert!(!received.end_of_stream);
            }
            Err(err) => break err,
        }
        thread::sleep(POLL_INTERVAL);
    };

    assert!(matches!(
        err,
        WireError::PayloadTooLarge {
            length: 1501,
            mtu: 1500
        }
    ));
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);

    // A well-formed frame after the violation is never delivered.
    peer.write_all(&build_frame(b"late")).unwrap();
    thread::sleep(Duration::from_millis(20));
    let err = server.receive().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn test_send_rejects_new_packet_while_in_flight() {
    let mtu = 32 * 1024 * 1024;
    let (_server, mut client) = connected_pair(mtu);

    // Nobody reads on the other end, so this cannot go out in one write.
    let big = Bytes::from(vec![0x42; mtu as usize]);
    assert!(!client.send(Some(big)).unwrap());
    assert!(!client.is_send_idle());

    let err = client.send(Some(Bytes::from_static(b"next"))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn test_send_continue_without_packet_fails() {
    let (_server, mut client) = connected_pair(16384);
    let err = client.send(None).unwrap_err();
    assert!(matches!(err, WireError::Precondition(_)));
}

#[test]
fn test_wire_format_seen_by_raw_peer() {
    let mut server = Transport::new(config(Role::Listener)).unwrap();
    let mut peer = TcpStream::connect((server.hostname(), server.port())).unwrap();
    poll_until(server.timeout(), || server.attempt_connect().unwrap());

    assert!(server.send(Some(Bytes::from_static(b"\x01\x02\x03"))).unwrap());
    drop(server);

    let mut bytes = Vec::new();
    peer.read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes, vec![0, 0, 0, 3, 1, 2, 3]);
}

#[test]
fn test_endpoint_string_configuration() {
    let server = Transport::new("listen:127.0.0.1:0".parse().unwrap()).unwrap();
    assert_eq!(server.role(), Role::Listener);
    assert_ne!(server.port(), 0);

    let endpoint = format!("connect:{}:{}", server.hostname(), server.port());
    let client = Transport::new(endpoint.parse().unwrap()).unwrap();
    assert_eq!(client.role(), Role::Connector);
    assert_eq!(client.port(), server.port());
}

#[test]
fn test_capture_to_transport_to_capture() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.hex");
    std::fs::write(
        &input,
        "# two packets\n\
         2023-01-01 10:00:00 \n\
         0000 aa bb cc dd\n\
         0004 ee ff\n\
         2023-01-01 10:00:01\n\
         0000 11 22\n",
    )
    .unwrap();

    let reader = CaptureReader::new([&input]);
    let packets: Vec<Packet> = reader.iterate().collect::<Result<_, _>>().unwrap();
    assert_eq!(packets.len(), 2);

    let (mut server, mut client) = connected_pair(16384);
    let received = transfer(&mut client, &mut server, &packets);

    let output = dir.path().join("out.hex");
    let mut writer = CaptureWriter::new(std::fs::File::create(&output).unwrap());
    for packet in &received {
        writer.write_packet(Some("2023-01-01 10:00:00"), packet).unwrap();
    }
    writer.flush().unwrap();
    drop(writer);

    let reread: Vec<Packet> = CaptureReader::new([&output])
        .iterate()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(reread, packets);
    assert_eq!(&reread[0][..], &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    assert_eq!(&reread[1][..], &[0x11, 0x22]);
}
