// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use brim_core::{FakeClock, SystemClock};

#[test]
fn binds_tcp_on_ephemeral_port() {
    let bound =
        get_listening_tcp_socket("127.0.0.1", 0, 16, 0, None, None, &SystemClock).unwrap();
    let addr = bound.listener.local_addr().unwrap();
    assert!(addr.port() > 0);
    assert!(bound.tls.is_none());
    // The socket accepts a real connection.
    let client = std::net::TcpStream::connect(addr).unwrap();
    let (_conn, peer) = bound.listener.accept().unwrap();
    assert_eq!(peer.ip(), client.local_addr().unwrap().ip());
}

#[test]
fn star_and_empty_mean_all_interfaces() {
    for ip in ["*", ""] {
        let bound = get_listening_tcp_socket(ip, 0, 16, 0, None, None, &SystemClock).unwrap();
        assert!(bound.listener.local_addr().unwrap().ip().is_unspecified());
    }
}

#[test]
fn binds_udp_on_ephemeral_port() {
    let socket = get_listening_udp_socket("127.0.0.1", 0, 0, &SystemClock).unwrap();
    let addr = socket.local_addr().unwrap();
    let client = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(b"ping", addr).unwrap();
    let mut buf = [0u8; 16];
    let (n, _) = socket.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping");
}

#[test]
fn unresolvable_host_is_an_address_family_error() {
    let err = get_listening_tcp_socket(
        "host.invalid.brim.test.",
        80,
        16,
        0,
        None,
        None,
        &SystemClock,
    )
    .unwrap_err();
    assert!(matches!(err, NetError::AddressFamily { .. }), "got {err:?}");
}

#[test]
fn addr_in_use_retries_until_the_deadline() {
    let clock = FakeClock::new();
    let attempts = std::cell::Cell::new(0u32);
    let result: Result<(), NetError> = bind_retry("1.2.3.4", 80, 30, &clock, || {
        attempts.set(attempts.get() + 1);
        Err(std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"))
    });
    let err = result.unwrap_err();
    assert!(matches!(err, NetError::BindTimeout { retry: 30, .. }), "got {err:?}");
    assert_eq!(
        err.to_string(),
        "Could not bind to 1.2.3.4:80 after trying for 30 seconds."
    );
    // 30 seconds of 100ms pauses plus the first attempt.
    assert_eq!(attempts.get(), 301);
}

#[test]
fn addr_in_use_succeeds_once_released_before_the_deadline() {
    let clock = FakeClock::new();
    let attempts = std::cell::Cell::new(0u32);
    let result = bind_retry("1.2.3.4", 80, 30, &clock, || {
        attempts.set(attempts.get() + 1);
        if attempts.get() < 250 {
            Err(std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"))
        } else {
            Ok(())
        }
    });
    assert!(result.is_ok());
}

#[test]
fn non_addr_in_use_errors_are_fatal_without_retry() {
    let clock = FakeClock::new();
    let attempts = std::cell::Cell::new(0u32);
    let result: Result<(), NetError> = bind_retry("1.2.3.4", 80, 30, &clock, || {
        attempts.set(attempts.get() + 1);
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"))
    });
    assert!(matches!(result.unwrap_err(), NetError::Bind { .. }));
    assert_eq!(attempts.get(), 1);
}

#[test]
fn missing_tls_files_are_fatal() {
    let err = get_listening_tcp_socket(
        "127.0.0.1",
        0,
        16,
        0,
        Some(Path::new("/nonexistent/cert.pem")),
        Some(Path::new("/nonexistent/key.pem")),
        &SystemClock,
    )
    .unwrap_err();
    assert!(matches!(err, NetError::Tls { .. }));
}
