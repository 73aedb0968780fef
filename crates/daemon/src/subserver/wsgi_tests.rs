// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::builtin_registry;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use brim_core::Conf;

fn echo_conf() -> Conf {
    let mut conf = Conf::default();
    conf.set("brim", "port", "0");
    conf.set("brim", "ip", "127.0.0.1");
    conf.set("brim", "wsgi", "echo");
    conf.set("brim", "workers", "1");
    conf.set("echo", "call", "brim_handlers::WsgiEcho");
    conf.set("echo", "path", "/echo");
    conf.set("echo", "max_echo", "10");
    conf
}

fn configured(conf: &Conf, no_daemon: bool) -> WsgiSubserver {
    let registry = builtin_registry();
    let mut subserver =
        WsgiSubserver::configure(conf, &registry, &[404, 408, 499, 501], "brim", no_daemon)
            .unwrap();
    subserver.acquire(&SystemClock).unwrap();
    subserver.allocate_stats();
    subserver
}

fn send_request(addr: std::net::SocketAddr, request: &[u8]) -> String {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut stream = loop {
        match TcpStream::connect(addr) {
            Ok(stream) => break stream,
            Err(_) if std::time::Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(err) => panic!("could not connect to {addr}: {err}"),
        }
    };
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(request).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

#[test]
fn serves_the_echo_chain_end_to_end() {
    let conf = echo_conf();
    let subserver = configured(&conf, false);
    let addr = subserver.local_addr().unwrap();
    let shutdown = Shutdown::new();

    std::thread::scope(|scope| {
        let handle = scope.spawn(|| subserver.run_parent(&shutdown));

        // Echo truncated at max_echo = 10.
        let response = send_request(
            addr,
            b"POST /echo HTTP/1.1\r\nContent-Length: 12\r\nConnection: close\r\n\r\nhelloworld!!",
        );
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "response: {response}");
        assert!(response.contains("Content-Length: 10\r\n"), "response: {response}");
        assert!(response.ends_with("\r\n\r\nhelloworld"), "response: {response}");

        // Unmatched path falls through to the default 404 app.
        let response =
            send_request(addr, b"GET /nope HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "response: {response}");

        shutdown.trigger_graceful();
        handle.join().unwrap();
    });

    // One worker, one bucket: both transactions counted.
    assert_eq!(subserver.stats.get(0, "request_count"), 2);
    assert_eq!(subserver.stats.get(0, "status_2xx_count"), 1);
    assert_eq!(subserver.stats.get(0, "status_4xx_count"), 1);
    assert_eq!(subserver.stats.get(0, "status_404_count"), 1);
    assert_eq!(subserver.stats.get(0, "echo.requests"), 1);
    assert!(subserver.stats.get(0, "start_time") > 0);
}

#[test]
fn keep_alive_carries_pipelined_requests() {
    let conf = echo_conf();
    let subserver = configured(&conf, false);
    let addr = subserver.local_addr().unwrap();
    let shutdown = Shutdown::new();

    std::thread::scope(|scope| {
        let handle = scope.spawn(|| subserver.run_parent(&shutdown));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut stream = loop {
            match TcpStream::connect(addr) {
                Ok(stream) => break stream,
                Err(_) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(err) => panic!("could not connect: {err}"),
            }
        };
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream
            .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi")
            .unwrap();
        let mut first = String::new();
        let mut buf = [0u8; 512];
        while !first.ends_with("\r\n\r\nhi") {
            let n = stream.read(&mut buf).unwrap();
            assert!(n > 0, "connection closed early: {first}");
            first.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        assert!(first.starts_with("HTTP/1.1 200 OK\r\n"), "first: {first}");

        stream
            .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 3\r\nConnection: close\r\n\r\nbye")
            .unwrap();
        let mut rest = String::new();
        stream.read_to_string(&mut rest).unwrap();
        assert!(rest.starts_with("HTTP/1.1 200 OK\r\n"), "second: {rest}");
        assert!(rest.ends_with("bye"), "second: {rest}");

        shutdown.trigger_graceful();
        handle.join().unwrap();
    });
}

#[test]
fn inline_mode_serves_from_the_calling_thread() {
    let conf = echo_conf();
    // workers = 0 (no-daemon): stats become no-ops but traffic still flows.
    let subserver = configured(&conf, true);
    assert_eq!(subserver.conf.worker_count, 0);
    assert_eq!(subserver.stats.bucket_count(), 0);
    let addr = subserver.local_addr().unwrap();
    let shutdown = Shutdown::new();

    std::thread::scope(|scope| {
        let handle = scope.spawn(|| subserver.run_parent(&shutdown));
        let response = send_request(
            addr,
            b"POST /echo HTTP/1.1\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
        );
        assert!(response.ends_with("\r\n\r\nok"), "response: {response}");
        shutdown.trigger_graceful();
        handle.join().unwrap();
    });
    assert_eq!(subserver.stats.get(0, "request_count"), 0);
}

#[test]
fn configure_rejects_bad_apps_before_binding() {
    let registry = builtin_registry();
    let mut conf = echo_conf();
    conf.set("echo", "call", "nope::Missing");
    let err = WsgiSubserver::configure(&conf, &registry, &[], "brim", false).unwrap_err();
    assert_eq!(err.to_string(), "Could not load 'nope::Missing' for app 'echo'.");

    let mut conf = echo_conf();
    conf.set("echo", "max_echo", "tons");
    let err = WsgiSubserver::configure(&conf, &registry, &[], "brim", false).unwrap_err();
    assert!(err.to_string().contains("cannot be converted to int"));
}
