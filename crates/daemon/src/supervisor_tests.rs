// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::builtin_registry;
use serial_test::serial;
use std::time::Duration;
use tempfile::tempdir;

fn brim_conf(pairs: &[(&str, &str)]) -> Conf {
    let mut conf = Conf::default();
    for (option, value) in pairs {
        conf.set("brim", option, value);
    }
    conf
}

#[test]
fn config_defaults() {
    let config = ServerConfig::parse(&Conf::default()).unwrap();
    assert_eq!(config.user, None);
    assert_eq!(config.group, None);
    assert_eq!(config.umask, 0o022);
    assert_eq!(config.log_name, "brim");
    assert_eq!(config.log_level, "INFO");
    assert_eq!(config.log_facility, "LOG_LOCAL0");
    assert_eq!(config.count_status_codes, vec![404, 408, 499, 501]);
}

#[test]
fn umask_parses_as_octal() {
    let config = ServerConfig::parse(&brim_conf(&[("umask", "0027")])).unwrap();
    assert_eq!(config.umask, 0o027);
    let err = ServerConfig::parse(&brim_conf(&[("umask", "abc")])).unwrap_err();
    assert_eq!(err.to_string(), "Invalid umask value 'abc'.");
}

#[test]
fn log_level_is_validated_case_insensitively() {
    let config = ServerConfig::parse(&brim_conf(&[("log_level", "debug")])).unwrap();
    assert_eq!(config.log_level, "DEBUG");
    let err = ServerConfig::parse(&brim_conf(&[("log_level", "CHATTY")])).unwrap_err();
    assert_eq!(err.to_string(), "Invalid log_level 'CHATTY'.");
}

#[test]
fn log_facility_gets_the_log_prefix() {
    let config = ServerConfig::parse(&brim_conf(&[("log_facility", "LOCAL3")])).unwrap();
    assert_eq!(config.log_facility, "LOG_LOCAL3");
    let config = ServerConfig::parse(&brim_conf(&[("log_facility", "LOG_DAEMON")])).unwrap();
    assert_eq!(config.log_facility, "LOG_DAEMON");
    let err = ServerConfig::parse(&brim_conf(&[("log_facility", "LOCAL9")])).unwrap_err();
    assert_eq!(err.to_string(), "Invalid log_facility 'LOG_LOCAL9'.");
}

#[test]
fn json_symbols_are_a_build_time_choice() {
    assert!(ServerConfig::parse(&brim_conf(&[("json_dumps", "json.dumps")])).is_ok());
    let err = ServerConfig::parse(&brim_conf(&[("json_dumps", "my.dumps")])).unwrap_err();
    assert_eq!(err.to_string(), "Could not load function 'my.dumps' for json_dumps.");
    let err = ServerConfig::parse(&brim_conf(&[("json_loads", "my.loads")])).unwrap_err();
    assert_eq!(err.to_string(), "Could not load function 'my.loads' for json_loads.");
}

#[test]
fn count_status_codes_parse() {
    let config =
        ServerConfig::parse(&brim_conf(&[("count_status_codes", "404 503")])).unwrap();
    assert_eq!(config.count_status_codes, vec![404, 503]);
    let err =
        ServerConfig::parse(&brim_conf(&[("count_status_codes", "404 bad")])).unwrap_err();
    assert_eq!(err.to_string(), "Invalid count_status_codes '404 bad'.");
}

#[test]
fn the_wsgi_subserver_always_exists() {
    let registry = builtin_registry();
    let conf = brim_conf(&[("port", "0")]);
    let config = ServerConfig::parse(&conf).unwrap();
    let subservers = build_subservers(&conf, &config, &registry, false).unwrap();
    assert_eq!(subservers.len(), 1);
    assert_eq!(subservers[0].name(), "wsgi");
}

#[test]
fn configured_lists_activate_their_subservers() {
    let registry = builtin_registry();
    let mut conf = brim_conf(&[("port", "0")]);
    conf.set("brim", "tcp", "techo");
    conf.set("techo", "call", "brim_handlers::TcpEcho");
    conf.set("brim", "udp", "uecho");
    conf.set("uecho", "call", "brim_handlers::UdpEcho");
    conf.set("brim", "daemons", "ticker");
    conf.set("ticker", "call", "brim_handlers::SampleDaemon");
    let config = ServerConfig::parse(&conf).unwrap();
    let subservers = build_subservers(&conf, &config, &registry, false).unwrap();
    let names: Vec<&str> = subservers.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["wsgi", "tcp", "udp", "daemons"]);

    // no-daemon mode starts no daemons.
    let subservers = build_subservers(&conf, &config, &registry, true).unwrap();
    let names: Vec<&str> = subservers.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["wsgi", "tcp", "udp"]);
}

#[test]
fn validate_surfaces_handler_misconfiguration() {
    let registry = builtin_registry();
    let mut conf = brim_conf(&[]);
    conf.set("brim", "wsgi", "echo");
    let err = validate(&conf, &registry).unwrap_err();
    assert_eq!(err.to_string(), "App 'echo' not configured with 'call' option.");

    conf.set("echo", "call", "who::Knows");
    let err = validate(&conf, &registry).unwrap_err();
    assert_eq!(err.to_string(), "Could not load 'who::Knows' for app 'echo'.");
}

#[test]
#[serial]
fn run_server_serves_until_graceful_shutdown() {
    let registry = builtin_registry();
    let mut conf = brim_conf(&[("ip", "127.0.0.1"), ("port", "0")]);
    conf.set("brim", "wsgi", "echo");
    conf.set("echo", "call", "brim_handlers::WsgiEcho");
    let dir = tempdir().unwrap();
    let opts = ServerOpts {
        pid_file: dir.path().join("brimd.pid"),
        no_daemon: true,
        daemonized: false,
    };
    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    std::thread::scope(|scope| {
        let server = scope.spawn(|| run_server(conf, opts, &registry, shutdown));
        std::thread::sleep(Duration::from_millis(300));
        trigger.trigger_graceful();
        server.join().unwrap().unwrap();
    });
}

#[test]
#[serial]
fn daemonized_run_owns_and_cleans_the_pid_file() {
    let registry = builtin_registry();
    let conf = brim_conf(&[("ip", "127.0.0.1"), ("port", "0")]);
    let dir = tempdir().unwrap();
    let pid_file = dir.path().join("brimd.pid");
    let opts = ServerOpts { pid_file: pid_file.clone(), no_daemon: false, daemonized: true };
    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    std::thread::scope(|scope| {
        let server = scope.spawn(|| run_server(conf, opts, &registry, shutdown));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !pid_file.exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        let stored = crate::control::read_pid(&pid_file).unwrap();
        assert_eq!(stored, Some(std::process::id() as i32));
        trigger.trigger_graceful();
        server.join().unwrap().unwrap();
    });
    assert!(!pid_file.exists(), "pid file survived graceful exit");
}

#[test]
#[serial]
fn bind_conflicts_are_fatal_after_the_retry_window() {
    let registry = builtin_registry();
    // Occupy a port, then ask the server to bind it with no retry window.
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();
    let conf = brim_conf(&[
        ("ip", "127.0.0.1"),
        ("port", &port.to_string()),
        ("listen_retry", "0"),
    ]);
    let dir = tempdir().unwrap();
    let opts = ServerOpts {
        pid_file: dir.path().join("brimd.pid"),
        no_daemon: true,
        daemonized: false,
    };
    let err = run_server(conf, opts, &registry, Shutdown::new()).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Could not bind to 127.0.0.1:{port} after trying for 0 seconds.")
    );
}
