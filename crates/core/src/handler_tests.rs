// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::wsgi::{Body, NotFound, Responder, WsgiEnv};

fn echo_like_factory() -> WsgiFactory {
    WsgiFactory {
        parse_conf: |name, conf| {
            conf.get_int(name, "max_echo", 65536)?;
            Ok(())
        },
        stats_conf: |name, _conf| vec![(format!("{name}.requests"), StatKind::Sum)],
        construct: |_name, _conf, next| Ok(next),
    }
}

fn conf_with_call(section: &str, call: &str) -> Conf {
    let mut conf = Conf::default();
    conf.set(section, "call", call);
    conf
}

#[test]
fn wsgi_factory_resolves_by_symbol() {
    let mut registry = Registry::new();
    registry.register("brim_handlers::WsgiEcho", Factory::Wsgi(echo_like_factory()));

    let conf = conf_with_call("echo", "brim_handlers::WsgiEcho");
    let factory = registry.wsgi_factory("echo", &conf).unwrap();
    let stats = (factory.stats_conf)("echo", &conf);
    assert_eq!(stats, vec![("echo.requests".to_string(), StatKind::Sum)]);
}

#[test]
fn missing_call_option_is_a_config_error() {
    let registry = Registry::new();
    let conf = Conf::default();
    let err = registry.wsgi_factory("echo", &conf).unwrap_err();
    assert_eq!(err.to_string(), "App 'echo' not configured with 'call' option.");
    let err = registry.daemon_factory("ticker", &conf).unwrap_err();
    assert_eq!(err.to_string(), "Daemon 'ticker' not configured with 'call' option.");
}

#[test]
fn unknown_symbol_is_a_config_error() {
    let registry = Registry::new();
    let conf = conf_with_call("echo", "nope::Missing");
    let err = registry.wsgi_factory("echo", &conf).unwrap_err();
    assert_eq!(err.to_string(), "Could not load 'nope::Missing' for app 'echo'.");
}

#[test]
fn wrong_capability_kind_is_a_config_error() {
    let mut registry = Registry::new();
    registry.register("brim_handlers::WsgiEcho", Factory::Wsgi(echo_like_factory()));
    let conf = conf_with_call("echo", "brim_handlers::WsgiEcho");
    let err = registry.tcp_factory("echo", &conf).unwrap_err();
    assert_eq!(err.to_string(), "'brim_handlers::WsgiEcho' is not a TCP app, for app 'echo'.");
    let err = registry.udp_factory("echo", &conf).unwrap_err();
    assert_eq!(err.to_string(), "'brim_handlers::WsgiEcho' is not a UDP app, for app 'echo'.");
    let err = registry.daemon_factory("echo", &conf).unwrap_err();
    assert_eq!(err.to_string(), "'brim_handlers::WsgiEcho' is not a daemon, for daemon 'echo'.");
}

#[test]
fn parse_conf_surfaces_handler_option_errors() {
    let mut registry = Registry::new();
    registry.register("brim_handlers::WsgiEcho", Factory::Wsgi(echo_like_factory()));
    let mut conf = conf_with_call("echo", "brim_handlers::WsgiEcho");
    conf.set("echo", "max_echo", "lots");
    let factory = registry.wsgi_factory("echo", &conf).unwrap();
    let err = (factory.parse_conf)("echo", &conf).unwrap_err();
    assert!(err.to_string().contains("cannot be converted to int"));
}

#[test]
fn default_capabilities_accept_and_declare_nothing() {
    let conf = Conf::default();
    assert!(no_parse_conf("x", &conf).is_ok());
    assert!(no_stats_conf("x", &conf).is_empty());
}

#[tokio::test]
async fn constructed_chain_is_callable() {
    let mut registry = Registry::new();
    registry.register("brim_handlers::WsgiEcho", Factory::Wsgi(echo_like_factory()));
    let conf = conf_with_call("echo", "brim_handlers::WsgiEcho");
    let factory = registry.wsgi_factory("echo", &conf).unwrap();
    let app = (factory.construct)("echo", &conf, Arc::new(NotFound)).unwrap();

    let mut env = WsgiEnv::new("GET", "/none", "", "HTTP/1.1", "127.0.0.1");
    let mut resp = Responder::new();
    let body = app.call(&mut env, &mut resp).await.unwrap();
    assert!(matches!(body, Body::Empty));
    assert_eq!(resp.started().map(|s| s.status.as_str()), Some("404 Not Found"));
}
