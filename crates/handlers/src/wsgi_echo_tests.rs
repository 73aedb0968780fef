// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use brim_core::{BucketStats, Conf, NotFound, StatsView};
use std::io::Cursor;
use std::time::Duration;

fn echo_conf(max_echo: Option<&str>) -> Conf {
    let mut conf = Conf::default();
    conf.set("echo", "call", "brim_handlers::WsgiEcho");
    conf.set("echo", "path", "/echo");
    if let Some(max_echo) = max_echo {
        conf.set("echo", "max_echo", max_echo);
    }
    conf
}

fn build(conf: &Conf) -> Arc<dyn WsgiApp> {
    let factory = WsgiEcho::factory();
    (factory.parse_conf)("echo", conf).unwrap();
    (factory.construct)("echo", conf, Arc::new(NotFound)).unwrap()
}

fn env_with_body(path: &str, body: &[u8]) -> WsgiEnv {
    let mut env = WsgiEnv::new("POST", path, "", "HTTP/1.1", "127.0.0.1");
    env.attach_input(Cursor::new(body.to_vec()), body.len() as u64, 4096, Duration::from_secs(5));
    env
}

#[tokio::test]
async fn echoes_the_request_body() {
    let app = build(&echo_conf(None));
    let mut env = env_with_body("/echo", b"hello");
    let mut resp = Responder::new();
    let body = app.call(&mut env, &mut resp).await.unwrap();
    let started = resp.into_started().unwrap();
    assert_eq!(started.status, "200 OK");
    assert_eq!(started.header("Content-Length"), Some("5"));
    assert!(matches!(body, Body::Chunks(chunks) if chunks.concat() == b"hello"));
}

#[tokio::test]
async fn truncates_at_max_echo() {
    let app = build(&echo_conf(Some("10")));
    let mut env = env_with_body("/echo", b"helloworld!!");
    let mut resp = Responder::new();
    let body = app.call(&mut env, &mut resp).await.unwrap();
    let started = resp.into_started().unwrap();
    assert_eq!(started.header("Content-Length"), Some("10"));
    assert!(matches!(body, Body::Chunks(chunks) if chunks.concat() == b"helloworld"));
}

#[tokio::test]
async fn passes_other_paths_to_the_next_app() {
    let app = build(&echo_conf(None));
    let mut env = env_with_body("/elsewhere", b"");
    let mut resp = Responder::new();
    app.call(&mut env, &mut resp).await.unwrap();
    assert_eq!(resp.into_started().unwrap().status, "404 Not Found");
}

#[tokio::test]
async fn counts_requests_in_its_declared_stat() {
    let conf = echo_conf(None);
    let factory = WsgiEcho::factory();
    let declared = (factory.stats_conf)("echo", &conf);
    assert_eq!(declared, vec![("echo.requests".to_string(), StatKind::Sum)]);

    let stats = Arc::new(BucketStats::new(vec!["0".to_string()], declared));
    let app = build(&conf);
    let mut env = env_with_body("/echo", b"x");
    env.stats = StatsView::new(Arc::clone(&stats), 0);
    let mut resp = Responder::new();
    app.call(&mut env, &mut resp).await.unwrap();
    assert_eq!(stats.get(0, "echo.requests"), 1);
}

#[test]
fn bad_max_echo_fails_parse_conf() {
    let conf = echo_conf(Some("plenty"));
    let factory = WsgiEcho::factory();
    assert!((factory.parse_conf)("echo", &conf).is_err());
}
