// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use brim_core::{BucketStats, Conf, NotFound, ServerStats, SubserverStats};

fn server_stats() -> Arc<ServerStats> {
    let wsgi = Arc::new(BucketStats::new(
        vec!["0".to_string(), "1".to_string()],
        vec![
            ("request_count".to_string(), StatKind::Sum),
            ("start_time".to_string(), StatKind::Worker),
        ],
    ));
    wsgi.set(0, "request_count", 3);
    wsgi.set(1, "request_count", 5);
    wsgi.set(0, "start_time", 1234);
    let udp = Arc::new(BucketStats::new(
        vec!["0".to_string()],
        vec![("byte_count".to_string(), StatKind::Sum)],
    ));
    udp.set(0, "byte_count", 4);
    Arc::new(ServerStats {
        start_time: 1700000000,
        subservers: vec![
            SubserverStats { name: "wsgi".to_string(), stats: wsgi },
            SubserverStats { name: "udp".to_string(), stats: udp },
        ],
    })
}

fn build() -> Arc<dyn WsgiApp> {
    let conf = Conf::default();
    (WsgiStats::factory().construct)("stats", &conf, Arc::new(NotFound)).unwrap()
}

fn stats_env(method: &str, query: &str) -> WsgiEnv {
    let mut env = WsgiEnv::new(method, "/stats", query, "HTTP/1.1", "127.0.0.1");
    env.server_stats = server_stats();
    env
}

async fn payload(env: &mut WsgiEnv) -> (String, Vec<u8>) {
    let app = build();
    let mut resp = Responder::new();
    let body = app.call(env, &mut resp).await.unwrap();
    let started = resp.into_started().unwrap();
    let bytes = match body {
        Body::Chunks(chunks) => chunks.concat(),
        Body::Empty => Vec::new(),
        Body::Stream(_) => panic!("unexpected stream body"),
    };
    assert_eq!(started.header("Content-Length"), Some(bytes.len().to_string()).as_deref());
    (started.status, bytes)
}

#[tokio::test]
async fn aggregates_sums_and_reports_raw_rows() {
    let mut env = stats_env("GET", "");
    let (status, bytes) = payload(&mut env).await;
    assert_eq!(status, "200 OK");
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["wsgi"]["request_count"], 8);
    assert_eq!(value["wsgi"]["0"]["request_count"], 3);
    assert_eq!(value["wsgi"]["1"]["request_count"], 5);
    assert_eq!(value["udp"]["byte_count"], 4);
    assert_eq!(value["start_time"], 1700000000u64);
    // Worker-kind stats appear per bucket but never aggregated.
    assert_eq!(value["wsgi"]["0"]["start_time"], 1234);
    assert!(value["wsgi"].get("start_time").is_none());
}

#[tokio::test]
async fn jsonp_wraps_the_payload() {
    let mut env = stats_env("GET", "jsonp=render");
    let app = build();
    let mut resp = Responder::new();
    let body = app.call(&mut env, &mut resp).await.unwrap();
    let started = resp.into_started().unwrap();
    assert_eq!(started.header("Content-Type"), Some("application/javascript"));
    let Body::Chunks(chunks) = body else { panic!("expected chunks") };
    let text = String::from_utf8(chunks.concat()).unwrap();
    assert!(text.starts_with("render("), "payload: {text}");
    assert!(text.ends_with(')'), "payload: {text}");

    let mut env = stats_env("GET", "callback=cb");
    let mut resp = Responder::new();
    let body = build().call(&mut env, &mut resp).await.unwrap();
    let Body::Chunks(chunks) = body else { panic!("expected chunks") };
    let text = String::from_utf8(chunks.concat()).unwrap();
    assert!(text.starts_with("cb("), "payload: {text}");
}

#[tokio::test]
async fn plain_json_has_content_type_and_newline() {
    let mut env = stats_env("GET", "");
    let app = build();
    let mut resp = Responder::new();
    let body = app.call(&mut env, &mut resp).await.unwrap();
    let started = resp.into_started().unwrap();
    assert_eq!(started.header("Content-Type"), Some("application/json"));
    let Body::Chunks(chunks) = body else { panic!("expected chunks") };
    assert!(chunks.concat().ends_with(b"\n"));
}

#[tokio::test]
async fn head_sends_no_body_but_keeps_content_length() {
    let mut env = stats_env("HEAD", "");
    let app = build();
    let mut resp = Responder::new();
    let body = app.call(&mut env, &mut resp).await.unwrap();
    let started = resp.into_started().unwrap();
    assert!(matches!(body, Body::Empty));
    let length: usize = started.header("Content-Length").unwrap().parse().unwrap();
    assert!(length > 0);
}

#[tokio::test]
async fn non_get_is_not_implemented() {
    let mut env = stats_env("POST", "");
    let app = build();
    let mut resp = Responder::new();
    let body = app.call(&mut env, &mut resp).await.unwrap();
    assert!(matches!(body, Body::Empty));
    assert_eq!(resp.into_started().unwrap().status, "501 Not Implemented");
}

#[tokio::test]
async fn other_paths_fall_through() {
    let mut env = stats_env("GET", "");
    env.path_info = "/not-stats".to_string();
    let app = build();
    let mut resp = Responder::new();
    app.call(&mut env, &mut resp).await.unwrap();
    assert_eq!(resp.into_started().unwrap().status, "404 Not Found");
}
