// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reports the server stats as a JSON response.
//!
//! The response is an object keyed by subserver name. Each subserver's
//! object carries the aggregated stats according to their declared kinds
//! and a nested object per worker with the raw row; the root carries the
//! server `start_time`. A `jsonp` or `callback` query variable wraps the
//! payload for JSONP.
//!
//! Options:
//!
//! ```ini
//! [wsgi_stats]
//! call = brim_handlers::WsgiStats
//! # path = <path>
//! #   The request path to match and serve. Setting this to a hard to
//! #   guess value is a crude access restriction. Default: /stats
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use brim_core::{Body, BoxError, Responder, StatKind, WsgiApp, WsgiEnv, WsgiFactory};

pub struct WsgiStats {
    path: String,
    next: Arc<dyn WsgiApp>,
}

impl WsgiStats {
    pub fn factory() -> WsgiFactory {
        WsgiFactory {
            parse_conf: brim_core::no_parse_conf,
            stats_conf: brim_core::no_stats_conf,
            construct: |name, conf, next| {
                Ok(Arc::new(WsgiStats {
                    path: conf.get_default(name, "path", "/stats").to_string(),
                    next,
                }))
            },
        }
    }
}

#[async_trait]
impl WsgiApp for WsgiStats {
    async fn call(&self, env: &mut WsgiEnv, resp: &mut Responder) -> Result<Body, BoxError> {
        if env.path_info != self.path {
            return self.next.call(env, resp).await;
        }
        if env.method != "GET" && env.method != "HEAD" {
            resp.start(
                "501 Not Implemented",
                vec![("Content-Length".to_string(), "0".to_string())],
            );
            return Ok(Body::Empty);
        }

        let mut body = Map::new();
        for subserver in &env.server_stats.subservers {
            let stats = &subserver.stats;
            let bucket_count = stats.bucket_count();
            let mut entry = Map::new();
            let mut per_bucket: Vec<Map<String, Value>> = vec![Map::new(); bucket_count];
            for name in stats.names() {
                let values: Vec<u64> = (0..bucket_count).map(|i| stats.get(i, name)).collect();
                let aggregated = match stats.kind(name) {
                    Some(StatKind::Sum) => Some(values.iter().sum::<u64>()),
                    Some(StatKind::Min) => values.iter().copied().min(),
                    Some(StatKind::Max) => values.iter().copied().max(),
                    _ => None,
                };
                if let Some(value) = aggregated {
                    if value != 0 {
                        entry.insert(name.clone(), Value::from(value));
                    }
                }
                for (bucket, value) in values.iter().enumerate() {
                    if *value != 0 {
                        per_bucket[bucket].insert(name.clone(), Value::from(*value));
                    }
                }
            }
            for (bucket, row) in per_bucket.into_iter().enumerate() {
                if !row.is_empty() {
                    entry.insert(stats.bucket_names()[bucket].clone(), Value::Object(row));
                }
            }
            body.insert(subserver.name.clone(), Value::Object(entry));
        }
        body.insert("start_time".to_string(), Value::from(env.server_stats.start_time));

        let callback = query_param(&env.query_string, "jsonp")
            .or_else(|| query_param(&env.query_string, "callback"));
        let body = Value::Object(body);
        let (payload, content_type) = match callback {
            Some(callback) => (
                format!("{callback}({})", (env.json.dumps)(&body)),
                "application/javascript",
            ),
            None => (format!("{}\n", (env.json.dumps)(&body)), "application/json"),
        };
        resp.start(
            "200 OK",
            vec![
                ("Content-Length".to_string(), payload.len().to_string()),
                ("Content-Type".to_string(), content_type.to_string()),
            ],
        );
        if env.method == "HEAD" {
            return Ok(Body::Empty);
        }
        Ok(Body::single(payload.into_bytes()))
    }
}

/// First value of `name` in the query string, percent- and plus-decoded.
fn query_param(query_string: &str, name: &str) -> Option<String> {
    for pair in query_string.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == name && !value.is_empty() {
            return Some(
                percent_encoding::percent_decode_str(&value.replace('+', " "))
                    .decode_utf8_lossy()
                    .into_owned(),
            );
        }
    }
    None
}

#[cfg(test)]
#[path = "wsgi_stats_tests.rs"]
mod tests;
