// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A WSGI app that echoes the request body back in the response. A good
//! starting point for other WSGI apps.
//!
//! Options:
//!
//! ```ini
//! [wsgi_echo]
//! call = brim_handlers::WsgiEcho
//! # path = <path>
//! #   The request path to match and serve; any other path is passed on to
//! #   the next app in the chain. Default: /echo
//! # max_echo = <bytes>
//! #   The maximum bytes to echo; anything beyond is ignored.
//! #   Default: 65536
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use brim_core::{Body, BoxError, Responder, StatKind, WsgiApp, WsgiEnv, WsgiFactory};

pub struct WsgiEcho {
    name: String,
    path: String,
    max_echo: usize,
    next: Arc<dyn WsgiApp>,
}

impl WsgiEcho {
    pub fn factory() -> WsgiFactory {
        WsgiFactory {
            parse_conf: |name, conf| {
                conf.get_int(name, "max_echo", 65536)?;
                Ok(())
            },
            stats_conf: |name, _conf| vec![(format!("{name}.requests"), StatKind::Sum)],
            construct: |name, conf, next| {
                Ok(Arc::new(WsgiEcho {
                    name: name.to_string(),
                    path: conf.get_default(name, "path", "/echo").to_string(),
                    max_echo: conf.get_int(name, "max_echo", 65536)?.max(0) as usize,
                    next,
                }))
            },
        }
    }
}

#[async_trait]
impl WsgiApp for WsgiEcho {
    async fn call(&self, env: &mut WsgiEnv, resp: &mut Responder) -> Result<Body, BoxError> {
        if env.path_info != self.path {
            return self.next.call(env, resp).await;
        }
        env.stats.incr(&format!("{}.requests", self.name));
        let mut body = Vec::new();
        while body.len() < self.max_echo {
            // A failed read just ends the echo early.
            let chunk = env.input.read(self.max_echo - body.len()).await.unwrap_or_default();
            if chunk.is_empty() {
                break;
            }
            body.extend_from_slice(&chunk);
        }
        resp.start("200 OK", vec![("Content-Length".to_string(), body.len().to_string())]);
        Ok(Body::single(body))
    }
}

#[cfg(test)]
#[path = "wsgi_echo_tests.rs"]
mod tests;
