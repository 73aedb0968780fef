// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wraps each accepted HTTP transaction: env construction, middleware
//! invocation, byte accounting, response writing, and the single access-log
//! record.
//!
//! Handler errors never escape this boundary. An error before a response is
//! started synthesizes a zero-body 500; an error while streaming the body
//! lets the partial response terminate naturally. Either way the worker
//! lives on and exactly one access-log record is emitted.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};

use brim_core::{
    Body, RequestLogger, Responder, ServerStats, StartedResponse, StatsView, WsgiApp, WsgiEnv,
};

use super::access_log;
use super::request::HttpRequest;
use super::response;

type BoxBufRead = Box<dyn AsyncBufRead + Send + Sync + Unpin>;

/// Per-worker request pipeline: the composed middleware chain plus the
/// context every request env is stamped with.
pub struct Pipeline {
    pub app: Arc<dyn WsgiApp>,
    pub logger: RequestLogger,
    pub stats: StatsView,
    pub server_stats: Arc<ServerStats>,
    pub log_headers: bool,
    pub chunk_size: usize,
    pub client_timeout: Duration,
}

impl Pipeline {
    /// Run one transaction. Returns the connection reader for the next
    /// keep-alive request (None if it was lost) and whether the connection
    /// may be reused.
    pub async fn handle<W>(
        &self,
        request: HttpRequest,
        reader: BoxBufRead,
        writer: &mut W,
        remote_addr: &str,
    ) -> (Option<BoxBufRead>, bool)
    where
        W: AsyncWrite + Send + Unpin,
    {
        let mut env = WsgiEnv::new(
            &request.method,
            &request.path,
            &request.query,
            &request.protocol,
            remote_addr,
        );
        for (name, value) in &request.headers {
            env.insert_header(name, value);
        }
        env.logger = self.logger.with_txn(&env.txn);
        env.stats = self.stats.clone();
        env.server_stats = Arc::clone(&self.server_stats);
        env.attach_input(reader, request.content_length, self.chunk_size, self.client_timeout);

        let mut responder = Responder::new();
        let result = self.app.call(&mut env, &mut responder).await;

        let (started, body) = match result {
            Ok(body) => match responder.into_started() {
                Some(started) => (started, body),
                None => {
                    env.logger.error("WSGI EXCEPTION: app returned without starting a response");
                    (error_response(), Body::Empty)
                }
            },
            Err(err) => {
                env.logger.error(&format!("WSGI EXCEPTION: {err}"));
                (error_response(), Body::Empty)
            }
        };

        let wire_status = response::effective_status(&started);
        let head_only = env.method == "HEAD";
        let mut keep_alive = request.keep_alive;
        let written = self
            .write_response(&env, writer, &wire_status, &started.headers, body, head_only, keep_alive)
            .await;
        match written {
            Ok(still_alive) => keep_alive = still_alive,
            Err(err) => {
                env.set_client_disconnect();
                env.logger.debug(&format!("client write failed: {err}"));
                keep_alive = false;
            }
        }

        // Exactly one access-log record per transaction, counters with it.
        let code = access_log::logged_status(&env, Some(&wire_status));
        access_log::update_status_counters(&env.stats, code);
        env.logger.notice(&access_log::access_line(&env, code, self.log_headers));

        if keep_alive && env.input.drain().await.is_err() {
            keep_alive = false;
        }
        (env.input.take_reader(), keep_alive)
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_response<W>(
        &self,
        env: &WsgiEnv,
        writer: &mut W,
        status: &str,
        headers: &[(String, String)],
        body: Body,
        head_only: bool,
        keep_alive: bool,
    ) -> io::Result<bool>
    where
        W: AsyncWrite + Send + Unpin,
    {
        let mut headers_out = headers.to_vec();
        let mut keep_alive = keep_alive;
        let has_length = headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-length"));
        if !has_length {
            match body.known_len() {
                Some(len) => headers_out.push(("Content-Length".to_string(), len.to_string())),
                // Unknown length: the close delimits the body.
                None => keep_alive = false,
            }
        }
        let head = response::build_head(status, &headers_out, keep_alive);
        self.write_all(writer, &head).await?;
        if !head_only {
            let bytes_out = env.bytes_out_counter();
            match body {
                Body::Empty => {}
                Body::Chunks(chunks) => {
                    for chunk in chunks {
                        if chunk.is_empty() {
                            continue;
                        }
                        self.write_all(writer, &chunk).await?;
                        bytes_out.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                    }
                }
                Body::Stream(mut stream) => {
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(chunk) => {
                                if chunk.is_empty() {
                                    continue;
                                }
                                self.write_all(writer, &chunk).await?;
                                bytes_out.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                            }
                            Err(err) => {
                                // Partial response terminates naturally.
                                env.logger.error(&format!("WSGI EXCEPTION: {err}"));
                                keep_alive = false;
                                break;
                            }
                        }
                    }
                }
            }
        }
        match tokio::time::timeout(self.client_timeout, writer.flush()).await {
            Ok(result) => result?,
            Err(_) => return Err(write_timeout()),
        }
        Ok(keep_alive)
    }

    async fn write_all<W>(&self, writer: &mut W, data: &[u8]) -> io::Result<()>
    where
        W: AsyncWrite + Send + Unpin,
    {
        match tokio::time::timeout(self.client_timeout, writer.write_all(data)).await {
            Ok(result) => result,
            Err(_) => Err(write_timeout()),
        }
    }
}

fn write_timeout() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "client write timed out")
}

fn error_response() -> StartedResponse {
    StartedResponse {
        status: "500 Internal Server Error".to_string(),
        headers: vec![("Content-Length".to_string(), "0".to_string())],
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
