// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-request WSGI context: env, body input/output, and the captured
//! start-response.
//!
//! The env is an explicit struct passed through the middleware chain rather
//! than process-global state. It carries the core-injected values every
//! request gets: the monotonic start instant, the 32-hex txn id, the
//! worker's stats view, a txn-carrying logger view, byte accounting
//! counters, and the slot for extra access-log fields.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::Stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::handler::{BoxError, WsgiApp};
use crate::stats::{ServerStats, StatsView};

/// A fresh request correlation id: 32 lowercase hex characters.
pub fn new_txn() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A logger view bound to a server name and, per request, a txn id.
///
/// Records go to the process logger (tracing); the txn rides along on every
/// record so a request's log lines can be correlated.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    server: String,
    txn: Option<String>,
}

impl RequestLogger {
    pub fn new(server: &str) -> Self {
        Self { server: server.to_string(), txn: None }
    }

    pub fn with_txn(&self, txn: &str) -> Self {
        Self { server: self.server.clone(), txn: Some(txn.to_string()) }
    }

    pub fn txn(&self) -> Option<&str> {
        self.txn.as_deref()
    }

    pub fn debug(&self, msg: &str) {
        match &self.txn {
            Some(txn) => tracing::debug!(target: "brim", server = %self.server, txn = %txn, "{msg}"),
            None => tracing::debug!(target: "brim", server = %self.server, "{msg}"),
        }
    }

    pub fn info(&self, msg: &str) {
        match &self.txn {
            Some(txn) => tracing::info!(target: "brim", server = %self.server, txn = %txn, "{msg}"),
            None => tracing::info!(target: "brim", server = %self.server, "{msg}"),
        }
    }

    pub fn error(&self, msg: &str) {
        match &self.txn {
            Some(txn) => tracing::error!(target: "brim", server = %self.server, txn = %txn, "{msg}"),
            None => tracing::error!(target: "brim", server = %self.server, "{msg}"),
        }
    }

    /// Access-log records; kept on their own target so the transport can
    /// split them out, the way the original used the NOTICE syslog level.
    pub fn notice(&self, msg: &str) {
        tracing::info!(target: "brim::access", server = %self.server, "{msg}");
    }
}

type BoxBufRead = Box<dyn AsyncBufRead + Send + Sync + Unpin>;

/// Byte-counting reader over the request body.
///
/// Bounded by the request's Content-Length so it never reads into the next
/// pipelined request. Every read a handler performs is added to the env's
/// bytes-in counter; a short read or timeout marks the client disconnected.
pub struct WsgiInput {
    reader: Option<BoxBufRead>,
    remaining: u64,
    chunk_size: usize,
    timeout: Duration,
    bytes_in: Arc<AtomicU64>,
    disconnected: Arc<AtomicBool>,
}

impl WsgiInput {
    pub fn new(
        reader: BoxBufRead,
        content_length: u64,
        chunk_size: usize,
        timeout: Duration,
        bytes_in: Arc<AtomicU64>,
        disconnected: Arc<AtomicBool>,
    ) -> Self {
        Self { reader: Some(reader), remaining: content_length, chunk_size, timeout, bytes_in, disconnected }
    }

    /// An input with no body at all.
    pub fn empty() -> Self {
        Self {
            reader: None,
            remaining: 0,
            chunk_size: 4096,
            timeout: Duration::from_secs(60),
            bytes_in: Arc::new(AtomicU64::new(0)),
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Unread body bytes left.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read up to `size` bytes (never past Content-Length). A short result
    /// means the client stopped sending.
    pub async fn read(&mut self, size: usize) -> io::Result<Vec<u8>> {
        match tokio::time::timeout(self.timeout, self.read_inner(size)).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out()),
        }
    }

    /// Read the rest of the body.
    pub async fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read(self.chunk_size).await?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }

    /// Read through the next newline (inclusive) or the end of the body.
    pub async fn read_line(&mut self) -> io::Result<Vec<u8>> {
        match tokio::time::timeout(self.timeout, self.read_line_inner()).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out()),
        }
    }

    /// The next `wsgi_input_iter_chunk_size`-sized chunk, or None at the end
    /// of the body.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let chunk = self.read(self.chunk_size).await?;
        Ok(if chunk.is_empty() { None } else { Some(chunk) })
    }

    /// Discard any unread body bytes so the connection can carry the next
    /// request. Not counted against bytes-in.
    pub async fn drain(&mut self) -> io::Result<()> {
        match tokio::time::timeout(self.timeout, self.drain_inner()).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out()),
        }
    }

    /// Hand the underlying reader back to the transport.
    pub fn take_reader(&mut self) -> Option<BoxBufRead> {
        self.reader.take()
    }

    fn timed_out(&self) -> io::Error {
        self.disconnected.store(true, Ordering::Relaxed);
        io::Error::new(io::ErrorKind::TimedOut, "client timed out")
    }

    async fn read_inner(&mut self, size: usize) -> io::Result<Vec<u8>> {
        let want = self.remaining.min(size as u64) as usize;
        if want == 0 {
            return Ok(Vec::new());
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(Vec::new());
        };
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.disconnected.store(true, Ordering::Relaxed);
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        self.remaining -= filled as u64;
        self.bytes_in.fetch_add(filled as u64, Ordering::Relaxed);
        Ok(buf)
    }

    async fn read_line_inner(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let Some(reader) = self.reader.as_mut() else {
            return Ok(out);
        };
        while self.remaining > 0 {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                self.disconnected.store(true, Ordering::Relaxed);
                break;
            }
            let upto = available.len().min(self.remaining as usize);
            if let Some(pos) = available[..upto].iter().position(|&b| b == b'\n') {
                out.extend_from_slice(&available[..=pos]);
                reader.consume(pos + 1);
                self.remaining -= (pos + 1) as u64;
                break;
            }
            out.extend_from_slice(&available[..upto]);
            reader.consume(upto);
            self.remaining -= upto as u64;
        }
        self.bytes_in.fetch_add(out.len() as u64, Ordering::Relaxed);
        Ok(out)
    }

    async fn drain_inner(&mut self) -> io::Result<()> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };
        while self.remaining > 0 {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                self.disconnected.store(true, Ordering::Relaxed);
                break;
            }
            let upto = available.len().min(self.remaining as usize);
            reader.consume(upto);
            self.remaining -= upto as u64;
        }
        Ok(())
    }
}

/// The captured start-response tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedResponse {
    pub status: String,
    pub headers: Vec<(String, String)>,
}

impl StartedResponse {
    /// First matching header value, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The start-response callback handed to the middleware chain. The captured
/// status and headers are forwarded to the transport after the call and kept
/// for the access log.
#[derive(Debug, Default)]
pub struct Responder {
    started: Option<StartedResponse>,
}

impl Responder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the response status line (e.g. `200 OK`) and headers.
    /// Middleware may call this again to replace an earlier capture, the
    /// same way exc_info allowed a retry in WSGI.
    pub fn start(&mut self, status: impl Into<String>, headers: Vec<(String, String)>) {
        self.started = Some(StartedResponse { status: status.into(), headers });
    }

    pub fn started(&self) -> Option<&StartedResponse> {
        self.started.as_ref()
    }

    pub fn into_started(self) -> Option<StartedResponse> {
        self.started
    }
}

/// The JSON codec carried in every request env. Deployments used to be
/// able to swap the serializer by symbol path; here the choice is made at
/// build time and handlers simply call through these.
#[derive(Clone, Copy)]
pub struct JsonCodec {
    pub dumps: fn(&serde_json::Value) -> String,
    pub loads: fn(&str) -> serde_json::Result<serde_json::Value>,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self { dumps: |value| value.to_string(), loads: |text| serde_json::from_str(text) }
    }
}

impl std::fmt::Debug for JsonCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

/// A streaming body chunk source, for apps that produce output while
/// reading.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send>>;

/// The response body an app returns.
pub enum Body {
    Empty,
    Chunks(Vec<Vec<u8>>),
    Stream(BodyStream),
}

impl Body {
    pub fn single(chunk: Vec<u8>) -> Self {
        Self::Chunks(vec![chunk])
    }

    /// Total size when knowable up front (streams are not).
    pub fn known_len(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Chunks(chunks) => Some(chunks.iter().map(|c| c.len() as u64).sum()),
            Self::Stream(_) => None,
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(chunk: Vec<u8>) -> Self {
        Self::single(chunk)
    }
}

/// Per-request environment. Created when a request's headers arrive and
/// dropped after the access-log record is emitted.
pub struct WsgiEnv {
    pub method: String,
    /// The request path as received on the wire, percent-encoding intact.
    pub path_info: String,
    pub query_string: String,
    pub server_protocol: String,
    pub remote_addr: String,
    pub remote_user: Option<String>,
    headers: Vec<(String, String)>,
    pub input: WsgiInput,
    /// Monotonic start of the transaction.
    pub start: Instant,
    pub txn: String,
    pub logger: RequestLogger,
    pub stats: StatsView,
    pub server_stats: Arc<ServerStats>,
    pub json: JsonCodec,
    pub additional_request_log_info: Vec<String>,
    bytes_in: Arc<AtomicU64>,
    bytes_out: Arc<AtomicU64>,
    disconnected: Arc<AtomicBool>,
}

impl WsgiEnv {
    pub fn new(
        method: &str,
        path_info: &str,
        query_string: &str,
        server_protocol: &str,
        remote_addr: &str,
    ) -> Self {
        let txn = new_txn();
        Self {
            method: method.to_string(),
            path_info: path_info.to_string(),
            query_string: query_string.to_string(),
            server_protocol: server_protocol.to_string(),
            remote_addr: remote_addr.to_string(),
            remote_user: None,
            headers: Vec::new(),
            input: WsgiInput::empty(),
            start: Instant::now(),
            logger: RequestLogger::new("brim").with_txn(&txn),
            txn,
            stats: StatsView::detached(),
            server_stats: Arc::new(ServerStats::default()),
            json: JsonCodec::default(),
            additional_request_log_info: Vec::new(),
            bytes_in: Arc::new(AtomicU64::new(0)),
            bytes_out: Arc::new(AtomicU64::new(0)),
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Store a request header under its WSGI-style key
    /// (`User-Agent` -> `HTTP_USER_AGENT`).
    pub fn insert_header(&mut self, name: &str, value: &str) {
        self.headers.push((wsgi_header_key(name), value.to_string()));
    }

    /// First value of a header by WSGI-style key (`HTTP_USER_AGENT`).
    pub fn header(&self, wsgi_key: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == wsgi_key).map(|(_, v)| v.as_str())
    }

    /// All headers, WSGI-style keys, in arrival order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Wire `reader` up as the request body with byte accounting into this
    /// env's counters.
    pub fn attach_input<R>(
        &mut self,
        reader: R,
        content_length: u64,
        chunk_size: usize,
        timeout: Duration,
    ) where
        R: AsyncBufRead + Send + Sync + Unpin + 'static,
    {
        self.input = WsgiInput::new(
            Box::new(reader),
            content_length,
            chunk_size,
            timeout,
            Arc::clone(&self.bytes_in),
            Arc::clone(&self.disconnected),
        );
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    /// Shared bytes-out counter for the response writer.
    pub fn bytes_out_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_out)
    }

    pub fn client_disconnect(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed)
    }

    pub fn set_client_disconnect(&self) {
        self.disconnected.store(true, Ordering::Relaxed);
    }
}

fn wsgi_header_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 5);
    key.push_str("HTTP_");
    for c in name.chars() {
        key.push(match c {
            '-' => '_',
            c => c.to_ascii_uppercase(),
        });
    }
    key
}

/// The default innermost app: 404 with a zero-length body.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

#[async_trait]
impl WsgiApp for NotFound {
    async fn call(&self, _env: &mut WsgiEnv, resp: &mut Responder) -> Result<Body, BoxError> {
        resp.start("404 Not Found", vec![("Content-Length".to_string(), "0".to_string())]);
        Ok(Body::Empty)
    }
}

#[cfg(test)]
#[path = "wsgi_tests.rs"]
mod tests;
