// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/1.x request-head reading and parsing.
//!
//! Reads exactly the header block off the connection (body bytes stay in
//! the buffered reader for the request's input wrapper) and parses it with
//! httparse.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Largest accepted request head.
const MAX_HEAD_BYTES: usize = 65536;

const MAX_HEADERS: usize = 64;

#[derive(Debug, Error)]
pub enum RequestError {
    /// Clean end of stream before any request byte; normal keep-alive close.
    #[error("connection closed")]
    Closed,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request head exceeds 65536 bytes")]
    TooLarge,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A parsed request head.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    /// Request path as received, percent-encoding intact, query removed.
    pub path: String,
    pub query: String,
    /// `HTTP/1.0` or `HTTP/1.1`.
    pub protocol: String,
    /// Raw header names and values in arrival order.
    pub headers: Vec<(String, String)>,
    pub content_length: u64,
    pub keep_alive: bool,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Read one request head from `reader`. Body bytes are left unconsumed.
pub async fn read_request<R>(reader: &mut R) -> Result<HttpRequest, RequestError>
where
    R: AsyncBufRead + Send + Unpin,
{
    let head = read_head(reader).await?;
    parse_head(&head)
}

async fn read_head<R>(reader: &mut R) -> Result<Vec<u8>, RequestError>
where
    R: AsyncBufRead + Send + Unpin,
{
    let mut head: Vec<u8> = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Err(if head.is_empty() {
                RequestError::Closed
            } else {
                RequestError::Malformed("unexpected end of request head".to_string())
            });
        }
        let previous_len = head.len();
        head.extend_from_slice(available);
        if let Some(end) = head_end(&head) {
            // Only consume what belongs to the head; the rest is body.
            reader.consume(end - previous_len);
            head.truncate(end);
            return Ok(head);
        }
        if head.len() > MAX_HEAD_BYTES {
            return Err(RequestError::TooLarge);
        }
        let consumed = available.len();
        reader.consume(consumed);
    }
}

/// Index one past the blank line ending the head, if present.
fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn parse_head(head: &[u8]) -> Result<HttpRequest, RequestError> {
    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut header_storage);
    match parsed.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(RequestError::Malformed("truncated request head".to_string()))
        }
        Err(err) => return Err(RequestError::Malformed(err.to_string())),
    }
    let method = parsed
        .method
        .ok_or_else(|| RequestError::Malformed("missing method".to_string()))?
        .to_string();
    let target =
        parsed.path.ok_or_else(|| RequestError::Malformed("missing request path".to_string()))?;
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target.to_string(), String::new()),
    };
    let minor = parsed.version.unwrap_or(0);
    let protocol = if minor == 1 { "HTTP/1.1" } else { "HTTP/1.0" };
    let headers: Vec<(String, String)> = parsed
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(0);
    let connection = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("connection"))
        .map(|(_, v)| v.to_lowercase());
    let keep_alive = match (minor, connection.as_deref()) {
        (_, Some(value)) if value.contains("close") => false,
        (0, Some(value)) => value.contains("keep-alive"),
        (0, None) => false,
        _ => true,
    };

    Ok(HttpRequest {
        method,
        path,
        query,
        protocol: protocol.to_string(),
        headers,
        content_length,
        keep_alive,
    })
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
