// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response-head assembly and the wire-status rewrite rules.

use brim_core::StartedResponse;

/// Numeric status code from a `200 OK`-style status line.
pub fn status_code(status: &str) -> Option<u16> {
    status.split_whitespace().next().and_then(|code| code.parse().ok())
}

/// The status actually sent on the wire.
///
/// A 200 whose Content-Length is numerically zero goes out as 204 No
/// Content; a non-numeric Content-Length leaves the status untouched.
pub fn effective_status(started: &StartedResponse) -> String {
    if status_code(&started.status) == Some(200) {
        if let Some(value) = started.header("Content-Length") {
            if matches!(value.trim().parse::<u64>(), Ok(0)) {
                return "204 No Content".to_string();
            }
        }
    }
    started.status.clone()
}

/// Serialize the response head. The body writer appends after this.
pub fn build_head(status: &str, headers: &[(String, String)], keep_alive: bool) -> Vec<u8> {
    let mut head = Vec::with_capacity(128);
    head.extend_from_slice(b"HTTP/1.1 ");
    head.extend_from_slice(status.as_bytes());
    head.extend_from_slice(b"\r\n");
    for (name, value) in headers {
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(if keep_alive {
        b"Connection: keep-alive\r\n".as_slice()
    } else {
        b"Connection: close\r\n".as_slice()
    });
    head.extend_from_slice(b"\r\n");
    head
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
