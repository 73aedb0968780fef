// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The access-log record: one line per completed HTTP transaction, plus the
//! per-status counters updated with each emission.
//!
//! Every field is percent-encoded (any byte below `!`, the `%` byte, and
//! any byte above `~` becomes `%XX`) so the line stays single-line and
//! space-splittable no matter what was in the request. Empty fields render
//! as `-`.

use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, CONTROLS};

use brim_core::{StatsView, WsgiEnv};

use super::response::status_code;

/// The status logged for requests terminated early by the client.
pub const HTTP_CLIENT_DISCONNECT: u16 = 499;

/// Bytes below `!` (controls and space), `%` itself, and DEL; bytes above
/// 0x7F are always encoded by the encoder.
const LOG_QUOTE: &AsciiSet = &CONTROLS.add(b' ').add(b'%').add(0x7f);

pub fn log_quote(value: &str) -> String {
    percent_encode(value.as_bytes(), LOG_QUOTE).to_string()
}

fn unquote(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

fn unquote_plus(value: &str) -> String {
    unquote(&value.replace('+', " "))
}

/// The logged request field: PATH_INFO decoded once, then `?` and the
/// decoded query string when present. (The whole field is re-encoded when
/// the line is assembled.)
pub fn format_request(path_info: &str, query_string: &str) -> String {
    let mut request = unquote(path_info);
    if !query_string.is_empty() {
        request.push('?');
        request.push_str(&unquote_plus(query_string));
    }
    request
}

/// `HTTP_USER_AGENT` -> `User-Agent`, for the optional headers field.
fn header_display_name(wsgi_key: &str) -> String {
    let stripped = wsgi_key.strip_prefix("HTTP_").unwrap_or(wsgi_key);
    let mut out = String::with_capacity(stripped.len());
    let mut capitalize = true;
    for c in stripped.chars() {
        if c == '_' {
            out.push('-');
            capitalize = true;
        } else if capitalize {
            out.push(c.to_ascii_uppercase());
            capitalize = false;
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

/// The wire status rendered for the log: the numeric code, 0 when absent or
/// unparsable, overridden to 499 when the client disconnected. Unparsable
/// codes still produce a log line; they just count as 0.
pub fn logged_status(env: &WsgiEnv, wire_status: Option<&str>) -> u16 {
    if env.client_disconnect() {
        return HTTP_CLIENT_DISCONNECT;
    }
    wire_status.and_then(status_code).unwrap_or(0)
}

/// Numeric fields follow the same falsy rendering as everything else on
/// the line: a zero count comes out as `-`.
fn count_field(value: u64) -> String {
    if value == 0 {
        String::new()
    } else {
        value.to_string()
    }
}

/// Assemble the access-log line for a completed transaction.
pub fn access_line(env: &WsgiEnv, code: u16, log_headers: bool) -> String {
    // Present-but-empty forwarding headers fall through to the next source.
    let client = env
        .header("HTTP_X_CLUSTER_CLIENT_IP")
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            env.header("HTTP_X_FORWARDED_FOR")
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .unwrap_or_else(|| env.remote_addr.clone());

    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    let elapsed = format!("{:.5}", env.start.elapsed().as_secs_f64());

    let mut fields: Vec<String> = vec![
        client,
        env.remote_addr.clone(),
        env.header("HTTP_X_AUTH_TOKEN").unwrap_or_default().to_string(),
        env.remote_user.clone().unwrap_or_default(),
        timestamp,
        env.method.clone(),
        format_request(&env.path_info, &env.query_string),
        env.server_protocol.clone(),
        count_field(code.into()),
        count_field(env.bytes_out()),
        count_field(env.bytes_in()),
        env.header("HTTP_REFERER").unwrap_or_default().to_string(),
        env.header("HTTP_USER_AGENT").unwrap_or_default().to_string(),
        env.txn.clone(),
        elapsed,
    ];
    fields.extend(env.additional_request_log_info.iter().cloned());
    if log_headers {
        let headers = env
            .headers()
            .iter()
            .map(|(k, v)| format!("{}:{}", header_display_name(k), v))
            .collect::<Vec<_>>()
            .join("\n");
        fields.push("headers:".to_string());
        fields.push(headers);
    }
    fields
        .iter()
        .map(|f| if f.is_empty() { "-".to_string() } else { log_quote(f) })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Counters incremented atomically with each access-log emission:
/// `request_count`, `status_<code>_count` for the codes enumerated in
/// `count_status_codes` (others are unknown names and so no-ops), and the
/// class bucket.
pub fn update_status_counters(stats: &StatsView, code: u16) {
    stats.incr("request_count");
    stats.incr(&format!("status_{code}_count"));
    match code / 100 {
        2 => stats.incr("status_2xx_count"),
        3 => stats.incr("status_3xx_count"),
        4 => stats.incr("status_4xx_count"),
        5 => stats.incr("status_5xx_count"),
        _ => {}
    }
}

#[cfg(test)]
#[path = "access_log_tests.rs"]
mod tests;
