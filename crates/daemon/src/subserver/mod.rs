// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The subserver model: each subserver owns a listening endpoint (or none,
//! for daemons), a fixed worker set, and the handlers configured for it.
//!
//! All variants share the endpoint/worker/timeout option parsing; every
//! numeric option validates at configuration time, before any socket binds.

pub mod daemons;
pub mod tcp;
pub mod udp;
pub mod wsgi;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use brim_core::{BucketStats, Clock, Conf, ConfError, ServerStats};

use crate::net::NetError;
use crate::service::Shutdown;

pub use daemons::DaemonsSubserver;
pub use tcp::TcpSubserver;
pub use udp::UdpSubserver;
pub use wsgi::WsgiSubserver;

/// Endpoint and worker options shared by every subserver variant. Options
/// set in an activated handler section override the `[brim]` values.
#[derive(Debug, Clone)]
pub struct SubserverConf {
    pub ip: String,
    pub port: u16,
    pub backlog: i32,
    pub listen_retry: u64,
    pub certfile: Option<PathBuf>,
    pub keyfile: Option<PathBuf>,
    pub worker_count: usize,
    pub client_timeout: Duration,
    pub concurrent_per_worker: usize,
    pub max_datagram_size: usize,
    pub chunk_size: usize,
    pub log_headers: bool,
}

impl SubserverConf {
    /// Parse the shared options, reading `section` first (when given) and
    /// falling back to `[brim]`. `no_daemon` forces the inline worker mode.
    pub fn parse(conf: &Conf, section: Option<&str>, no_daemon: bool) -> Result<Self, ConfError> {
        let port = int_opt(conf, section, "port", 80)?;
        if !(0..=65535).contains(&port) {
            return Err(ConfError::Invalid(format!("Invalid port value '{port}'.")));
        }
        let workers = if no_daemon { 0 } else { int_opt(conf, section, "workers", 1)? };
        if workers < 0 {
            return Err(ConfError::Invalid(format!("Invalid workers value '{workers}'.")));
        }
        Ok(Self {
            ip: str_opt(conf, section, "ip").unwrap_or("*").to_string(),
            port: port as u16,
            backlog: int_opt(conf, section, "backlog", 4096)? as i32,
            listen_retry: int_opt(conf, section, "listen_retry", 30)?.max(0) as u64,
            certfile: str_opt(conf, section, "certfile").map(PathBuf::from),
            keyfile: str_opt(conf, section, "keyfile").map(PathBuf::from),
            worker_count: workers as usize,
            client_timeout: Duration::from_secs(int_opt(conf, section, "client_timeout", 60)?.max(0) as u64),
            concurrent_per_worker: int_opt(conf, section, "concurrent_per_worker", 1024)?.max(1) as usize,
            max_datagram_size: int_opt(conf, section, "max_datagram_size", 65536)?.max(1) as usize,
            chunk_size: int_opt(conf, section, "wsgi_input_iter_chunk_size", 4096)?.max(1) as usize,
            log_headers: bool_opt(conf, section, "log_headers", false)?,
        })
    }
}

fn str_opt<'a>(conf: &'a Conf, section: Option<&str>, option: &str) -> Option<&'a str> {
    if let Some(section) = section {
        if let Some(value) = conf.get(section, option) {
            return Some(value);
        }
    }
    conf.get("brim", option)
}

fn int_opt(
    conf: &Conf,
    section: Option<&str>,
    option: &str,
    default: i64,
) -> Result<i64, ConfError> {
    if let Some(section) = section {
        if conf.get(section, option).is_some() {
            return conf.get_int(section, option, default);
        }
    }
    conf.get_int("brim", option, default)
}

fn bool_opt(
    conf: &Conf,
    section: Option<&str>,
    option: &str,
    default: bool,
) -> Result<bool, ConfError> {
    if let Some(section) = section {
        if conf.get(section, option).is_some() {
            return conf.get_bool(section, option, default);
        }
    }
    conf.get_bool("brim", option, default)
}

/// The space-separated section names activated by a `[brim]` list option.
pub fn section_list(conf: &Conf, option: &str) -> Vec<String> {
    conf.get_default("brim", option, "")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// A configured subserver of any kind.
pub enum Subserver {
    Wsgi(WsgiSubserver),
    Tcp(TcpSubserver),
    Udp(UdpSubserver),
    Daemons(DaemonsSubserver),
}

impl Subserver {
    pub fn name(&self) -> &'static str {
        match self {
            Subserver::Wsgi(_) => "wsgi",
            Subserver::Tcp(_) => "tcp",
            Subserver::Udp(_) => "udp",
            Subserver::Daemons(_) => "daemons",
        }
    }

    /// Bind the subserver's listening endpoint (daemons have none).
    pub fn acquire<C: Clock>(&mut self, clock: &C) -> Result<(), NetError> {
        match self {
            Subserver::Wsgi(sub) => sub.acquire(clock),
            Subserver::Tcp(sub) => sub.acquire(clock),
            Subserver::Udp(sub) => sub.acquire(clock),
            Subserver::Daemons(_) => Ok(()),
        }
    }

    /// Build the shared stats region now that all stat names are known.
    pub fn allocate_stats(&mut self) {
        match self {
            Subserver::Wsgi(sub) => sub.allocate_stats(),
            Subserver::Tcp(sub) => sub.allocate_stats(),
            Subserver::Udp(sub) => sub.allocate_stats(),
            Subserver::Daemons(sub) => sub.allocate_stats(),
        }
    }

    pub fn stats(&self) -> Arc<BucketStats> {
        match self {
            Subserver::Wsgi(sub) => Arc::clone(&sub.stats),
            Subserver::Tcp(sub) => Arc::clone(&sub.stats),
            Subserver::Udp(sub) => Arc::clone(&sub.stats),
            Subserver::Daemons(sub) => Arc::clone(&sub.stats),
        }
    }

    /// Hand every subserver the process-wide stats directory.
    pub fn set_server_stats(&mut self, server_stats: Arc<ServerStats>) {
        match self {
            Subserver::Wsgi(sub) => sub.server_stats = server_stats,
            Subserver::Tcp(_) | Subserver::Udp(_) | Subserver::Daemons(_) => {}
        }
    }

    /// Run this subserver's worker pool; returns on shutdown.
    pub fn run_parent(&self, shutdown: &Shutdown) {
        match self {
            Subserver::Wsgi(sub) => sub.run_parent(shutdown),
            Subserver::Tcp(sub) => sub.run_parent(shutdown),
            Subserver::Udp(sub) => sub.run_parent(shutdown),
            Subserver::Daemons(sub) => sub.run_parent(shutdown),
        }
    }
}

pub(crate) fn tokio_tcp_listener(
    listener: &std::net::TcpListener,
) -> std::io::Result<tokio::net::TcpListener> {
    let cloned = listener.try_clone()?;
    cloned.set_nonblocking(true)?;
    tokio::net::TcpListener::from_std(cloned)
}

pub(crate) fn tokio_udp_socket(
    socket: &std::net::UdpSocket,
) -> std::io::Result<tokio::net::UdpSocket> {
    let cloned = socket.try_clone()?;
    cloned.set_nonblocking(true)?;
    tokio::net::UdpSocket::from_std(cloned)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
