// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listening-socket acquisition with handoff-aware retry.
//!
//! Binding tolerates EADDRINUSE for up to the configured retry window, in
//! case another instance is bound but exiting soon. This is what makes
//! near-zero-downtime handoffs work: start the new server, tell the old one
//! to shut down, and the new bind succeeds as soon as the port is released.
//! Any other socket error is immediately fatal.

use std::io::BufReader;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

use brim_core::Clock;

/// Seconds a TCP connection may idle before keepalive probing starts.
const TCP_KEEPIDLE: Duration = Duration::from_secs(600);

/// How long to wait between bind attempts while the address is in use.
const BIND_RETRY_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum NetError {
    #[error("Could not determine address family of {ip}:{port} for binding.")]
    AddressFamily { ip: String, port: u16 },

    #[error("Could not bind to {ip}:{port} after trying for {retry} seconds.")]
    BindTimeout { ip: String, port: u16, retry: u64 },

    #[error("Could not bind to {ip}:{port}: {source}")]
    Bind { ip: String, port: u16, source: std::io::Error },

    #[error("Could not load TLS cert/key from {certfile} / {keyfile}: {detail}")]
    Tls { certfile: String, keyfile: String, detail: String },
}

/// A bound TCP listener, with the TLS acceptor when a cert/key pair was
/// configured. Connections are wrapped per-accept by the worker.
pub struct BoundTcp {
    pub listener: std::net::TcpListener,
    pub tls: Option<TlsAcceptor>,
}

impl std::fmt::Debug for BoundTcp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundTcp")
            .field("listener", &self.listener)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

/// Resolve the bind address: `*` and empty mean all interfaces, and the
/// first AF_INET/AF_INET6 result wins.
fn resolve(ip: &str, port: u16) -> Result<SocketAddr, NetError> {
    let host = if ip.is_empty() || ip == "*" { "0.0.0.0" } else { ip };
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| NetError::AddressFamily { ip: ip.to_string(), port })
}

/// Bind a TCP listening socket, retrying EADDRINUSE for up to `retry`
/// seconds, and load the TLS acceptor when cert and key files are given.
pub fn get_listening_tcp_socket<C: Clock>(
    ip: &str,
    port: u16,
    backlog: i32,
    retry: u64,
    certfile: Option<&Path>,
    keyfile: Option<&Path>,
    clock: &C,
) -> Result<BoundTcp, NetError> {
    let addr = resolve(ip, port)?;
    let tls = match (certfile, keyfile) {
        (Some(cert), Some(key)) => Some(load_tls(cert, key)?),
        _ => None,
    };
    let listener = bind_retry(ip, port, retry, clock, || {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_keepalive(true)?;
        socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(TCP_KEEPIDLE))?;
        socket.bind(&addr.into())?;
        socket.listen(backlog)?;
        Ok(socket.into())
    })?;
    Ok(BoundTcp { listener, tls })
}

/// Bind a UDP socket, retrying EADDRINUSE the same way.
pub fn get_listening_udp_socket<C: Clock>(
    ip: &str,
    port: u16,
    retry: u64,
    clock: &C,
) -> Result<std::net::UdpSocket, NetError> {
    let addr = resolve(ip, port)?;
    bind_retry(ip, port, retry, clock, || {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        Ok(socket.into())
    })
}

fn bind_retry<T, C, F>(ip: &str, port: u16, retry: u64, clock: &C, mut bind: F) -> Result<T, NetError>
where
    C: Clock,
    F: FnMut() -> std::io::Result<T>,
{
    let deadline = clock.now() + Duration::from_secs(retry);
    loop {
        match bind() {
            Ok(bound) => return Ok(bound),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                if clock.now() >= deadline {
                    return Err(NetError::BindTimeout { ip: ip.to_string(), port, retry });
                }
                clock.sleep(BIND_RETRY_PAUSE);
            }
            Err(err) => return Err(NetError::Bind { ip: ip.to_string(), port, source: err }),
        }
    }
}

fn load_tls(certfile: &Path, keyfile: &Path) -> Result<TlsAcceptor, NetError> {
    let tls_error = |detail: String| NetError::Tls {
        certfile: certfile.display().to_string(),
        keyfile: keyfile.display().to_string(),
        detail,
    };
    let cert_file = std::fs::File::open(certfile).map_err(|e| tls_error(e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(e.to_string()))?;
    if certs.is_empty() {
        return Err(tls_error("no certificates found".to_string()));
    }
    let key_file = std::fs::File::open(keyfile).map_err(|e| tls_error(e.to_string()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| tls_error(e.to_string()))?
        .ok_or_else(|| tls_error("no private key found".to_string()))?;
    let config = tokio_rustls::rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| tls_error(e.to_string()))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
#[path = "net_tests.rs"]
mod tests;
