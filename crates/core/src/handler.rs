// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The plug-in contract: capability traits per subserver kind, factories,
//! and the registry of handler symbols.
//!
//! Handlers are located by a symbol path given in their section's `call`
//! option. Where the original design resolved dotted paths with runtime
//! introspection, here the registry holds named factories populated at link
//! time and the arity checks are the trait signatures themselves. What
//! remains to validate at configuration time is the symbol lookup, the
//! factory kind, and each handler's own option parsing, all of which run
//! before any listener binds.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UdpSocket;

use crate::conf::{Conf, ConfError};
use crate::stats::{StatKind, StatsView};
use crate::wsgi::{Body, Responder, WsgiEnv};

/// Errors handlers may surface from their invoke capability. These are
/// caught at the subserver boundary and logged, never fatal.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A connected byte stream, plain TCP or TLS-wrapped.
pub trait NetConn: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> NetConn for T {}

/// Boxed connection handed to TCP apps.
pub type NetStream = Box<dyn NetConn>;

/// Context describing the subserver driving a handler invocation.
#[derive(Debug, Clone)]
pub struct SubserverInfo {
    pub name: String,
    pub worker_id: usize,
}

impl SubserverInfo {
    pub fn new(name: &str, worker_id: usize) -> Self {
        Self { name: name.to_string(), worker_id }
    }

    /// Emit a request-level record on the access target, the way the HTTP
    /// pipeline does for WSGI transactions.
    pub fn notice(&self, msg: &str) {
        tracing::info!(target: "brim::access", server = %self.name, "{msg}");
    }
}

/// A WSGI-style application; middleware holds the next app in the chain.
#[async_trait]
pub trait WsgiApp: Send + Sync {
    async fn call(&self, env: &mut WsgiEnv, resp: &mut Responder) -> Result<Body, BoxError>;
}

/// A raw TCP application. Owns the whole dialogue; the subserver closes the
/// socket after this returns or errors.
#[async_trait]
pub trait TcpApp: Send + Sync {
    async fn serve(
        &self,
        subserver: &SubserverInfo,
        stats: &StatsView,
        conn: NetStream,
        ip: IpAddr,
        port: u16,
    ) -> Result<(), BoxError>;
}

/// A UDP application, invoked once per received datagram. Response sending
/// is the app's responsibility via the shared socket.
#[async_trait]
pub trait UdpApp: Send + Sync {
    async fn serve(
        &self,
        subserver: &SubserverInfo,
        stats: &StatsView,
        socket: Arc<UdpSocket>,
        datagram: Vec<u8>,
        ip: IpAddr,
        port: u16,
    ) -> Result<(), BoxError>;
}

/// A background daemon. If `run` returns or errors, the subserver constructs
/// a fresh instance and invokes it again so the daemon is always running.
#[async_trait]
pub trait DaemonApp: Send + Sync {
    async fn run(&self, subserver: &SubserverInfo, stats: &StatsView) -> Result<(), BoxError>;
}

/// The optional *parse-config* capability: validate the handler's options
/// against the full configuration. Default accepts anything.
pub type ParseConfFn = fn(name: &str, conf: &Conf) -> Result<(), ConfError>;

/// The optional *declare-stats* capability. Default declares none.
pub type StatsConfFn = fn(name: &str, conf: &Conf) -> Vec<(String, StatKind)>;

pub fn no_parse_conf(_name: &str, _conf: &Conf) -> Result<(), ConfError> {
    Ok(())
}

pub fn no_stats_conf(_name: &str, _conf: &Conf) -> Vec<(String, StatKind)> {
    Vec::new()
}

#[derive(Debug)]
pub struct WsgiFactory {
    pub parse_conf: ParseConfFn,
    pub stats_conf: StatsConfFn,
    #[allow(clippy::type_complexity)]
    pub construct:
        fn(name: &str, conf: &Conf, next: Arc<dyn WsgiApp>) -> Result<Arc<dyn WsgiApp>, ConfError>,
}

#[derive(Debug)]
pub struct TcpFactory {
    pub parse_conf: ParseConfFn,
    pub stats_conf: StatsConfFn,
    pub construct: fn(name: &str, conf: &Conf) -> Result<Arc<dyn TcpApp>, ConfError>,
}

#[derive(Debug)]
pub struct UdpFactory {
    pub parse_conf: ParseConfFn,
    pub stats_conf: StatsConfFn,
    pub construct: fn(name: &str, conf: &Conf) -> Result<Arc<dyn UdpApp>, ConfError>,
}

#[derive(Debug)]
pub struct DaemonFactory {
    pub parse_conf: ParseConfFn,
    pub stats_conf: StatsConfFn,
    pub construct: fn(name: &str, conf: &Conf) -> Result<Arc<dyn DaemonApp>, ConfError>,
}

/// A registered handler symbol of one of the four capability kinds.
pub enum Factory {
    Wsgi(WsgiFactory),
    Tcp(TcpFactory),
    Udp(UdpFactory),
    Daemon(DaemonFactory),
}

/// Symbol path -> factory. The daemon registers its built-ins; embedders can
/// register their own before the supervisor configures subservers.
#[derive(Default)]
pub struct Registry {
    symbols: HashMap<String, Factory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, symbol: &str, factory: Factory) {
        self.symbols.insert(symbol.to_string(), factory);
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    fn call_option<'a>(
        &self,
        kind: &str,
        name: &str,
        conf: &'a Conf,
    ) -> Result<&'a str, ConfError> {
        conf.get(name, "call").ok_or_else(|| {
            ConfError::Invalid(format!("{kind} '{name}' not configured with 'call' option."))
        })
    }

    pub fn wsgi_factory(&self, name: &str, conf: &Conf) -> Result<&WsgiFactory, ConfError> {
        let call = self.call_option("App", name, conf)?;
        match self.symbols.get(call) {
            Some(Factory::Wsgi(factory)) => Ok(factory),
            Some(_) => {
                Err(ConfError::Invalid(format!("'{call}' is not a WSGI app, for app '{name}'.")))
            }
            None => Err(ConfError::Invalid(format!("Could not load '{call}' for app '{name}'."))),
        }
    }

    pub fn tcp_factory(&self, name: &str, conf: &Conf) -> Result<&TcpFactory, ConfError> {
        let call = self.call_option("App", name, conf)?;
        match self.symbols.get(call) {
            Some(Factory::Tcp(factory)) => Ok(factory),
            Some(_) => {
                Err(ConfError::Invalid(format!("'{call}' is not a TCP app, for app '{name}'.")))
            }
            None => Err(ConfError::Invalid(format!("Could not load '{call}' for app '{name}'."))),
        }
    }

    pub fn udp_factory(&self, name: &str, conf: &Conf) -> Result<&UdpFactory, ConfError> {
        let call = self.call_option("App", name, conf)?;
        match self.symbols.get(call) {
            Some(Factory::Udp(factory)) => Ok(factory),
            Some(_) => {
                Err(ConfError::Invalid(format!("'{call}' is not a UDP app, for app '{name}'.")))
            }
            None => Err(ConfError::Invalid(format!("Could not load '{call}' for app '{name}'."))),
        }
    }

    pub fn daemon_factory(&self, name: &str, conf: &Conf) -> Result<&DaemonFactory, ConfError> {
        let call = self.call_option("Daemon", name, conf)?;
        match self.symbols.get(call) {
            Some(Factory::Daemon(factory)) => Ok(factory),
            Some(_) => {
                Err(ConfError::Invalid(format!("'{call}' is not a daemon, for daemon '{name}'.")))
            }
            None => {
                Err(ConfError::Invalid(format!("Could not load '{call}' for daemon '{name}'.")))
            }
        }
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
