// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The WSGI subserver: accepts HTTP connections and runs each transaction
//! through the middleware chain built from the configured `wsgi` list.
//!
//! The chain composes in reverse order (the last configured app is the
//! final handler, each earlier app wraps it) with a default innermost app
//! answering 404. Each worker admits at most `concurrent_per_worker`
//! connections into its reactor at once.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use brim_core::{
    BucketStats, Clock, Conf, ConfError, NotFound, Registry, RequestLogger, ServerStats, StatKind,
    StatsView, SystemClock, WsgiApp,
};

use crate::capture::Role;
use crate::http::{read_request, Pipeline, RequestError};
use crate::net::{self, NetError};
use crate::service::{sustain_workers, Shutdown};

use super::{section_list, SubserverConf};

/// A validated app slot: its section name and link-time constructor.
#[derive(Debug)]
pub struct WsgiAppPlan {
    pub name: String,
    #[allow(clippy::type_complexity)]
    construct:
        fn(&str, &Conf, Arc<dyn WsgiApp>) -> Result<Arc<dyn WsgiApp>, ConfError>,
}

pub struct WsgiSubserver {
    pub conf: SubserverConf,
    pub server_conf: Conf,
    pub log_name: String,
    plans: Vec<WsgiAppPlan>,
    stats_conf: Vec<(String, StatKind)>,
    pub listener: Option<std::net::TcpListener>,
    pub tls: Option<TlsAcceptor>,
    pub stats: Arc<BucketStats>,
    pub server_stats: Arc<ServerStats>,
}

impl std::fmt::Debug for WsgiSubserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsgiSubserver")
            .field("conf", &self.conf)
            .field("server_conf", &self.server_conf)
            .field("log_name", &self.log_name)
            .field("plans", &self.plans)
            .field("stats_conf", &self.stats_conf)
            .field("listener", &self.listener)
            .field("tls", &self.tls.is_some())
            .field("stats", &self.stats)
            .field("server_stats", &self.server_stats)
            .finish()
    }
}

impl WsgiSubserver {
    /// Validate the configured app chain and collect its stat declarations.
    /// Runs before any listener binds; every misconfiguration is fatal here.
    pub fn configure(
        conf: &Conf,
        registry: &Registry,
        count_status_codes: &[u16],
        log_name: &str,
        no_daemon: bool,
    ) -> Result<Self, ConfError> {
        let mut stats_conf = vec![
            ("start_time".to_string(), StatKind::Worker),
            ("request_count".to_string(), StatKind::Sum),
            ("status_2xx_count".to_string(), StatKind::Sum),
            ("status_3xx_count".to_string(), StatKind::Sum),
            ("status_4xx_count".to_string(), StatKind::Sum),
            ("status_5xx_count".to_string(), StatKind::Sum),
        ];
        for code in count_status_codes {
            stats_conf.push((format!("status_{code}_count"), StatKind::Sum));
        }
        let mut plans = Vec::new();
        for name in section_list(conf, "wsgi") {
            let factory = registry.wsgi_factory(&name, conf)?;
            (factory.parse_conf)(&name, conf)?;
            stats_conf.extend((factory.stats_conf)(&name, conf));
            plans.push(WsgiAppPlan { name, construct: factory.construct });
        }
        Ok(Self {
            conf: SubserverConf::parse(conf, None, no_daemon)?,
            server_conf: conf.clone(),
            log_name: log_name.to_string(),
            plans,
            stats_conf,
            listener: None,
            tls: None,
            stats: Arc::new(BucketStats::empty()),
            server_stats: Arc::new(ServerStats::default()),
        })
    }

    pub fn acquire<C: Clock>(&mut self, clock: &C) -> Result<(), NetError> {
        let bound = net::get_listening_tcp_socket(
            &self.conf.ip,
            self.conf.port,
            self.conf.backlog,
            self.conf.listen_retry,
            self.conf.certfile.as_deref(),
            self.conf.keyfile.as_deref(),
            clock,
        )?;
        self.listener = Some(bound.listener);
        self.tls = bound.tls;
        Ok(())
    }

    pub fn allocate_stats(&mut self) {
        let bucket_names: Vec<String> =
            (0..self.conf.worker_count).map(|id| id.to_string()).collect();
        self.stats = Arc::new(BucketStats::new(bucket_names, self.stats_conf.clone()));
    }

    /// The bound address, once acquired. Handy with `port = 0`.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn run_parent(&self, shutdown: &Shutdown) {
        sustain_workers(
            self.conf.worker_count,
            Role::Wsgi,
            |worker_id| self.worker(worker_id, shutdown.clone()),
            shutdown,
        );
    }

    /// One worker: a single-threaded reactor sharing the listening socket.
    fn worker(&self, worker_id: usize, shutdown: Shutdown) {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(target: "brim", "wid:{worker_id:03} could not build reactor: {err}");
                return;
            }
        };
        runtime.block_on(self.worker_loop(worker_id, shutdown));
    }

    async fn worker_loop(&self, worker_id: usize, shutdown: Shutdown) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };
        let listener = match super::tokio_tcp_listener(listener) {
            Ok(listener) => listener,
            Err(err) => {
                error!(target: "brim", "wid:{worker_id:03} could not share listener: {err}");
                return;
            }
        };
        let stats = StatsView::new(Arc::clone(&self.stats), worker_id);
        stats.set("start_time", SystemClock.epoch_secs());

        let mut app: Arc<dyn WsgiApp> = Arc::new(NotFound);
        for plan in self.plans.iter().rev() {
            app = match (plan.construct)(&plan.name, &self.server_conf, app) {
                Ok(app) => app,
                Err(err) => {
                    error!(target: "brim", "could not construct app '{}': {}", plan.name, err);
                    return;
                }
            };
        }
        let pipeline = Arc::new(Pipeline {
            app,
            logger: RequestLogger::new(&self.log_name),
            stats,
            server_stats: Arc::clone(&self.server_stats),
            log_headers: self.conf.log_headers,
            chunk_size: self.conf.chunk_size,
            client_timeout: self.conf.client_timeout,
        });

        let semaphore = Arc::new(Semaphore::new(self.conf.concurrent_per_worker));
        let tracker = TaskTracker::new();
        loop {
            let permit = tokio::select! {
                _ = shutdown.wait_graceful() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let accepted = tokio::select! {
                _ = shutdown.wait_graceful() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    error!(target: "brim", "accept error: {err}");
                    continue;
                }
            };
            let pipeline = Arc::clone(&pipeline);
            let tls = self.tls.clone();
            let conn_shutdown = shutdown.clone();
            tracker.spawn(async move {
                let _permit = permit;
                match tls {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(stream) => serve_connection(stream, peer, pipeline, conn_shutdown).await,
                        Err(err) => {
                            debug!(target: "brim", "TLS handshake with {peer} failed: {err}");
                        }
                    },
                    None => serve_connection(stream, peer, pipeline, conn_shutdown).await,
                }
            });
        }
        tracker.close();
        if !shutdown.is_abort() {
            // Graceful: let in-flight transactions drain.
            tracker.wait().await;
        }
    }
}

/// Serve one connection's keep-alive request loop.
async fn serve_connection<S>(
    stream: S,
    peer: std::net::SocketAddr,
    pipeline: Arc<Pipeline>,
    shutdown: Shutdown,
) where
    S: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader: Box<dyn AsyncBufRead + Send + Sync + Unpin> = Box::new(BufReader::new(read_half));
    let mut writer = BufWriter::new(write_half);
    let remote = peer.ip().to_string();
    loop {
        // Between requests the connection is not in-flight work: graceful
        // shutdown closes it rather than waiting out client_timeout.
        let request = tokio::select! {
            _ = shutdown.wait_graceful() => break,
            result = tokio::time::timeout(pipeline.client_timeout, read_request(&mut reader)) => {
                match result {
                    // Idle past client_timeout; the one authoritative
                    // connection timeout.
                    Err(_) => break,
                    Ok(Err(RequestError::Closed)) => break,
                    Ok(Err(err)) => {
                        debug!(target: "brim", "bad request from {remote}: {err}");
                        break;
                    }
                    Ok(Ok(request)) => request,
                }
            }
        };
        let (next_reader, keep_alive) =
            pipeline.handle(request, reader, &mut writer, &remote).await;
        match next_reader {
            Some(next_reader) => reader = next_reader,
            None => break,
        }
        if !keep_alive || shutdown.is_graceful() {
            break;
        }
    }
}

#[cfg(test)]
#[path = "wsgi_tests.rs"]
mod tests;
