// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The TCP subserver: hands each accepted connection to the single
//! configured app in a fresh task. The app owns the whole dialogue; the
//! subserver only guarantees the socket is closed afterwards and that an
//! app error costs a fresh instance, not the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use brim_core::{
    BucketStats, Clock, Conf, ConfError, Registry, StatKind, StatsView, SubserverInfo, SystemClock,
    TcpApp,
};

use crate::capture::Role;
use crate::net::{self, NetError};
use crate::service::{sustain_workers, Shutdown};

use super::{section_list, SubserverConf};

pub struct TcpSubserver {
    pub conf: SubserverConf,
    pub server_conf: Conf,
    pub app_name: String,
    construct: fn(&str, &Conf) -> Result<Arc<dyn TcpApp>, ConfError>,
    stats_conf: Vec<(String, StatKind)>,
    pub listener: Option<std::net::TcpListener>,
    pub tls: Option<TlsAcceptor>,
    pub stats: Arc<BucketStats>,
}

impl std::fmt::Debug for TcpSubserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSubserver")
            .field("conf", &self.conf)
            .field("server_conf", &self.server_conf)
            .field("app_name", &self.app_name)
            .field("construct", &self.construct)
            .field("stats_conf", &self.stats_conf)
            .field("listener", &self.listener)
            .field("tls", &self.tls.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl TcpSubserver {
    pub fn configure(
        conf: &Conf,
        registry: &Registry,
        no_daemon: bool,
    ) -> Result<Self, ConfError> {
        let names = section_list(conf, "tcp");
        let [name] = names.as_slice() else {
            return Err(ConfError::Invalid(format!(
                "Option tcp takes exactly one app section; {} configured.",
                names.len()
            )));
        };
        let factory = registry.tcp_factory(name, conf)?;
        (factory.parse_conf)(name, conf)?;
        let mut stats_conf = vec![("start_time".to_string(), StatKind::Worker)];
        stats_conf.extend((factory.stats_conf)(name, conf));
        Ok(Self {
            conf: SubserverConf::parse(conf, Some(name.as_str()), no_daemon)?,
            server_conf: conf.clone(),
            app_name: name.clone(),
            construct: factory.construct,
            stats_conf,
            listener: None,
            tls: None,
            stats: Arc::new(BucketStats::empty()),
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

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn run_parent(&self, shutdown: &Shutdown) {
        sustain_workers(
            self.conf.worker_count,
            Role::Tcp,
            |worker_id| self.worker(worker_id, shutdown.clone()),
            shutdown,
        );
    }

    fn worker(&self, worker_id: usize, shutdown: Shutdown) {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(target: "brim", "tid:{worker_id:03} could not build reactor: {err}");
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
                error!(target: "brim", "tid:{worker_id:03} could not share listener: {err}");
                return;
            }
        };
        let stats = StatsView::new(Arc::clone(&self.stats), worker_id);
        stats.set("start_time", SystemClock.epoch_secs());
        let info = SubserverInfo::new("tcp", worker_id);

        let mut app = match (self.construct)(&self.app_name, &self.server_conf) {
            Ok(app) => app,
            Err(err) => {
                error!(target: "brim", "could not construct app '{}': {}", self.app_name, err);
                return;
            }
        };
        // Set when an app invocation errors; the next dispatch gets a fresh
        // instance.
        let rebuild = Arc::new(AtomicBool::new(false));

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
            if rebuild.swap(false, Ordering::Relaxed) {
                match (self.construct)(&self.app_name, &self.server_conf) {
                    Ok(fresh) => app = fresh,
                    Err(err) => {
                        error!(target: "brim", "could not reconstruct app '{}': {}", self.app_name, err);
                    }
                }
            }
            let app = Arc::clone(&app);
            let app_name = self.app_name.clone();
            let info = info.clone();
            let stats = stats.clone();
            let tls = self.tls.clone();
            let rebuild = Arc::clone(&rebuild);
            tracker.spawn(async move {
                let _permit = permit;
                let result = match tls {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(stream) => {
                            app.serve(&info, &stats, Box::new(stream), peer.ip(), peer.port())
                                .await
                        }
                        Err(err) => {
                            debug!(target: "brim", "TLS handshake with {peer} failed: {err}");
                            return;
                        }
                    },
                    None => {
                        app.serve(&info, &stats, Box::new(stream), peer.ip(), peer.port()).await
                    }
                };
                if let Err(err) = result {
                    error!(target: "brim", "TCP EXCEPTION: app '{app_name}': {err}");
                    rebuild.store(true, Ordering::Relaxed);
                }
            });
        }
        tracker.close();
        if !shutdown.is_abort() {
            tracker.wait().await;
        }
    }
}

#[cfg(test)]
#[path = "tcp_tests.rs"]
mod tests;
