// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The UDP subserver. Single-reader discipline: exactly one worker reads
//! the socket, scheduling each datagram's app invocation into the
//! cooperative pool. Response sending is the app's business via the shared
//! socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{error, warn};

use brim_core::{
    BucketStats, Clock, Conf, ConfError, Registry, StatKind, StatsView, SubserverInfo, SystemClock,
    UdpApp,
};

use crate::capture::Role;
use crate::net::{self, NetError};
use crate::service::{sustain_workers, Shutdown};

use super::{section_list, SubserverConf};

#[derive(Debug)]
pub struct UdpSubserver {
    pub conf: SubserverConf,
    pub server_conf: Conf,
    pub app_name: String,
    construct: fn(&str, &Conf) -> Result<Arc<dyn UdpApp>, ConfError>,
    stats_conf: Vec<(String, StatKind)>,
    pub socket: Option<std::net::UdpSocket>,
    pub stats: Arc<BucketStats>,
}

impl UdpSubserver {
    pub fn configure(
        conf: &Conf,
        registry: &Registry,
        no_daemon: bool,
    ) -> Result<Self, ConfError> {
        let names = section_list(conf, "udp");
        let [name] = names.as_slice() else {
            return Err(ConfError::Invalid(format!(
                "Option udp takes exactly one app section; {} configured.",
                names.len()
            )));
        };
        let factory = registry.udp_factory(name, conf)?;
        (factory.parse_conf)(name, conf)?;
        let mut stats_conf = vec![("start_time".to_string(), StatKind::Worker)];
        stats_conf.extend((factory.stats_conf)(name, conf));
        let mut subserver_conf = SubserverConf::parse(conf, Some(name.as_str()), no_daemon)?;
        if !no_daemon && subserver_conf.worker_count != 1 {
            // One reader per UDP socket; anything else loses datagrams to
            // whichever worker the kernel picks.
            warn!(
                target: "brim",
                "udp app '{}' configured with workers = {}; forcing 1",
                name, subserver_conf.worker_count
            );
            subserver_conf.worker_count = 1;
        }
        Ok(Self {
            conf: subserver_conf,
            server_conf: conf.clone(),
            app_name: name.clone(),
            construct: factory.construct,
            stats_conf,
            socket: None,
            stats: Arc::new(BucketStats::empty()),
        })
    }

    pub fn acquire<C: Clock>(&mut self, clock: &C) -> Result<(), NetError> {
        self.socket = Some(net::get_listening_udp_socket(
            &self.conf.ip,
            self.conf.port,
            self.conf.listen_retry,
            clock,
        )?);
        Ok(())
    }

    pub fn allocate_stats(&mut self) {
        let bucket_names: Vec<String> =
            (0..self.conf.worker_count).map(|id| id.to_string()).collect();
        self.stats = Arc::new(BucketStats::new(bucket_names, self.stats_conf.clone()));
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn run_parent(&self, shutdown: &Shutdown) {
        sustain_workers(
            self.conf.worker_count,
            Role::Udp,
            |worker_id| self.worker(worker_id, shutdown.clone()),
            shutdown,
        );
    }

    fn worker(&self, worker_id: usize, shutdown: Shutdown) {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(target: "brim", "uid:{worker_id:03} could not build reactor: {err}");
                return;
            }
        };
        runtime.block_on(self.worker_loop(worker_id, shutdown));
    }

    async fn worker_loop(&self, worker_id: usize, shutdown: Shutdown) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        let socket = match super::tokio_udp_socket(socket) {
            Ok(socket) => Arc::new(socket),
            Err(err) => {
                error!(target: "brim", "uid:{worker_id:03} could not share socket: {err}");
                return;
            }
        };
        let stats = StatsView::new(Arc::clone(&self.stats), worker_id);
        stats.set("start_time", SystemClock.epoch_secs());
        let info = SubserverInfo::new("udp", worker_id);

        let mut app = match (self.construct)(&self.app_name, &self.server_conf) {
            Ok(app) => app,
            Err(err) => {
                error!(target: "brim", "could not construct app '{}': {}", self.app_name, err);
                return;
            }
        };
        let rebuild = Arc::new(AtomicBool::new(false));

        let semaphore = Arc::new(Semaphore::new(self.conf.concurrent_per_worker));
        let tracker = TaskTracker::new();
        let mut buf = vec![0u8; self.conf.max_datagram_size];
        loop {
            let permit = tokio::select! {
                _ = shutdown.wait_graceful() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let received = tokio::select! {
                _ = shutdown.wait_graceful() => break,
                received = socket.recv_from(&mut buf) => received,
            };
            let (len, peer) = match received {
                Ok(pair) => pair,
                Err(err) => {
                    error!(target: "brim", "recv error: {err}");
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
            let datagram = buf[..len].to_vec();
            let app = Arc::clone(&app);
            let app_name = self.app_name.clone();
            let info = info.clone();
            let stats = stats.clone();
            let socket = Arc::clone(&socket);
            let rebuild = Arc::clone(&rebuild);
            tracker.spawn(async move {
                let _permit = permit;
                let result =
                    app.serve(&info, &stats, socket, datagram, peer.ip(), peer.port()).await;
                if let Err(err) = result {
                    error!(target: "brim", "UDP EXCEPTION: app '{app_name}': {err}");
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
#[path = "udp_tests.rs"]
mod tests;
