// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemons subserver: no sockets, one worker per configured daemon.
//! Each worker constructs its daemon and invokes it; if the daemon returns
//! or errors it is reconstructed and reinvoked, throttled, so the daemon is
//! always running.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use brim_core::{
    BucketStats, Conf, ConfError, DaemonApp, Registry, StatKind, StatsView, SubserverInfo,
    SystemClock,
};
use brim_core::Clock;

use crate::capture::Role;
use crate::service::{sustain_workers, Shutdown};

use super::section_list;

const RECONSTRUCT_THROTTLE: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct DaemonPlan {
    name: String,
    construct: fn(&str, &Conf) -> Result<Arc<dyn DaemonApp>, ConfError>,
}

#[derive(Debug)]
pub struct DaemonsSubserver {
    pub server_conf: Conf,
    plans: Vec<DaemonPlan>,
    stats_conf: Vec<(String, StatKind)>,
    pub stats: Arc<BucketStats>,
}

impl DaemonsSubserver {
    pub fn configure(conf: &Conf, registry: &Registry) -> Result<Self, ConfError> {
        let mut stats_conf = vec![("start_time".to_string(), StatKind::Worker)];
        let mut plans = Vec::new();
        for name in section_list(conf, "daemons") {
            let factory = registry.daemon_factory(&name, conf)?;
            (factory.parse_conf)(&name, conf)?;
            stats_conf.extend((factory.stats_conf)(&name, conf));
            plans.push(DaemonPlan { name, construct: factory.construct });
        }
        Ok(Self {
            server_conf: conf.clone(),
            plans,
            stats_conf,
            stats: Arc::new(BucketStats::empty()),
        })
    }

    /// One worker per daemon, one bucket per daemon, named after it.
    pub fn worker_count(&self) -> usize {
        self.plans.len()
    }

    pub fn allocate_stats(&mut self) {
        let bucket_names: Vec<String> = self.plans.iter().map(|p| p.name.clone()).collect();
        self.stats = Arc::new(BucketStats::new(bucket_names, self.stats_conf.clone()));
    }

    pub fn run_parent(&self, shutdown: &Shutdown) {
        sustain_workers(
            self.worker_count(),
            Role::Daemon,
            |daemon_id| self.worker(daemon_id, shutdown.clone()),
            shutdown,
        );
    }

    fn worker(&self, daemon_id: usize, shutdown: Shutdown) {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(target: "brim", "did:{daemon_id:03} could not build reactor: {err}");
                return;
            }
        };
        runtime.block_on(self.daemon_loop(daemon_id, shutdown));
    }

    async fn daemon_loop(&self, daemon_id: usize, shutdown: Shutdown) {
        let plan = &self.plans[daemon_id];
        let stats = StatsView::new(Arc::clone(&self.stats), daemon_id);
        let info = SubserverInfo::new("daemons", daemon_id);
        while !shutdown.is_graceful() {
            stats.set("start_time", SystemClock.epoch_secs());
            let app = match (plan.construct)(&plan.name, &self.server_conf) {
                Ok(app) => app,
                Err(err) => {
                    error!(target: "brim", "could not construct daemon '{}': {}", plan.name, err);
                    return;
                }
            };
            tokio::select! {
                _ = shutdown.wait_graceful() => break,
                result = app.run(&info, &stats) => match result {
                    Ok(()) => {
                        info!(target: "brim", "daemon '{}' returned; restarting", plan.name);
                    }
                    Err(err) => {
                        error!(target: "brim", "DAEMON EXCEPTION: '{}': {}", plan.name, err);
                    }
                },
            }
            tokio::select! {
                _ = shutdown.wait_graceful() => break,
                _ = tokio::time::sleep(RECONSTRUCT_THROTTLE) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "daemons_tests.rs"]
mod tests;
