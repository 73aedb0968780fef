// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A daemon that logs a status line every so often. A good starting point
//! for other daemons: the subserver reconstructs and reinvokes it if it
//! ever returns or errors, so the work here can assume it is always
//! running.
//!
//! ```ini
//! [sample_daemon]
//! call = brim_handlers::SampleDaemon
//! # interval = <seconds>
//! #   Seconds between status lines. Default: 60
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use brim_core::{BoxError, DaemonApp, DaemonFactory, StatKind, StatsView, SubserverInfo};

pub struct SampleDaemon {
    name: String,
    interval: Duration,
}

impl SampleDaemon {
    pub fn factory() -> DaemonFactory {
        DaemonFactory {
            parse_conf: |name, conf| {
                conf.get_int(name, "interval", 60)?;
                Ok(())
            },
            stats_conf: |_name, _conf| {
                vec![
                    ("iterations".to_string(), StatKind::Sum),
                    ("last_run".to_string(), StatKind::Worker),
                ]
            },
            construct: |name, conf| {
                Ok(Arc::new(SampleDaemon {
                    name: name.to_string(),
                    interval: Duration::from_secs(conf.get_int(name, "interval", 60)?.max(1) as u64),
                }))
            },
        }
    }
}

#[async_trait]
impl DaemonApp for SampleDaemon {
    async fn run(&self, _subserver: &SubserverInfo, stats: &StatsView) -> Result<(), BoxError> {
        let mut iteration = 0u64;
        loop {
            tokio::time::sleep(self.interval).await;
            iteration += 1;
            stats.incr("iterations");
            stats.set(
                "last_run",
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
            );
            info!(target: "brim", "{} iteration {}", self.name, iteration);
        }
    }
}

#[cfg(test)]
#[path = "sample_daemon_tests.rs"]
mod tests;
