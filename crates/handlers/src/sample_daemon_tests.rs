// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use brim_core::{BucketStats, Conf};

fn build(interval: Option<&str>) -> Arc<dyn DaemonApp> {
    let mut conf = Conf::default();
    conf.set("ticker", "call", "brim_handlers::SampleDaemon");
    if let Some(interval) = interval {
        conf.set("ticker", "interval", interval);
    }
    let factory = SampleDaemon::factory();
    (factory.parse_conf)("ticker", &conf).unwrap();
    (factory.construct)("ticker", &conf).unwrap()
}

#[tokio::test(start_paused = true)]
async fn logs_and_counts_iterations_forever() {
    let app = build(Some("5"));
    let stats = Arc::new(BucketStats::new(
        vec!["ticker".to_string()],
        (SampleDaemon::factory().stats_conf)("ticker", &Conf::default()),
    ));
    let view = StatsView::new(Arc::clone(&stats), 0);
    let info = SubserverInfo::new("daemons", 0);

    // The daemon never returns; give it a bounded slice of (paused) time.
    let result =
        tokio::time::timeout(Duration::from_secs(16), app.run(&info, &view)).await;
    assert!(result.is_err(), "daemon returned unexpectedly");
    assert_eq!(stats.get(0, "iterations"), 3);
    assert!(stats.get(0, "last_run") > 0);
}

#[test]
fn bad_interval_fails_parse_conf() {
    let mut conf = Conf::default();
    conf.set("ticker", "interval", "soon");
    assert!((SampleDaemon::factory().parse_conf)("ticker", &conf).is_err());
}
