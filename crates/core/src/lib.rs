// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! brim-core: configuration, statistics, and the plug-in contract for the
//! brim service container.
//!
//! The daemon crate hosts the supervisor and the subservers; handler crates
//! implement the capability traits defined here and are wired up through
//! [`handler::Registry`].

pub mod clock;
pub mod conf;
pub mod handler;
pub mod stats;
pub mod wsgi;

pub use clock::{Clock, FakeClock, SystemClock};
pub use conf::{read_conf, Conf, ConfError, FALSE_VALUES, TRUE_VALUES};
pub use handler::{
    no_parse_conf, no_stats_conf, BoxError, DaemonApp, DaemonFactory, Factory, NetConn, NetStream,
    Registry, SubserverInfo, TcpApp, TcpFactory, UdpApp, UdpFactory, WsgiApp, WsgiFactory,
};
pub use stats::{BucketStats, ServerStats, StatKind, StatsView, SubserverStats};
pub use wsgi::{
    new_txn, Body, BodyStream, JsonCodec, NotFound, RequestLogger, Responder, StartedResponse,
    WsgiEnv, WsgiInput,
};
