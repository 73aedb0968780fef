// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! brim-handlers: the sample plug-ins bundled with brimd.
//!
//! Each is a reasonable starting point for a real handler of its kind: a
//! WSGI echo app, the stats-reporting app, straight TCP and UDP echo apps,
//! and a daemon that logs a status line every so often.

pub mod sample_daemon;
pub mod tcp_echo;
pub mod udp_echo;
pub mod wsgi_echo;
pub mod wsgi_stats;

pub use sample_daemon::SampleDaemon;
pub use tcp_echo::TcpEcho;
pub use udp_echo::UdpEcho;
pub use wsgi_echo::WsgiEcho;
pub use wsgi_stats::WsgiStats;

use brim_core::{Factory, Registry};

/// Register every bundled handler under its symbol path.
pub fn register_builtin(registry: &mut Registry) {
    registry.register("brim_handlers::WsgiEcho", Factory::Wsgi(WsgiEcho::factory()));
    registry.register("brim_handlers::WsgiStats", Factory::Wsgi(WsgiStats::factory()));
    registry.register("brim_handlers::TcpEcho", Factory::Tcp(TcpEcho::factory()));
    registry.register("brim_handlers::UdpEcho", Factory::Udp(UdpEcho::factory()));
    registry.register("brim_handlers::SampleDaemon", Factory::Daemon(SampleDaemon::factory()));
}
