// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A straight UDP app that echoes each datagram back to its sender. A good
//! starting point for other UDP apps.
//!
//! ```ini
//! [udp_echo]
//! call = brim_handlers::UdpEcho
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use brim_core::{BoxError, StatKind, StatsView, SubserverInfo, UdpApp, UdpFactory};

pub struct UdpEcho;

impl UdpEcho {
    pub fn factory() -> UdpFactory {
        UdpFactory {
            parse_conf: brim_core::no_parse_conf,
            stats_conf: |_name, _conf| vec![("byte_count".to_string(), StatKind::Sum)],
            construct: |_name, _conf| Ok(Arc::new(UdpEcho)),
        }
    }
}

#[async_trait]
impl UdpApp for UdpEcho {
    async fn serve(
        &self,
        subserver: &SubserverInfo,
        stats: &StatsView,
        socket: Arc<UdpSocket>,
        datagram: Vec<u8>,
        ip: IpAddr,
        port: u16,
    ) -> Result<(), BoxError> {
        stats.set("byte_count", stats.get("byte_count") + datagram.len() as u64);
        let result = socket.send_to(&datagram, (ip, port)).await;
        subserver.notice(&format!(
            "served request of {} bytes from {ip}:{port}",
            datagram.len()
        ));
        result?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "udp_echo_tests.rs"]
mod tests;
