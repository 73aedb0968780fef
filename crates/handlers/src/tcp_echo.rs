// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A straight TCP app that echoes incoming data back until the client
//! closes. A good starting point for other TCP apps.
//!
//! Options:
//!
//! ```ini
//! [tcp_echo]
//! call = brim_handlers::TcpEcho
//! # chunk_read = <bytes>
//! #   The most to read from the client before echoing it back.
//! #   Default: 65536
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use brim_core::{BoxError, NetStream, StatKind, StatsView, SubserverInfo, TcpApp, TcpFactory};

pub struct TcpEcho {
    chunk_read: usize,
}

impl TcpEcho {
    pub fn factory() -> TcpFactory {
        TcpFactory {
            parse_conf: |name, conf| {
                conf.get_int(name, "chunk_read", 65536)?;
                Ok(())
            },
            stats_conf: |_name, _conf| {
                vec![
                    ("byte_count".to_string(), StatKind::Sum),
                    ("connection_count".to_string(), StatKind::Sum),
                ]
            },
            construct: |name, conf| {
                Ok(Arc::new(TcpEcho {
                    chunk_read: conf.get_int(name, "chunk_read", 65536)?.max(1) as usize,
                }))
            },
        }
    }
}

#[async_trait]
impl TcpApp for TcpEcho {
    async fn serve(
        &self,
        subserver: &SubserverInfo,
        stats: &StatsView,
        mut conn: NetStream,
        ip: IpAddr,
        port: u16,
    ) -> Result<(), BoxError> {
        stats.incr("connection_count");
        let mut buf = vec![0u8; self.chunk_read];
        let result: Result<(), BoxError> = async {
            loop {
                let n = conn.read(&mut buf).await?;
                if n == 0 {
                    return Ok(());
                }
                stats.set("byte_count", stats.get("byte_count") + n as u64);
                conn.write_all(&buf[..n]).await?;
            }
        }
        .await;
        subserver.notice(&format!("served request from {ip}:{port}"));
        result
    }
}

#[cfg(test)]
#[path = "tcp_echo_tests.rs"]
mod tests;
