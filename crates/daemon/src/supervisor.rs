// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor: parses the `[brim]` section, constructs and validates
//! every subserver, acquires listening sockets, drops privileges, allocates
//! the stats region, and then shepherds the subserver parents, respawning
//! any that die, until a shutdown signal arrives.
//!
//! The supervisor never touches connections; workers do. Any failure before
//! the worker pool starts aborts with a single diagnostic line and exit
//! code 1.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use brim_core::{Clock, Conf, ConfError, Registry, ServerStats, SubserverStats, SystemClock};

use crate::capture::{self, Role};
use crate::net::NetError;
use crate::service::{self, sustain_workers, ServiceError, Shutdown};
use crate::subserver::{DaemonsSubserver, Subserver, TcpSubserver, UdpSubserver, WsgiSubserver};

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "NOTICE", "WARNING", "ERROR", "CRITICAL"];

const VALID_LOG_FACILITIES: &[&str] = &[
    "LOG_KERN", "LOG_USER", "LOG_MAIL", "LOG_DAEMON", "LOG_AUTH", "LOG_SYSLOG", "LOG_LPR",
    "LOG_NEWS", "LOG_UUCP", "LOG_CRON", "LOG_AUTHPRIV", "LOG_FTP", "LOG_LOCAL0", "LOG_LOCAL1",
    "LOG_LOCAL2", "LOG_LOCAL3", "LOG_LOCAL4", "LOG_LOCAL5", "LOG_LOCAL6", "LOG_LOCAL7",
];

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Conf(#[from] ConfError),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Could not write pid file {path}: {source}")]
    PidFile { path: PathBuf, source: std::io::Error },
}

/// The parsed `[brim]` options the supervisor itself consumes.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub user: Option<String>,
    pub group: Option<String>,
    pub umask: u32,
    pub log_name: String,
    pub log_level: String,
    pub log_facility: String,
    pub count_status_codes: Vec<u16>,
}

impl ServerConfig {
    pub fn parse(conf: &Conf) -> Result<Self, ConfError> {
        let umask_text = conf.get_default("brim", "umask", "0022").to_string();
        let umask = u32::from_str_radix(&umask_text, 8)
            .map_err(|_| ConfError::Invalid(format!("Invalid umask value '{umask_text}'.")))?;

        let log_level = conf.get_default("brim", "log_level", "INFO").to_uppercase();
        if !VALID_LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(ConfError::Invalid(format!("Invalid log_level '{log_level}'.")));
        }

        let mut log_facility = conf.get_default("brim", "log_facility", "LOCAL0").to_uppercase();
        if !log_facility.starts_with("LOG_") {
            log_facility = format!("LOG_{log_facility}");
        }
        if !VALID_LOG_FACILITIES.contains(&log_facility.as_str()) {
            return Err(ConfError::Invalid(format!("Invalid log_facility '{log_facility}'.")));
        }

        // The serializer symbols are a build-time choice; only the stock
        // symbols resolve.
        let json_dumps = conf.get_default("brim", "json_dumps", "json.dumps");
        if json_dumps != "json.dumps" {
            return Err(ConfError::Invalid(format!(
                "Could not load function '{json_dumps}' for json_dumps."
            )));
        }
        let json_loads = conf.get_default("brim", "json_loads", "json.loads");
        if json_loads != "json.loads" {
            return Err(ConfError::Invalid(format!(
                "Could not load function '{json_loads}' for json_loads."
            )));
        }

        let codes_text = conf.get_default("brim", "count_status_codes", "404 408 499 501");
        let mut count_status_codes = Vec::new();
        for token in codes_text.split_whitespace() {
            let code: u16 = token.parse().map_err(|_| {
                ConfError::Invalid(format!("Invalid count_status_codes '{codes_text}'."))
            })?;
            count_status_codes.push(code);
        }

        Ok(Self {
            user: conf.get("brim", "user").map(str::to_string),
            group: conf.get("brim", "group").map(str::to_string),
            umask,
            log_name: conf.get_default("brim", "log_name", "brim").to_string(),
            log_level,
            log_facility,
            count_status_codes,
        })
    }
}

/// Install the tracing subscriber per the configured log level. The
/// transport is the process's stdout; `brim::access` records are the access
/// log. Safe to call more than once.
pub fn init_logging(config: &ServerConfig) {
    let level = match config.log_level.as_str() {
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    };
    let filter = tracing_subscriber::EnvFilter::new(level);
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

/// Construct and validate every configured subserver. Handler symbols,
/// handler options, and stat declarations are all checked here, before any
/// socket binds. The WSGI subserver always exists; its default chain
/// answers 404.
pub fn build_subservers(
    conf: &Conf,
    config: &ServerConfig,
    registry: &Registry,
    no_daemon: bool,
) -> Result<Vec<Subserver>, ServerError> {
    let mut subservers = Vec::new();
    subservers.push(Subserver::Wsgi(WsgiSubserver::configure(
        conf,
        registry,
        &config.count_status_codes,
        &config.log_name,
        no_daemon,
    )?));
    if conf.get("brim", "tcp").is_some() {
        subservers.push(Subserver::Tcp(TcpSubserver::configure(conf, registry, no_daemon)?));
    }
    if conf.get("brim", "udp").is_some() {
        subservers.push(Subserver::Udp(UdpSubserver::configure(conf, registry, no_daemon)?));
    }
    if conf.get("brim", "daemons").is_some() {
        if no_daemon {
            info!(target: "brim", "no-daemon mode; configured daemons are not started");
        } else {
            subservers.push(Subserver::Daemons(DaemonsSubserver::configure(conf, registry)?));
        }
    }
    Ok(subservers)
}

/// Configuration-only pass used by the controlling invocation before it
/// spawns the daemon child.
pub fn validate(conf: &Conf, registry: &Registry) -> Result<(), ServerError> {
    let config = ServerConfig::parse(conf)?;
    build_subservers(conf, &config, registry, false)?;
    Ok(())
}

pub struct ServerOpts {
    pub pid_file: PathBuf,
    pub no_daemon: bool,
    /// This process is the spawned daemon child and owns the PID file.
    pub daemonized: bool,
}

/// Run the server until shutdown. `shutdown` is the control channel the
/// signal watcher (and tests) trigger.
pub fn run_server(
    conf: Conf,
    opts: ServerOpts,
    registry: &Registry,
    shutdown: Shutdown,
) -> Result<(), ServerError> {
    let config = ServerConfig::parse(&conf)?;
    init_logging(&config);
    let clock = SystemClock;

    let mut subservers = build_subservers(&conf, &config, registry, opts.no_daemon)?;
    for subserver in &mut subservers {
        subserver.acquire(&clock)?;
    }
    if opts.daemonized {
        std::fs::write(&opts.pid_file, format!("{}\n", std::process::id()))
            .map_err(|source| ServerError::PidFile { path: opts.pid_file.clone(), source })?;
    }
    service::drop_privileges(config.user.as_deref(), config.group.as_deref(), config.umask)?;
    for subserver in &mut subservers {
        subserver.allocate_stats();
    }
    let server_stats = Arc::new(ServerStats {
        start_time: clock.epoch_secs(),
        subservers: subservers
            .iter()
            .map(|s| SubserverStats { name: s.name().to_string(), stats: s.stats() })
            .collect(),
    });
    for subserver in &mut subservers {
        subserver.set_server_stats(Arc::clone(&server_stats));
    }

    capture::install_exception_capture();
    spawn_signal_watcher(shutdown.clone());
    info!(target: "brim", "brimd starting with {} subserver(s)", subservers.len());

    sustain_workers(
        subservers.len(),
        Role::Main,
        |index| subservers[index].run_parent(&shutdown),
        &shutdown,
    );

    if opts.daemonized {
        // Clean up the PID file unless a handoff already replaced it.
        if let Ok(Some(pid)) = crate::control::read_pid(&opts.pid_file) {
            if pid == std::process::id() as i32 {
                let _ = std::fs::remove_file(&opts.pid_file);
            }
        }
    }
    info!(
        target: "brim",
        "exiting due to {}",
        if shutdown.is_abort() { "SIGTERM" } else { "SIGHUP" }
    );
    Ok(())
}

/// Bridge Unix signals onto the shutdown broadcast: SIGHUP is graceful,
/// SIGTERM and SIGINT are immediate.
fn spawn_signal_watcher(shutdown: Shutdown) {
    let spawned = std::thread::Builder::new().name("signals".to_string()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(target: "brim", "could not build signal reactor: {err}");
                return;
            }
        };
        runtime.block_on(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let streams = (
                signal(SignalKind::hangup()),
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
            );
            let (Ok(mut hup), Ok(mut term), Ok(mut int)) = streams else {
                error!(target: "brim", "could not install signal handlers");
                return;
            };
            loop {
                tokio::select! {
                    _ = hup.recv() => {
                        info!(target: "brim", "received SIGHUP; shutting down gracefully");
                        shutdown.trigger_graceful();
                    }
                    _ = term.recv() => {
                        info!(target: "brim", "received SIGTERM; shutting down now");
                        shutdown.trigger_abort();
                    }
                    _ = int.recv() => {
                        info!(target: "brim", "received SIGINT; shutting down now");
                        shutdown.trigger_abort();
                    }
                }
                if shutdown.is_abort() {
                    break;
                }
                // After a graceful request, keep listening so a SIGTERM can
                // still escalate.
            }
        });
    });
    if let Err(err) = spawned {
        error!(target: "brim", "could not spawn signal watcher: {err}");
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
