// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-pool plumbing shared by the supervisor and every subserver:
//! shutdown propagation, the sustain-workers loop, and privilege dropping.
//!
//! Workers are OS threads, each hosting its own current-thread tokio
//! reactor, so a worker's cooperative tasks all live on one thread and a
//! crashed worker takes down nothing but itself. The listening socket and
//! the stats region are shared into workers by handle, and the supervisor's
//! signal watcher fans shutdown out through [`Shutdown`] instead of a
//! process-group signal.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use nix::unistd::{getegid, geteuid, setgid, setgroups, setsid, setuid, Group, User};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::capture::{self, Role};

/// Errors from privilege dropping. All fatal before any traffic flows.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Cannot switch to unknown user '{0}'.")]
    UnknownUser(String),

    #[error("Cannot switch to unknown group '{0}'.")]
    UnknownGroup(String),

    #[error("Permission denied when switching to user '{0}'.")]
    SetUser(String),

    #[error("Permission denied when switching to group '{0}'.")]
    SetGroup(String),

    #[error("Could not drop privileges: {0}")]
    Other(String),
}

/// Graceful/immediate shutdown broadcast, the channel-based stand-in for
/// SIGHUP/SIGTERM delivery to a process group.
///
/// Graceful means stop accepting and let in-flight work drain; abort means
/// bail out of everything now. Abort implies graceful.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    graceful: CancellationToken,
    abort: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger_graceful(&self) {
        self.graceful.cancel();
    }

    pub fn trigger_abort(&self) {
        self.abort.cancel();
        self.graceful.cancel();
    }

    pub fn is_graceful(&self) -> bool {
        self.graceful.is_cancelled()
    }

    pub fn is_abort(&self) -> bool {
        self.abort.is_cancelled()
    }

    pub async fn wait_graceful(&self) {
        self.graceful.cancelled().await;
    }

    pub async fn wait_abort(&self) {
        self.abort.cancelled().await;
    }
}

/// How long a parent waits between respawns once the initial cohort is up.
const RESPAWN_THROTTLE: Duration = Duration::from_secs(1);

/// Notifies the parent loop however the worker ends, panics included.
struct ExitGuard {
    tx: mpsc::Sender<usize>,
    worker_id: usize,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(self.worker_id);
    }
}

/// Start and maintain a set of worker threads running `worker_fn`.
///
/// A worker that exits without shutdown having been signaled is restarted,
/// throttled to one respawn per second after the initial cohort. Does not
/// return until shutdown is signaled and every worker has been joined.
///
/// With `workers_desired == 0` the worker runs inline on the calling thread
/// and this returns when it does: the no-fork debug mode.
pub fn sustain_workers<F>(workers_desired: usize, role: Role, worker_fn: F, shutdown: &Shutdown)
where
    F: Fn(usize) + Send + Sync,
{
    if workers_desired == 0 {
        capture::set_worker_role(role, 0);
        debug!(target: "brim", "{}:000 starting inline worker", role.tag());
        worker_fn(0);
        info!(target: "brim", "exiting due to workers = 0 mode");
        return;
    }

    let worker_fn = &worker_fn;
    let (exit_tx, exit_rx) = mpsc::channel::<usize>();
    std::thread::scope(|scope| {
        let mut handles: Vec<Option<std::thread::ScopedJoinHandle<'_, ()>>> =
            (0..workers_desired).map(|_| None).collect();
        let mut initial_spawning = true;
        let mut last_respawn: Option<Instant> = None;

        while !shutdown.is_graceful() {
            for worker_id in 0..workers_desired {
                if handles[worker_id].is_some() || shutdown.is_graceful() {
                    continue;
                }
                if !initial_spawning {
                    // At most one respawn per second after the initial
                    // cohort.
                    if let Some(last) = last_respawn {
                        let since = last.elapsed();
                        if since < RESPAWN_THROTTLE {
                            std::thread::sleep(RESPAWN_THROTTLE - since);
                        }
                    }
                    last_respawn = Some(Instant::now());
                }
                let exit_tx = exit_tx.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("{}-{:03}", role.tag(), worker_id))
                    .spawn_scoped(scope, move || {
                        let _guard = ExitGuard { tx: exit_tx, worker_id };
                        capture::set_worker_role(role, worker_id);
                        debug!(target: "brim", "{}:{:03} starting worker", role.tag(), worker_id);
                        worker_fn(worker_id);
                        debug!(target: "brim", "{}:{:03} worker exited", role.tag(), worker_id);
                    });
                match spawned {
                    Ok(handle) => handles[worker_id] = Some(handle),
                    Err(err) => {
                        error!(target: "brim", "could not spawn {}:{:03} worker: {}", role.tag(), worker_id, err);
                    }
                }
            }
            initial_spawning = false;

            match exit_rx.recv_timeout(Duration::from_millis(250)) {
                Ok(worker_id) => {
                    if let Some(handle) = handles[worker_id].take() {
                        let _ = handle.join();
                    }
                    if !shutdown.is_graceful() {
                        debug!(target: "brim", "{}:{:03} worker exited; restarting", role.tag(), worker_id);
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        for handle in handles.iter_mut().filter_map(Option::take) {
            let _ = handle.join();
        }
    });
}

/// Drop to the configured user/group and umask, become session leader when
/// permitted, and change to `/`. A missing user or group, or a denied
/// switch, is fatal.
pub fn drop_privileges(
    user: Option<&str>,
    group: Option<&str>,
    umask: u32,
) -> Result<(), ServiceError> {
    if user.is_some() || group.is_some() {
        match setgroups(&[]) {
            Ok(()) | Err(nix::errno::Errno::EPERM) => {}
            Err(err) => return Err(ServiceError::Other(err.to_string())),
        }
        let mut uid = geteuid();
        let mut gid = getegid();
        if let Some(name) = user {
            let pw = User::from_name(name)
                .map_err(|e| ServiceError::Other(e.to_string()))?
                .ok_or_else(|| ServiceError::UnknownUser(name.to_string()))?;
            uid = pw.uid;
            gid = pw.gid;
        }
        if let Some(name) = group {
            let gr = Group::from_name(name)
                .map_err(|e| ServiceError::Other(e.to_string()))?
                .ok_or_else(|| ServiceError::UnknownGroup(name.to_string()))?;
            gid = gr.gid;
        }
        setgid(gid).map_err(|_| ServiceError::SetGroup(group.unwrap_or_default().to_string()))?;
        setuid(uid).map_err(|_| ServiceError::SetUser(user.unwrap_or_default().to_string()))?;
    }
    nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(umask));
    match setsid() {
        Ok(_) | Err(nix::errno::Errno::EPERM) => {}
        Err(err) => return Err(ServiceError::Other(err.to_string())),
    }
    std::env::set_current_dir("/").map_err(|e| ServiceError::Other(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
