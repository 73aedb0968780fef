// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PID-file control of a running instance: locate it, signal it, wait for
//! it to exit, clean up.
//!
//! Everything is built on one primitive: read the PID file and send a
//! signal. Signal 0 probes liveness; ESRCH means not running. A missing
//! PID file, or one that does not hold an integer, means not running.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;

use brim_core::Clock;

/// Seconds to wait for a PID to disappear after sending it a signal that
/// should make it exit.
pub const PID_WAIT_TIME: u64 = 15;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{pid} did not exit after 15 seconds.")]
    DidNotExit { pid: i32 },

    #[error("Could not read pid file {path}: {source}")]
    ReadPidFile { path: PathBuf, source: std::io::Error },

    #[error("Could not remove pid file {path}: {source}")]
    RemovePidFile { path: PathBuf, source: std::io::Error },

    #[error("Could not signal {pid}: {source}")]
    Signal { pid: i32, source: nix::errno::Errno },
}

/// The PID stored in `pid_file`, or None when the file is absent or does
/// not hold an integer.
pub fn read_pid(pid_file: &Path) -> Result<Option<i32>, ControlError> {
    match std::fs::read_to_string(pid_file) {
        Ok(text) => Ok(text.trim().parse().ok()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ControlError::ReadPidFile { path: pid_file.to_path_buf(), source: err }),
    }
}

/// Signal-0 liveness probe.
pub fn pid_running(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Send `sig` to the instance recorded in `pid_file` (or `pid_override`).
///
/// Returns `(signaled, pid)`: signaled is false when no instance is
/// running; pid is whatever PID was found, 0 when there was none. With
/// `expect_exit` the call waits up to [`PID_WAIT_TIME`] for the process to
/// disappear, then removes the PID file, unless `pid_override` was given,
/// in which case the file is left alone (during a handoff it already
/// carries the new instance's PID).
pub fn send_pid_sig<C: Clock>(
    pid_file: &Path,
    sig: Option<Signal>,
    expect_exit: bool,
    pid_override: Option<i32>,
    clock: &C,
) -> Result<(bool, i32), ControlError> {
    let pid = match pid_override {
        Some(pid) => Some(pid),
        None => read_pid(pid_file)?,
    };
    let Some(pid) = pid else {
        return Ok((false, 0));
    };
    match kill(Pid::from_raw(pid), sig) {
        Ok(()) => {}
        Err(nix::errno::Errno::ESRCH) => return Ok((false, pid)),
        Err(err) => return Err(ControlError::Signal { pid, source: err }),
    }
    if expect_exit {
        let wait_until = clock.now() + Duration::from_secs(PID_WAIT_TIME);
        loop {
            match kill(Pid::from_raw(pid), None) {
                Err(nix::errno::Errno::ESRCH) => break,
                Err(err) => return Err(ControlError::Signal { pid, source: err }),
                Ok(()) => {}
            }
            if clock.now() >= wait_until {
                return Err(ControlError::DidNotExit { pid });
            }
            clock.sleep(Duration::from_secs(1));
        }
        if pid_override.is_none() {
            match std::fs::remove_file(pid_file) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(ControlError::RemovePidFile {
                        path: pid_file.to_path_buf(),
                        source: err,
                    })
                }
            }
        }
    }
    Ok((true, pid))
}

/// One line for `brimd status`.
pub fn status_line(pid_file: &Path) -> Result<String, ControlError> {
    match read_pid(pid_file)? {
        Some(pid) if pid_running(pid) => Ok(format!("{pid} is running")),
        Some(pid) => Ok(format!("{pid} is not running")),
        None => Ok("not running".to_string()),
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
