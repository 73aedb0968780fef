// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uncaught-failure capture for daemonized workers.
//!
//! A process-wide panic hook turns any escaped panic into a single
//! syslog-friendly record carrying the worker's role and id, type-first so
//! the interesting part survives truncation:
//!
//! `UNCAUGHT EXCEPTION: wid:003 panic: <msg> [<file>:<line>]`

use std::cell::Cell;

/// Which kind of worker the current thread is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Main,
    Wsgi,
    Tcp,
    Udp,
    Daemon,
}

impl Role {
    pub fn tag(self) -> &'static str {
        match self {
            Role::Main => "main",
            Role::Wsgi => "wid",
            Role::Tcp => "tid",
            Role::Udp => "uid",
            Role::Daemon => "did",
        }
    }
}

thread_local! {
    static CURRENT: Cell<(Role, usize)> = const { Cell::new((Role::Main, 0)) };
}

/// Tag the current thread; every worker thread calls this first.
pub fn set_worker_role(role: Role, worker_id: usize) {
    CURRENT.with(|c| c.set((role, worker_id)));
}

pub fn current_role() -> (Role, usize) {
    CURRENT.with(|c| c.get())
}

/// `wid:003`-style label for the current thread.
pub fn role_label() -> String {
    let (role, id) = current_role();
    format!("{}:{:03}", role.tag(), id)
}

/// Install the process-wide panic hook. The default hook's multi-line
/// stderr dump is replaced; workers have no console in daemon mode.
pub fn install_exception_capture() {
    std::panic::set_hook(Box::new(|info| {
        let msg = if let Some(s) = info.payload().downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        let frame = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let msg = msg.replace('\n', " ");
        tracing::error!(target: "brim", "UNCAUGHT EXCEPTION: {} panic: {} [{}]", role_label(), msg, frame);
    }));
}

#[cfg(test)]
#[path = "capture_tests.rs"]
mod tests;
