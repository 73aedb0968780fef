// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so retry and wait deadlines are testable.
//!
//! The bind-retry loop and the PID-wait loop both poll against a deadline
//! with short sleeps; with [`FakeClock`] a test can walk those loops without
//! real time passing.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// A clock providing monotonic now, wall-clock epoch seconds, and sleep.
pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> Instant;
    fn epoch_secs(&self) -> u64;
    fn sleep(&self, duration: Duration);
}

/// Real system clock.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_secs(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Controllable clock for tests. `sleep` advances the clock instead of
/// blocking.
#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<Instant>>,
    epoch: Arc<Mutex<u64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { now: Arc::new(Mutex::new(Instant::now())), epoch: Arc::new(Mutex::new(1_000_000)) }
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock() += duration;
        *self.epoch.lock() += duration.as_secs();
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }

    fn epoch_secs(&self) -> u64 {
        *self.epoch.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
