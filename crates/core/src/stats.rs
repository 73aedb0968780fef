// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared counters for server stats.
//!
//! Each worker writes only its own bucket (row); any worker may read any
//! bucket. Cells are plain atomic u64 stores and increments with relaxed
//! ordering; readers on other workers may lag by an operation, which is
//! acceptable for telemetry. Apps like `brim_handlers::WsgiStats` read and
//! report all of them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How a stat is aggregated across buckets when reported.
///
/// Storage treats all stats identically; the kind only matters to reporting
/// apps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatKind {
    /// Per-worker value only; no overall stat is reported.
    Worker,
    /// Report the sum of the stat across all buckets.
    Sum,
    /// Report the smallest value across all buckets.
    Min,
    /// Report the largest value across all buckets.
    Max,
}

impl std::str::FromStr for StatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker" => Ok(Self::Worker),
            "sum" => Ok(Self::Sum),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => Err(format!("unknown stat kind '{other}'")),
        }
    }
}

/// Tracks server stats in a region shared by all workers of a subserver.
///
/// The naming table is immutable after construction; only the cell values
/// change. A bucket count of zero (inline debug mode) turns every operation
/// into a no-op returning zero.
#[derive(Debug)]
pub struct BucketStats {
    bucket_names: Vec<String>,
    names: Vec<String>,
    index: HashMap<String, usize>,
    kinds: HashMap<String, StatKind>,
    cells: Vec<AtomicU64>,
}

impl BucketStats {
    /// `bucket_names` names one bucket per worker; `stats_conf` declares the
    /// stat names and their reporting kinds.
    pub fn new(bucket_names: Vec<String>, stats_conf: Vec<(String, StatKind)>) -> Self {
        let mut names = Vec::new();
        let mut index = HashMap::new();
        let mut kinds = HashMap::new();
        for (name, kind) in stats_conf {
            if !index.contains_key(&name) {
                index.insert(name.clone(), names.len());
                names.push(name.clone());
            }
            kinds.insert(name, kind);
        }
        let cell_count = bucket_names.len() * names.len();
        let mut cells = Vec::with_capacity(cell_count);
        cells.resize_with(cell_count, AtomicU64::default);
        Self { bucket_names, names, index, kinds, cells }
    }

    /// An empty, no-op bucket set for inline (zero worker) mode.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_names.len()
    }

    pub fn bucket_names(&self) -> &[String] {
        &self.bucket_names
    }

    /// Declared stat names, in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The reporting kind for a declared stat name.
    pub fn kind(&self, name: &str) -> Option<StatKind> {
        self.kinds.get(name).copied()
    }

    fn cell(&self, bucket_id: usize, name: &str) -> Option<&AtomicU64> {
        if self.bucket_names.is_empty() {
            return None;
        }
        let column = *self.index.get(name)?;
        // An out-of-range bucket is a caller bug; the slice index reports it.
        Some(&self.cells[bucket_id * self.names.len() + column])
    }

    /// The value of `name` in `bucket_id`, or 0 for unknown names.
    pub fn get(&self, bucket_id: usize, name: &str) -> u64 {
        self.cell(bucket_id, name).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Set `name` in `bucket_id`; unknown names are ignored.
    pub fn set(&self, bucket_id: usize, name: &str, value: u64) {
        if let Some(cell) = self.cell(bucket_id, name) {
            cell.store(value, Ordering::Relaxed);
        }
    }

    /// Increment `name` in `bucket_id` by one; unknown names are ignored.
    pub fn incr(&self, bucket_id: usize, name: &str) {
        if let Some(cell) = self.cell(bucket_id, name) {
            cell.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A [`BucketStats`] bound to one bucket, as handed to a single worker or
/// daemon. WSGI apps receive this through the request env; TCP, UDP, and
/// daemon apps receive it as a call argument.
#[derive(Debug, Clone)]
pub struct StatsView {
    stats: Arc<BucketStats>,
    bucket_id: usize,
}

impl StatsView {
    pub fn new(stats: Arc<BucketStats>, bucket_id: usize) -> Self {
        Self { stats, bucket_id }
    }

    /// A view over an empty bucket set; every operation is a no-op.
    pub fn detached() -> Self {
        Self { stats: Arc::new(BucketStats::empty()), bucket_id: 0 }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.stats.get(self.bucket_id, name)
    }

    pub fn set(&self, name: &str, value: u64) {
        self.stats.set(self.bucket_id, name, value);
    }

    pub fn incr(&self, name: &str) {
        self.stats.incr(self.bucket_id, name);
    }
}

/// One subserver's share of the server-wide stats directory.
#[derive(Debug, Clone)]
pub struct SubserverStats {
    pub name: String,
    pub stats: Arc<BucketStats>,
}

/// The process-wide stats directory: every subserver's bucket set plus the
/// server start time. Built once by the supervisor after all stat names are
/// declared, before any worker starts.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub start_time: u64,
    pub subservers: Vec<SubserverStats>,
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
