//! Lightweight per-store metrics for SpanDB.
//!
//! Атомарные счётчики живут в самом хранилище (Pager), глобальных static нет:
//! два открытых файла в одном процессе не видят счётчики друг друга.
//! - allocation / free chain
//! - region growth
//! - extents (grow / shrink / resolve)
//! - integrity (checksum failures, quarantine)
//! - maintenance (compaction, sweep)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    // ----- allocation -----
    blocks_allocated: AtomicU64,
    blocks_reused: AtomicU64,
    blocks_freed: AtomicU64,

    // ----- region -----
    region_extensions: AtomicU64,
    region_bytes_extended: AtomicU64,

    // ----- extents -----
    extent_grows: AtomicU64,
    extent_shrinks: AtomicU64,
    resolves: AtomicU64,

    // ----- integrity -----
    checksum_failures: AtomicU64,
    quarantined: AtomicU64,

    // ----- maintenance -----
    compactions: AtomicU64,
    sweep_runs: AtomicU64,
    sweep_blocks_reclaimed: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub blocks_allocated: u64,
    pub blocks_reused: u64,
    pub blocks_freed: u64,

    pub region_extensions: u64,
    pub region_bytes_extended: u64,

    pub extent_grows: u64,
    pub extent_shrinks: u64,
    pub resolves: u64,

    pub checksum_failures: u64,
    pub quarantined: u64,

    pub compactions: u64,
    pub sweep_runs: u64,
    pub sweep_blocks_reclaimed: u64,
}

impl MetricsSnapshot {
    /// Доля выделений, обслуженных free-цепочкой.
    pub fn reuse_ratio(&self) -> f64 {
        if self.blocks_allocated == 0 {
            0.0
        } else {
            self.blocks_reused as f64 / self.blocks_allocated as f64
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- Recorders (allocation) -----
    /// `fresh` - блоки из хвоста файла, `reused` - из free-цепочки.
    pub fn record_alloc(&self, fresh: u64, reused: u64) {
        self.blocks_allocated.fetch_add(fresh + reused, Ordering::Relaxed);
        self.blocks_reused.fetch_add(reused, Ordering::Relaxed);
    }

    pub fn record_free(&self, n: u64) {
        self.blocks_freed.fetch_add(n, Ordering::Relaxed);
    }

    // ----- Recorders (region) -----
    pub fn record_region_extension(&self, bytes: u64) {
        self.region_extensions.fetch_add(1, Ordering::Relaxed);
        self.region_bytes_extended.fetch_add(bytes, Ordering::Relaxed);
    }

    // ----- Recorders (extents) -----
    pub fn record_grow(&self) {
        self.extent_grows.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_shrink(&self) {
        self.extent_shrinks.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_resolve(&self) {
        self.resolves.fetch_add(1, Ordering::Relaxed);
    }

    // ----- Recorders (integrity) -----
    pub fn record_checksum_failure(&self) {
        self.checksum_failures.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_quarantine(&self) {
        self.quarantined.fetch_add(1, Ordering::Relaxed);
    }

    // ----- Recorders (maintenance) -----
    pub fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_sweep(&self, reclaimed: u64) {
        self.sweep_runs.fetch_add(1, Ordering::Relaxed);
        self.sweep_blocks_reclaimed.fetch_add(reclaimed, Ordering::Relaxed);
    }

    // ----- Snapshot / Reset -----
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_allocated: self.blocks_allocated.load(Ordering::Relaxed),
            blocks_reused: self.blocks_reused.load(Ordering::Relaxed),
            blocks_freed: self.blocks_freed.load(Ordering::Relaxed),

            region_extensions: self.region_extensions.load(Ordering::Relaxed),
            region_bytes_extended: self.region_bytes_extended.load(Ordering::Relaxed),

            extent_grows: self.extent_grows.load(Ordering::Relaxed),
            extent_shrinks: self.extent_shrinks.load(Ordering::Relaxed),
            resolves: self.resolves.load(Ordering::Relaxed),

            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            quarantined: self.quarantined.load(Ordering::Relaxed),

            compactions: self.compactions.load(Ordering::Relaxed),
            sweep_runs: self.sweep_runs.load(Ordering::Relaxed),
            sweep_blocks_reclaimed: self.sweep_blocks_reclaimed.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for c in [
            &self.blocks_allocated,
            &self.blocks_reused,
            &self.blocks_freed,
            &self.region_extensions,
            &self.region_bytes_extended,
            &self.extent_grows,
            &self.extent_shrinks,
            &self.resolves,
            &self.checksum_failures,
            &self.quarantined,
            &self.compactions,
            &self.sweep_runs,
            &self.sweep_blocks_reclaimed,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}
