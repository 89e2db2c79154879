//! Telemetry helpers for the structural perceiver.
//!
//! Process-wide counters plus latency aggregates; the CLI prints them with
//! `--metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::model::WalkStats;

static SNAPSHOT_TOTAL: AtomicU64 = AtomicU64::new(0);
static SNAPSHOT_FAILED: AtomicU64 = AtomicU64::new(0);
static SNAPSHOT_LAT_NS: AtomicU64 = AtomicU64::new(0);
static SNAPSHOT_LAT_SAMPLES: AtomicU64 = AtomicU64::new(0);

static NODES_VISITED: AtomicU64 = AtomicU64::new(0);
static NODES_INDEXED: AtomicU64 = AtomicU64::new(0);
static NODES_DETACHED: AtomicU64 = AtomicU64::new(0);
static NODES_TIMED_OUT: AtomicU64 = AtomicU64::new(0);
static NODES_PROBE_FAILED: AtomicU64 = AtomicU64::new(0);
static OPAQUE_FRAMES: AtomicU64 = AtomicU64::new(0);

static RECHECK_TOTAL: AtomicU64 = AtomicU64::new(0);
static RECHECK_STALE: AtomicU64 = AtomicU64::new(0);
static RECHECK_LAT_NS: AtomicU64 = AtomicU64::new(0);
static RECHECK_LAT_SAMPLES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricCounter {
    pub total: u64,
    pub avg_ms: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct NodeMetric {
    pub visited: u64,
    pub indexed: u64,
    pub detached: u64,
    pub timed_out: u64,
    pub probe_failed: u64,
    pub opaque_frames: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricSnapshot {
    pub snapshot: MetricCounter,
    pub snapshot_failed: u64,
    pub nodes: NodeMetric,
    pub recheck: MetricCounter,
    pub recheck_stale: u64,
}

pub fn record_snapshot(stats: &WalkStats, indexed: usize, duration: Duration) {
    SNAPSHOT_TOTAL.fetch_add(1, Ordering::Relaxed);
    NODES_VISITED.fetch_add(stats.visited as u64, Ordering::Relaxed);
    NODES_INDEXED.fetch_add(indexed as u64, Ordering::Relaxed);
    NODES_DETACHED.fetch_add(stats.detached as u64, Ordering::Relaxed);
    NODES_TIMED_OUT.fetch_add(stats.timed_out as u64, Ordering::Relaxed);
    NODES_PROBE_FAILED.fetch_add(stats.probe_errors as u64, Ordering::Relaxed);
    OPAQUE_FRAMES.fetch_add(stats.opaque_frames as u64, Ordering::Relaxed);
    record_latency(&SNAPSHOT_LAT_NS, &SNAPSHOT_LAT_SAMPLES, duration);
}

pub fn record_snapshot_failure() {
    SNAPSHOT_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_recheck(stale: bool, duration: Duration) {
    RECHECK_TOTAL.fetch_add(1, Ordering::Relaxed);
    if stale {
        RECHECK_STALE.fetch_add(1, Ordering::Relaxed);
    }
    record_latency(&RECHECK_LAT_NS, &RECHECK_LAT_SAMPLES, duration);
}

pub fn snapshot() -> MetricSnapshot {
    MetricSnapshot {
        snapshot: make_counter(
            SNAPSHOT_TOTAL.load(Ordering::Relaxed),
            SNAPSHOT_LAT_NS.load(Ordering::Relaxed),
            SNAPSHOT_LAT_SAMPLES.load(Ordering::Relaxed),
        ),
        snapshot_failed: SNAPSHOT_FAILED.load(Ordering::Relaxed),
        nodes: NodeMetric {
            visited: NODES_VISITED.load(Ordering::Relaxed),
            indexed: NODES_INDEXED.load(Ordering::Relaxed),
            detached: NODES_DETACHED.load(Ordering::Relaxed),
            timed_out: NODES_TIMED_OUT.load(Ordering::Relaxed),
            probe_failed: NODES_PROBE_FAILED.load(Ordering::Relaxed),
            opaque_frames: OPAQUE_FRAMES.load(Ordering::Relaxed),
        },
        recheck: make_counter(
            RECHECK_TOTAL.load(Ordering::Relaxed),
            RECHECK_LAT_NS.load(Ordering::Relaxed),
            RECHECK_LAT_SAMPLES.load(Ordering::Relaxed),
        ),
        recheck_stale: RECHECK_STALE.load(Ordering::Relaxed),
    }
}

fn make_counter(total: u64, nanos: u64, samples: u64) -> MetricCounter {
    let avg_ms = if samples == 0 {
        0.0
    } else {
        (nanos as f64 / samples as f64) / 1_000_000.0
    };
    MetricCounter { total, avg_ms }
}

fn record_latency(total_ns: &AtomicU64, samples: &AtomicU64, duration: Duration) {
    let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
    total_ns.fetch_add(nanos, Ordering::Relaxed);
    samples.fetch_add(1, Ordering::Relaxed);
}
