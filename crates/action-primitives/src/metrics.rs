//! Action counters by outcome, surfaced by the CLI with `--metrics`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use pagepilot_core_types::ErrorKind;
use serde::Serialize;

static ACTION_TOTAL: AtomicU64 = AtomicU64::new(0);
static ACTION_SUCCESS: AtomicU64 = AtomicU64::new(0);
static ACTION_WARNED: AtomicU64 = AtomicU64::new(0);
static ACTION_LAT_NS: AtomicU64 = AtomicU64::new(0);
static ACTION_LAT_SAMPLES: AtomicU64 = AtomicU64::new(0);

const KINDS: [ErrorKind; 8] = [
    ErrorKind::IndexNotFound,
    ErrorKind::StaleElement,
    ErrorKind::InvalidPayload,
    ErrorKind::ActionDispatchFailed,
    ErrorKind::ClassifierTimeout,
    ErrorKind::FrameAccessDenied,
    ErrorKind::Cancelled,
    ErrorKind::RepeatedAction,
];

static FAILURES: [AtomicU64; 8] = [
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
];

#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub total: u64,
    pub succeeded: u64,
    pub warned: u64,
    pub avg_ms: f64,
    pub failures: BTreeMap<&'static str, u64>,
}

pub fn record_action(error: Option<ErrorKind>, warned: bool, duration: Duration) {
    ACTION_TOTAL.fetch_add(1, Ordering::Relaxed);
    match error {
        None => {
            ACTION_SUCCESS.fetch_add(1, Ordering::Relaxed);
        }
        Some(kind) => {
            if let Some(slot) = KINDS.iter().position(|k| *k == kind) {
                FAILURES[slot].fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    if warned {
        ACTION_WARNED.fetch_add(1, Ordering::Relaxed);
    }
    let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
    ACTION_LAT_NS.fetch_add(nanos, Ordering::Relaxed);
    ACTION_LAT_SAMPLES.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> MetricSnapshot {
    let samples = ACTION_LAT_SAMPLES.load(Ordering::Relaxed);
    let avg_ms = if samples == 0 {
        0.0
    } else {
        (ACTION_LAT_NS.load(Ordering::Relaxed) as f64 / samples as f64) / 1_000_000.0
    };
    MetricSnapshot {
        total: ACTION_TOTAL.load(Ordering::Relaxed),
        succeeded: ACTION_SUCCESS.load(Ordering::Relaxed),
        warned: ACTION_WARNED.load(Ordering::Relaxed),
        avg_ms,
        failures: KINDS
            .iter()
            .zip(FAILURES.iter())
            .map(|(kind, count)| (kind.as_str(), count.load(Ordering::Relaxed)))
            .collect(),
    }
}
