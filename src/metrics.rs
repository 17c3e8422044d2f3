//! Delivery counters and rate meters shared by all in-flight records.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counts events and reports their mean rate since creation.
#[derive(Debug)]
pub struct Meter {
    count: AtomicU64,
    started: Instant,
}

impl Meter {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn mark(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Events per second since the meter was created.
    pub fn mean_rate(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.count() as f64 / elapsed
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct ProducerMetrics {
    pub produced_count: Counter,
    pub failed_count: Counter,
    pub produced_meter: Meter,
    pub failed_meter: Meter,
}

impl ProducerMetrics {
    pub fn record_success(&self) {
        self.produced_count.inc();
        self.produced_meter.mark();
    }

    pub fn record_failure(&self) {
        self.failed_count.inc();
        self.failed_meter.mark();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            produced: self.produced_count.get(),
            failed: self.failed_count.get(),
            produced_rate: self.produced_meter.mean_rate(),
            failed_rate: self.failed_meter.mean_rate(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub produced: u64,
    pub failed: u64,
    pub produced_rate: f64,
    pub failed_rate: f64,
}
