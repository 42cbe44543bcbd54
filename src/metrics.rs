//! Job Metrics
//!
//! Counters and latency tracking for background job execution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Metrics collector for background jobs.
#[derive(Debug)]
pub struct Metrics {
    /// Total executed jobs across all kinds
    total_jobs: AtomicU64,

    /// Executed jobs per kind (pool name)
    jobs_by_kind: RwLock<HashMap<String, u64>>,

    /// Failures per kind (panics, storage errors)
    failures_by_kind: RwLock<HashMap<String, u64>>,

    /// Latency tracking (simplified)
    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total_jobs: AtomicU64::new(0),
            jobs_by_kind: RwLock::new(HashMap::new()),
            failures_by_kind: RwLock::new(HashMap::new()),
            latency_sum_us: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
        }
    }

    /// Record one executed job of the given kind.
    pub fn record_job(&self, kind: &str, latency: Duration) {
        self.total_jobs.fetch_add(1, Ordering::Relaxed);

        {
            let mut jobs = self.jobs_by_kind.write().unwrap();
            *jobs.entry(kind.to_string()).or_insert(0) += 1;
        }

        let latency_us = latency.as_micros() as u64;
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);

        // Update min (atomic min)
        let mut current_min = self.latency_min_us.load(Ordering::Relaxed);
        while latency_us < current_min {
            match self.latency_min_us.compare_exchange_weak(
                current_min,
                latency_us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current_min = c,
            }
        }

        // Update max (atomic max)
        let mut current_max = self.latency_max_us.load(Ordering::Relaxed);
        while latency_us > current_max {
            match self.latency_max_us.compare_exchange_weak(
                current_max,
                latency_us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current_max = c,
            }
        }
    }

    /// Record one failed job of the given kind.
    pub fn record_failure(&self, kind: &str) {
        let mut failures = self.failures_by_kind.write().unwrap();
        *failures.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn total_jobs(&self) -> u64 {
        self.total_jobs.load(Ordering::Relaxed)
    }

    pub fn job_count(&self, kind: &str) -> u64 {
        self.jobs_by_kind
            .read()
            .unwrap()
            .get(kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn failure_count(&self, kind: &str) -> u64 {
        self.failures_by_kind
            .read()
            .unwrap()
            .get(kind)
            .copied()
            .unwrap_or(0)
    }

    /// Average job latency in microseconds.
    pub fn avg_latency_us(&self) -> f64 {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        sum as f64 / count as f64
    }

    pub fn min_latency_us(&self) -> u64 {
        let min = self.latency_min_us.load(Ordering::Relaxed);
        if min == u64::MAX {
            0
        } else {
            min
        }
    }

    pub fn max_latency_us(&self) -> u64 {
        self.latency_max_us.load(Ordering::Relaxed)
    }

    /// One-line summary for periodic status logs.
    pub fn summary(&self) -> String {
        format!(
            "Jobs: {} | Latency (µs): avg={:.1}, min={}, max={}",
            self.total_jobs(),
            self.avg_latency_us(),
            self.min_latency_us(),
            self.max_latency_us()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_jobs_and_failures_by_kind() {
        let metrics = Metrics::new();

        metrics.record_job("expire-scan", Duration::from_micros(100));
        metrics.record_job("expire-scan", Duration::from_micros(200));
        metrics.record_job("expire-del", Duration::from_micros(150));
        metrics.record_failure("expire-del");

        assert_eq!(metrics.total_jobs(), 3);
        assert_eq!(metrics.job_count("expire-scan"), 2);
        assert_eq!(metrics.job_count("expire-del"), 1);
        assert_eq!(metrics.failure_count("expire-del"), 1);
        assert_eq!(metrics.failure_count("expire-scan"), 0);
        assert_eq!(metrics.min_latency_us(), 100);
        assert_eq!(metrics.max_latency_us(), 200);
        assert!((metrics.avg_latency_us() - 150.0).abs() < 0.1);
    }
}
