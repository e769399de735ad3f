//! Per-request metrics aggregation.
//!
//! Samples are keyed by response status and request method. Each sample is a
//! set of atomic counters, so recording never takes a lock once the key
//! exists. The exporter periodically drains every non-empty sample; draining
//! swaps each counter back to its initial value, so a concurrent observation
//! lands either in the drained window or in the next one, never in both and
//! never in neither.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

pub mod exporter;

pub use exporter::{ExportedMetric, LogSink, MetricsExporter, MetricsSink};

/// Histogram bucket upper bounds in milliseconds (exclusive).
pub const BUCKET_BOUNDS_MS: [u64; 11] = [0, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];

/// One bucket per bound plus the overflow bucket for latencies ≥ 10 s.
pub const BUCKET_COUNT: usize = BUCKET_BOUNDS_MS.len() + 1;

/// Returns the bucket for `latency_ms`: the first bound strictly greater than
/// the latency, or the overflow bucket.
pub fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS_MS
        .iter()
        .position(|&bound| latency_ms < bound)
        .unwrap_or(BUCKET_BOUNDS_MS.len())
}

/// Identity of a metric series.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    /// Response status code, as text.
    pub status: String,
    /// Request method.
    pub method: String,
}

impl MetricKey {
    pub fn new(status: u16, method: &str) -> Self {
        Self {
            status: status.to_string(),
            method: method.to_string(),
        }
    }
}

/// Point-in-time copy of a [`MetricSample`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub count: u64,
    pub total_latency_ms: u64,
    /// Smallest latency observed, 0 when empty.
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub buckets: [u64; BUCKET_COUNT],
}

impl MetricSnapshot {
    /// Mean latency, 0 when empty.
    pub fn avg_latency_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.count as f64
        }
    }
}

/// Concurrently updated counters for one [`MetricKey`].
#[derive(Debug)]
pub struct MetricSample {
    count: AtomicU64,
    total_latency_ms: AtomicU64,
    min_latency_ms: AtomicU64,
    max_latency_ms: AtomicU64,
    buckets: [AtomicU64; BUCKET_COUNT],
}

impl Default for MetricSample {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            min_latency_ms: AtomicU64::new(u64::MAX),
            max_latency_ms: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

impl MetricSample {
    pub fn record(&self, latency_ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);
        self.buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Reads the counters without resetting them.
    pub fn snapshot(&self) -> MetricSnapshot {
        let min = self.min_latency_ms.load(Ordering::Relaxed);
        MetricSnapshot {
            count: self.count.load(Ordering::Relaxed),
            total_latency_ms: self.total_latency_ms.load(Ordering::Relaxed),
            min_latency_ms: if min == u64::MAX { 0 } else { min },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            buckets: std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed)),
        }
    }

    /// Reads and resets the counters in one pass.
    pub fn take(&self) -> MetricSnapshot {
        let min = self.min_latency_ms.swap(u64::MAX, Ordering::Relaxed);
        MetricSnapshot {
            count: self.count.swap(0, Ordering::Relaxed),
            total_latency_ms: self.total_latency_ms.swap(0, Ordering::Relaxed),
            min_latency_ms: if min == u64::MAX { 0 } else { min },
            max_latency_ms: self.max_latency_ms.swap(0, Ordering::Relaxed),
            buckets: std::array::from_fn(|i| self.buckets[i].swap(0, Ordering::Relaxed)),
        }
    }

    pub fn reset(&self) {
        self.take();
    }
}

/// Registry of metric samples shared by every request.
#[derive(Debug, Default)]
pub struct ProxyMetrics {
    samples: DashMap<MetricKey, Arc<MetricSample>>,
}

impl ProxyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed request.
    pub fn record(&self, status: u16, method: &str, latency_ms: u64) {
        let key = MetricKey::new(status, method);
        // Clone the handle so the shard lock is released before the update.
        let sample = match self.samples.get(&key) {
            Some(sample) => sample.clone(),
            None => self.samples.entry(key).or_default().clone(),
        };
        sample.record(latency_ms);
    }

    pub fn sample(&self, key: &MetricKey) -> Option<Arc<MetricSample>> {
        self.samples.get(key).map(|sample| sample.clone())
    }

    /// Live key to sample pairs, sorted by key.
    pub fn entries(&self) -> Vec<(MetricKey, Arc<MetricSample>)> {
        let mut entries: Vec<_> = self
            .samples
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Drains every non-empty sample, resetting each right after reading it.
    pub fn drain(&self) -> Vec<(MetricKey, MetricSnapshot)> {
        self.entries()
            .into_iter()
            .filter(|(_, sample)| sample.count() > 0)
            .map(|(key, sample)| (key, sample.take()))
            .filter(|(_, snapshot)| snapshot.count > 0)
            .collect()
    }

    /// Resets one key; other keys are untouched.
    pub fn reset(&self, key: &MetricKey) {
        if let Some(sample) = self.samples.get(key) {
            sample.reset();
        }
    }
}
