//! Periodic export of aggregated metrics.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use super::{MetricKey, MetricSnapshot, ProxyMetrics};
use crate::error::Result;

/// One drained series, ready for a sink.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportedMetric {
    pub key: MetricKey,
    pub snapshot: MetricSnapshot,
}

/// Destination for drained metrics.
pub trait MetricsSink: Send + Sync {
    fn export(&self, batch: &[ExportedMetric]) -> Result<()>;
}

/// Emits each series as a structured log event.
#[derive(Debug, Default)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn export(&self, batch: &[ExportedMetric]) -> Result<()> {
        for metric in batch {
            let snapshot = &metric.snapshot;
            info!(
                status = %metric.key.status,
                method = %metric.key.method,
                count = snapshot.count,
                avg_latency_ms = snapshot.avg_latency_ms(),
                min_latency_ms = snapshot.min_latency_ms,
                max_latency_ms = snapshot.max_latency_ms,
                buckets = ?snapshot.buckets,
                "Proxy request metrics"
            );
        }
        Ok(())
    }
}

/// Drains [`ProxyMetrics`] into a [`MetricsSink`] on a fixed interval.
pub struct MetricsExporter {
    metrics: Arc<ProxyMetrics>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
}

impl MetricsExporter {
    pub fn new(metrics: Arc<ProxyMetrics>, sink: Arc<dyn MetricsSink>, interval: Duration) -> Self {
        Self {
            metrics,
            sink,
            interval,
        }
    }

    /// Drains once and hands the batch to the sink. Returns the number of
    /// series exported.
    pub fn export_once(&self) -> usize {
        let batch: Vec<ExportedMetric> = self
            .metrics
            .drain()
            .into_iter()
            .map(|(key, snapshot)| ExportedMetric { key, snapshot })
            .collect();

        if batch.is_empty() {
            debug!("No proxy metrics to export");
            return 0;
        }

        match self.sink.export(&batch) {
            Ok(()) => batch.len(),
            Err(err) => {
                let requests: u64 = batch.iter().map(|metric| metric.snapshot.count).sum();
                error!(
                    error = %err,
                    series = batch.len(),
                    requests,
                    "Failed to export proxy metrics"
                );
                0
            }
        }
    }

    /// Exports every interval until `shutdown` flips to true, then flushes
    /// once more.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.export_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let flushed = self.export_once();
        info!(series = flushed, "Metrics exporter stopped");
    }
}
