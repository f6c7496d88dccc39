use metrics::{Counter, Gauge, Histogram};
use metrics_derive::Metrics;
use std::time::Duration;

/// Metrics for a [`Buffer`](crate::buffer::Buffer).
#[derive(Metrics)]
#[metrics(scope = "buffer")]
pub struct BufferMetrics {
    /// Number of submissions accepted into a cycle.
    pub submissions: Counter,
    /// Number of dispatched cycles.
    pub cycles: Counter,
    /// Number of cycles whose operation returned an error.
    pub failed_cycles: Counter,
    /// Number of cycles whose operation panicked.
    pub panicked_cycles: Counter,
    /// Number of submissions rejected because the buffer was cancelled.
    pub cancelled: Counter,
    /// Number of submissions currently buffered.
    pub buffered: Gauge,
    /// Number of submissions per dispatched cycle.
    pub cycle_size: Histogram,
    /// Time it takes to run the operation of a cycle, in milliseconds.
    pub operation_time: Histogram,
}

impl BufferMetrics {
    /// Record a dispatched cycle.
    pub fn record_cycle(&self, size: usize, elapsed: Duration) {
        self.cycles.increment(1);
        self.cycle_size.record(size as f64);
        self.operation_time.record(elapsed.as_secs_f64() * 1000.0);
        self.buffered.set(0.0);
    }
}
