//! MetricsSink trait - observability hooks emitted by the dispatcher

use std::time::Duration;

/// Metrics emitted by the dispatcher
pub trait MetricsSink: Send + Sync {
    /// Report the configured queue capacity
    fn set_max_buffer_size(&self, size: usize);

    /// Count one rejected enqueue
    fn inc_enqueue_failures(&self);

    /// Record the latency of one outbound request, partitioned by status
    fn observe_request_latency(&self, elapsed: Duration, status: &str);
}

/// Metrics sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn set_max_buffer_size(&self, _size: usize) {}

    fn inc_enqueue_failures(&self) {}

    fn observe_request_latency(&self, _elapsed: Duration, _status: &str) {}
}
