//! 通知投递指标
//!
//! 通过 `metrics` facade 记录，由 Prometheus exporter 导出。
//! 未安装 recorder 时所有记录都是空操作。

use std::sync::Mutex;
use std::time::Duration;

use contracts::MetricsSink;
use metrics::{counter, gauge, histogram};

/// 队列容量
pub const MAX_BUFFER_SIZE: &str = "notifier_max_buffer_size";
/// 入队失败次数
pub const ENQUEUE_FAILURES_TOTAL: &str = "notifier_enqueue_failures_total";
/// 请求延迟（秒），按状态码标注
pub const HTTP_REQUEST_LATENCY_SECONDS: &str = "notifier_http_request_latency_seconds";

/// 记录队列容量
pub fn record_max_buffer_size(size: usize) {
    gauge!(MAX_BUFFER_SIZE).set(size as f64);
}

/// 记录一次入队失败
pub fn record_enqueue_failure() {
    counter!(ENQUEUE_FAILURES_TOTAL).increment(1);
}

/// 记录请求延迟
pub fn record_request_latency(elapsed: Duration, status: &str) {
    histogram!(HTTP_REQUEST_LATENCY_SECONDS, "status" => status.to_string())
        .record(elapsed.as_secs_f64());
}

/// Prometheus 指标 sink
///
/// 同时在内存中聚合延迟，便于退出时输出摘要。
#[derive(Debug, Default)]
pub struct PrometheusMetrics {
    latency: Mutex<LatencyStats>,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 延迟摘要
    pub fn latency_summary(&self) -> LatencySummary {
        match self.latency.lock() {
            Ok(stats) => LatencySummary::from(&*stats),
            Err(poisoned) => LatencySummary::from(&*poisoned.into_inner()),
        }
    }
}

impl MetricsSink for PrometheusMetrics {
    fn set_max_buffer_size(&self, size: usize) {
        record_max_buffer_size(size);
    }

    fn inc_enqueue_failures(&self) {
        record_enqueue_failure();
    }

    fn observe_request_latency(&self, elapsed: Duration, status: &str) {
        record_request_latency(elapsed, status);

        let mut stats = match self.latency.lock() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        };
        stats.push(elapsed.as_secs_f64() * 1000.0);
    }
}

/// 在线延迟统计 (Welford's algorithm)，单位毫秒
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl LatencyStats {
    /// 添加一个样本
    pub fn push(&mut self, value_ms: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value_ms;
            self.max = value_ms;
        } else {
            self.min = self.min.min(value_ms);
            self.max = self.max.max(value_ms);
        }

        let delta = value_ms - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value_ms - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// 样本标准差
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}

/// 延迟摘要
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
}

impl From<&LatencyStats> for LatencySummary {
    fn from(stats: &LatencyStats) -> Self {
        Self {
            count: stats.count,
            min_ms: stats.min,
            max_ms: stats.max,
            mean_ms: stats.mean(),
            std_dev_ms: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "Request latency (ms): N/A")
        } else {
            write!(
                f,
                "Request latency (ms): min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min_ms, self.max_ms, self.mean_ms, self.std_dev_ms, self.count
            )
        }
    }
}
