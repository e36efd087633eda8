//! NotifierSettings - Config Loader output
//!
//! File-level configuration of the notifier: destination, batching interval,
//! queue capacity, throughput and concurrency limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default batching interval (milliseconds)
pub const DEFAULT_INTERVAL_MS: u64 = 5_000;
/// Default queue / batch capacity
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1_000;
/// Default requests per second
pub const DEFAULT_MAX_RPS: u64 = 100;
/// Highest accepted requests per second
pub const MAX_RPS: u64 = 1_000_000;
/// Default tokens added per refill tick
pub const DEFAULT_REFILL_TOKENS: u64 = 1;
/// Default worker count
pub const DEFAULT_MAX_CONCURRENCY: usize = 100;
/// Default shutdown grace period (milliseconds)
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 3_000;

/// Complete notifier configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NotifierSettings {
    /// Destination URL every notification is POSTed to
    #[validate(url)]
    pub url: String,

    /// Interval after which buffered notifications are sent
    #[serde(default = "default_interval_ms")]
    #[validate(range(min = 1))]
    pub interval_ms: u64,

    /// Max messages buffered between sends
    #[serde(default = "default_max_buffer_size")]
    #[validate(range(min = 1))]
    pub max_buffer_size: usize,

    /// Max requests per second
    #[serde(default = "default_max_rps")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub max_rps: u64,

    /// Tokens added to the bucket per refill tick
    #[serde(default = "default_refill_tokens")]
    #[validate(range(min = 1))]
    pub refill_tokens: u64,

    /// Number of concurrent delivery workers
    #[serde(default = "default_max_concurrency")]
    #[validate(range(min = 1))]
    pub max_concurrency: usize,

    /// Grace period for shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Per-request timeout (None = transport default)
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_max_buffer_size() -> usize {
    DEFAULT_MAX_BUFFER_SIZE
}

fn default_max_rps() -> u64 {
    DEFAULT_MAX_RPS
}

fn default_refill_tokens() -> u64 {
    DEFAULT_REFILL_TOKENS
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

impl NotifierSettings {
    /// Settings for `url` with every other field at its default
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            interval_ms: DEFAULT_INTERVAL_MS,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_rps: DEFAULT_MAX_RPS,
            refill_tokens: DEFAULT_REFILL_TOKENS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            request_timeout_ms: None,
        }
    }

    /// Batching interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Shutdown grace period
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
