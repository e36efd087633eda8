//! Dispatcher configuration

use std::time::Duration;

use contracts::{
    NotifierSettings, DEFAULT_MAX_BUFFER_SIZE, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RPS,
    DEFAULT_REFILL_TOKENS, DEFAULT_SHUTDOWN_GRACE_MS,
};

/// Suggested wait before enqueuing again after a full queue
pub const DEFAULT_ENQUEUE_RETRY_AFTER: Duration = Duration::from_secs(3);
/// How long a worker waits for a rate-limit token before dropping its message
pub const DEFAULT_RATE_LIMIT_RETRY: Duration = Duration::from_secs(3);
/// Pause between two admission checks while rate limited
pub const DEFAULT_RATE_LIMIT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Queue capacity; enqueue fails once this many messages are waiting
    pub max_buffer_size: usize,

    /// Number of workers launched by `start`
    pub max_concurrency: usize,

    /// Upper bound on how long `stop` waits for workers
    pub shutdown_grace: Duration,

    /// Retry hint carried by a queue-full error
    pub enqueue_retry_after: Duration,

    /// Rate-limit admission window per message
    pub rate_limit_retry: Duration,

    /// Pause between admission checks
    pub rate_limit_poll_interval: Duration,

    /// Requests per second of the default token bucket
    pub max_rps: u64,

    /// Tokens added per refill tick of the default token bucket
    pub refill_tokens: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
            enqueue_retry_after: DEFAULT_ENQUEUE_RETRY_AFTER,
            rate_limit_retry: DEFAULT_RATE_LIMIT_RETRY,
            rate_limit_poll_interval: DEFAULT_RATE_LIMIT_POLL_INTERVAL,
            max_rps: DEFAULT_MAX_RPS,
            refill_tokens: DEFAULT_REFILL_TOKENS,
        }
    }
}

impl From<&NotifierSettings> for DispatcherConfig {
    fn from(settings: &NotifierSettings) -> Self {
        Self {
            max_buffer_size: settings.max_buffer_size,
            max_concurrency: settings.max_concurrency,
            shutdown_grace: settings.shutdown_grace(),
            max_rps: settings.max_rps,
            refill_tokens: settings.refill_tokens,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert_eq!(config.max_buffer_size, 1000);
        assert_eq!(config.max_concurrency, 100);
        assert_eq!(config.shutdown_grace, Duration::from_secs(3));
        assert_eq!(config.enqueue_retry_after, Duration::from_secs(3));
        assert_eq!(config.rate_limit_retry, Duration::from_secs(3));
        assert_eq!(config.max_rps, 100);
        assert_eq!(config.refill_tokens, 1);
    }

    #[test]
    fn test_from_settings() {
        let mut settings = NotifierSettings::new("http://localhost/notify");
        settings.max_buffer_size = 10;
        settings.max_concurrency = 2;
        settings.shutdown_grace_ms = 500;
        settings.max_rps = 7;

        let config = DispatcherConfig::from(&settings);
        assert_eq!(config.max_buffer_size, 10);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.shutdown_grace, Duration::from_millis(500));
        assert_eq!(config.max_rps, 7);
        assert_eq!(config.rate_limit_retry, DEFAULT_RATE_LIMIT_RETRY);
    }
}
