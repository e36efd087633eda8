//! Dispatcher error types
//!
//! - [`EnqueueError`]: returned synchronously by `enqueue`
//! - [`DeliveryError`]: surfaced asynchronously on the error channel
//! - [`ShutdownError`]: returned by `stop`
//!
//! [`DispatchError`] wraps all three and exposes the behavioural predicates
//! callers branch on.

use std::fmt;
use std::time::Duration;

use contracts::{Message, TransportError};
use thiserror::Error;

/// Enqueue-time failure
#[derive(Debug, Clone, Error)]
pub enum EnqueueError {
    /// The queue was full; retry after `retry_after`
    #[error("failed to enqueue message: '{message}': queue full")]
    QueueFull {
        message: Message,
        retry_after: Duration,
    },

    /// The dispatcher has been stopped
    #[error("failed to enqueue message: '{message}': dispatcher stopped")]
    Closed { message: Message },
}

impl EnqueueError {
    /// Whether the condition is expected to clear shortly
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }

    /// How long to wait before enqueuing again
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::QueueFull { retry_after, .. } => Some(*retry_after),
            Self::Closed { .. } => None,
        }
    }

    /// The first message that was not accepted
    pub fn message(&self) -> &Message {
        match self {
            Self::QueueFull { message, .. } | Self::Closed { message } => message,
        }
    }
}

/// Why a worker gave up waiting for a rate-limit token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitCause {
    /// The retry window elapsed without admission
    Exhausted,
    /// Shutdown interrupted the wait
    Shutdown,
}

impl fmt::Display for RateLimitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => f.write_str("rate limit reached"),
            Self::Shutdown => f.write_str("dispatcher shutting down"),
        }
    }
}

/// Delivery-time failure, reported on the error channel
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The endpoint answered with a non-2xx status
    #[error("request failed with status: {status}")]
    Request {
        message: Message,
        status: u16,
        retryable: bool,
    },

    /// No response was obtained
    #[error("{source}")]
    Transport {
        message: Message,
        #[source]
        source: TransportError,
    },

    /// The message was dropped before sending
    #[error("dropping msg: '{message}': {cause}")]
    RateLimited {
        message: Message,
        cause: RateLimitCause,
    },
}

impl DeliveryError {
    /// Whether re-sending the same message may succeed
    ///
    /// Only 5xx responses are retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Request { retryable: true, .. })
    }

    /// The message that failed
    pub fn message(&self) -> &Message {
        match self {
            Self::Request { message, .. }
            | Self::Transport { message, .. }
            | Self::RateLimited { message, .. } => message,
        }
    }

    /// Response status, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure to shut down cleanly
#[derive(Debug, Clone, Error)]
pub enum ShutdownError {
    /// Workers were still running when the grace period ran out
    #[error("shut down grace period of {grace:?} exceeded, some workers may still be running")]
    GracePeriodExceeded { grace: Duration },
}

/// Any dispatcher failure
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

impl DispatchError {
    /// Whether the condition is expected to clear shortly
    pub fn is_temporary(&self) -> bool {
        match self {
            Self::Enqueue(e) => e.is_temporary(),
            _ => false,
        }
    }

    /// Whether re-sending may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Delivery(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// How long to wait before retrying
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Enqueue(e) => e.retry_after(),
            _ => None,
        }
    }

    /// The message involved, if any
    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Enqueue(e) => Some(e.message()),
            Self::Delivery(e) => Some(e.message()),
            Self::Shutdown(_) => None,
        }
    }
}

/// Classify a response status
///
/// 2xx is success, 5xx a retryable failure, anything else a permanent one.
pub fn classify_status(status: u16, message: Message) -> Result<(), DeliveryError> {
    match status {
        200..=299 => Ok(()),
        s => Err(DeliveryError::Request {
            message,
            status: s,
            retryable: s >= 500,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_all_statuses() {
        for status in 100u16..=599 {
            let result = classify_status(status, Message::from("m"));
            match status {
                200..=299 => assert!(result.is_ok(), "status {status}"),
                500..=599 => assert!(result.unwrap_err().is_retryable(), "status {status}"),
                _ => {
                    let err = result.unwrap_err();
                    assert!(!err.is_retryable(), "status {status}");
                    assert_eq!(err.status(), Some(status));
                }
            }
        }
    }

    #[test]
    fn test_request_error_carries_message() {
        let err = classify_status(503, Message::from("payload")).unwrap_err();
        assert_eq!(err.message(), &Message::from("payload"));
        assert_eq!(err.to_string(), "request failed with status: 503");
    }

    #[test]
    fn test_enqueue_error_predicates() {
        let full = EnqueueError::QueueFull {
            message: Message::from("hello2"),
            retry_after: Duration::from_secs(3),
        };
        assert!(full.is_temporary());
        assert_eq!(full.retry_after(), Some(Duration::from_secs(3)));

        let closed = EnqueueError::Closed {
            message: Message::from("late"),
        };
        assert!(!closed.is_temporary());
        assert_eq!(closed.retry_after(), None);
    }

    #[test]
    fn test_transport_and_rate_limit_not_retryable() {
        let transport = DeliveryError::Transport {
            message: Message::from("m"),
            source: TransportError::connection("refused"),
        };
        assert!(!transport.is_retryable());
        assert_eq!(transport.status(), None);

        let limited = DeliveryError::RateLimited {
            message: Message::from("m"),
            cause: RateLimitCause::Exhausted,
        };
        assert!(!limited.is_retryable());
        assert_eq!(limited.to_string(), "dropping msg: 'm': rate limit reached");
    }

    #[test]
    fn test_dispatch_error_predicates() {
        let err: DispatchError = EnqueueError::QueueFull {
            message: Message::from("m"),
            retry_after: Duration::from_secs(3),
        }
        .into();
        assert!(err.is_temporary());
        assert!(!err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));

        let err: DispatchError = ShutdownError::GracePeriodExceeded {
            grace: Duration::from_secs(1),
        }
        .into();
        assert!(!err.is_temporary());
        assert!(err.message().is_none());
    }
}
