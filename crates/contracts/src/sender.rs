//! RequestSender trait - Dispatcher output interface
//!
//! Defines the abstract transport used to deliver a single message.

use thiserror::Error;

use crate::Message;

/// Transport-level failure, raised when no HTTP status was obtained
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be constructed (e.g. malformed destination)
    #[error("construct request: {message}")]
    InvalidRequest { message: String },

    /// Connection or protocol failure while sending
    #[error("send request: {message}")]
    Connection { message: String },

    /// The transport gave up waiting for a response
    #[error("request timed out: {message}")]
    Timeout { message: String },
}

impl TransportError {
    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }
}

/// Outbound request trait
///
/// Consumes a destination and a payload and produces the response status
/// code, or a [`TransportError`] when no response was obtained. Implementations
/// must be shareable across workers.
#[trait_variant::make(RequestSender: Send)]
pub trait LocalRequestSender {
    /// Sender name (used for logging)
    fn name(&self) -> &str;

    /// Deliver one message
    ///
    /// # Errors
    /// Returns transport error (should include context)
    async fn send(&self, destination: &str, body: Message) -> Result<u16, TransportError>;
}
