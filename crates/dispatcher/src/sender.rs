//! HttpSender - POST each message to the destination over HTTP

use std::time::Duration;

use contracts::{Message, RequestSender, TransportError};
use reqwest::{Client, Url};
use tracing::{debug, instrument};

/// Default [`RequestSender`] backed by a shared `reqwest` client
///
/// The message bytes are sent as the request body. The response body is never
/// read since its content type is unknown; only the status is reported.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: Client,
    timeout: Option<Duration>,
}

impl HttpSender {
    /// Create a sender with a default client and no per-request timeout
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a sender on top of a preconfigured client (custom transport,
    /// TLS, default headers)
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Apply a per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn build_url(destination: &str) -> Result<Url, TransportError> {
        Url::parse(destination).map_err(|e| {
            TransportError::invalid_request(format!("invalid url '{destination}': {e}"))
        })
    }
}

impl Default for HttpSender {
    fn default() -> Self {
        Self::new()
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::timeout(e.to_string())
    } else if e.is_builder() {
        TransportError::invalid_request(e.to_string())
    } else {
        TransportError::connection(e.to_string())
    }
}

impl RequestSender for HttpSender {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(
        name = "http_sender_send",
        skip(self, body),
        fields(bytes = body.len())
    )]
    async fn send(&self, destination: &str, body: Message) -> Result<u16, TransportError> {
        let url = Self::build_url(destination)?;

        let mut request = self.client.post(url).body(body.into_bytes());
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        debug!(status = %status, "Response received");

        Ok(status.as_u16())
    }
}
