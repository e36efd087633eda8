//! Worker task - pulls messages from the shared queue, waits for a rate-limit
//! token and delivers them one at a time

use std::borrow::Cow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_channel::Receiver;
use contracts::{Message, MetricsSink, RateLimit, RequestSender};
use flume::{Sender, TrySendError};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::dispatcher::lock;
use crate::error::{classify_status, DeliveryError, RateLimitCause};
use crate::metrics::DeliveryStats;

/// State shared by every worker of one dispatcher
pub(crate) struct Shared<S> {
    pub(crate) destination: String,
    pub(crate) sender: S,
    pub(crate) limiter: Arc<dyn RateLimit>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) stats: Arc<DeliveryStats>,
    /// Taken on stop, which disconnects the error channel
    pub(crate) errors_tx: Mutex<Option<Sender<DeliveryError>>>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) rate_limit_retry: Duration,
    pub(crate) poll_interval: Duration,
}

impl<S: RequestSender> Shared<S> {
    /// Wait for a rate-limit token, bounded by the retry window and
    /// interrupted by shutdown
    async fn acquire(&self) -> Result<(), RateLimitCause> {
        let deadline = Instant::now() + self.rate_limit_retry;

        loop {
            if self.shutdown.is_cancelled() {
                return Err(RateLimitCause::Shutdown);
            }
            if self.limiter.add() {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RateLimitCause::Exhausted);
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(RateLimitCause::Shutdown),
                _ = sleep(self.poll_interval.min(deadline - now)) => {}
            }
        }
    }

    /// Issue one request and classify the outcome
    ///
    /// Latency is recorded whatever the outcome.
    async fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
        let start = Instant::now();
        let result = self.sender.send(&self.destination, message.clone()).await;

        let status: Cow<'static, str> = match &result {
            Ok(status) => Cow::Owned(status.to_string()),
            Err(_) => Cow::Borrowed("transport_error"),
        };
        self.metrics
            .observe_request_latency(start.elapsed(), status.as_ref());

        let outcome = match result {
            Ok(status) => classify_status(status, message),
            Err(source) => Err(DeliveryError::Transport { message, source }),
        };

        match outcome {
            Ok(()) => self.stats.inc_delivered(),
            Err(_) => self.stats.inc_failed(),
        }
        outcome
    }

    /// Hand an error to a consumer already waiting on the channel, or drop it
    fn report(&self, err: DeliveryError) {
        let result = match lock(&self.errors_tx).as_ref() {
            Some(tx) => tx.try_send(err),
            None => Err(TrySendError::Disconnected(err)),
        };

        if let Err(e) = result {
            self.stats.inc_errors_dropped();
            debug!(error = %e.into_inner(), "Dropping error, no receiver");
        }
    }
}

/// Worker loop
///
/// Exits when shutdown is signalled or the queue is closed and drained. A
/// message is dropped, with an error report, when no token is granted in
/// time.
#[instrument(name = "dispatcher_worker", skip(shared, queue))]
pub(crate) async fn run<S: RequestSender>(
    worker_id: usize,
    shared: Arc<Shared<S>>,
    queue: Receiver<Message>,
) {
    debug!("Worker started");

    loop {
        let message = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            received = queue.recv() => match received {
                Ok(message) => message,
                Err(_) => break,
            },
        };

        if let Err(cause) = shared.acquire().await {
            shared.stats.inc_rate_limited();
            shared.report(DeliveryError::RateLimited { message, cause });
            continue;
        }

        if let Err(e) = shared.deliver(message).await {
            error!(error = %e, retryable = e.is_retryable(), "Failed to send notification");
            shared.report(e);
        }
    }

    debug!("Worker stopped");
}
