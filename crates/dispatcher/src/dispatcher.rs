//! Dispatcher - bounded queue, worker pool, rate limiter and graceful shutdown

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_channel::{Receiver, Sender, TrySendError};
use contracts::{Message, MetricsSink, NoopMetrics, RateLimit, RequestSender};
use rate_limiter::TokenBucket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, instrument, warn, Dispatch};

use crate::config::DispatcherConfig;
use crate::error::{DeliveryError, EnqueueError, ShutdownError};
use crate::metrics::{DeliveryStats, StatsSnapshot};
use crate::sender::HttpSender;
use crate::worker::{self, Shared};

/// Rendezvous: a report is handed over only to a receiver already waiting
const ERROR_CHANNEL_CAPACITY: usize = 0;

/// Builder for creating a Dispatcher
///
/// Options are applied in call order; the last one touching a field wins.
/// The queue is sized from the final configuration in [`DispatcherBuilder::build`].
pub struct DispatcherBuilder<S = HttpSender> {
    destination: String,
    config: DispatcherConfig,
    sender: S,
    limiter: Option<Arc<dyn RateLimit>>,
    metrics: Arc<dyn MetricsSink>,
    logger: Dispatch,
}

impl DispatcherBuilder<HttpSender> {
    /// Create a builder delivering to `destination` with default settings
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            config: DispatcherConfig::default(),
            sender: HttpSender::new(),
            limiter: None,
            metrics: Arc::new(NoopMetrics),
            logger: Dispatch::none(),
        }
    }
}

impl<S> DispatcherBuilder<S> {
    /// Replace the request sender (custom HTTP client, instrumented
    /// transport, test double)
    pub fn with_sender<T: RequestSender>(self, sender: T) -> DispatcherBuilder<T> {
        DispatcherBuilder {
            destination: self.destination,
            config: self.config,
            sender,
            limiter: self.limiter,
            metrics: self.metrics,
            logger: self.logger,
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the queue capacity
    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.config.max_buffer_size = size;
        self
    }

    /// Set the number of workers
    pub fn with_max_concurrency(mut self, workers: usize) -> Self {
        self.config.max_concurrency = workers;
        self
    }

    /// Set the grace period allowed for `stop`
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// Set the retry hint carried by queue-full errors
    pub fn with_enqueue_retry_after(mut self, retry_after: Duration) -> Self {
        self.config.enqueue_retry_after = retry_after;
        self
    }

    /// Set how long a worker waits for a rate-limit token
    pub fn with_rate_limit_retry(mut self, retry: Duration) -> Self {
        self.config.rate_limit_retry = retry;
        self
    }

    /// Use a custom rate limiter
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimit>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Use the default token bucket with the given rate and refill amount,
    /// replacing any custom rate limiter
    pub fn with_max_rps_and_refill(mut self, rps: u64, refill: u64) -> Self {
        self.config.max_rps = rps;
        self.config.refill_tokens = refill;
        self.limiter = None;
        self
    }

    /// Report metrics to `metrics` instead of discarding them
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Send dispatcher log events to `logger` instead of discarding them
    pub fn with_logger(mut self, logger: impl Into<Dispatch>) -> Self {
        self.logger = logger.into();
        self
    }

    /// Current configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }
}

impl<S: RequestSender + Sync + 'static> DispatcherBuilder<S> {
    /// Build the dispatcher; call [`Dispatcher::start`] to begin delivering
    pub fn build(self) -> Dispatcher<S> {
        let mut config = self.config;
        if config.max_buffer_size == 0 {
            warn!("max_buffer_size of 0 raised to 1");
            config.max_buffer_size = 1;
        }
        if config.max_concurrency == 0 {
            warn!("max_concurrency of 0 raised to 1");
            config.max_concurrency = 1;
        }

        let limiter = self.limiter.unwrap_or_else(|| {
            Arc::new(TokenBucket::new(config.max_rps, config.refill_tokens))
        });
        let (queue_tx, queue_rx) = async_channel::bounded(config.max_buffer_size);
        let (errors_tx, errors_rx) = flume::bounded(ERROR_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            destination: self.destination,
            sender: self.sender,
            limiter,
            metrics: self.metrics,
            stats: Arc::new(DeliveryStats::new()),
            errors_tx: Mutex::new(Some(errors_tx)),
            shutdown: CancellationToken::new(),
            rate_limit_retry: config.rate_limit_retry,
            poll_interval: config.rate_limit_poll_interval,
        });

        Dispatcher {
            config,
            shared,
            queue_tx,
            queue_rx,
            errors_rx,
            workers: Mutex::new(Vec::new()),
            logger: self.logger,
        }
    }
}

/// Rate-limited, concurrent notification dispatcher
///
/// Producers call [`Dispatcher::enqueue`], which never blocks: a full queue
/// is reported immediately as a temporary error. Workers deliver each message
/// as one request and report failures on [`Dispatcher::errors`]. An accepted
/// message is not a delivered one.
pub struct Dispatcher<S = HttpSender> {
    config: DispatcherConfig,
    shared: Arc<Shared<S>>,
    queue_tx: Sender<Message>,
    queue_rx: Receiver<Message>,
    errors_rx: flume::Receiver<DeliveryError>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    logger: Dispatch,
}

impl Dispatcher<HttpSender> {
    /// Dispatcher with default settings delivering to `destination`
    pub fn new(destination: impl Into<String>) -> Self {
        DispatcherBuilder::new(destination).build()
    }

    /// Start building a dispatcher delivering to `destination`
    pub fn builder(destination: impl Into<String>) -> DispatcherBuilder<HttpSender> {
        DispatcherBuilder::new(destination)
    }
}

impl<S: RequestSender + Sync + 'static> Dispatcher<S> {
    /// Enqueue messages for delivery
    ///
    /// Succeeds only if every message was accepted. Stops at the first
    /// rejection and returns it; messages before it stay queued.
    pub fn enqueue<I>(&self, messages: I) -> Result<(), EnqueueError>
    where
        I: IntoIterator,
        I::Item: Into<Message>,
    {
        let _log = tracing::dispatcher::set_default(&self.logger);

        for message in messages {
            let message = message.into();
            let size = message.len();

            match self.queue_tx.try_send(message) {
                Ok(()) => {
                    self.shared.stats.inc_enqueued();
                    debug!(bytes = size, "Queuing message");
                }
                Err(TrySendError::Full(message)) => {
                    self.shared.metrics.inc_enqueue_failures();
                    self.shared.stats.inc_enqueue_failures();
                    info!(bytes = size, "Failed to enqueue message, queue full");
                    return Err(EnqueueError::QueueFull {
                        message,
                        retry_after: self.config.enqueue_retry_after,
                    });
                }
                Err(TrySendError::Closed(message)) => {
                    self.shared.metrics.inc_enqueue_failures();
                    self.shared.stats.inc_enqueue_failures();
                    warn!(bytes = size, "Failed to enqueue message, dispatcher stopped");
                    return Err(EnqueueError::Closed { message });
                }
            }
        }

        Ok(())
    }

    /// Launch the worker pool and the rate limiter refill
    ///
    /// Must be called once, from within a tokio runtime. Calling it again
    /// launches a second set of workers.
    pub fn start(&self) {
        let _log = tracing::dispatcher::set_default(&self.logger);
        info!(
            workers = self.config.max_concurrency,
            max_buffer_size = self.config.max_buffer_size,
            sender = self.shared.sender.name(),
            "Starting message consuming"
        );

        self.shared
            .metrics
            .set_max_buffer_size(self.config.max_buffer_size);
        self.shared.limiter.start();

        let mut workers = lock(&self.workers);
        for worker_id in 0..self.config.max_concurrency {
            let task = worker::run(worker_id, Arc::clone(&self.shared), self.queue_rx.clone());
            workers.push(tokio::spawn(task.with_subscriber(self.logger.clone())));
        }
    }

    /// Gracefully shut down
    ///
    /// Stops the rate limiter, signals every worker, and waits for them for at
    /// most the grace period. The error channel is disconnected and the message
    /// queue closed in every case. On timeout, workers still sending are left to finish on
    /// their own and the dispatcher must not be used again.
    pub async fn stop(&self) -> Result<(), ShutdownError> {
        self.shutdown().with_subscriber(self.logger.clone()).await
    }

    #[instrument(name = "dispatcher_stop", skip(self))]
    async fn shutdown(&self) -> Result<(), ShutdownError> {
        self.shared.limiter.stop();
        self.shared.shutdown.cancel();

        let workers = std::mem::take(&mut *lock(&self.workers));
        let result = wait_with_timeout(workers, self.config.shutdown_grace).await;

        lock(&self.shared.errors_tx).take();
        self.queue_tx.close();

        match &result {
            Ok(()) => info!("Dispatcher stopped"),
            Err(e) => warn!(error = %e, "Dispatcher stopped"),
        }
        result
    }
}

impl<S> Dispatcher<S> {
    /// Delivery errors, best effort
    ///
    /// A report reaches only a receiver already waiting in `recv_async`;
    /// reports made while nobody is receiving are dropped, never held for a
    /// later consumer. The channel disconnects on `stop`.
    pub fn errors(&self) -> flume::Receiver<DeliveryError> {
        self.errors_rx.clone()
    }

    /// Messages waiting in the queue
    pub fn queue_len(&self) -> usize {
        self.queue_tx.len()
    }

    /// Effective configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Destination every message is sent to
    pub fn destination(&self) -> &str {
        &self.shared.destination
    }

    /// Snapshot of delivery counters
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

/// Wait for every worker, bounded by `grace`
///
/// Workers still running when the grace period ends are detached, not
/// aborted.
async fn wait_with_timeout(
    workers: Vec<JoinHandle<()>>,
    grace: Duration,
) -> Result<(), ShutdownError> {
    let join_all = async move {
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = ?e, "Worker task panicked");
            }
        }
    };

    tokio::time::timeout(grace, join_all)
        .await
        .map_err(|_| ShutdownError::GracePeriodExceeded { grace })
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
