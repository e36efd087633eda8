//! Notifier - wires stdin, the batching buffer and the dispatcher together.

use std::future::Future;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use contracts::{Message, RequestSender};
use dispatcher::{Dispatcher, HttpSender, ShutdownError, StatsSnapshot};
use flume::{Receiver, Sender};
use timed_buffer::{Batch, TimedBuffer};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause between two checks of the queue while draining
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lines read ahead of the scanner
const LINE_CHANNEL_CAPACITY: usize = 1_024;

/// Read stdin on a dedicated thread and hand every line over a channel
///
/// A blocking stdin read cannot be cancelled, so the thread is detached and
/// ends with the process. It stops early once the receiver is dropped.
pub fn spawn_stdin_reader() -> std::io::Result<Receiver<String>> {
    let (tx, rx) = flume::bounded(LINE_CHANNEL_CAPACITY);
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || read_lines(std::io::stdin().lock(), tx))?;
    Ok(rx)
}

/// Forward lines until EOF, a read error, or the receiver going away
fn read_lines<R: BufRead>(reader: R, lines: Sender<String>) {
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if lines.send(line).is_err() {
                    debug!("Input closed, stop reading");
                    return;
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read input");
                return;
            }
        }
    }
    debug!("Input reached EOF");
}

/// Reads lines, batches them and hands every batch to the dispatcher
pub struct Notifier<S = HttpSender> {
    dispatcher: Arc<Dispatcher<S>>,
    buffer: Arc<TimedBuffer<Message>>,
    grace: Duration,
}

impl<S: RequestSender + Sync + 'static> Notifier<S> {
    pub fn new(dispatcher: Dispatcher<S>, buffer: TimedBuffer<Message>) -> Self {
        let grace = dispatcher.config().shutdown_grace;
        Self {
            dispatcher: Arc::new(dispatcher),
            buffer: Arc::new(buffer),
            grace,
        }
    }

    /// Run until `shutdown` resolves or every `input` sender is gone, then
    /// shut down
    ///
    /// Input stops being read before the drain starts. Lines already
    /// accumulated are forwarded before the dispatcher is stopped.
    pub async fn run<F>(
        self,
        input: Receiver<String>,
        shutdown: F,
    ) -> Result<StatsSnapshot, ShutdownError>
    where
        F: Future<Output = ()>,
    {
        self.dispatcher.start();

        let errors = self.spawn_error_logger();
        let mut scanner = tokio::spawn(scan(input, Arc::clone(&self.buffer)));
        let flushes = self.buffer.flush_channel();

        info!(destination = self.dispatcher.destination(), "Waiting for messages");
        tokio::pin!(shutdown);

        let input_exhausted = loop {
            tokio::select! {
                batch = flushes.recv_async() => match batch {
                    Ok(batch) => self.forward(batch),
                    Err(_) => break false,
                },
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping notifier...");
                    break false;
                }
                _ = &mut scanner => {
                    info!("Input exhausted, stopping notifier...");
                    break true;
                }
            }
        };

        if !input_exhausted {
            scanner.abort();
            if let Err(e) = scanner.await {
                if !e.is_cancelled() {
                    error!(error = ?e, "Scanner task failed");
                }
            }
        }

        let result = self.stop().await;

        if let Err(e) = errors.await {
            error!(error = ?e, "Error logger task failed");
        }

        result.map(|()| self.dispatcher.stats())
    }

    fn spawn_error_logger(&self) -> JoinHandle<()> {
        let errors = self.dispatcher.errors();
        tokio::spawn(async move {
            while let Ok(e) = errors.recv_async().await {
                warn!(error = %e, retryable = e.is_retryable(), "Client error");
            }
        })
    }

    fn forward(&self, batch: Batch<Message>) {
        if batch.is_empty() {
            return;
        }

        debug!(messages = batch.len(), "Sending messages");
        if let Err(e) = self.dispatcher.enqueue(batch) {
            warn!(
                error = %e,
                retry_after = ?e.retry_after(),
                "Message queue error"
            );
        }
    }

    /// Forward what is left, give the queue up to the grace period to empty,
    /// then stop the buffer and the dispatcher
    async fn stop(&self) -> Result<(), ShutdownError> {
        self.forward(self.buffer.drain());

        let drained = tokio::time::timeout(self.grace, async {
            while self.dispatcher.queue_len() > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                pending = self.dispatcher.queue_len(),
                "Queue not drained within grace period"
            );
        }

        self.buffer.close();
        info!("Stopping notifier...");
        self.dispatcher.stop().await
    }
}

/// Append every input line to the buffer until the input closes
async fn scan(lines: Receiver<String>, buffer: Arc<TimedBuffer<Message>>) {
    info!("Reading stdin...");
    while let Ok(line) = lines.recv_async().await {
        if let Err(e) = buffer.append([Message::from(line)]) {
            warn!(error = %e, "Buffer append failed");
        }
    }
}
