//! TimedBuffer - lock-guarded accumulator drained by a ticker task

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use flume::{Receiver, Sender, TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::error::BufferError;

/// An ordered snapshot of accumulated items, flushed once per tick
pub type Batch<T> = Vec<T>;

/// Shortest accepted flush interval
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Rendezvous: a batch is handed over only to a receiver already waiting
const FLUSH_CHANNEL_CAPACITY: usize = 0;

struct Accumulator<T> {
    items: Vec<T>,
    closed: bool,
}

/// Buffer flushed on a fixed interval
///
/// Items appended between two ticks are handed off together as one [`Batch`].
/// [`TimedBuffer::close`] must be called to stop the ticker task; dropping
/// the buffer also stops it.
pub struct TimedBuffer<T> {
    acc: Arc<Mutex<Accumulator<T>>>,
    max_size: usize,
    interval: Duration,
    flush_rx: Receiver<Batch<T>>,
    stop: CancellationToken,
    flush_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T> fmt::Debug for TimedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedBuffer")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .field("interval", &self.interval)
            .finish()
    }
}

impl<T: Send + 'static> TimedBuffer<T> {
    /// Create a buffer flushed every `interval`, holding at most `max_size`
    /// items between flushes
    ///
    /// Spawns the flush task, so it must be called from within a tokio
    /// runtime.
    pub fn new(interval: Duration, max_size: usize) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        let acc = Arc::new(Mutex::new(Accumulator {
            items: Vec::new(),
            closed: false,
        }));
        let (flush_tx, flush_rx) = flume::bounded(FLUSH_CHANNEL_CAPACITY);
        let stop = CancellationToken::new();

        let handle = tokio::spawn(flush_loop(
            Arc::clone(&acc),
            interval,
            flush_tx,
            stop.clone(),
        ));

        Self {
            acc,
            max_size,
            interval,
            flush_rx,
            stop,
            flush_handle: Mutex::new(Some(handle)),
        }
    }
}

impl<T> TimedBuffer<T> {
    /// Append items to the accumulation
    ///
    /// The whole call is rejected when it would exceed the maximum size; the
    /// existing accumulation is left untouched. Empty appends are a no-op.
    pub fn append(&self, items: impl IntoIterator<Item = T>) -> Result<(), BufferError> {
        let items: Vec<T> = items.into_iter().collect();
        let mut acc = lock(&self.acc);

        if acc.closed {
            return Err(BufferError::Closed);
        }
        if items.is_empty() {
            return Ok(());
        }
        if acc.items.len() + items.len() > self.max_size {
            return Err(BufferError::CapacityExceeded {
                max: self.max_size,
                current: acc.items.len(),
                requested: items.len(),
            });
        }

        acc.items.extend(items);
        Ok(())
    }

    /// Channel on which non-empty batches are delivered, one per tick
    ///
    /// A batch reaches only a receiver already waiting in `recv_async`; when
    /// none is, the batch is dropped. The channel disconnects once the buffer
    /// is closed.
    pub fn flush_channel(&self) -> Receiver<Batch<T>> {
        self.flush_rx.clone()
    }

    /// Take the current accumulation without waiting for the next tick
    pub fn drain(&self) -> Batch<T> {
        std::mem::take(&mut lock(&self.acc).items)
    }

    /// Items currently accumulated
    pub fn len(&self) -> usize {
        lock(&self.acc).items.len()
    }

    /// Whether nothing is accumulated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum items held between flushes
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Stop the ticker and the flush task, closing the flush channel
    ///
    /// Items still accumulated are not flushed; use [`TimedBuffer::drain`]
    /// first to keep them.
    #[instrument(name = "timed_buffer_close", skip(self))]
    pub fn close(&self) {
        {
            let mut acc = lock(&self.acc);
            acc.closed = true;
            if !acc.items.is_empty() {
                warn!(discarded = acc.items.len(), "Closing with unflushed items");
            }
        }
        self.stop.cancel();
        lock(&self.flush_handle).take();
        debug!("Timed buffer closed");
    }
}

impl<T> Drop for TimedBuffer<T> {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Ticker task: on each tick, swap the accumulation out under the lock and
/// offer it on the flush channel without blocking
async fn flush_loop<T>(
    acc: Arc<Mutex<Accumulator<T>>>,
    every: Duration,
    flush_tx: Sender<Batch<T>>,
    stop: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => flush(&acc, &flush_tx),
        }
    }

    // Dropping the only sender disconnects the channel for receivers.
    drop(flush_tx);
    debug!("Timed buffer flush loop stopped");
}

fn flush<T>(acc: &Mutex<Accumulator<T>>, flush_tx: &Sender<Batch<T>>) {
    let batch = std::mem::take(&mut lock(acc).items);
    if batch.is_empty() {
        return;
    }

    let size = batch.len();
    match flush_tx.try_send(batch) {
        Ok(()) => trace!(size, "Batch flushed"),
        Err(TrySendError::Full(_)) => warn!(size, "No receiver ready, batch dropped"),
        Err(TrySendError::Disconnected(_)) => {
            debug!(size, "Flush channel closed, batch dropped")
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    #[tokio::test(start_paused = true)]
    async fn test_single_message() {
        let tb = TimedBuffer::new(Duration::from_secs(3), 100);

        tb.append(["hello"]).unwrap();

        let batch = tb.flush_channel().recv_async().await.unwrap();
        assert_eq!(batch, vec!["hello"]);

        tb.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_messages_keep_insertion_order() {
        let tb = TimedBuffer::new(Duration::from_secs(3), 100);
        let msgs = vec!["a", "b", "c", "d", "e"];

        tb.append(msgs.clone()).unwrap();
        assert_eq!(tb.len(), 5);

        let batch = tb.flush_channel().recv_async().await.unwrap();
        assert_eq!(batch, msgs);
        assert!(tb.is_empty());

        tb.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_batches() {
        let tb = Arc::new(TimedBuffer::new(Duration::from_secs(5), 100));
        let rx = tb.flush_channel();

        let producer = {
            let tb = Arc::clone(&tb);
            tokio::spawn(async move {
                let start = Instant::now() + Duration::from_millis(500);
                let mut ticker = interval_at(start, Duration::from_secs(1));
                loop {
                    ticker.tick().await;
                    if tb.append(["msg"]).is_err() {
                        return;
                    }
                }
            })
        };

        let consumer = tokio::spawn(async move {
            let mut batches = Vec::new();
            while let Ok(batch) = rx.recv_async().await {
                batches.push(batch);
            }
            batches
        });

        sleep(Duration::from_millis(22_500)).await;
        tb.close();

        let batches = consumer.await.unwrap();
        producer.await.unwrap();

        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.len() == 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_buffer_size() {
        let tb = TimedBuffer::new(Duration::from_secs(3), 5);
        let msgs = vec!["1", "2", "3", "4", "5"];
        for msg in &msgs {
            tb.append([*msg]).unwrap();
        }

        let err = tb.append(["msg"]).unwrap_err();
        assert_eq!(
            err,
            BufferError::CapacityExceeded {
                max: 5,
                current: 5,
                requested: 1
            }
        );

        let flushed = tb.flush_channel().recv_async().await.unwrap();
        tb.close();

        assert_eq!(flushed, msgs);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_append_never_happens() {
        let tb = TimedBuffer::new(Duration::from_secs(3), 3);
        tb.append(["a", "b"]).unwrap();

        assert!(tb.append(["c", "d"]).is_err());
        assert_eq!(tb.drain(), vec!["a", "b"]);

        tb.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_messages_no_flush() {
        let tb: TimedBuffer<String> = TimedBuffer::new(Duration::from_secs(3), 10);

        let result = timeout(Duration::from_secs(5), tb.flush_channel().into_recv_async()).await;
        assert!(result.is_err(), "expected no batch");

        tb.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_empties_accumulation() {
        let tb = TimedBuffer::new(Duration::from_secs(3), 10);
        tb.append(["x", "y"]).unwrap();

        assert_eq!(tb.drain(), vec!["x", "y"]);

        let result = timeout(Duration::from_secs(4), tb.flush_channel().into_recv_async()).await;
        assert!(result.is_err());

        tb.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_rejects_appends_and_closes_channel() {
        let tb = TimedBuffer::new(Duration::from_secs(1), 10);
        let rx = tb.flush_channel();

        tb.close();

        assert_eq!(tb.append(["late"]), Err(BufferError::Closed));
        assert!(rx.recv_async().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_dropped_without_waiting_receiver() {
        let tb = TimedBuffer::new(Duration::from_secs(1), 10);
        let rx = tb.flush_channel();

        // Nobody is receiving at the first tick.
        tb.append(["first"]).unwrap();
        sleep(Duration::from_millis(1_500)).await;
        assert!(rx.try_recv().is_err());
        assert!(tb.is_empty());

        tb.append(["second"]).unwrap();
        assert_eq!(rx.recv_async().await.unwrap(), vec!["second"]);

        tb.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_not_held_for_late_receiver() {
        let tb = TimedBuffer::new(Duration::from_secs(1), 10);
        let rx = tb.flush_channel();

        tb.append(["stale"]).unwrap();
        sleep(Duration::from_secs(60)).await;

        let late = timeout(Duration::from_millis(500), rx.recv_async()).await;
        assert!(late.is_err(), "expected no batch, got {late:?}");

        tb.close();
    }
}
