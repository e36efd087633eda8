//! TokenBucket - mutex-guarded token count with a background refill task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::RateLimit;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Shortest refill interval, `interval_at` panics on a zero period
const MIN_REFILL_EVERY: Duration = Duration::from_micros(1);

/// Bucket state, only touched under the lock
#[derive(Debug)]
struct BucketState {
    /// Tokens currently available (`0 <= tokens <= max`)
    tokens: u64,
    /// Capacity
    max: u64,
    /// Tokens added per refill tick
    refill_tokens: u64,
}

impl BucketState {
    fn refill(&mut self) {
        self.tokens = self.tokens.saturating_add(self.refill_tokens).min(self.max);
    }

    fn take(&mut self) -> bool {
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}

/// Token-bucket rate limiter
///
/// If 4 requests per second are allowed and one token is used up, it is
/// given back 250ms later.
///
/// A refill tick racing [`RateLimit::stop`] may still land, so one or two
/// extra admissions can be observed right around shutdown.
pub struct TokenBucket {
    state: Arc<Mutex<BucketState>>,
    refill_every: Duration,
    started: AtomicBool,
    stop: CancellationToken,
    refill_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TokenBucket {
    /// Create a bucket admitting `rps` requests per second, refilled with
    /// `refill` tokens every `1s / rps`
    ///
    /// The bucket starts full. `rps` of 0 is treated as 1, and the refill
    /// interval never drops below one microsecond.
    pub fn new(rps: u64, refill: u64) -> Self {
        let rps = rps.max(1);
        Self {
            state: Arc::new(Mutex::new(BucketState {
                tokens: rps,
                max: rps,
                refill_tokens: refill,
            })),
            refill_every: Duration::from_secs_f64(1.0 / rps as f64).max(MIN_REFILL_EVERY),
            started: AtomicBool::new(false),
            stop: CancellationToken::new(),
            refill_handle: Mutex::new(None),
        }
    }

    /// Tokens currently available
    pub fn tokens(&self) -> u64 {
        lock(&self.state).tokens
    }

    /// Bucket capacity
    pub fn capacity(&self) -> u64 {
        lock(&self.state).max
    }

    /// Interval between refill ticks
    pub fn refill_every(&self) -> Duration {
        self.refill_every
    }

    async fn refill_loop(
        state: Arc<Mutex<BucketState>>,
        every: Duration,
        stop: CancellationToken,
    ) {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => lock(&state).refill(),
            }
        }

        debug!("Rate limiter refill stopped");
    }
}

impl RateLimit for TokenBucket {
    /// Spawn the refill task on the current tokio runtime
    ///
    /// Calling it again, or after [`RateLimit::stop`], is a no-op.
    #[instrument(name = "rate_limiter_start", skip(self), fields(every = ?self.refill_every))]
    fn start(&self) {
        if self.stop.is_cancelled() || self.started.load(Ordering::SeqCst) {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "No tokio runtime, rate limiter will not refill");
                return;
            }
        };

        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let handle = runtime.spawn(Self::refill_loop(
            Arc::clone(&self.state),
            self.refill_every,
            self.stop.clone(),
        ));
        *lock(&self.refill_handle) = Some(handle);
    }

    fn add(&self) -> bool {
        lock(&self.state).take()
    }

    fn stop(&self) {
        self.stop.cancel();
        // The task observes the token on its own; the handle is only detached.
        lock(&self.refill_handle).take();
    }
}

impl Drop for TokenBucket {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
