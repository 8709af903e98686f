use core::time::Duration;

/// Backoff state for one logical retrying call.
///
/// A context is created fresh per request with [`RetryContext::new`], advanced
/// with [`RetryContext::next`] after every retryable failure, and dropped on
/// success or exhaustion. It is a plain value; nothing about it is shared
/// between requests.
///
/// `can_retry` is decided from the attempts remaining *before* a decrement, so
/// a context created with `max_retries = n` permits exactly `n` retries:
///
/// ```
/// use core::time::Duration;
/// use surrogate::RetryContext;
///
/// let mut ctx = RetryContext::new(2, Duration::from_secs(1), 2.0);
/// let mut retries = 0;
/// while ctx.can_retry() {
///     retries += 1;
///     ctx = ctx.next();
/// }
/// assert_eq!(retries, 2);
/// assert_eq!(ctx.sleep(), Duration::from_secs(4));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryContext {
    attempts: u32,
    sleep: Duration,
    multiplier: f64,
    retry: bool,
}

impl RetryContext {
    /// Creates the initial context for a request.
    pub const fn new(max_retries: u32, initial_sleep: Duration, multiplier: f64) -> Self {
        Self {
            attempts: max_retries,
            sleep: initial_sleep,
            multiplier,
            retry: max_retries > 0,
        }
    }

    /// Returns the context to use for the following attempt.
    ///
    /// Attempts are decremented (saturating at zero) and the sleep duration is
    /// scaled by the multiplier.
    #[must_use]
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace"))]
    pub fn next(self) -> Self {
        Self {
            retry: self.attempts > 1,
            attempts: self.attempts.saturating_sub(1),
            sleep: scale(self.sleep, self.multiplier),
            multiplier: self.multiplier,
        }
    }

    /// Whether another attempt may be made after a retryable failure.
    pub const fn can_retry(&self) -> bool {
        self.retry
    }

    /// Retries remaining.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// How long to wait before the next attempt.
    pub const fn sleep(&self) -> Duration {
        self.sleep
    }

    pub const fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Worst-case total wait for a fresh context: the sum of every sleep taken
    /// before the context is exhausted.
    pub fn max_total_wait(&self) -> Duration {
        let mut ctx = *self;
        let mut total = Duration::ZERO;
        while ctx.can_retry() {
            total = total.saturating_add(ctx.sleep());
            ctx = ctx.next();
        }
        total
    }
}

fn scale(sleep: Duration, multiplier: f64) -> Duration {
    // `mul_f64` panics on negative, non-finite or overflowing results.
    if !multiplier.is_finite() || multiplier < 0.0 {
        return sleep;
    }
    Duration::try_from_secs_f64(sleep.as_secs_f64() * multiplier).unwrap_or(Duration::MAX)
}
