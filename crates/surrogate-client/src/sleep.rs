use core::time::Duration;

/// Blocks the calling thread between retry attempts.
///
/// The wait is backpressure on the service, so implementations must really
/// block. Tests substitute a recorder to keep retries instant.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, dur: Duration);
}

/// Sleeps with [`std::thread::sleep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}
