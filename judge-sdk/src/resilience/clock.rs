//! Substitutable time source
//!
//! Backoff sleeps, deadlines and breaker cool-downs all read time through a
//! `Clock` so tests can drive them without waiting.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

/// Source of monotonic time and cooperative sleeps
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Suspend the calling task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by tokio's timer
///
/// Honours `tokio::time::pause` so paused-time tests work unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually driven clock for tests
///
/// Time only moves when `advance` is called. A `sleep` stays pending until
/// the clock has been advanced past its wake time, and every requested
/// duration is recorded so retry schedules can be asserted exactly.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: watch::Sender<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        let (offset, _) = watch::channel(Duration::ZERO);
        Self {
            base: Instant::now(),
            offset,
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move the clock forward, waking every sleep that is now due
    pub fn advance(&self, duration: Duration) {
        self.offset.send_modify(|offset| *offset += duration);
    }

    /// Every duration passed to `sleep` so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Total time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        *self.offset.borrow()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        let mut offset = self.offset.subscribe();
        let wake_at = *offset.borrow_and_update() + duration;
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        // The sender lives as long as `self`, so this only returns once due.
        let _ = offset.wait_for(|now| *now >= wake_at).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_manual_sleep_waits_for_advance() {
        let clock = Arc::new(ManualClock::new());
        let start = clock.now();

        let sleeper = {
            let clock = Arc::clone(&clock);
            tokio::spawn(async move { clock.sleep(Duration::from_millis(250)).await })
        };
        while clock.sleeps().is_empty() {
            tokio::task::yield_now().await;
        }

        clock.advance(Duration::from_millis(100));
        tokio::task::yield_now().await;
        assert!(!sleeper.is_finished());
        assert_eq!(clock.now() - start, Duration::from_millis(100));

        clock.advance(Duration::from_millis(150));
        sleeper.await.unwrap();
        assert_eq!(clock.now() - start, Duration::from_millis(250));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250)]);
    }

    #[tokio::test]
    async fn test_manual_sleep_never_moves_time() {
        let clock = ManualClock::new();
        clock.sleep(Duration::ZERO).await;

        let pending = tokio::time::timeout(
            Duration::from_millis(20),
            clock.sleep(Duration::from_secs(30)),
        )
        .await;
        assert!(pending.is_err());
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_respects_paused_time() {
        let clock = TokioClock;
        let start = clock.now();
        clock.sleep(Duration::from_secs(30)).await;
        assert!(clock.now() - start >= Duration::from_secs(30));
    }
}
