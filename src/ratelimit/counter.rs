//! Fixed-window request counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Bounds of the window a counter is currently counting in.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    length: Duration,
}

/// Counts admitted requests within a fixed time window.
///
/// The window restarts on the first acquire after it has fully elapsed.
/// Uses the tokio clock so paused test time applies.
#[derive(Debug)]
pub struct WindowCounter {
    /// Requests admitted in the current window
    count: AtomicU64,
    /// Current window bounds
    window: Mutex<Window>,
}

impl WindowCounter {
    /// Create a counter whose first window starts now.
    pub fn new(length: Duration) -> Self {
        Self {
            count: AtomicU64::new(0),
            window: Mutex::new(Window {
                start: Instant::now(),
                length,
            }),
        }
    }

    /// Admit one request if fewer than `limit` were admitted in the current window.
    ///
    /// A rejected request is not counted. A changed `length` takes effect when
    /// the current window ends.
    pub fn try_acquire(&self, limit: u64, length: Duration) -> bool {
        let mut window = self.window.lock();
        if window.start.elapsed() >= window.length {
            self.count.store(0, Ordering::SeqCst);
            *window = Window {
                start: Instant::now(),
                length,
            };
        }

        self.count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < limit).then_some(count + 1)
            })
            .is_ok()
    }

    /// Requests admitted in the current window.
    pub fn current_count(&self) -> u64 {
        if self.is_expired() {
            return 0;
        }
        self.count.load(Ordering::SeqCst)
    }

    /// Whether the current window has fully elapsed.
    pub fn is_expired(&self) -> bool {
        let window = self.window.lock();
        window.start.elapsed() >= window.length
    }

    /// Time left until the current window ends.
    pub fn duration_until_reset(&self) -> Duration {
        let window = self.window.lock();
        window.length.saturating_sub(window.start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_limit() {
        let counter = WindowCounter::new(Duration::from_secs(1));

        assert!(counter.try_acquire(3, Duration::from_secs(1)));
        assert_eq!(counter.current_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_exceeds_limit() {
        let counter = WindowCounter::new(Duration::from_secs(1));

        for _ in 0..5 {
            assert!(counter.try_acquire(5, Duration::from_secs(1)));
        }

        // Rejections do not consume quota
        assert!(!counter.try_acquire(5, Duration::from_secs(1)));
        assert!(!counter.try_acquire(5, Duration::from_secs(1)));
        assert_eq!(counter.current_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let counter = WindowCounter::new(Duration::from_millis(100));
        assert!(counter.try_acquire(1, Duration::from_millis(100)));
        assert!(!counter.try_acquire(1, Duration::from_millis(100)));

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(!counter.try_acquire(1, Duration::from_millis(100)));
        assert_eq!(counter.duration_until_reset(), Duration::from_millis(40));

        tokio::time::advance(Duration::from_millis(40)).await;
        assert!(counter.is_expired());
        assert_eq!(counter.current_count(), 0);
        assert!(counter.try_acquire(1, Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_length_applies_to_next_window() {
        let counter = WindowCounter::new(Duration::from_millis(100));
        assert!(counter.try_acquire(1, Duration::from_secs(10)));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(counter.try_acquire(1, Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!counter.try_acquire(1, Duration::from_secs(10)));
    }
}
