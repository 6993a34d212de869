//! In-memory fixed-window rate oracle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::counter::WindowCounter;
use super::oracle::RateOracle;
use crate::key::CallIdentity;

/// A [`RateOracle`] keeping one fixed-window counter per key in memory.
///
/// This struct is thread-safe and can be shared across multiple tasks.
#[derive(Debug, Default)]
pub struct FixedWindowOracle {
    /// Counters indexed by call key
    counters: DashMap<CallIdentity, WindowCounter>,
}

impl FixedWindowOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests admitted for `key` in its current window.
    ///
    /// Returns `None` if no counter exists for the key.
    pub fn current_count(&self, key: &CallIdentity) -> Option<u64> {
        self.counters.get(key).map(|c| c.current_count())
    }

    /// Get the number of active counters.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }

    /// Drop counters whose window has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_expired());
        let removed = before.saturating_sub(self.counters.len());
        if removed > 0 {
            debug!(removed, remaining = self.counters.len(), "Purged expired counters");
        }
        removed
    }

    /// Purge expired counters every `every` until `token` is cancelled.
    pub fn spawn_cleanup(
        self: Arc<Self>,
        every: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        self.purge_expired();
                    }
                }
            }
        })
    }
}

#[async_trait]
impl RateOracle for FixedWindowOracle {
    async fn check(&self, key: &CallIdentity, max_requests: u64, interval: Duration) -> bool {
        let allowed = match self.counters.get(key) {
            Some(counter) => counter.try_acquire(max_requests, interval),
            None => {
                let counter = self.counters.entry(key.clone()).or_insert_with(|| {
                    debug!(
                        key = %key,
                        max_requests,
                        interval = ?interval,
                        "Creating window counter"
                    );
                    WindowCounter::new(interval)
                });
                counter.try_acquire(max_requests, interval)
            }
        };

        trace!(key = %key, allowed, "Checked fixed window");
        allowed
    }
}
