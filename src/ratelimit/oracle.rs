//! Rate oracle trait for abstracting counting strategies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::key::CallIdentity;

/// Reports whether a call is within its quota.
///
/// Each `check` records consumption against the key's quota when it answers
/// `true`. Implementations must be safe to call concurrently for the same key;
/// the admission controller does no locking of its own.
#[async_trait]
pub trait RateOracle: Send + Sync {
    /// Check one request for `key` against `max_requests` per `interval`.
    async fn check(&self, key: &CallIdentity, max_requests: u64, interval: Duration) -> bool;
}

#[async_trait]
impl<T: RateOracle + ?Sized> RateOracle for Arc<T> {
    async fn check(&self, key: &CallIdentity, max_requests: u64, interval: Duration) -> bool {
        (**self).check(key, max_requests, interval).await
    }
}
