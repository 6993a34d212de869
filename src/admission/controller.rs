//! The admission controller.
//!
//! For every intercepted call the controller resolves a key, resolves the
//! effective options for that key, and then either short-circuits (blocked or
//! disabled) or runs a bounded check/wait loop against the rate oracle.
//!
//! The loop performs at most `retry_count + 1` oracle checks. Waits happen only
//! between two checks: never before the first, never after the last. A
//! cancellation observed during a wait ends the decision with
//! [`Rejection::Interrupted`] and no further checks.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::outcome::{AdmissionOutcome, GuardError, Rejection};
use super::wait::{RetryWait, TokioWait, WaitOutcome};
use crate::call::CallContext;
use crate::error::ResolveError;
use crate::key::{CallIdentity, KeyResolver};
use crate::options::{LimitOptions, OptionsResolver};
use crate::ratelimit::RateOracle;

/// Decides whether intercepted calls may proceed.
///
/// Holds no per-call state, so a single controller can be shared across tasks.
/// Quota consistency for concurrent calls on the same key is the oracle's job.
pub struct AdmissionController {
    keys: Arc<dyn KeyResolver>,
    options: Arc<dyn OptionsResolver>,
    oracle: Arc<dyn RateOracle>,
    wait: Arc<dyn RetryWait>,
    /// Cancels every in-flight retry wait when fired
    shutdown: CancellationToken,
}

impl AdmissionController {
    /// Create a controller from its three collaborators, waiting on the tokio timer.
    pub fn new(
        keys: Arc<dyn KeyResolver>,
        options: Arc<dyn OptionsResolver>,
        oracle: Arc<dyn RateOracle>,
    ) -> Self {
        Self {
            keys,
            options,
            oracle,
            wait: Arc::new(TokioWait),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the retry wait primitive.
    pub fn with_wait(mut self, wait: Arc<dyn RetryWait>) -> Self {
        self.wait = wait;
        self
    }

    /// Tie all retry waits to `token`.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Token that interrupts every retry wait of this controller when cancelled.
    ///
    /// Cancelling it is permanent: later decisions that need to wait are
    /// rejected as interrupted.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Decide whether `call` may proceed.
    ///
    /// Key and options are resolved afresh on every call. Resolver failures are
    /// returned as-is.
    #[instrument(skip(self, call), fields(target_op = %call.target()))]
    pub async fn decide(&self, call: &CallContext) -> Result<AdmissionOutcome, ResolveError> {
        let key = self.keys.resolve(call)?;
        let options = self.options.resolve(&key, call)?;

        debug!(
            key = %key,
            enabled = options.enabled,
            blocked = options.blocked,
            max_requests = options.max_requests,
            interval = ?options.interval,
            retry = ?options.retry,
            "Resolved limit options"
        );

        if options.blocked {
            warn!(key = %key, "Call blocked by configuration");
            return Ok(AdmissionOutcome::Rejected(Rejection::Blocked { key }));
        }

        if !options.enabled {
            debug!(key = %key, "Rate limiting disabled, skipping checks");
            return Ok(AdmissionOutcome::Proceed);
        }

        Ok(self.run_checks(key, &options, call.cancellation()).await)
    }

    /// The bounded check/wait loop.
    async fn run_checks(
        &self,
        key: CallIdentity,
        options: &LimitOptions,
        cancellation: &CancellationToken,
    ) -> AdmissionOutcome {
        let attempts_allowed = options.attempts_allowed();
        let mut remaining = attempts_allowed;
        let mut attempts = 0;

        while remaining > 0 {
            attempts += 1;
            if self
                .oracle
                .check(&key, options.max_requests, options.interval)
                .await
            {
                debug!(key = %key, attempts, "Call admitted");
                return AdmissionOutcome::Proceed;
            }

            remaining -= 1;
            if remaining == 0 {
                break;
            }

            if let Some(retry) = options.retry {
                debug!(
                    key = %key,
                    attempts,
                    remaining,
                    retry_interval = ?retry.retry_interval,
                    "Rate limit hit, waiting before retry"
                );
                let outcome = self
                    .wait
                    .wait(retry.retry_interval, cancellation, &self.shutdown)
                    .await;
                if outcome == WaitOutcome::Cancelled {
                    warn!(key = %key, attempts, "Execution retry was interrupted");
                    return AdmissionOutcome::Rejected(Rejection::Interrupted { key, attempts });
                }
            }
        }

        warn!(key = %key, attempts = attempts_allowed, "Rate limit has been exceeded");
        AdmissionOutcome::Rejected(Rejection::LimitExceeded {
            key,
            attempts: attempts_allowed,
        })
    }

    /// Run `operation` if admission control lets `call` through.
    ///
    /// The operation runs at most once and its result is returned untouched.
    /// It never runs when the call is rejected or cannot be evaluated.
    pub async fn guard<F, Fut, T, E>(
        &self,
        call: &CallContext,
        operation: F,
    ) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.decide(call).await.map_err(GuardError::Resolve)? {
            AdmissionOutcome::Proceed => operation().await.map_err(GuardError::Operation),
            AdmissionOutcome::Rejected(rejection) => Err(GuardError::Rejected(rejection)),
        }
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("shutdown_cancelled", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}
