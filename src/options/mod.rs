//! Effective limiting options and their resolution.

mod declared;
mod rules;

pub use declared::DeclaredOptionsResolver;
pub use rules::{IntervalSpec, LimitRule, RetryRule, RuleOptionsResolver, RulesConfig, TimeUnit};

use std::time::Duration;

use crate::call::{CallContext, DeclaredLimit};
use crate::error::ResolveError;
use crate::key::CallIdentity;

/// Blocking retry policy applied when the oracle rejects a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub retry_count: u32,
    /// Pause between consecutive attempts
    pub retry_interval: Duration,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, retry_interval: Duration) -> Self {
        Self {
            retry_count,
            retry_interval,
        }
    }
}

/// Effective limiting configuration for one call.
///
/// `blocked` dominates everything; `enabled == false` skips rate checking
/// but still lets the call through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOptions {
    pub enabled: bool,
    pub blocked: bool,
    pub max_requests: u64,
    pub interval: Duration,
    pub retry: Option<RetryPolicy>,
}

impl LimitOptions {
    /// Total number of oracle checks a decision may perform, first one included.
    pub fn attempts_allowed(&self) -> u64 {
        self.retry.map_or(1, |retry| u64::from(retry.retry_count) + 1)
    }

    /// Check the quota constraints for options that will reach the oracle.
    pub fn validate(&self, key: &CallIdentity) -> Result<(), ResolveError> {
        if self.blocked || !self.enabled {
            return Ok(());
        }

        let invalid = |reason: &str| ResolveError::InvalidOptions {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if self.max_requests == 0 {
            return Err(invalid("max_requests must be greater than zero"));
        }
        if self.interval.is_zero() {
            return Err(invalid("interval must be greater than zero"));
        }
        Ok(())
    }
}

impl From<&DeclaredLimit> for LimitOptions {
    fn from(declared: &DeclaredLimit) -> Self {
        Self {
            enabled: declared.enabled,
            blocked: declared.blocked,
            max_requests: declared.max_requests,
            interval: declared.interval,
            retry: declared.retry,
        }
    }
}

/// Strategy deriving the effective [`LimitOptions`] for a call.
pub trait OptionsResolver: Send + Sync {
    /// Resolve options for `call`, already identified by `key`.
    fn resolve(
        &self,
        key: &CallIdentity,
        call: &CallContext,
    ) -> Result<LimitOptions, ResolveError>;
}

impl<F> OptionsResolver for F
where
    F: Fn(&CallIdentity, &CallContext) -> Result<LimitOptions, ResolveError> + Send + Sync,
{
    fn resolve(
        &self,
        key: &CallIdentity,
        call: &CallContext,
    ) -> Result<LimitOptions, ResolveError> {
        self(key, call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(retry: Option<RetryPolicy>) -> LimitOptions {
        LimitOptions {
            enabled: true,
            blocked: false,
            max_requests: 10,
            interval: Duration::from_secs(1),
            retry,
        }
    }

    #[test]
    fn test_attempts_allowed_without_retry() {
        assert_eq!(options(None).attempts_allowed(), 1);
    }

    #[test]
    fn test_attempts_allowed_counts_first_attempt() {
        let zero = options(Some(RetryPolicy::new(0, Duration::from_millis(10))));
        assert_eq!(zero.attempts_allowed(), 1);

        let two = options(Some(RetryPolicy::new(2, Duration::from_millis(10))));
        assert_eq!(two.attempts_allowed(), 3);

        let max = options(Some(RetryPolicy::new(u32::MAX, Duration::from_millis(10))));
        assert_eq!(max.attempts_allowed(), u64::from(u32::MAX) + 1);
    }

    #[test]
    fn test_validate_rejects_zero_quota() {
        let key = CallIdentity::new("k");
        let mut opts = options(None);
        opts.max_requests = 0;
        assert!(matches!(
            opts.validate(&key),
            Err(ResolveError::InvalidOptions { .. })
        ));

        let mut opts = options(None);
        opts.interval = Duration::ZERO;
        assert!(opts.validate(&key).is_err());
    }

    #[test]
    fn test_validate_skips_unchecked_options() {
        let key = CallIdentity::new("k");
        let mut opts = options(None);
        opts.max_requests = 0;
        opts.enabled = false;
        assert!(opts.validate(&key).is_ok());

        opts.enabled = true;
        opts.blocked = true;
        assert!(opts.validate(&key).is_ok());
    }
}
