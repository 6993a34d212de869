//! The intercepted call as seen by the admission controller.
//!
//! A [`CallContext`] bundles everything the collaborators need: the name of
//! the guarded operation, the limits declared for it, its arguments and a
//! cancellation token for the caller.

use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::options::RetryPolicy;

/// Rate limiting metadata declared for a guarded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredLimit {
    /// Static key for the rate limit bucket
    pub key: Option<String>,
    /// Key template rendered from call arguments; wins over `key`
    pub key_template: Option<String>,
    /// Whether rate checking applies at all
    pub enabled: bool,
    /// Unconditionally reject the call
    pub blocked: bool,
    /// Maximum requests per interval
    pub max_requests: u64,
    /// Length of the quota window
    pub interval: Duration,
    /// Blocking retry policy, if any
    pub retry: Option<RetryPolicy>,
}

impl DeclaredLimit {
    /// Declare an enabled limit of `max_requests` per `interval` with no retry.
    pub fn new(max_requests: u64, interval: Duration) -> Self {
        Self {
            key: None,
            key_template: None,
            enabled: true,
            blocked: false,
            max_requests,
            interval,
            retry: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_key_template(mut self, template: impl Into<String>) -> Self {
        self.key_template = Some(template.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_blocked(mut self, blocked: bool) -> Self {
        self.blocked = blocked;
        self
    }
}

/// One intercepted invocation of a guarded operation.
#[derive(Debug, Clone)]
pub struct CallContext {
    target: String,
    declared: DeclaredLimit,
    args: Map<String, Value>,
    cancellation: CancellationToken,
}

impl CallContext {
    /// Create a call for `target` with the given declared limits.
    ///
    /// The call gets its own cancellation token; replace it with
    /// [`with_cancellation`](Self::with_cancellation) to tie retries to a
    /// caller-owned token.
    pub fn new(target: impl Into<String>, declared: DeclaredLimit) -> Self {
        Self {
            target: target.into(),
            declared,
            args: Map::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Attach a named argument.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Name of the guarded operation.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn declared(&self) -> &DeclaredLimit {
        &self.declared
    }

    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Look up an argument by dotted path, e.g. `user.id` or `items.0`.
    ///
    /// The first segment names the argument; the rest walk into objects by
    /// field and into arrays by index.
    pub fn arg_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.args.get(segments.next()?)?;

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_declared_limit_defaults() {
        let declared = DeclaredLimit::new(10, Duration::from_secs(1));
        assert!(declared.enabled);
        assert!(!declared.blocked);
        assert!(declared.retry.is_none());
        assert!(declared.key.is_none());
    }

    #[test]
    fn test_arg_path_nested() {
        let call = CallContext::new("orders::create", DeclaredLimit::new(1, Duration::from_secs(1)))
            .with_arg("user", json!({ "id": 42, "tags": ["a", "b"] }))
            .with_arg("region", "eu-west");

        assert_eq!(call.arg_path("region"), Some(&json!("eu-west")));
        assert_eq!(call.arg_path("user.id"), Some(&json!(42)));
        assert_eq!(call.arg_path("user.tags.1"), Some(&json!("b")));
        assert_eq!(call.arg_path("user.missing"), None);
        assert_eq!(call.arg_path("region.inner"), None);
        assert_eq!(call.arg_path("absent"), None);
    }

    #[test]
    fn test_fresh_call_is_not_cancelled() {
        let call = CallContext::new("op", DeclaredLimit::new(1, Duration::from_secs(1)));
        assert!(!call.cancellation().is_cancelled());
    }
}
