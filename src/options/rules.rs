//! Rule-file overrides for declared limits.
//!
//! A rules document lets operators adjust limits per key without touching the
//! guarded code: block a key, disable limiting, change the quota or the retry
//! policy. Every field of a rule is optional and overrides only what it names.
//!
//! ```yaml
//! rules:
//!   - key: "billing:charge"
//!     max_requests: 100
//!     interval: { amount: 1, unit: second }
//!     retry:
//!       count: 2
//!       interval: { amount: 50, unit: millisecond }
//!   - key: "reports:*"
//!     blocked: true
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{LimitOptions, OptionsResolver, RetryPolicy};
use crate::call::CallContext;
use crate::error::{ResolveError, Result};
use crate::key::CallIdentity;

/// A complete rules document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Ordered list of rules
    #[serde(default)]
    pub rules: Vec<LimitRule>,
}

/// Overrides applied to calls whose key matches `key`.
///
/// `key` is either an exact key or a prefix pattern ending in `*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRule {
    /// Exact key or `prefix*` pattern
    pub key: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub blocked: Option<bool>,
    #[serde(default)]
    pub max_requests: Option<u64>,
    #[serde(default)]
    pub interval: Option<IntervalSpec>,
    #[serde(default)]
    pub retry: Option<RetryRule>,
}

/// Retry override. A `count` of zero means a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRule {
    pub count: u32,
    pub interval: IntervalSpec,
}

/// A duration written as an amount of a time unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSpec {
    pub amount: u64,
    pub unit: TimeUnit,
}

impl IntervalSpec {
    pub fn new(amount: u64, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    /// The interval as a [`Duration`], or [`Duration::MAX`] if it overflows.
    pub fn duration(&self) -> Duration {
        let unit_ms = self.unit.duration().as_millis() as u64;
        self.amount
            .checked_mul(unit_ms)
            .map_or(Duration::MAX, Duration::from_millis)
    }
}

/// Time unit for intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Millisecond => Duration::from_millis(1),
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

impl RulesConfig {
    /// Create an empty rules document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Find the rule for `key`.
    ///
    /// An exact match wins; otherwise the longest matching `prefix*` pattern.
    pub fn find_rule(&self, key: &str) -> Option<&LimitRule> {
        if let Some(rule) = self.rules.iter().find(|rule| rule.key == key) {
            return Some(rule);
        }

        self.rules
            .iter()
            .filter_map(|rule| {
                let prefix = rule.key.strip_suffix('*')?;
                key.starts_with(prefix).then_some((prefix.len(), rule))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, rule)| rule)
    }
}

impl LimitRule {
    /// Apply this rule's overrides on top of `options`.
    pub fn apply(&self, options: &mut LimitOptions) {
        if let Some(enabled) = self.enabled {
            options.enabled = enabled;
        }
        if let Some(blocked) = self.blocked {
            options.blocked = blocked;
        }
        if let Some(max_requests) = self.max_requests {
            options.max_requests = max_requests;
        }
        if let Some(interval) = self.interval {
            options.interval = interval.duration();
        }
        if let Some(retry) = self.retry {
            options.retry = Some(RetryPolicy::new(retry.count, retry.interval.duration()));
        }
    }
}

/// [`OptionsResolver`] applying a hot-swappable [`RulesConfig`] over declared limits.
///
/// The rules are read on every call; nothing is cached between calls.
#[derive(Debug, Default)]
pub struct RuleOptionsResolver {
    rules: RwLock<RulesConfig>,
}

impl RuleOptionsResolver {
    pub fn new(rules: RulesConfig) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Replace the active rules.
    pub fn set_rules(&self, rules: RulesConfig) {
        let mut current = self.rules.write();
        *current = rules;
    }

    /// Get a copy of the active rules.
    pub fn rules(&self) -> RulesConfig {
        self.rules.read().clone()
    }

    /// Re-read rules from `path`, keeping the current rules if that fails.
    pub fn reload_from(&self, path: &Path) -> Result<()> {
        let rules = RulesConfig::from_file(path)?;
        debug!(path = %path.display(), rule_count = rules.rules.len(), "Rules reloaded");
        self.set_rules(rules);
        Ok(())
    }

    /// Reload rules from `path` every `every` until `token` is cancelled.
    pub fn spawn_reload(
        self: Arc<Self>,
        path: PathBuf,
        every: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if let Err(e) = self.reload_from(&path) {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to reload rules, keeping previous rules"
                    );
                }
            }
        })
    }
}

impl OptionsResolver for RuleOptionsResolver {
    fn resolve(
        &self,
        key: &CallIdentity,
        call: &CallContext,
    ) -> std::result::Result<LimitOptions, ResolveError> {
        let mut options = LimitOptions::from(call.declared());

        let rules = self.rules.read();
        if let Some(rule) = rules.find_rule(key.as_str()) {
            debug!(key = %key, rule = %rule.key, "Applying limit rule");
            rule.apply(&mut options);
        }
        drop(rules);

        options.validate(key)?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::DeclaredLimit;

    fn call() -> CallContext {
        CallContext::new("op", DeclaredLimit::new(10, Duration::from_secs(1)))
    }

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
rules:
  - key: billing:charge
    max_requests: 100
    interval: { amount: 1, unit: minute }
    retry:
      count: 2
      interval: { amount: 50, unit: millisecond }
  - key: "reports:*"
    blocked: true
"#;
        let config = RulesConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rules.len(), 2);

        let rule = &config.rules[0];
        assert_eq!(rule.max_requests, Some(100));
        assert_eq!(rule.interval.unwrap().duration(), Duration::from_secs(60));
        assert_eq!(rule.retry.unwrap().count, 2);
        assert_eq!(config.rules[1].blocked, Some(true));
    }

    #[test]
    fn test_parse_empty_document() {
        let config = RulesConfig::from_yaml("rules: []").unwrap();
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_parse_invalid_unit() {
        let yaml = r#"
rules:
  - key: a
    interval: { amount: 1, unit: fortnight }
"#;
        assert!(RulesConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_find_rule_exact_beats_prefix() {
        let yaml = r#"
rules:
  - key: "api:*"
    max_requests: 1
  - key: "api:search"
    max_requests: 2
  - key: "api:se*"
    max_requests: 3
"#;
        let config = RulesConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.find_rule("api:search").unwrap().max_requests, Some(2));
        assert_eq!(config.find_rule("api:send").unwrap().max_requests, Some(3));
        assert_eq!(config.find_rule("api:list").unwrap().max_requests, Some(1));
        assert!(config.find_rule("other").is_none());
    }

    #[test]
    fn test_catch_all_rule() {
        let yaml = r#"
rules:
  - key: "*"
    enabled: false
"#;
        let config = RulesConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.find_rule("anything").unwrap().enabled, Some(false));
    }

    #[test]
    fn test_time_unit_durations() {
        assert_eq!(TimeUnit::Millisecond.duration(), Duration::from_millis(1));
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
        assert_eq!(
            IntervalSpec::new(250, TimeUnit::Millisecond).duration(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_large_interval_amounts() {
        // Past u32::MAX milliseconds
        assert_eq!(
            IntervalSpec::new(5_000_000_000, TimeUnit::Millisecond).duration(),
            Duration::from_millis(5_000_000_000)
        );
        assert_eq!(
            IntervalSpec::new(100_000, TimeUnit::Day).duration(),
            Duration::from_secs(100_000 * 86400)
        );
        assert_eq!(IntervalSpec::new(u64::MAX, TimeUnit::Second).duration(), Duration::MAX);
    }

    #[test]
    fn test_resolver_without_rules_uses_declared() {
        let resolver = RuleOptionsResolver::default();
        let options = resolver.resolve(&CallIdentity::new("op"), &call()).unwrap();
        assert_eq!(options, LimitOptions::from(call().declared()));
    }

    #[test]
    fn test_resolver_applies_overrides() {
        let resolver = RuleOptionsResolver::new(RulesConfig {
            rules: vec![LimitRule {
                key: "op".to_string(),
                enabled: None,
                blocked: Some(true),
                max_requests: Some(3),
                interval: None,
                retry: Some(RetryRule {
                    count: 1,
                    interval: IntervalSpec::new(20, TimeUnit::Millisecond),
                }),
            }],
        });

        let options = resolver.resolve(&CallIdentity::new("op"), &call()).unwrap();
        assert!(options.blocked);
        assert!(options.enabled);
        assert_eq!(options.max_requests, 3);
        assert_eq!(options.interval, Duration::from_secs(1));
        assert_eq!(
            options.retry,
            Some(RetryPolicy::new(1, Duration::from_millis(20)))
        );
    }

    #[test]
    fn test_resolver_sees_new_rules() {
        let resolver = RuleOptionsResolver::default();
        let key = CallIdentity::new("op");
        assert!(!resolver.resolve(&key, &call()).unwrap().blocked);

        let rules = RulesConfig::from_yaml("rules:\n  - key: op\n    blocked: true\n").unwrap();
        resolver.set_rules(rules);
        assert!(resolver.resolve(&key, &call()).unwrap().blocked);
    }

    #[test]
    fn test_resolver_rejects_invalid_override() {
        let resolver = RuleOptionsResolver::new(
            RulesConfig::from_yaml("rules:\n  - key: op\n    max_requests: 0\n").unwrap(),
        );
        let err = resolver
            .resolve(&CallIdentity::new("op"), &call())
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidOptions { .. }));
    }

    #[test]
    fn test_reload_from_missing_file_keeps_rules() {
        let resolver = RuleOptionsResolver::new(
            RulesConfig::from_yaml("rules:\n  - key: op\n    blocked: true\n").unwrap(),
        );
        assert!(resolver
            .reload_from(Path::new("/nonexistent/callgate-rules.yaml"))
            .is_err());
        assert_eq!(resolver.rules().rules.len(), 1);
    }
}
