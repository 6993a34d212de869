//! Call identity and key resolution.

mod template;

pub use template::TemplateKeyResolver;

use crate::call::CallContext;
use crate::error::ResolveError;

/// Identity of the rate limit bucket a call belongs to.
///
/// Produced once per call and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallIdentity(String);

impl CallIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CallIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallIdentity {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CallIdentity {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Strategy deriving the [`CallIdentity`] for a call.
pub trait KeyResolver: Send + Sync {
    /// Derive the key for `call`.
    fn resolve(&self, call: &CallContext) -> Result<CallIdentity, ResolveError>;
}

impl<F> KeyResolver for F
where
    F: Fn(&CallContext) -> Result<CallIdentity, ResolveError> + Send + Sync,
{
    fn resolve(&self, call: &CallContext) -> Result<CallIdentity, ResolveError> {
        self(call)
    }
}
