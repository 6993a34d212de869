//! Key resolution from declared keys and argument templates.
//!
//! Precedence: a declared `key_template` is rendered against the call's
//! arguments; otherwise the declared static `key` is used; otherwise the
//! call's target name. Placeholders look like `{user.id}`, and `{{` / `}}`
//! produce literal braces.

use serde_json::Value;
use tracing::trace;

use super::{CallIdentity, KeyResolver};
use crate::call::CallContext;
use crate::error::ResolveError;

/// Default [`KeyResolver`] rendering declared keys and templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateKeyResolver {
    /// Optional prefix joined to every key with `:`
    namespace: Option<String>,
}

impl TemplateKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every resolved key with `namespace:`.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }

    fn render(template: &str, call: &CallContext) -> Result<String, ResolveError> {
        let invalid = |reason: &str| ResolveError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    out.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    out.push('}');
                }
                '}' => return Err(invalid("unmatched `}`")),
                '{' => {
                    let mut path = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => return Err(invalid("nested `{`")),
                            Some(ch) => path.push(ch),
                            None => return Err(invalid("unterminated placeholder")),
                        }
                    }

                    let path = path.trim();
                    if path.is_empty() {
                        return Err(invalid("empty placeholder"));
                    }

                    let value = call.arg_path(path).ok_or_else(|| ResolveError::MissingArgument {
                        name: path.to_string(),
                    })?;
                    match value {
                        Value::String(s) => out.push_str(s),
                        other => out.push_str(&other.to_string()),
                    }
                }
                other => out.push(other),
            }
        }

        Ok(out)
    }
}

impl KeyResolver for TemplateKeyResolver {
    fn resolve(&self, call: &CallContext) -> Result<CallIdentity, ResolveError> {
        let declared = call.declared();

        let base = match (&declared.key_template, &declared.key) {
            (Some(template), _) if !template.is_empty() => Self::render(template, call)?,
            (_, Some(key)) if !key.is_empty() => key.clone(),
            _ => call.target().to_string(),
        };

        let key = match &self.namespace {
            Some(ns) => format!("{ns}:{base}"),
            None => base,
        };

        trace!(target_op = %call.target(), key = %key, "Resolved call key");
        Ok(CallIdentity::new(key))
    }
}
