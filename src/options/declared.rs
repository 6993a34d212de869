//! Options taken verbatim from the call's declared limits.

use super::{LimitOptions, OptionsResolver};
use crate::call::CallContext;
use crate::error::ResolveError;
use crate::key::CallIdentity;

/// [`OptionsResolver`] that uses the limits declared on the call as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredOptionsResolver;

impl OptionsResolver for DeclaredOptionsResolver {
    fn resolve(
        &self,
        key: &CallIdentity,
        call: &CallContext,
    ) -> Result<LimitOptions, ResolveError> {
        let options = LimitOptions::from(call.declared());
        options.validate(key)?;
        Ok(options)
    }
}
