//! Admission outcomes and rejection errors.

use thiserror::Error;

use crate::error::ResolveError;
use crate::key::CallIdentity;

/// Result of one admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// The guarded operation may run.
    Proceed,
    /// The guarded operation must not run.
    Rejected(Rejection),
}

impl AdmissionOutcome {
    pub fn is_proceed(&self) -> bool {
        matches!(self, AdmissionOutcome::Proceed)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            AdmissionOutcome::Proceed => None,
            AdmissionOutcome::Rejected(rejection) => Some(rejection),
        }
    }
}

/// Why a call was rejected, without the details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Blocked,
    LimitExceeded,
    Interrupted,
}

/// A call rejected by admission control.
///
/// Every variant is terminal for the call: nothing retries it further and the
/// guarded operation never runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Configuration forbids the call outright.
    #[error("execution of `{key}` is blocked by configuration")]
    Blocked { key: CallIdentity },

    /// The quota stayed exhausted for every permitted attempt.
    #[error("rate limit exceeded for `{key}` after {attempts} attempt(s)")]
    LimitExceeded { key: CallIdentity, attempts: u64 },

    /// Cancelled while waiting between attempts.
    #[error("interrupted while retrying `{key}` after {attempts} attempt(s)")]
    Interrupted { key: CallIdentity, attempts: u64 },
}

impl Rejection {
    pub fn reason(&self) -> RejectReason {
        match self {
            Rejection::Blocked { .. } => RejectReason::Blocked,
            Rejection::LimitExceeded { .. } => RejectReason::LimitExceeded,
            Rejection::Interrupted { .. } => RejectReason::Interrupted,
        }
    }

    /// Key of the rejected call.
    pub fn key(&self) -> &CallIdentity {
        match self {
            Rejection::Blocked { key }
            | Rejection::LimitExceeded { key, .. }
            | Rejection::Interrupted { key, .. } => key,
        }
    }
}

/// Error returned when running an operation through the admission controller.
///
/// Collaborator and operation errors are carried unchanged; their `Display`
/// and `source` pass straight through.
#[derive(Error, Debug)]
pub enum GuardError<E> {
    /// Admission control rejected the call.
    #[error(transparent)]
    Rejected(Rejection),

    /// The key or options could not be resolved.
    #[error(transparent)]
    Resolve(ResolveError),

    /// The guarded operation ran and failed.
    #[error(transparent)]
    Operation(E),
}

impl<E> GuardError<E> {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            GuardError::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    /// The operation's own error, if that is what failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            GuardError::Operation(e) => Some(e),
            _ => None,
        }
    }
}
