//! Admission decisions for intercepted calls.

mod controller;
mod outcome;
mod wait;

pub use controller::AdmissionController;
pub use outcome::{AdmissionOutcome, GuardError, RejectReason, Rejection};
pub use wait::{RetryWait, TokioWait, WaitOutcome};
