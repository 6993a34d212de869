//! Callgate - call admission control.
//!
//! This crate decides, for each invocation of a guarded operation, whether it
//! may run now, should wait and retry against its rate limit, or must be
//! rejected. Key derivation, option resolution and rate counting are
//! pluggable; [`admission::AdmissionController`] composes them.

pub mod admission;
pub mod call;
pub mod config;
pub mod error;
pub mod key;
pub mod options;
pub mod ratelimit;
