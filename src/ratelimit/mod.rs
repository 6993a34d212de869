//! Rate checking strategies.

mod counter;
mod limiter;
mod oracle;

pub use counter::WindowCounter;
pub use limiter::FixedWindowOracle;
pub use oracle::RateOracle;
