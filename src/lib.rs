#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod limiter;
pub use limiter::*;

mod cancel;
pub use cancel::*;

mod pacer;

mod runtime;

mod error;
pub use error::*;

mod common;
pub use common::{Dispatch, LimiterOptions, pacing_interval, total_for_duration};

#[cfg(test)]
mod tests;
