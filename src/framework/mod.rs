//! Guards that keep only the newest request's results.
//!
//! See: [`LatestOnly`], [`Outcome`]

mod latest;
mod outcome;

pub use latest::*;
pub use outcome::*;
