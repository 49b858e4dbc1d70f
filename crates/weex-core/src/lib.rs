//! Core data types, units, and rollup calculations for WeeWX
//!
//! This crate provides the unit model, the unit-aware value container, and
//! the interval and per-day statistics the archive and query layers build on.

mod defaults;

pub mod daily;
pub mod duration;
pub mod format;
pub mod rollups;
pub mod timespan;
pub mod types;
pub mod units;
pub mod value;
pub mod vector;

pub use daily::DaySummary;
pub use duration::{parse_duration, DurationError};
pub use format::{Formatter, Locale};
pub use rollups::*;
pub use timespan::{DayClock, TimeSpan, SECONDS_PER_DAY};
pub use types::*;
pub use units::*;
pub use value::{Value, ValueTuple};
pub use vector::VectorSum;
