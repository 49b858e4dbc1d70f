//! Aggregation queries over the WeeWX archive
//!
//! [`AggregationEngine`] answers `(obs_type, verb, span, threshold)` from
//! the daily summary tables when the span is whole days and from the raw
//! archive otherwise. Types and verbs the engine does not know are offered
//! to the providers in an [`XTypeRegistry`]. [`QueryPool`] runs queries on
//! worker tasks with cancellation and timeouts.

pub mod combine;
pub mod derived;
pub mod engine;
pub mod error;
pub mod op;
pub mod pool;
pub mod samples;
pub mod xtypes;

pub use derived::{DegreeDays, DerivedWeather};
pub use engine::{aggregate_in, series_in, AggregationEngine};
pub use error::{QueryError, QueryResult};
pub use op::{AggregateOp, Comparison, DayStat, Verb, VerbClass};
pub use pool::{QueryHandle, QueryPool, QueryRequest};
pub use xtypes::{QueryContext, Series, XTypeProvider, XTypeRegistry};
