//! Archive interval aggregator
//!
//! Accumulates LOOP packets over the configured interval, converts them to
//! the database unit system, and writes one archive record per interval.

pub mod aggregator;
pub mod buffer;

pub use aggregator::*;
pub use buffer::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] weex_db::DbError),

    #[error("Unit conversion failed: {0}")]
    Conversion(#[from] weex_core::UnitError),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Buffer overflow")]
    BufferOverflow,
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
