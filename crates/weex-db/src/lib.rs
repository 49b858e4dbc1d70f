//! Database access layer for the WeeWX archive schema
//!
//! SQLite through sqlx. One `archive` table with a column per observation
//! type, plus one `archive_day_<type>` table of daily rollups per column.
//! Archive inserts and their daily updates commit in one transaction.

pub mod client;
pub mod daily;
pub mod queries;
pub mod schema;

pub use client::*;
pub use schema::*;

use thiserror::Error;
use weex_core::{Timestamp, UnitError, UnitSystem};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate archive record at {0}")]
    DuplicateRecord(Timestamp),

    #[error("Record is in unit system {record}, database uses {database}")]
    UnitSystemMismatch {
        database: UnitSystem,
        record: UnitSystem,
    },

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Unknown observation type: {0}")]
    UnknownColumn(String),

    #[error("Corrupt database contents: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Unit(#[from] UnitError),
}

pub type DbResult<T> = Result<T, DbError>;
