//! Table layout of the archive database
//!
//! Column names are observation type names and end up inside SQL text, so
//! every name is checked against [`validate_column`] before use.

use crate::{DbError, DbResult};

/// Table names
pub mod tables {
    pub const ARCHIVE: &str = "archive";
    pub const METADATA: &str = "archive_metadata";
    pub const DAY_PREFIX: &str = "archive_day_";
    pub const DAY_METADATA: &str = "archive_day__metadata";
}

/// Metadata keys
pub mod keys {
    pub const UNIT_SYSTEM: &str = "unit_system";
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const LAST_UPDATE: &str = "lastUpdate";
}

pub const SCHEMA_VERSION: &str = "4.0";

/// Columns every archive row has regardless of observation types
pub const FIXED_COLUMNS: [&str; 3] = ["dateTime", "usUnits", "interval"];

/// Observation columns of a freshly created archive when none are given.
/// Derived types (dewpoint, windchill, heatindex, ...) are left out so they
/// are computed from these on demand.
pub const DEFAULT_OBS_COLUMNS: &[&str] = &[
    "outTemp",
    "inTemp",
    "extraTemp1",
    "outHumidity",
    "inHumidity",
    "barometer",
    "pressure",
    "altimeter",
    "windSpeed",
    "windDir",
    "windGust",
    "windGustDir",
    "rain",
    "rainRate",
    "radiation",
    "UV",
    "ET",
    "rxCheckPercent",
    "consBatteryVoltage",
];

/// Check that `name` is a plain identifier usable as an observation column
pub fn validate_column(name: &str) -> DbResult<&str> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic());
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest || FIXED_COLUMNS.contains(&name) {
        return Err(DbError::InvalidColumn(name.to_string()));
    }
    Ok(name)
}

/// Name of the daily summary table for an observation type
pub fn day_table(obs_type: &str) -> String {
    format!("{}{}", tables::DAY_PREFIX, obs_type)
}

pub(crate) fn quoted(column: &str) -> String {
    format!("\"{column}\"")
}

pub(crate) fn create_archive_sql(columns: &[String]) -> String {
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         \"dateTime\" INTEGER NOT NULL PRIMARY KEY, \
         \"usUnits\" INTEGER NOT NULL, \
         \"interval\" INTEGER NOT NULL",
        tables::ARCHIVE
    );
    for column in columns {
        sql.push_str(&format!(", {} REAL", quoted(column)));
    }
    sql.push(')');
    sql
}

pub(crate) fn create_metadata_sql(table: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table} (name TEXT NOT NULL PRIMARY KEY, value TEXT)")
}

/// Columns of a daily summary table, in storage order
pub const DAY_COLUMNS: [&str; 13] = [
    "dateTime", "count", "sum", "wsum", "sumtime", "min", "mintime", "max", "maxtime", "first",
    "firsttime", "last", "lasttime",
];

pub(crate) fn create_day_sql(obs_type: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         \"dateTime\" INTEGER NOT NULL PRIMARY KEY, \
         \"count\" INTEGER NOT NULL DEFAULT 0, \
         \"sum\" REAL NOT NULL DEFAULT 0, \
         \"wsum\" REAL NOT NULL DEFAULT 0, \
         \"sumtime\" INTEGER NOT NULL DEFAULT 0, \
         \"min\" REAL, \"mintime\" INTEGER, \
         \"max\" REAL, \"maxtime\" INTEGER, \
         \"first\" REAL, \"firsttime\" INTEGER, \
         \"last\" REAL, \"lasttime\" INTEGER)",
        quoted(&day_table(obs_type))
    )
}

pub(crate) fn day_select_list() -> String {
    DAY_COLUMNS.iter().map(|c| quoted(c)).collect::<Vec<_>>().join(", ")
}

/// `SELECT` list for archive reads: fixed columns then `columns`
pub(crate) fn select_list(columns: &[String]) -> String {
    FIXED_COLUMNS
        .iter()
        .map(|c| quoted(c))
        .chain(columns.iter().map(|c| quoted(c)))
        .collect::<Vec<_>>()
        .join(", ")
}
