//! Archive table reads and writes

use crate::schema::{self, keys, tables};
use crate::{daily, DbClient, DbError, DbResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, instrument, warn};
use weex_core::{ArchiveRecord, Interval, TimeSpan, Timestamp, UnitSystem};

impl DbClient {
    /// Insert one archive record and fold it into the daily summaries.
    ///
    /// Both happen in one transaction; on any failure neither is visible.
    #[instrument(skip(self, record), fields(date_time = record.date_time))]
    pub async fn add_record(&self, record: &ArchiveRecord) -> DbResult<()> {
        if record.us_units != self.unit_system() {
            return Err(DbError::UnitSystemMismatch {
                database: self.unit_system(),
                record: record.us_units,
            });
        }
        for obs_type in record.values.keys() {
            if !self.has_column(obs_type) {
                debug!(obs_type = %obs_type, "No archive column, value dropped");
            }
        }

        let mut tx = self.pool().begin().await?;
        if let Err(err) = insert_record(&mut tx, self.columns(), record).await {
            if matches!(err, DbError::DuplicateRecord(_)) {
                warn!("Rejected duplicate archive record");
            }
            return Err(err);
        }

        let day = self.clock().archive_day_start(record.date_time);
        for column in self.columns() {
            daily::update_day(
                &mut tx,
                column,
                day,
                record.get(column),
                record.date_time,
                record.interval_secs(),
            )
            .await?;
        }
        daily::advance_last_update(&mut tx, record.date_time).await?;
        tx.commit().await?;

        debug!("Inserted archive record");
        Ok(())
    }

    /// Archive records within a time span
    #[instrument(skip(self))]
    pub async fn records(&self, span: &TimeSpan) -> DbResult<Vec<ArchiveRecord>> {
        let mut conn = self.pool().acquire().await?;
        let records = fetch_records(&mut conn, self.columns(), span).await?;
        debug!(count = records.len(), "Retrieved archive records");
        Ok(records)
    }

    /// The archive record stamped exactly `date_time`
    pub async fn record(&self, date_time: Timestamp) -> DbResult<Option<ArchiveRecord>> {
        let mut conn = self.pool().acquire().await?;
        fetch_record(&mut conn, self.columns(), date_time).await
    }

    pub async fn first_timestamp(&self) -> DbResult<Option<Timestamp>> {
        let mut conn = self.pool().acquire().await?;
        bound_timestamp(&mut conn, "MIN").await
    }

    pub async fn last_timestamp(&self) -> DbResult<Option<Timestamp>> {
        let mut conn = self.pool().acquire().await?;
        bound_timestamp(&mut conn, "MAX").await
    }

    /// Get count of archive records
    pub async fn count_records(&self) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM archive")
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get(0)?)
    }

    /// Get metadata value by name
    pub async fn get_metadata(&self, name: &str) -> DbResult<Option<String>> {
        let mut conn = self.pool().acquire().await?;
        get_meta(&mut conn, tables::METADATA, name).await
    }

    /// Set metadata value
    #[instrument(skip(self))]
    pub async fn set_metadata(&self, name: &str, value: &str) -> DbResult<()> {
        if name == keys::UNIT_SYSTEM {
            return Err(DbError::ConfigError(
                "the unit system of an archive cannot be changed".to_string(),
            ));
        }
        let mut conn = self.pool().acquire().await?;
        set_meta(&mut conn, tables::METADATA, name, value).await?;
        debug!("Set metadata: {} = {}", name, value);
        Ok(())
    }
}

async fn insert_record(
    conn: &mut SqliteConnection,
    columns: &[String],
    record: &ArchiveRecord,
) -> DbResult<()> {
    let placeholders = vec!["?"; schema::FIXED_COLUMNS.len() + columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        tables::ARCHIVE,
        schema::select_list(columns)
    );

    let mut query = sqlx::query(&sql)
        .bind(record.date_time)
        .bind(record.us_units.code())
        .bind(record.interval);
    for column in columns {
        query = query.bind(record.get(column));
    }

    match query.execute(&mut *conn).await {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(DbError::DuplicateRecord(record.date_time))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn fetch_records(
    conn: &mut SqliteConnection,
    columns: &[String],
    span: &TimeSpan,
) -> DbResult<Vec<ArchiveRecord>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE \"dateTime\" > ? AND \"dateTime\" <= ? ORDER BY \"dateTime\" ASC",
        schema::select_list(columns),
        tables::ARCHIVE
    );
    let rows = sqlx::query(&sql)
        .bind(span.start)
        .bind(span.stop)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(|row| record_from_row(row, columns)).collect()
}

pub(crate) async fn fetch_record(
    conn: &mut SqliteConnection,
    columns: &[String],
    date_time: Timestamp,
) -> DbResult<Option<ArchiveRecord>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE \"dateTime\" = ?",
        schema::select_list(columns),
        tables::ARCHIVE
    );
    let row = sqlx::query(&sql)
        .bind(date_time)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| record_from_row(&r, columns)).transpose()
}

/// `MIN` or `MAX` of the archive timestamps
pub(crate) async fn bound_timestamp(
    conn: &mut SqliteConnection,
    function: &str,
) -> DbResult<Option<Timestamp>> {
    let sql = format!("SELECT {function}(\"dateTime\") FROM {}", tables::ARCHIVE);
    let row = sqlx::query(&sql).fetch_one(&mut *conn).await?;
    Ok(row.try_get::<Option<i64>, _>(0)?)
}

fn record_from_row(row: &SqliteRow, columns: &[String]) -> DbResult<ArchiveRecord> {
    let date_time: i64 = row.try_get("dateTime")?;
    let code: i64 = row.try_get("usUnits")?;
    let us_units = i32::try_from(code)
        .map_err(|_| DbError::Corrupt(format!("usUnits {code} at {date_time}")))
        .and_then(|c| UnitSystem::try_from(c).map_err(DbError::from))?;
    let interval: i64 = row.try_get("interval")?;
    let interval = Interval::try_from(interval)
        .map_err(|_| DbError::Corrupt(format!("interval {interval} at {date_time}")))?;

    let mut record = ArchiveRecord::new(date_time, us_units, interval);
    for column in columns {
        let value: Option<f64> = row.try_get(column.as_str())?;
        record.values.insert(column.clone(), value);
    }
    Ok(record)
}

pub(crate) async fn get_meta(
    conn: &mut SqliteConnection,
    table: &str,
    name: &str,
) -> DbResult<Option<String>> {
    let sql = format!("SELECT value FROM {table} WHERE name = ?");
    let row = sqlx::query(&sql)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.try_get::<Option<String>, _>("value")).transpose()?.flatten())
}

pub(crate) async fn set_meta(
    conn: &mut SqliteConnection,
    table: &str,
    name: &str,
    value: &str,
) -> DbResult<()> {
    let sql = format!(
        "INSERT INTO {table} (name, value) VALUES (?, ?) \
         ON CONFLICT(name) DO UPDATE SET value = excluded.value"
    );
    sqlx::query(&sql)
        .bind(name)
        .bind(value)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
