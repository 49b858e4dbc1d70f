//! Daily summary tables
//!
//! One row per observation type per local day. Rows are maintained
//! incrementally by [`DbClient::add_record`] and can be rebuilt from the
//! archive at any time.

use crate::queries::{self, fetch_records};
use crate::schema::{self, keys, tables};
use crate::{DbClient, DbError, DbResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};
use weex_core::{DayClock, DaySummary, TimeSpan, Timestamp};

impl DbClient {
    /// Daily summary of `obs_type` for the day starting at `day`
    pub async fn get_day(&self, obs_type: &str, day: Timestamp) -> DbResult<Option<DaySummary>> {
        self.check_column(obs_type)?;
        let mut conn = self.pool().acquire().await?;
        load_day(&mut conn, obs_type, day).await
    }

    /// Daily summaries for the days starting inside `[span.start, span.stop)`
    pub async fn get_day_range(&self, obs_type: &str, span: &TimeSpan) -> DbResult<Vec<DaySummary>> {
        self.check_column(obs_type)?;
        let mut conn = self.pool().acquire().await?;
        fetch_day_range(&mut conn, obs_type, span).await
    }

    /// Recompute every daily row of `obs_type` from the archive.
    ///
    /// Returns the number of days written.
    #[instrument(skip(self))]
    pub async fn rebuild_daily(&self, obs_type: &str) -> DbResult<usize> {
        self.check_column(obs_type)?;
        let mut tx = self.pool().begin().await?;
        let days = rebuild_column(&mut tx, self.clock(), obs_type).await?;
        tx.commit().await?;
        info!(days, "Rebuilt daily summaries");
        Ok(days)
    }

    /// Recompute all daily tables and reset the backfill marker
    #[instrument(skip(self))]
    pub async fn rebuild_all_daily(&self) -> DbResult<usize> {
        let mut tx = self.pool().begin().await?;
        let mut days = 0;
        for column in self.columns() {
            days += rebuild_column(&mut tx, self.clock(), column).await?;
        }
        match queries::bound_timestamp(&mut tx, "MAX").await? {
            Some(last) => {
                queries::set_meta(&mut tx, tables::DAY_METADATA, keys::LAST_UPDATE, &last.to_string())
                    .await?
            }
            None => clear_last_update(&mut tx).await?,
        }
        tx.commit().await?;
        info!(days, columns = self.columns().len(), "Rebuilt all daily summaries");
        Ok(days)
    }

    /// Fold archive records newer than the last daily update into the
    /// daily tables. Returns the number of records applied.
    #[instrument(skip(self))]
    pub async fn backfill_daily(&self) -> DbResult<usize> {
        let Some(last_update) = self.last_daily_update().await? else {
            if self.count_records().await? > 0 {
                info!("No daily summary marker, rebuilding from the archive");
                self.rebuild_all_daily().await?;
                return Ok(self.count_records().await?.try_into().unwrap_or(usize::MAX));
            }
            return Ok(0);
        };

        let mut tx = self.pool().begin().await?;
        let pending = fetch_records(
            &mut tx,
            self.columns(),
            &TimeSpan::new(last_update, Timestamp::MAX),
        )
        .await?;
        for record in &pending {
            let day = self.clock().archive_day_start(record.date_time);
            for column in self.columns() {
                update_day(
                    &mut tx,
                    column,
                    day,
                    record.get(column),
                    record.date_time,
                    record.interval_secs(),
                )
                .await?;
            }
        }
        if let Some(last) = pending.last() {
            advance_last_update(&mut tx, last.date_time).await?;
        }
        tx.commit().await?;

        if !pending.is_empty() {
            info!(records = pending.len(), since = last_update, "Backfilled daily summaries");
        }
        Ok(pending.len())
    }

    /// Timestamp of the newest archive record reflected in the daily tables
    pub async fn last_daily_update(&self) -> DbResult<Option<Timestamp>> {
        let mut conn = self.pool().acquire().await?;
        read_last_update(&mut conn).await
    }

    fn check_column(&self, obs_type: &str) -> DbResult<()> {
        if self.has_column(obs_type) {
            Ok(())
        } else {
            Err(DbError::UnknownColumn(obs_type.to_string()))
        }
    }
}

/// Fold one archive value into its day's row, creating the row if needed
pub(crate) async fn update_day(
    conn: &mut SqliteConnection,
    obs_type: &str,
    day: Timestamp,
    value: Option<f64>,
    ts: Timestamp,
    interval_secs: i64,
) -> DbResult<()> {
    let mut summary = load_day(conn, obs_type, day)
        .await?
        .unwrap_or_else(|| DaySummary::new(day));
    summary.add(value, ts, interval_secs);
    store_day(conn, obs_type, &summary).await
}

pub(crate) async fn load_day(
    conn: &mut SqliteConnection,
    obs_type: &str,
    day: Timestamp,
) -> DbResult<Option<DaySummary>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE \"dateTime\" = ?",
        schema::day_select_list(),
        schema::quoted(&schema::day_table(obs_type))
    );
    let row = sqlx::query(&sql)
        .bind(day)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| day_from_row(&r)).transpose()
}

pub(crate) async fn fetch_day_range(
    conn: &mut SqliteConnection,
    obs_type: &str,
    span: &TimeSpan,
) -> DbResult<Vec<DaySummary>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE \"dateTime\" >= ? AND \"dateTime\" < ? ORDER BY \"dateTime\" ASC",
        schema::day_select_list(),
        schema::quoted(&schema::day_table(obs_type))
    );
    let rows = sqlx::query(&sql)
        .bind(span.start)
        .bind(span.stop)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(day_from_row).collect()
}

async fn store_day(conn: &mut SqliteConnection, obs_type: &str, summary: &DaySummary) -> DbResult<()> {
    let placeholders = vec!["?"; schema::DAY_COLUMNS.len()].join(", ");
    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({placeholders})",
        schema::quoted(&schema::day_table(obs_type)),
        schema::day_select_list()
    );
    sqlx::query(&sql)
        .bind(summary.day)
        .bind(summary.count)
        .bind(summary.sum)
        .bind(summary.wsum)
        .bind(summary.sumtime)
        .bind(summary.min)
        .bind(summary.mintime)
        .bind(summary.max)
        .bind(summary.maxtime)
        .bind(summary.first)
        .bind(summary.firsttime)
        .bind(summary.last)
        .bind(summary.lasttime)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn rebuild_column(conn: &mut SqliteConnection, clock: DayClock, obs_type: &str) -> DbResult<usize> {
    let table = schema::quoted(&schema::day_table(obs_type));
    sqlx::query(&format!("DELETE FROM {table}"))
        .execute(&mut *conn)
        .await?;

    let sql = format!(
        "SELECT \"dateTime\", \"interval\", {} FROM {} ORDER BY \"dateTime\" ASC",
        schema::quoted(obs_type),
        tables::ARCHIVE
    );
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;

    let mut days: BTreeMap<Timestamp, DaySummary> = BTreeMap::new();
    for row in &rows {
        let ts: i64 = row.try_get("dateTime")?;
        let interval: i64 = row.try_get("interval")?;
        let value: Option<f64> = row.try_get(obs_type)?;
        let day = clock.archive_day_start(ts);
        days.entry(day)
            .or_insert_with(|| DaySummary::new(day))
            .add(value, ts, interval * 60);
    }
    for summary in days.values() {
        store_day(conn, obs_type, summary).await?;
    }
    debug!(obs_type, records = rows.len(), days = days.len(), "Recomputed daily rows");
    Ok(days.len())
}

async fn read_last_update(conn: &mut SqliteConnection) -> DbResult<Option<Timestamp>> {
    match queries::get_meta(conn, tables::DAY_METADATA, keys::LAST_UPDATE).await? {
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|_| DbError::Corrupt(format!("lastUpdate '{text}'"))),
        None => Ok(None),
    }
}

/// Move the backfill marker forward to `ts`; never backward
pub(crate) async fn advance_last_update(conn: &mut SqliteConnection, ts: Timestamp) -> DbResult<()> {
    let current = read_last_update(conn).await?;
    if current.map_or(true, |c| ts > c) {
        queries::set_meta(conn, tables::DAY_METADATA, keys::LAST_UPDATE, &ts.to_string()).await?;
    }
    Ok(())
}

async fn clear_last_update(conn: &mut SqliteConnection) -> DbResult<()> {
    let sql = format!("DELETE FROM {} WHERE name = ?", tables::DAY_METADATA);
    sqlx::query(&sql)
        .bind(keys::LAST_UPDATE)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn day_from_row(row: &SqliteRow) -> DbResult<DaySummary> {
    Ok(DaySummary {
        day: row.try_get("dateTime")?,
        count: row.try_get("count")?,
        sum: row.try_get("sum")?,
        wsum: row.try_get("wsum")?,
        sumtime: row.try_get("sumtime")?,
        min: row.try_get("min")?,
        mintime: row.try_get("mintime")?,
        max: row.try_get("max")?,
        maxtime: row.try_get("maxtime")?,
        first: row.try_get("first")?,
        firsttime: row.try_get("firsttime")?,
        last: row.try_get("last")?,
        lasttime: row.try_get("lasttime")?,
    })
}
