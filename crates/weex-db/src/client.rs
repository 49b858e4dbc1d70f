//! Database client and connection management

use crate::schema::{self, keys, tables};
use crate::{daily, queries, DbError, DbResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqliteConnection, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use weex_core::{ArchiveRecord, DayClock, DaySummary, TimeSpan, Timestamp, UnitSystem};

/// Options for opening (and if needed creating) an archive database
#[derive(Debug, Clone)]
pub struct DbOptions {
    path: PathBuf,
    unit_system: UnitSystem,
    columns: Vec<String>,
    clock: DayClock,
    max_connections: u32,
    busy_timeout: Duration,
}

impl DbOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            unit_system: UnitSystem::Us,
            columns: schema::DEFAULT_OBS_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            clock: DayClock::utc(),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Unit system for a new database; an existing database must match it
    pub fn unit_system(mut self, unit_system: UnitSystem) -> Self {
        self.unit_system = unit_system;
        self
    }

    /// Observation columns used when the archive table is created
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Day boundaries used for daily summaries
    pub fn clock(mut self, clock: DayClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Archive database handle. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct DbClient {
    pool: SqlitePool,
    unit_system: UnitSystem,
    columns: Arc<Vec<String>>,
    clock: DayClock,
}

impl DbClient {
    /// Open the database at `options.path`, creating the schema on first use
    #[instrument(skip(options), fields(path = %options.path.display()))]
    pub async fn open(options: DbOptions) -> DbResult<Self> {
        for column in &options.columns {
            schema::validate_column(column)?;
        }

        let connect = SqliteConnectOptions::new()
            .filename(&options.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect)
            .await?;

        let client = if table_exists(&pool, tables::ARCHIVE).await? {
            Self::load(pool, &options).await?
        } else {
            Self::create(pool, &options).await?
        };

        info!(
            unit_system = %client.unit_system,
            columns = client.columns.len(),
            "Opened archive database"
        );
        Ok(client)
    }

    async fn create(pool: SqlitePool, options: &DbOptions) -> DbResult<Self> {
        let mut tx = pool.begin().await?;
        sqlx::query(&schema::create_archive_sql(&options.columns))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&schema::create_metadata_sql(tables::METADATA))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&schema::create_metadata_sql(tables::DAY_METADATA))
            .execute(&mut *tx)
            .await?;
        for column in &options.columns {
            sqlx::query(&schema::create_day_sql(column))
                .execute(&mut *tx)
                .await?;
        }
        let code = options.unit_system.code().to_string();
        queries::set_meta(&mut *tx, tables::METADATA, keys::UNIT_SYSTEM, &code).await?;
        queries::set_meta(&mut *tx, tables::METADATA, keys::SCHEMA_VERSION, schema::SCHEMA_VERSION)
            .await?;
        tx.commit().await?;

        info!(unit_system = %options.unit_system, "Created archive schema");
        Ok(Self {
            pool,
            unit_system: options.unit_system,
            columns: Arc::new(options.columns.clone()),
            clock: options.clock,
        })
    }

    async fn load(pool: SqlitePool, options: &DbOptions) -> DbResult<Self> {
        let mut conn = pool.acquire().await?;

        let stored = queries::get_meta(&mut *conn, tables::METADATA, keys::UNIT_SYSTEM)
            .await?
            .ok_or_else(|| DbError::Corrupt("archive has no unit system".to_string()))?;
        let unit_system = stored
            .parse::<UnitSystem>()
            .map_err(|_| DbError::Corrupt(format!("unit system '{stored}'")))?;
        if unit_system != options.unit_system {
            return Err(DbError::ConfigError(format!(
                "database uses unit system {unit_system}, configuration asks for {}",
                options.unit_system
            )));
        }

        let rows = sqlx::query("PRAGMA table_info(archive)")
            .fetch_all(&mut *conn)
            .await?;
        let mut columns = Vec::new();
        for row in rows {
            let name: String = row.try_get("name")?;
            if schema::FIXED_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            match schema::validate_column(&name) {
                Ok(_) => columns.push(name),
                Err(_) => warn!(column = %name, "Ignoring archive column with unusable name"),
            }
        }
        for wanted in &options.columns {
            if !columns.contains(wanted) {
                warn!(column = %wanted, "Configured column missing from existing archive");
            }
        }

        sqlx::query(&schema::create_metadata_sql(tables::DAY_METADATA))
            .execute(&mut *conn)
            .await?;
        for column in &columns {
            sqlx::query(&schema::create_day_sql(column))
                .execute(&mut *conn)
                .await?;
        }

        Ok(Self {
            pool,
            unit_system,
            columns: Arc::new(columns),
            clock: options.clock,
        })
    }

    /// Get reference to underlying pool for direct queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn unit_system(&self) -> UnitSystem {
        self.unit_system
    }

    pub fn clock(&self) -> DayClock {
        self.clock
    }

    /// Observation columns of the archive table
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, obs_type: &str) -> bool {
        self.columns.iter().any(|c| c == obs_type)
    }

    /// Begin a read transaction. Every read through the snapshot sees the
    /// database as of this call, regardless of concurrent writes.
    pub async fn snapshot(&self) -> DbResult<ReadSnapshot> {
        let mut tx = self.pool.begin().await?;
        // SQLite pins the snapshot at the first read, not at BEGIN
        sqlx::query("SELECT COUNT(*) FROM archive_metadata")
            .fetch_one(&mut *tx)
            .await?;
        Ok(ReadSnapshot {
            tx,
            unit_system: self.unit_system,
            columns: Arc::clone(&self.columns),
            clock: self.clock,
        })
    }

    /// Test the database connection
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the connection pool gracefully
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Consistent read view over the archive and its daily summaries
pub struct ReadSnapshot {
    tx: Transaction<'static, Sqlite>,
    unit_system: UnitSystem,
    columns: Arc<Vec<String>>,
    clock: DayClock,
}

impl ReadSnapshot {
    pub fn unit_system(&self) -> UnitSystem {
        self.unit_system
    }

    pub fn clock(&self) -> DayClock {
        self.clock
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, obs_type: &str) -> bool {
        self.columns.iter().any(|c| c == obs_type)
    }

    fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// All archive records in `span`, every column
    pub async fn records(&mut self, span: &TimeSpan) -> DbResult<Vec<ArchiveRecord>> {
        let columns = Arc::clone(&self.columns);
        queries::fetch_records(self.conn(), &columns, span).await
    }

    /// Archive records in `span` carrying only the listed observation types
    pub async fn samples(&mut self, span: &TimeSpan, obs_types: &[&str]) -> DbResult<Vec<ArchiveRecord>> {
        let mut columns = Vec::with_capacity(obs_types.len());
        for obs_type in obs_types {
            if !self.has_column(obs_type) {
                return Err(DbError::UnknownColumn(obs_type.to_string()));
            }
            columns.push(obs_type.to_string());
        }
        queries::fetch_records(self.conn(), &columns, span).await
    }

    pub async fn record(&mut self, date_time: Timestamp) -> DbResult<Option<ArchiveRecord>> {
        let columns = Arc::clone(&self.columns);
        queries::fetch_record(self.conn(), &columns, date_time).await
    }

    pub async fn first_timestamp(&mut self) -> DbResult<Option<Timestamp>> {
        queries::bound_timestamp(self.conn(), "MIN").await
    }

    pub async fn last_timestamp(&mut self) -> DbResult<Option<Timestamp>> {
        queries::bound_timestamp(self.conn(), "MAX").await
    }

    /// Daily summary for the day starting at `day`
    pub async fn get_day(&mut self, obs_type: &str, day: Timestamp) -> DbResult<Option<DaySummary>> {
        if !self.has_column(obs_type) {
            return Err(DbError::UnknownColumn(obs_type.to_string()));
        }
        daily::load_day(self.conn(), obs_type, day).await
    }

    /// Daily summaries for the days starting inside `[span.start, span.stop)`
    pub async fn get_day_range(&mut self, obs_type: &str, span: &TimeSpan) -> DbResult<Vec<DaySummary>> {
        if !self.has_column(obs_type) {
            return Err(DbError::UnknownColumn(obs_type.to_string()));
        }
        daily::fetch_day_range(self.conn(), obs_type, span).await
    }

    /// End the read transaction
    pub async fn close(self) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

async fn table_exists(pool: &SqlitePool, name: &str) -> DbResult<bool> {
    let row = sqlx::query("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    let count: i64 = row.try_get(0)?;
    Ok(count > 0)
}
