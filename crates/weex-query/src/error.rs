use thiserror::Error;
use weex_core::UnitError;
use weex_db::DbError;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown observation type: {0}")]
    UnknownObservationType(String),

    #[error("Unknown aggregation '{aggregation}' for {obs_type}")]
    UnknownAggregation {
        obs_type: String,
        aggregation: String,
    },

    #[error("Conversion error: {0}")]
    Conversion(#[from] UnitError),

    #[error("Invalid timespan: {0}")]
    Timespan(String),

    #[error("Aggregation '{0}' needs a threshold")]
    MissingThreshold(String),

    #[error("Database error: {0}")]
    Db(DbError),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Query timed out")]
    TimedOut,

    #[error("Query task failed: {0}")]
    Worker(String),
}

impl QueryError {
    pub fn unknown_aggregation(obs_type: &str, aggregation: impl ToString) -> Self {
        QueryError::UnknownAggregation {
            obs_type: obs_type.to_string(),
            aggregation: aggregation.to_string(),
        }
    }

    /// Whether a provider answered "not mine" rather than failing
    pub fn is_decline(&self) -> bool {
        matches!(
            self,
            QueryError::UnknownObservationType(_) | QueryError::UnknownAggregation { .. }
        )
    }
}

impl From<DbError> for QueryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UnknownColumn(obs_type) => QueryError::UnknownObservationType(obs_type),
            DbError::Unit(e) => QueryError::Conversion(e),
            other => QueryError::Db(other),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
