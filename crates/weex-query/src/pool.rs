//! Worker pool running aggregation queries off the ingest path

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use weex_core::{TimeSpan, ValueTuple};

use crate::engine::AggregationEngine;
use crate::error::{QueryError, QueryResult};
use crate::op::AggregateOp;

/// One aggregation to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub obs_type: String,
    pub op: AggregateOp,
    pub span: TimeSpan,
    #[serde(default)]
    pub threshold: Option<ValueTuple>,
}

impl QueryRequest {
    pub fn new(obs_type: impl Into<String>, op: impl Into<AggregateOp>, span: TimeSpan) -> Self {
        Self {
            obs_type: obs_type.into(),
            op: op.into(),
            span,
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: ValueTuple) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// Runs queries on tokio tasks, at most `workers` at a time
pub struct QueryPool {
    engine: Arc<AggregationEngine>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl QueryPool {
    pub fn new(engine: Arc<AggregationEngine>, workers: usize, timeout: Option<Duration>) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn engine(&self) -> &Arc<AggregationEngine> {
        &self.engine
    }

    /// Queries currently allowed to start without waiting
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Start `request` in the background
    pub fn submit(&self, request: QueryRequest) -> QueryHandle {
        let token = self.shutdown.child_token();
        let engine = Arc::clone(&self.engine);
        let permits = Arc::clone(&self.permits);
        let timeout = self.timeout;
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let run = async {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| QueryError::Worker("query pool is closed".to_string()))?;
                engine
                    .aggregate(
                        &request.obs_type,
                        &request.op,
                        &request.span,
                        request.threshold.as_ref(),
                    )
                    .await
            };

            tokio::select! {
                biased;
                _ = task_token.cancelled() => {
                    debug!("Query {} of {} cancelled", request.op, request.obs_type);
                    Err(QueryError::Cancelled)
                }
                result = with_timeout(timeout, run) => {
                    if let Err(QueryError::TimedOut) = &result {
                        warn!("Query {} of {} timed out", request.op, request.obs_type);
                    }
                    result
                }
            }
        });

        QueryHandle { token, task }
    }

    /// Cancel every running query and refuse new ones
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.permits.close();
    }
}

async fn with_timeout<F>(limit: Option<Duration>, run: F) -> QueryResult<ValueTuple>
where
    F: std::future::Future<Output = QueryResult<ValueTuple>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .unwrap_or(Err(QueryError::TimedOut)),
        None => run.await,
    }
}

/// A submitted query
pub struct QueryHandle {
    token: CancellationToken,
    task: JoinHandle<QueryResult<ValueTuple>>,
}

impl QueryHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the query's result
    pub async fn join(self) -> QueryResult<ValueTuple> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(QueryError::Cancelled),
            Err(e) => Err(QueryError::Worker(e.to_string())),
        }
    }
}
