//! Packet archiving loop and end-of-day summaries

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use weex_archive::IntervalAggregator;
use weex_core::{DayClock, TimeSpan, Timestamp, ValueTuple};
use weex_ingest::PacketReceiver;
use weex_query::{QueryPool, QueryRequest, QueryResult};

/// Statistics reported day by day
const DAILY_STATS: &[(&str, &str)] = &[
    ("outTemp", "min"),
    ("outTemp", "max"),
    ("outTemp", "avg"),
    ("outHumidity", "avg"),
    ("windSpeed", "max"),
    ("rain", "sum"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub packets: u64,
    pub records: u64,
    pub rejected: u64,
}

/// Feeds LOOP packets into the interval aggregator
pub struct Scheduler {
    receiver: PacketReceiver,
    aggregator: IntervalAggregator,
    summaries: Option<DailySummaries>,
}

impl Scheduler {
    pub fn new(receiver: PacketReceiver, aggregator: IntervalAggregator) -> Self {
        Self {
            receiver,
            aggregator,
            summaries: None,
        }
    }

    /// Log a summary of each day once its last archive record is written
    pub fn with_summaries(mut self, summaries: DailySummaries) -> Self {
        self.summaries = Some(summaries);
        self
    }

    /// Run until `token` is cancelled or the packet channel closes, then
    /// flush the partial interval
    pub async fn run(&mut self, token: CancellationToken) -> Result<SchedulerStats> {
        let mut stats = SchedulerStats::default();

        info!("Scheduler started");
        info!("Archive interval: {}s", self.aggregator.interval());
        info!("Unit system: {}", self.aggregator.unit_system());

        loop {
            let packet = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                packet = self.receiver.recv() => packet,
            };
            let Some(packet) = packet else {
                debug!("Packet channel closed");
                break;
            };
            stats.packets += 1;

            match self.aggregator.add_packet(packet).await {
                Ok(Some(record)) => {
                    stats.records += 1;
                    self.record_written(record.date_time);
                }
                Ok(None) => {}
                Err(e) => {
                    // A bad packet must not stop archiving
                    stats.rejected += 1;
                    error!("Error processing packet: {}", e);
                }
            }
        }

        info!("Stopping scheduler...");
        match self
            .aggregator
            .force_flush()
            .await
            .context("Failed to flush the last interval")?
        {
            Some(record) => {
                stats.records += 1;
                info!("Flushed partial interval ending at {}", record.date_time);
            }
            None => debug!("Nothing to flush"),
        }

        info!(
            packets = stats.packets,
            records = stats.records,
            rejected = stats.rejected,
            "Scheduler stopped"
        );
        Ok(stats)
    }

    fn record_written(&mut self, date_time: Timestamp) {
        let Some(summaries) = self.summaries.as_mut() else {
            return;
        };
        if let Some(span) = summaries.advance(date_time) {
            let summaries = summaries.clone();
            tokio::spawn(async move {
                summaries.report(span).await;
            });
        }
    }
}

/// Notices when archive records move on to a new day
#[derive(Debug, Clone, Copy)]
pub struct DayTracker {
    clock: DayClock,
    current_day: Option<Timestamp>,
}

impl DayTracker {
    pub fn new(clock: DayClock) -> Self {
        Self {
            clock,
            current_day: None,
        }
    }

    /// Track the archive day of a new record; returns the previous day's
    /// span when the record starts a new one
    pub fn advance(&mut self, date_time: Timestamp) -> Option<TimeSpan> {
        let day = self.clock.archive_day_start(date_time);
        match self.current_day.replace(day) {
            Some(previous) if previous < day => Some(self.clock.day_span(previous)),
            _ => None,
        }
    }
}

/// Runs the daily statistics through the query pool
#[derive(Clone)]
pub struct DailySummaries {
    pool: Arc<QueryPool>,
    days: DayTracker,
}

impl DailySummaries {
    pub fn new(pool: Arc<QueryPool>, clock: DayClock) -> Self {
        Self {
            pool,
            days: DayTracker::new(clock),
        }
    }

    fn advance(&mut self, date_time: Timestamp) -> Option<TimeSpan> {
        self.days.advance(date_time)
    }

    /// Run every daily statistic for `span`
    pub async fn summarize(&self, span: TimeSpan) -> Vec<(QueryRequest, QueryResult<ValueTuple>)> {
        let handles: Vec<_> = DAILY_STATS
            .iter()
            .map(|(obs_type, op)| {
                let request = QueryRequest::new(*obs_type, *op, span);
                (request.clone(), self.pool.submit(request))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (request, handle) in handles {
            results.push((request, handle.join().await));
        }
        results
    }

    async fn report(&self, span: TimeSpan) {
        for (request, result) in self.summarize(span).await {
            match result {
                Ok(value) => info!(
                    day = span.start,
                    obs_type = %request.obs_type,
                    op = %request.op,
                    value = ?value.raw(),
                    unit = value.unit().unwrap_or(""),
                    "Daily summary"
                ),
                Err(e) => warn!(
                    day = span.start,
                    "Daily {} of {} failed: {}",
                    request.op,
                    request.obs_type,
                    e
                ),
            }
        }
    }
}
