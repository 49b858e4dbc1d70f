//! Per-day rollup statistics for one observation type

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Statistics for one observation type over one day.
///
/// `wsum` and `sumtime` weight each archive value by its interval length so
/// that averages over several days are time-weighted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    /// Local midnight starting the day
    #[serde(rename = "dateTime")]
    pub day: Timestamp,
    pub count: i64,
    pub sum: f64,
    pub wsum: f64,
    pub sumtime: i64,
    pub min: Option<f64>,
    pub mintime: Option<Timestamp>,
    pub max: Option<f64>,
    pub maxtime: Option<Timestamp>,
    pub first: Option<f64>,
    pub firsttime: Option<Timestamp>,
    pub last: Option<f64>,
    pub lasttime: Option<Timestamp>,
}

impl DaySummary {
    pub fn new(day: Timestamp) -> Self {
        Self {
            day,
            ..Default::default()
        }
    }

    /// Fold one archive value stamped `ts` covering `interval_secs` seconds.
    /// A missing value leaves the row untouched.
    pub fn add(&mut self, value: Option<f64>, ts: Timestamp, interval_secs: i64) {
        let Some(v) = value else { return };

        self.count += 1;
        self.sum += v;
        self.wsum += v * interval_secs as f64;
        self.sumtime += interval_secs;
        if self.min.map_or(true, |m| v < m) {
            self.min = Some(v);
            self.mintime = Some(ts);
        }
        if self.max.map_or(true, |m| v > m) {
            self.max = Some(v);
            self.maxtime = Some(ts);
        }
        if self.firsttime.map_or(true, |t| ts < t) {
            self.first = Some(v);
            self.firsttime = Some(ts);
        }
        if self.lasttime.map_or(true, |t| ts >= t) {
            self.last = Some(v);
            self.lasttime = Some(ts);
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }

    /// Time-weighted average
    pub fn avg(&self) -> Option<f64> {
        (self.sumtime > 0).then(|| self.wsum / self.sumtime as f64)
    }

    /// Plain arithmetic mean of the archive values
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn total(&self) -> Option<f64> {
        self.has_data().then_some(self.sum)
    }
}
