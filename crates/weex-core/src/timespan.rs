//! Time spans and calendar day boundaries
//!
//! Archive timestamps mark the *end* of an interval, so a span selects
//! records with `start < dateTime <= stop`, and a record stamped exactly at
//! midnight belongs to the day that just ended.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// A span of time `(start, stop]` in epoch seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: Timestamp,
    pub stop: Timestamp,
}

impl TimeSpan {
    pub fn new(start: Timestamp, stop: Timestamp) -> Self {
        Self { start, stop }
    }

    pub fn length(&self) -> i64 {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }

    /// Whether an archive record stamped `ts` falls in this span
    pub fn includes(&self, ts: Timestamp) -> bool {
        self.start < ts && ts <= self.stop
    }

    /// Consecutive sub-spans of `interval` seconds starting at `start`;
    /// the last one is cut short at `stop`.
    pub fn intervals(&self, interval: i64) -> Vec<TimeSpan> {
        let mut spans = Vec::new();
        if interval <= 0 {
            return spans;
        }
        let mut start = self.start;
        while start < self.stop {
            let stop = (start + interval).min(self.stop);
            spans.push(TimeSpan::new(start, stop));
            start = stop;
        }
        spans
    }
}

/// Day boundaries at local midnight for a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayClock {
    offset: FixedOffset,
}

impl Default for DayClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayClock {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// `None` if the offset is a day or more
    pub fn with_offset_secs(secs: i32) -> Option<Self> {
        FixedOffset::east_opt(secs).map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local midnight at or before `ts`
    pub fn start_of_day(&self, ts: Timestamp) -> Timestamp {
        let local = ts + i64::from(self.offset.local_minus_utc());
        ts - local.rem_euclid(SECONDS_PER_DAY)
    }

    pub fn is_start_of_day(&self, ts: Timestamp) -> bool {
        self.start_of_day(ts) == ts
    }

    /// Start of the day an archive record stamped `ts` belongs to
    pub fn archive_day_start(&self, ts: Timestamp) -> Timestamp {
        self.start_of_day(ts - 1)
    }

    /// The day containing `ts`
    pub fn day_span(&self, ts: Timestamp) -> TimeSpan {
        let start = self.start_of_day(ts);
        TimeSpan::new(start, start + SECONDS_PER_DAY)
    }

    /// The day an archive record stamped `ts` belongs to
    pub fn archive_day_span(&self, ts: Timestamp) -> TimeSpan {
        self.day_span(ts - 1)
    }

    /// Both ends on local midnight and at least one day long
    pub fn is_day_aligned(&self, span: &TimeSpan) -> bool {
        span.length() >= SECONDS_PER_DAY
            && self.is_start_of_day(span.start)
            && self.is_start_of_day(span.stop)
    }

    /// Calendar days overlapping `span`, each clipped to the span
    pub fn days(&self, span: &TimeSpan) -> Vec<TimeSpan> {
        let mut days = Vec::new();
        let mut start = span.start;
        while start < span.stop {
            let stop = (self.start_of_day(start) + SECONDS_PER_DAY).min(span.stop);
            days.push(TimeSpan::new(start, stop));
            start = stop;
        }
        days
    }

    /// Calendar month an archive record stamped `ts` belongs to
    pub fn archive_month_span(&self, ts: Timestamp) -> Option<TimeSpan> {
        let date = self.local_date(ts - 1)?;
        let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
        let next = if date.month() == 12 {
            NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)?
        };
        Some(TimeSpan::new(self.midnight(first)?, self.midnight(next)?))
    }

    /// Calendar year an archive record stamped `ts` belongs to
    pub fn archive_year_span(&self, ts: Timestamp) -> Option<TimeSpan> {
        let date = self.local_date(ts - 1)?;
        let first = NaiveDate::from_ymd_opt(date.year(), 1, 1)?;
        let next = NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?;
        Some(TimeSpan::new(self.midnight(first)?, self.midnight(next)?))
    }

    /// Seven days starting on the most recent `week_start` (0 = Monday)
    pub fn archive_week_span(&self, ts: Timestamp, week_start: u32) -> Option<TimeSpan> {
        let date = self.local_date(ts - 1)?;
        let back = (date.weekday().num_days_from_monday() + 7 - week_start % 7) % 7;
        let start = self.start_of_day(ts - 1) - i64::from(back) * SECONDS_PER_DAY;
        Some(TimeSpan::new(start, start + 7 * SECONDS_PER_DAY))
    }

    fn local_date(&self, ts: Timestamp) -> Option<NaiveDate> {
        DateTime::from_timestamp(ts, 0).map(|t| t.with_timezone(&self.offset).date_naive())
    }

    fn midnight(&self, date: NaiveDate) -> Option<Timestamp> {
        let naive = date.and_hms_opt(0, 0, 0)?;
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|t| t.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-10 00:00:00 UTC
    const MIDNIGHT: i64 = 1_710_028_800;

    #[test]
    fn test_start_of_day_utc() {
        let clock = DayClock::utc();
        assert_eq!(clock.start_of_day(MIDNIGHT + 3600), MIDNIGHT);
        assert_eq!(clock.start_of_day(MIDNIGHT), MIDNIGHT);
        assert!(clock.is_start_of_day(MIDNIGHT));
        assert_eq!(clock.archive_day_start(MIDNIGHT), MIDNIGHT - SECONDS_PER_DAY);
        assert_eq!(clock.archive_day_start(MIDNIGHT + 300), MIDNIGHT);
    }

    #[test]
    fn test_start_of_day_with_offset() {
        let clock = DayClock::with_offset_secs(-5 * 3600).unwrap();
        // 03:00 UTC is 22:00 the previous local day
        let ts = MIDNIGHT + 3 * 3600;
        assert_eq!(clock.start_of_day(ts), MIDNIGHT - 19 * 3600);
        assert!(clock.is_start_of_day(MIDNIGHT + 5 * 3600));
    }

    #[test]
    fn test_day_alignment() {
        let clock = DayClock::utc();
        assert!(clock.is_day_aligned(&TimeSpan::new(MIDNIGHT, MIDNIGHT + 3 * SECONDS_PER_DAY)));
        assert!(!clock.is_day_aligned(&TimeSpan::new(MIDNIGHT, MIDNIGHT + 3600)));
        assert!(!clock.is_day_aligned(&TimeSpan::new(MIDNIGHT + 1, MIDNIGHT + SECONDS_PER_DAY + 1)));
    }

    #[test]
    fn test_days_clip_to_span() {
        let clock = DayClock::utc();
        let span = TimeSpan::new(MIDNIGHT + 3600, MIDNIGHT + SECONDS_PER_DAY + 7200);
        let days = clock.days(&span);
        assert_eq!(
            days,
            vec![
                TimeSpan::new(MIDNIGHT + 3600, MIDNIGHT + SECONDS_PER_DAY),
                TimeSpan::new(MIDNIGHT + SECONDS_PER_DAY, MIDNIGHT + SECONDS_PER_DAY + 7200),
            ]
        );
    }

    #[test]
    fn test_intervals() {
        let span = TimeSpan::new(0, 1000);
        let parts = span.intervals(300);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3], TimeSpan::new(900, 1000));
        assert!(span.intervals(0).is_empty());
    }

    #[test]
    fn test_includes_is_open_at_start() {
        let span = TimeSpan::new(100, 200);
        assert!(!span.includes(100));
        assert!(span.includes(101));
        assert!(span.includes(200));
        assert!(!span.includes(201));
    }

    #[test]
    fn test_calendar_spans() {
        let clock = DayClock::utc();
        let month = clock.archive_month_span(MIDNIGHT + 60).unwrap();
        // March 2024
        assert_eq!(month.start, 1_709_251_200);
        assert_eq!(month.stop, 1_711_929_600);

        let year = clock.archive_year_span(MIDNIGHT + 60).unwrap();
        assert_eq!(year.start, 1_704_067_200);
        assert_eq!(year.stop, 1_735_689_600);

        // 2024-03-10 is a Sunday; weeks start on Monday
        let week = clock.archive_week_span(MIDNIGHT + 60, 0).unwrap();
        assert_eq!(week.start, MIDNIGHT - 6 * SECONDS_PER_DAY);
        assert_eq!(week.length(), 7 * SECONDS_PER_DAY);
    }
}
