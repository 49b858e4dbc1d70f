//! Folding per-day rollups into span results

use std::collections::BTreeMap;
use weex_core::{ArchiveRecord, DayClock, DaySummary, Timestamp};

use crate::op::{Comparison, DayStat, Verb};

/// Bucket raw archive values of `obs_type` into per-day summaries, the same
/// rows the daily tables would hold for those records.
pub fn bucket_by_day(clock: &DayClock, records: &[ArchiveRecord], obs_type: &str) -> Vec<DaySummary> {
    let mut days: BTreeMap<Timestamp, DaySummary> = BTreeMap::new();
    for record in records {
        let day = clock.archive_day_start(record.date_time);
        days.entry(day)
            .or_insert_with(|| DaySummary::new(day))
            .add(record.get(obs_type), record.date_time, record.interval_secs());
    }
    days.into_values().collect()
}

/// Evaluate a day-decomposable verb over consecutive days
pub fn day_verb(verb: Verb, days: &[DaySummary]) -> Option<f64> {
    let with_data = || days.iter().filter(|d| d.has_data());

    match verb {
        Verb::Avg => {
            let (wsum, sumtime) = days
                .iter()
                .fold((0.0, 0_i64), |(w, t), d| (w + d.wsum, t + d.sumtime));
            (sumtime > 0).then(|| wsum / sumtime as f64)
        }
        Verb::Sum => {
            let mut iter = with_data().peekable();
            iter.peek()?;
            Some(iter.map(|d| d.sum).sum())
        }
        Verb::Count => {
            let count: i64 = days.iter().map(|d| d.count).sum();
            (count > 0).then_some(count as f64)
        }
        Verb::Min => extreme(days, |d| d.min.zip(d.mintime), Pick::Lowest).map(|(v, _)| v),
        Verb::MinTime => extreme(days, |d| d.min.zip(d.mintime), Pick::Lowest).map(|(_, t)| t as f64),
        Verb::Max => extreme(days, |d| d.max.zip(d.maxtime), Pick::Highest).map(|(v, _)| v),
        Verb::MaxTime => extreme(days, |d| d.max.zip(d.maxtime), Pick::Highest).map(|(_, t)| t as f64),
        Verb::First => earliest(days).map(|(v, _)| v),
        Verb::FirstTime => earliest(days).map(|(_, t)| t as f64),
        Verb::Last => latest(days).map(|(v, _)| v),
        Verb::LastTime => latest(days).map(|(_, t)| t as f64),
        Verb::MaxMin => extreme(days, |d| d.min.zip(d.mintime), Pick::Highest).map(|(v, _)| v),
        Verb::MaxMinTime => {
            extreme(days, |d| d.min.zip(d.mintime), Pick::Highest).map(|(_, t)| t as f64)
        }
        Verb::MinMax => extreme(days, |d| d.max.zip(d.maxtime), Pick::Lowest).map(|(v, _)| v),
        Verb::MinMaxTime => {
            extreme(days, |d| d.max.zip(d.maxtime), Pick::Lowest).map(|(_, t)| t as f64)
        }
        Verb::MeanMax => mean(days.iter().filter_map(|d| d.max)),
        Verb::MeanMin => mean(days.iter().filter_map(|d| d.min)),
        Verb::MaxSum => daily_sum(days, Pick::Highest).map(|(v, _)| v),
        Verb::MaxSumTime => daily_sum(days, Pick::Highest).map(|(_, t)| t as f64),
        Verb::MinSum => daily_sum(days, Pick::Lowest).map(|(v, _)| v),
        Verb::MinSumTime => daily_sum(days, Pick::Lowest).map(|(_, t)| t as f64),
        _ => None,
    }
}

/// Number of days with data whose statistic passes `limit`; `None` when no
/// day has data
pub fn threshold_count(stat: DayStat, comparison: Comparison, limit: f64, days: &[DaySummary]) -> Option<f64> {
    let mut any = false;
    let mut count = 0_u32;
    for day in days.iter().filter(|d| d.has_data()) {
        any = true;
        let value = match stat {
            DayStat::Avg => day.avg(),
            DayStat::Max => day.max,
            DayStat::Min => day.min,
            DayStat::Sum => day.total(),
        };
        if value.is_some_and(|v| comparison.test(v, limit)) {
            count += 1;
        }
    }
    any.then_some(f64::from(count))
}

#[derive(Clone, Copy)]
enum Pick {
    Lowest,
    Highest,
}

impl Pick {
    fn better(self, candidate: f64, best: f64) -> bool {
        match self {
            Pick::Lowest => candidate < best,
            Pick::Highest => candidate > best,
        }
    }
}

/// Extreme of a per-day value; ties keep the earliest day
fn extreme(
    days: &[DaySummary],
    value: impl Fn(&DaySummary) -> Option<(f64, Timestamp)>,
    pick: Pick,
) -> Option<(f64, Timestamp)> {
    days.iter()
        .filter_map(value)
        .fold(None, |best: Option<(f64, Timestamp)>, (v, t)| match best {
            Some((b, _)) if !pick.better(v, b) => best,
            _ => Some((v, t)),
        })
}

/// Extreme daily total, timed by the start of its day
fn daily_sum(days: &[DaySummary], pick: Pick) -> Option<(f64, Timestamp)> {
    extreme(
        days,
        |d| d.has_data().then_some((d.sum, d.day)),
        pick,
    )
}

fn earliest(days: &[DaySummary]) -> Option<(f64, Timestamp)> {
    days.iter()
        .filter_map(|d| d.first.zip(d.firsttime))
        .min_by_key(|&(_, t)| t)
}

fn latest(days: &[DaySummary]) -> Option<(f64, Timestamp)> {
    days.iter()
        .filter_map(|d| d.last.zip(d.lasttime))
        .max_by_key(|&(_, t)| t)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0_u32), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / f64::from(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weex_core::{UnitSystem, SECONDS_PER_DAY};

    const DAY0: i64 = 1_710_028_800;

    fn day(index: i64, values: &[f64]) -> DaySummary {
        let start = DAY0 + index * SECONDS_PER_DAY;
        let mut summary = DaySummary::new(start);
        for (i, v) in values.iter().enumerate() {
            summary.add(Some(*v), start + 300 * (i as i64 + 1), 300);
        }
        summary
    }

    fn week() -> Vec<DaySummary> {
        vec![
            day(0, &[10.0, 14.0, 12.0]),
            day(1, &[8.0, 16.0]),
            day(2, &[]),
            day(3, &[11.0, 11.0, 11.0, 11.0]),
        ]
    }

    #[test]
    fn test_simple_verbs() {
        let days = week();
        assert_eq!(day_verb(Verb::Count, &days), Some(9.0));
        assert_eq!(day_verb(Verb::Sum, &days), Some(104.0));
        assert_eq!(day_verb(Verb::Min, &days), Some(8.0));
        assert_eq!(day_verb(Verb::MinTime, &days), Some((DAY0 + SECONDS_PER_DAY + 300) as f64));
        assert_eq!(day_verb(Verb::Max, &days), Some(16.0));
        assert_eq!(day_verb(Verb::First, &days), Some(10.0));
        assert_eq!(day_verb(Verb::Last, &days), Some(11.0));
        assert_eq!(
            day_verb(Verb::LastTime, &days),
            Some((DAY0 + 3 * SECONDS_PER_DAY + 1200) as f64)
        );
    }

    #[test]
    fn test_avg_is_time_weighted() {
        let mut a = DaySummary::new(DAY0);
        a.add(Some(10.0), DAY0 + 60, 60);
        let mut b = DaySummary::new(DAY0 + SECONDS_PER_DAY);
        b.add(Some(20.0), DAY0 + SECONDS_PER_DAY + 300, 300);
        // 10 for one minute, 20 for five
        let avg = day_verb(Verb::Avg, &[a, b]).unwrap();
        assert!((avg - 110.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_over_day_verbs() {
        let days = week();
        assert_eq!(day_verb(Verb::MaxMin, &days), Some(11.0));
        assert_eq!(day_verb(Verb::MinMax, &days), Some(11.0));
        assert_eq!(day_verb(Verb::MeanMax, &days), Some(41.0 / 3.0));
        assert_eq!(day_verb(Verb::MeanMin, &days), Some(29.0 / 3.0));
        assert_eq!(day_verb(Verb::MaxSum, &days), Some(44.0));
        assert_eq!(day_verb(Verb::MaxSumTime, &days), Some((DAY0 + 3 * SECONDS_PER_DAY) as f64));
        assert_eq!(day_verb(Verb::MinSum, &days), Some(24.0));
        assert_eq!(day_verb(Verb::MinSumTime, &days), Some((DAY0 + SECONDS_PER_DAY) as f64));
    }

    #[test]
    fn test_empty_days_give_none() {
        let days = vec![day(0, &[]), day(1, &[])];
        for verb in [Verb::Avg, Verb::Sum, Verb::Count, Verb::Min, Verb::MaxSum, Verb::MeanMax] {
            assert_eq!(day_verb(verb, &days), None, "{verb}");
        }
        assert_eq!(day_verb(Verb::Count, &[]), None);
    }

    #[test]
    fn test_threshold_counting() {
        let days = vec![day(0, &[4.0]), day(1, &[6.0]), day(2, &[5.0]), day(3, &[])];
        assert_eq!(threshold_count(DayStat::Sum, Comparison::AtLeast, 5.0, &days), Some(2.0));
        assert_eq!(threshold_count(DayStat::Sum, Comparison::AtMost, 5.0, &days), Some(2.0));
        assert_eq!(threshold_count(DayStat::Max, Comparison::AtLeast, 10.0, &days), Some(0.0));
        assert_eq!(threshold_count(DayStat::Avg, Comparison::AtLeast, 0.0, &[day(0, &[])]), None);
    }

    #[test]
    fn test_bucket_by_day_splits_at_midnight() {
        let clock = DayClock::utc();
        let records: Vec<_> = [DAY0 - 300, DAY0, DAY0 + 300]
            .iter()
            .map(|&ts| ArchiveRecord::new(ts, UnitSystem::Us, 5).with("rain", 1.0))
            .collect();
        let days = bucket_by_day(&clock, &records, "rain");
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].day, DAY0 - SECONDS_PER_DAY);
        assert_eq!(days[0].total(), Some(2.0));
        assert_eq!(days[1].total(), Some(1.0));
    }
}
