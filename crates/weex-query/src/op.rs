//! Aggregation verbs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Built-in aggregation verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Avg,
    Sum,
    Min,
    Max,
    Count,
    First,
    Last,
    FirstTime,
    LastTime,
    MinTime,
    MaxTime,
    MaxMin,
    MinMax,
    MeanMax,
    MeanMin,
    MaxSum,
    MinSum,
    MaxSumTime,
    MinSumTime,
    MaxMinTime,
    MinMaxTime,
    Diff,
    Tderiv,
    Rms,
    VecAvg,
    VecDir,
    Exists,
    HasData,
    AvgGe,
    AvgLe,
    MaxGe,
    MaxLe,
    MinGe,
    MinLe,
    SumGe,
    SumLe,
}

const NAMES: [(Verb, &str); 36] = [
    (Verb::Avg, "avg"),
    (Verb::Sum, "sum"),
    (Verb::Min, "min"),
    (Verb::Max, "max"),
    (Verb::Count, "count"),
    (Verb::First, "first"),
    (Verb::Last, "last"),
    (Verb::FirstTime, "firsttime"),
    (Verb::LastTime, "lasttime"),
    (Verb::MinTime, "mintime"),
    (Verb::MaxTime, "maxtime"),
    (Verb::MaxMin, "maxmin"),
    (Verb::MinMax, "minmax"),
    (Verb::MeanMax, "meanmax"),
    (Verb::MeanMin, "meanmin"),
    (Verb::MaxSum, "maxsum"),
    (Verb::MinSum, "minsum"),
    (Verb::MaxSumTime, "maxsumtime"),
    (Verb::MinSumTime, "minsumtime"),
    (Verb::MaxMinTime, "maxmintime"),
    (Verb::MinMaxTime, "minmaxtime"),
    (Verb::Diff, "diff"),
    (Verb::Tderiv, "tderiv"),
    (Verb::Rms, "rms"),
    (Verb::VecAvg, "vecavg"),
    (Verb::VecDir, "vecdir"),
    (Verb::Exists, "exists"),
    (Verb::HasData, "has_data"),
    (Verb::AvgGe, "avg_ge"),
    (Verb::AvgLe, "avg_le"),
    (Verb::MaxGe, "max_ge"),
    (Verb::MaxLe, "max_le"),
    (Verb::MinGe, "min_ge"),
    (Verb::MinLe, "min_le"),
    (Verb::SumGe, "sum_ge"),
    (Verb::SumLe, "sum_le"),
];

/// How a verb is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbClass {
    /// Computable from per-day rollups
    DayDecomposable,
    /// Needs the individual archive records
    SampleLevel,
    /// Counts days whose statistic passes a threshold
    Threshold,
}

/// Per-day statistic a threshold verb compares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStat {
    Avg,
    Max,
    Min,
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    AtLeast,
    AtMost,
}

impl Comparison {
    pub fn test(self, value: f64, limit: f64) -> bool {
        match self {
            Comparison::AtLeast => value >= limit,
            Comparison::AtMost => value <= limit,
        }
    }
}

impl Verb {
    pub const ALL: [Verb; 36] = {
        let mut all = [Verb::Avg; 36];
        let mut i = 0;
        while i < NAMES.len() {
            all[i] = NAMES[i].0;
            i += 1;
        }
        all
    };

    pub fn from_name(name: &str) -> Option<Verb> {
        NAMES.iter().find(|(_, n)| *n == name).map(|(v, _)| *v)
    }

    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(v, _)| *v == self)
            .map(|(_, n)| *n)
            .unwrap_or("unknown")
    }

    pub fn class(self) -> VerbClass {
        use Verb::*;
        match self {
            Diff | Tderiv | Rms | VecAvg | VecDir | Exists | HasData => VerbClass::SampleLevel,
            AvgGe | AvgLe | MaxGe | MaxLe | MinGe | MinLe | SumGe | SumLe => VerbClass::Threshold,
            _ => VerbClass::DayDecomposable,
        }
    }

    /// Verbs that pick or average one value per day, so need at least a day
    pub fn spans_days(self) -> bool {
        use Verb::*;
        matches!(
            self,
            MaxMin | MinMax | MeanMax | MeanMin | MaxSum | MinSum | MaxSumTime | MinSumTime
                | MaxMinTime | MinMaxTime
        )
    }

    /// The compared statistic and direction of a threshold verb
    pub fn threshold(self) -> Option<(DayStat, Comparison)> {
        use Verb::*;
        Some(match self {
            AvgGe => (DayStat::Avg, Comparison::AtLeast),
            AvgLe => (DayStat::Avg, Comparison::AtMost),
            MaxGe => (DayStat::Max, Comparison::AtLeast),
            MaxLe => (DayStat::Max, Comparison::AtMost),
            MinGe => (DayStat::Min, Comparison::AtLeast),
            MinLe => (DayStat::Min, Comparison::AtMost),
            SumGe => (DayStat::Sum, Comparison::AtLeast),
            SumLe => (DayStat::Sum, Comparison::AtMost),
            _ => return None,
        })
    }

    /// Result is a timestamp
    pub fn is_time(self) -> bool {
        use Verb::*;
        matches!(
            self,
            FirstTime | LastTime | MinTime | MaxTime | MaxSumTime | MinSumTime | MaxMinTime
                | MinMaxTime
        )
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A requested aggregation: a built-in verb or a name only an extension
/// provider understands
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AggregateOp {
    Builtin(Verb),
    Custom(String),
}

impl AggregateOp {
    pub fn name(&self) -> &str {
        match self {
            AggregateOp::Builtin(verb) => verb.name(),
            AggregateOp::Custom(name) => name,
        }
    }

    pub fn verb(&self) -> Option<Verb> {
        match self {
            AggregateOp::Builtin(verb) => Some(*verb),
            AggregateOp::Custom(_) => None,
        }
    }
}

impl From<&str> for AggregateOp {
    fn from(name: &str) -> Self {
        match Verb::from_name(name) {
            Some(verb) => AggregateOp::Builtin(verb),
            None => AggregateOp::Custom(name.to_string()),
        }
    }
}

impl From<String> for AggregateOp {
    fn from(name: String) -> Self {
        AggregateOp::from(name.as_str())
    }
}

impl From<AggregateOp> for String {
    fn from(op: AggregateOp) -> Self {
        op.name().to_string()
    }
}

impl From<Verb> for AggregateOp {
    fn from(verb: Verb) -> Self {
        AggregateOp::Builtin(verb)
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
