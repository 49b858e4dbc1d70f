//! Interval accumulation of LOOP samples into archive values

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::types::Timestamp;
use crate::value::ValueTuple;

/// Whether an observation's archive value is an average or a total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObsKind {
    /// Averaged over the interval (temperature, pressure)
    Intensive,
    /// Accumulated over the interval (rain)
    Extensive,
}

/// How an accumulator turns its samples into one archive value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extractor {
    /// Mean of the samples
    Avg,
    /// Difference between the last and first reading of a cumulative counter
    Delta,
    /// Sum of per-packet amounts
    Sum,
    Min,
    Max,
    First,
    Last,
}

impl Extractor {
    pub fn default_for(kind: ObsKind) -> Self {
        match kind {
            ObsKind::Intensive => Extractor::Avg,
            ObsKind::Extensive => Extractor::Delta,
        }
    }
}

/// Default classification for common observation types
pub fn default_kind(obs_type: &str) -> ObsKind {
    match obs_type {
        "rain" | "hail" | "ET" => ObsKind::Extensive,
        _ => ObsKind::Intensive,
    }
}

/// Default extractor for common observation types
pub fn default_extractor(obs_type: &str) -> Extractor {
    match obs_type {
        "windGust" => Extractor::Max,
        "windDir" | "windGustDir" => Extractor::Last,
        other => Extractor::default_for(default_kind(other)),
    }
}

/// Per-type classification and extractor overrides, usually from config
#[derive(Debug, Clone, Default)]
pub struct AccumulatorConfig {
    kinds: HashMap<String, ObsKind>,
    extractors: HashMap<String, Extractor>,
}

impl AccumulatorConfig {
    pub fn set_kind(&mut self, obs_type: &str, kind: ObsKind) -> &mut Self {
        self.kinds.insert(obs_type.to_string(), kind);
        self
    }

    pub fn set_extractor(&mut self, obs_type: &str, extractor: Extractor) -> &mut Self {
        self.extractors.insert(obs_type.to_string(), extractor);
        self
    }

    pub fn kind_for(&self, obs_type: &str) -> ObsKind {
        self.kinds
            .get(obs_type)
            .copied()
            .unwrap_or_else(|| default_kind(obs_type))
    }

    /// An explicit extractor wins; otherwise an explicit kind picks its
    /// default; otherwise the built-in default for the type.
    pub fn extractor_for(&self, obs_type: &str) -> Extractor {
        if let Some(e) = self.extractors.get(obs_type) {
            return *e;
        }
        match self.kinds.get(obs_type) {
            Some(kind) => Extractor::default_for(*kind),
            None => default_extractor(obs_type),
        }
    }

    pub fn accumulator(&self, obs_type: &str, unit: Option<&str>, group: Option<&str>) -> Accumulator {
        Accumulator::new(obs_type, self.extractor_for(obs_type), unit, group)
    }
}

/// Statistics for one observation type over one archive interval
#[derive(Debug, Clone)]
pub struct Accumulator {
    obs_type: String,
    extractor: Extractor,
    unit: Option<String>,
    group: Option<String>,
    count: usize,
    sum: f64,
    min: Option<(f64, Timestamp)>,
    max: Option<(f64, Timestamp)>,
    first: Option<(f64, Timestamp)>,
    last: Option<(f64, Timestamp)>,
    /// Counter reading carried over from the previous interval
    baseline: Option<(f64, Timestamp)>,
}

impl Accumulator {
    pub fn new(obs_type: &str, extractor: Extractor, unit: Option<&str>, group: Option<&str>) -> Self {
        Self {
            obs_type: obs_type.to_string(),
            extractor,
            unit: unit.map(str::to_string),
            group: group.map(str::to_string),
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
            first: None,
            last: None,
            baseline: None,
        }
    }

    /// Start a counter from the previous interval's last reading. The
    /// baseline is not a sample: an interval without readings of its own
    /// still finalizes to None.
    pub fn set_baseline(&mut self, ts: Timestamp, value: f64) -> &mut Self {
        self.baseline = Some((value, ts));
        self
    }

    pub fn baseline(&self) -> Option<(f64, Timestamp)> {
        self.baseline
    }

    /// Fold one sample in. Missing values are skipped.
    pub fn add_sample(&mut self, ts: Timestamp, value: Option<f64>) {
        let Some(v) = value else { return };

        self.count += 1;
        self.sum += v;
        if self.min.map_or(true, |(m, _)| v < m) {
            self.min = Some((v, ts));
        }
        if self.max.map_or(true, |(m, _)| v > m) {
            self.max = Some((v, ts));
        }
        if self.first.map_or(true, |(_, t)| ts < t) {
            self.first = Some((v, ts));
        }
        if self.last.map_or(true, |(_, t)| ts >= t) {
            self.last = Some((v, ts));
        }
    }

    pub fn obs_type(&self) -> &str {
        &self.obs_type
    }

    pub fn extractor(&self) -> Extractor {
        self.extractor
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum(&self) -> Option<f64> {
        (self.count > 0).then_some(self.sum)
    }

    pub fn min(&self) -> Option<(f64, Timestamp)> {
        self.min
    }

    pub fn max(&self) -> Option<(f64, Timestamp)> {
        self.max
    }

    pub fn first(&self) -> Option<(f64, Timestamp)> {
        self.first
    }

    pub fn last(&self) -> Option<(f64, Timestamp)> {
        self.last
    }

    /// Close the interval and produce its archive value
    pub fn finalize(self) -> ValueTuple {
        let value = self.result();
        ValueTuple::new(value, self.unit.as_deref(), self.group.as_deref())
    }

    fn result(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        Some(match self.extractor {
            Extractor::Avg => self.sum / self.count as f64,
            Extractor::Sum => self.sum,
            Extractor::Min => self.min?.0,
            Extractor::Max => self.max?.0,
            Extractor::First => self.first?.0,
            Extractor::Last => self.last?.0,
            Extractor::Delta => {
                let (first, _) = self.baseline.or(self.first)?;
                let (last, _) = self.last?;
                let delta = last - first;
                if delta < 0.0 {
                    warn!(
                        obs_type = %self.obs_type,
                        first,
                        last,
                        "Counter reset detected, clamping interval total to zero"
                    );
                    0.0
                } else {
                    delta
                }
            }
        })
    }
}
