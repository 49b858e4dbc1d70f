//! Core data types for weather observations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::units::UnitError;

/// Timestamp type (Unix epoch seconds)
pub type Timestamp = i64;

/// Archive interval in minutes, as stored in the `interval` column
pub type Interval = i32;

/// Unit system identifiers stored in `usUnits`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum UnitSystem {
    Us,
    Metric,
    MetricWx,
}

impl UnitSystem {
    pub const ALL: [UnitSystem; 3] = [UnitSystem::Us, UnitSystem::Metric, UnitSystem::MetricWx];

    pub fn code(self) -> i32 {
        match self {
            UnitSystem::Us => unit_systems::US,
            UnitSystem::Metric => unit_systems::METRIC,
            UnitSystem::MetricWx => unit_systems::METRICWX,
        }
    }
}

impl TryFrom<i32> for UnitSystem {
    type Error = UnitError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            unit_systems::US => Ok(UnitSystem::Us),
            unit_systems::METRIC => Ok(UnitSystem::Metric),
            unit_systems::METRICWX => Ok(UnitSystem::MetricWx),
            other => Err(UnitError::UnknownUnitSystem(other)),
        }
    }
}

impl From<UnitSystem> for i32 {
    fn from(system: UnitSystem) -> Self {
        system.code()
    }
}

impl FromStr for UnitSystem {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "us" => Ok(UnitSystem::Us),
            "metric" => Ok(UnitSystem::Metric),
            "metricwx" => Ok(UnitSystem::MetricWx),
            other => match other.parse::<i32>() {
                Ok(code) => UnitSystem::try_from(code),
                Err(_) => Err(UnitError::UnknownSystemName(s.to_string())),
            },
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitSystem::Us => "US",
            UnitSystem::Metric => "METRIC",
            UnitSystem::MetricWx => "METRICWX",
        };
        f.write_str(name)
    }
}

/// LOOP packet from a station driver.
///
/// All values share the packet's unit system. Observation types the
/// hardware did not report are absent from the map; an explicit `null`
/// means the sensor reported but had no reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopPacket {
    /// Unix timestamp of observation
    #[serde(rename = "dateTime")]
    pub date_time: Timestamp,

    /// Unit system every observation in this packet is expressed in
    #[serde(rename = "usUnits")]
    pub us_units: UnitSystem,

    /// Weather observations (field name -> value)
    #[serde(flatten)]
    pub observations: BTreeMap<String, Option<f64>>,
}

impl LoopPacket {
    pub fn new(date_time: Timestamp, us_units: UnitSystem) -> Self {
        Self {
            date_time,
            us_units,
            observations: BTreeMap::new(),
        }
    }

    pub fn with(mut self, obs_type: impl Into<String>, value: impl Into<Option<f64>>) -> Self {
        self.observations.insert(obs_type.into(), value.into());
        self
    }

    pub fn get(&self, obs_type: &str) -> Option<f64> {
        self.observations.get(obs_type).copied().flatten()
    }
}

/// Archive record: one consolidated interval in the database unit system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveRecord {
    /// Unix timestamp (end of interval)
    #[serde(rename = "dateTime")]
    pub date_time: Timestamp,

    /// Unit system of every value in the record
    #[serde(rename = "usUnits")]
    pub us_units: UnitSystem,

    /// Interval length in minutes
    pub interval: Interval,

    /// Consolidated observations
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

impl ArchiveRecord {
    pub fn new(date_time: Timestamp, us_units: UnitSystem, interval: Interval) -> Self {
        Self {
            date_time,
            us_units,
            interval,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, obs_type: impl Into<String>, value: impl Into<Option<f64>>) -> Self {
        self.values.insert(obs_type.into(), value.into());
        self
    }

    pub fn get(&self, obs_type: &str) -> Option<f64> {
        self.values.get(obs_type).copied().flatten()
    }

    /// Interval length in seconds
    pub fn interval_secs(&self) -> i64 {
        i64::from(self.interval) * 60
    }
}

/// Unit system codes as stored in the `usUnits` column
pub mod unit_systems {
    pub const US: i32 = 1;
    pub const METRIC: i32 = 16;
    pub const METRICWX: i32 = 17;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_system_codes() {
        assert_eq!(UnitSystem::try_from(1).unwrap(), UnitSystem::Us);
        assert_eq!(UnitSystem::try_from(17).unwrap(), UnitSystem::MetricWx);
        assert!(UnitSystem::try_from(2).is_err());
        assert_eq!("metric".parse::<UnitSystem>().unwrap(), UnitSystem::Metric);
        assert_eq!("16".parse::<UnitSystem>().unwrap(), UnitSystem::Metric);
        assert!("imperial".parse::<UnitSystem>().is_err());
    }

    #[test]
    fn test_loop_packet_serde() {
        let json = r#"{"dateTime":1234567890,"usUnits":16,"outTemp":25.5,"rain":null}"#;
        let packet: LoopPacket = serde_json::from_str(json).unwrap();

        assert_eq!(packet.date_time, 1234567890);
        assert_eq!(packet.us_units, UnitSystem::Metric);
        assert_eq!(packet.get("outTemp"), Some(25.5));
        assert!(packet.observations.contains_key("rain"));
        assert_eq!(packet.get("rain"), None);
        assert!(!packet.observations.contains_key("windSpeed"));
    }

    #[test]
    fn test_archive_record_interval() {
        let record = ArchiveRecord::new(1_700_000_100, UnitSystem::Us, 5).with("outTemp", 70.0);
        assert_eq!(record.interval_secs(), 300);
        assert_eq!(record.get("outTemp"), Some(70.0));
        assert_eq!(record.get("barometer"), None);
    }
}
