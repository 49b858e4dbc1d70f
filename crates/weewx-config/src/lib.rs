use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use weex_core::{
    parse_duration, AccumulatorConfig, DayClock, DurationError, Extractor, ObsKind, TargetUnits,
    UnitError, UnitModel, UnitModelBuilder, UnitSystem, ValueTuple,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub id: String,
    /// Offset of local time from UTC; days start at local midnight
    pub utc_offset_minutes: i32,
    pub driver: String,
    /// Seconds between LOOP packets, duration notation
    pub loop_interval: String,
    /// Settings handed to the driver, e.g. `mode = "generator"` for the
    /// simulator
    pub options: BTreeMap<String, toml::Value>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            id: "weewx".to_string(),
            utc_offset_minutes: 0,
            driver: "simulator".to_string(),
            loop_interval: "2".to_string(),
            options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Unit system every stored value is expressed in; fixed once created
    pub unit_system: String,
    /// Observation columns for a new archive; the built-in set when absent
    pub columns: Option<Vec<String>>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("weewx.sdb"),
            unit_system: "US".to_string(),
            columns: None,
            max_connections: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Archive interval, duration notation; must be whole minutes
    pub interval: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            interval: "300".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitsConfig {
    /// Unit system query results are presented in
    pub system: String,
    /// Per-group unit overrides, e.g. `group_pressure = "hPa"`
    pub groups: BTreeMap<String, String>,
    /// Extra observation type memberships, e.g. `soilMoist1 = "group_percent"`
    pub obs_groups: BTreeMap<String, String>,
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            system: "US".to_string(),
            groups: BTreeMap::new(),
            obs_groups: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    pub kind: Option<ObsKind>,
    pub extractor: Option<Extractor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegreeDayConfig {
    pub heating_base: f64,
    pub cooling_base: f64,
    pub growing_base: f64,
    /// Temperature unit the bases are given in
    pub unit: String,
}

impl Default for DegreeDayConfig {
    fn default() -> Self {
        Self {
            heating_base: 65.0,
            cooling_base: 65.0,
            growing_base: 50.0,
            unit: "degree_F".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub workers: usize,
    /// Per-query timeout, duration notation; no limit when absent
    pub timeout: Option<String>,
    pub degree_days: DegreeDayConfig,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout: Some("60".to_string()),
            degree_days: DegreeDayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub station: StationConfig,
    pub database: DatabaseConfig,
    pub archive: ArchiveConfig,
    pub units: UnitsConfig,
    pub observations: BTreeMap<String, ObservationConfig>,
    pub query: QueryConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid duration: {0}")]
    Duration(#[from] DurationError),
    #[error("Invalid units: {0}")]
    Unit(#[from] UnitError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl AppConfig {
    /// Load configuration from WEEWX_CONFIG path (TOML) if present, with reasonable defaults
    pub fn load() -> ConfigResult<Self> {
        let path = std::env::var("WEEWX_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        if Path::new(&path).exists() {
            Self::from_path(&path)
        } else {
            Ok(AppConfig::default())
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let s = fs::read_to_string(path)?;
        Self::parse(&s)
    }

    /// Parse and validate a TOML document
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let cfg = toml::from_str::<AppConfig>(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check everything that can be checked without building the unit model
    pub fn validate(&self) -> ConfigResult<()> {
        self.archive_interval_secs()?;
        self.loop_interval_secs()?;
        self.query_timeout()?;
        self.database_unit_system()?;
        self.target_unit_system()?;
        self.day_clock()?;

        if self.query.workers == 0 {
            return Err(ConfigError::Invalid("query.workers must be at least 1".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        self.driver_settings()?;
        Ok(())
    }

    /// Archive interval in seconds
    pub fn archive_interval_secs(&self) -> ConfigResult<i64> {
        let secs = parse_duration(&self.archive.interval)?;
        if secs <= 0 || secs % 60 != 0 {
            return Err(ConfigError::Invalid(format!(
                "archive.interval must be a positive whole number of minutes, got {secs} seconds"
            )));
        }
        Ok(secs)
    }

    pub fn loop_interval_secs(&self) -> ConfigResult<u64> {
        let secs = parse_duration(&self.station.loop_interval)?;
        u64::try_from(secs)
            .map_err(|_| ConfigError::Invalid(format!("station.loop_interval is negative: {secs}")))
    }

    /// Driver options as plain strings; tables and arrays are rejected
    pub fn driver_settings(&self) -> ConfigResult<BTreeMap<String, String>> {
        self.station
            .options
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Integer(_) | toml::Value::Float(_) | toml::Value::Boolean(_) => {
                        value.to_string()
                    }
                    _ => {
                        return Err(ConfigError::Invalid(format!(
                            "station.options.{key} must be a string, number or boolean"
                        )))
                    }
                };
                Ok((key.clone(), text))
            })
            .collect()
    }

    pub fn query_timeout(&self) -> ConfigResult<Option<Duration>> {
        match &self.query.timeout {
            Some(text) => {
                let secs = parse_duration(text)?;
                let secs = u64::try_from(secs)
                    .map_err(|_| ConfigError::Invalid(format!("query.timeout is negative: {secs}")))?;
                Ok(Some(Duration::from_secs(secs)))
            }
            None => Ok(None),
        }
    }

    pub fn database_unit_system(&self) -> ConfigResult<UnitSystem> {
        Ok(self.database.unit_system.parse()?)
    }

    pub fn target_unit_system(&self) -> ConfigResult<UnitSystem> {
        Ok(self.units.system.parse()?)
    }

    pub fn day_clock(&self) -> ConfigResult<DayClock> {
        self.station
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(DayClock::with_offset_secs)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "station.utc_offset_minutes out of range: {}",
                    self.station.utc_offset_minutes
                ))
            })
    }

    /// The built-in unit model plus configured observation memberships
    pub fn unit_model(&self) -> ConfigResult<UnitModel> {
        let mut builder = UnitModelBuilder::with_defaults()?;
        for (obs_type, group) in &self.units.obs_groups {
            builder.assign_obs(obs_type, group)?;
        }
        Ok(builder.build()?)
    }

    /// Presentation units: the target system with per-group overrides
    pub fn target_units(&self, model: &UnitModel) -> ConfigResult<TargetUnits> {
        let overrides = self
            .units
            .groups
            .iter()
            .map(|(group, unit)| (group.as_str(), unit.as_str()));
        Ok(model.target_units(self.target_unit_system()?, overrides)?)
    }

    pub fn accumulator_config(&self) -> AccumulatorConfig {
        let mut config = AccumulatorConfig::default();
        for (obs_type, obs) in &self.observations {
            if let Some(kind) = obs.kind {
                config.set_kind(obs_type, kind);
            }
            if let Some(extractor) = obs.extractor {
                config.set_extractor(obs_type, extractor);
            }
        }
        config
    }

    /// Degree-day base temperatures as heating, cooling, growing
    pub fn degree_day_bases(&self, model: &UnitModel) -> ConfigResult<(ValueTuple, ValueTuple, ValueTuple)> {
        let dd = &self.query.degree_days;
        let group = model.group_of_unit(&dd.unit).ok_or_else(|| UnitError::UnknownUnit(dd.unit.clone()))?;
        if group != "group_temperature" {
            return Err(ConfigError::Invalid(format!(
                "query.degree_days.unit must be a temperature unit, got {}",
                dd.unit
            )));
        }
        let base = |value| ValueTuple::scalar(value, &dd.unit, group);
        Ok((base(dd.heating_base), base(dd.cooling_base), base(dd.growing_base)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[station]
id = "backyard"
utc_offset_minutes = -300
driver = "simulator"
loop_interval = "2s"

[station.options]
mode = "generator"
start = 1700000000

[database]
path = "/var/lib/weewx/weewx.sdb"
unit_system = "METRICWX"
columns = ["outTemp", "rain"]

[archive]
interval = "600"

[units]
system = "METRIC"

[units.groups]
group_pressure = "hPa"

[units.obs_groups]
soilMoist1 = "group_percent"

[observations.lightning_strike_count]
kind = "extensive"

[observations.rain]
extractor = "sum"

[query]
workers = 8
timeout = "2h"

[query.degree_days]
heating_base = 18.0
cooling_base = 18.0
growing_base = 10.0
unit = "degree_C"
"#;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.archive_interval_secs().unwrap(), 300);
        assert_eq!(cfg.database_unit_system().unwrap(), UnitSystem::Us);
        assert_eq!(cfg.query_timeout().unwrap(), Some(Duration::from_secs(60)));
        assert_eq!(cfg.day_clock().unwrap(), DayClock::utc());
    }

    #[test]
    fn test_full_document() {
        let cfg = AppConfig::parse(FULL).unwrap();
        assert_eq!(cfg.station.id, "backyard");
        assert_eq!(cfg.loop_interval_secs().unwrap(), 2);
        let settings = cfg.driver_settings().unwrap();
        assert_eq!(settings.get("mode").map(String::as_str), Some("generator"));
        assert_eq!(settings.get("start").map(String::as_str), Some("1700000000"));
        assert_eq!(cfg.archive_interval_secs().unwrap(), 600);
        assert_eq!(cfg.database_unit_system().unwrap(), UnitSystem::MetricWx);
        assert_eq!(cfg.query_timeout().unwrap(), Some(Duration::from_secs(7200)));
        assert_eq!(cfg.day_clock().unwrap().offset().local_minus_utc(), -18_000);

        let model = cfg.unit_model().unwrap();
        assert_eq!(model.group_of("soilMoist1"), Some("group_percent"));
        let targets = cfg.target_units(&model).unwrap();
        assert_eq!(targets.unit_for("group_pressure"), Some("hPa"));
        assert_eq!(targets.unit_for("group_temperature"), Some("degree_C"));

        let acc = cfg.accumulator_config();
        assert_eq!(acc.kind_for("lightning_strike_count"), ObsKind::Extensive);
        assert_eq!(acc.extractor_for("rain"), Extractor::Sum);

        let (heating, _, growing) = cfg.degree_day_bases(&model).unwrap();
        assert_eq!(heating.unit(), Some("degree_C"));
        assert_eq!(growing.raw(), Some(10.0));
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_interval = "[archive]\ninterval = \"90\"\n";
        assert!(matches!(AppConfig::parse(bad_interval), Err(ConfigError::Invalid(_))));

        let bad_duration = "[query]\ntimeout = \"soon\"\n";
        assert!(matches!(AppConfig::parse(bad_duration), Err(ConfigError::Duration(_))));

        let bad_system = "[database]\nunit_system = \"IMPERIAL\"\n";
        assert!(matches!(AppConfig::parse(bad_system), Err(ConfigError::Unit(_))));

        let bad_option = "[station.options]\nports = [1, 2]\n";
        assert!(matches!(AppConfig::parse(bad_option), Err(ConfigError::Invalid(_))));

        let bad_toml = "[station\n";
        assert!(matches!(AppConfig::parse(bad_toml), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_unit_overrides_checked_against_model() {
        let cfg = AppConfig::parse("[units.groups]\ngroup_pressure = \"furlong\"\n").unwrap();
        let model = cfg.unit_model().unwrap();
        assert!(matches!(cfg.target_units(&model), Err(ConfigError::Unit(_))));

        let cfg = AppConfig::parse("[units.obs_groups]\nfoo = \"group_nonsense\"\n").unwrap();
        assert!(matches!(cfg.unit_model(), Err(ConfigError::Unit(_))));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weewx.toml");
        std::fs::write(&path, "[archive]\ninterval = \"1h\"\n").unwrap();
        let cfg = AppConfig::from_path(&path).unwrap();
        assert_eq!(cfg.archive_interval_secs().unwrap(), 3600);
    }
}
