//! Daemon settings resolved from the application configuration

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use weewx_config::AppConfig;
use weex_core::{AccumulatorConfig, TargetUnits, UnitModel};
use weex_db::DbOptions;
use weex_ingest::{DriverOptions, DriverRegistry};
use weex_query::{DegreeDays, DerivedWeather, XTypeRegistry};

/// Priority of the built-in derived types
const BUILTIN_XTYPE_PRIORITY: i32 = 100;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub station_id: String,
    pub db_options: DbOptions,
    pub archive_interval: i64,
    pub driver: String,
    pub driver_options: DriverOptions,
    pub model: Arc<UnitModel>,
    pub targets: TargetUnits,
    pub accumulators: AccumulatorConfig,
    pub degree_days: DegreeDays,
    pub query_workers: usize,
    pub query_timeout: Option<Duration>,
}

impl DaemonConfig {
    /// Resolve and cross-check everything the daemon needs
    pub fn from_app(app: &AppConfig) -> Result<Self> {
        app.validate().context("Invalid configuration")?;

        let model = app.unit_model().context("Failed to build unit model")?;
        let targets = app
            .target_units(&model)
            .context("Invalid [units] section")?;
        let (heating, cooling, growing) = app
            .degree_day_bases(&model)
            .context("Invalid [query.degree_days] section")?;

        let mut db_options = DbOptions::new(&app.database.path)
            .unit_system(app.database_unit_system()?)
            .clock(app.day_clock()?)
            .max_connections(app.database.max_connections);
        if let Some(columns) = &app.database.columns {
            if columns.is_empty() {
                bail!("database.columns must name at least one observation type");
            }
            db_options = db_options.columns(columns.iter().cloned());
        }

        let driver_options = DriverOptions {
            loop_interval: app.loop_interval_secs()?,
            settings: app.driver_settings()?,
        };
        DriverRegistry::builtin()
            .validate(&app.station.driver, &driver_options)
            .with_context(|| format!("Invalid [station] driver {}", app.station.driver))?;

        Ok(Self {
            station_id: app.station.id.clone(),
            db_options,
            archive_interval: app.archive_interval_secs()?,
            driver: app.station.driver.clone(),
            driver_options,
            model: Arc::new(model),
            targets,
            accumulators: app.accumulator_config(),
            degree_days: DegreeDays::with_bases(heating, cooling, growing),
            query_workers: app.query.workers,
            query_timeout: app.query_timeout()?,
        })
    }

    /// Derived types with the configured degree-day bases
    pub fn xtypes(&self) -> XTypeRegistry {
        let registry = XTypeRegistry::new();
        registry.register(Arc::new(DerivedWeather), BUILTIN_XTYPE_PRIORITY);
        registry.register(Arc::new(self.degree_days.clone()), BUILTIN_XTYPE_PRIORITY);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weex_core::UnitSystem;

    #[test]
    fn test_defaults_resolve() {
        let config = DaemonConfig::from_app(&AppConfig::default()).unwrap();
        assert_eq!(config.archive_interval, 300);
        assert_eq!(config.driver, "simulator");
        assert_eq!(config.targets.system(), UnitSystem::Us);
        assert_eq!(config.query_workers, 4);
        assert_eq!(config.xtypes().len(), 2);
    }

    #[test]
    fn test_metric_station() {
        let app = AppConfig::parse(
            r#"
[database]
unit_system = "metricwx"
columns = ["outTemp", "rain"]

[units]
system = "metric"

[units.groups]
group_rain = "mm"

[query]
timeout = "30s"
"#,
        )
        .unwrap();
        let config = DaemonConfig::from_app(&app).unwrap();
        assert_eq!(config.targets.unit_for("group_rain"), Some("mm"));
        assert_eq!(config.query_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_driver_resolved_from_station() {
        let app = AppConfig::parse(
            "[station]\nloop_interval = \"5\"\n\n[station.options]\nmode = \"generator\"\nstart = 86400\n",
        )
        .unwrap();
        let config = DaemonConfig::from_app(&app).unwrap();
        assert_eq!(config.driver_options.loop_interval, 5);
        assert_eq!(config.driver_options.get("start"), Some("86400"));

        let unknown = AppConfig::parse("[station]\ndriver = \"vantage\"\n").unwrap();
        assert!(DaemonConfig::from_app(&unknown).is_err());

        let bad_mode = AppConfig::parse("[station.options]\nmode = \"replay\"\n").unwrap();
        assert!(DaemonConfig::from_app(&bad_mode).is_err());
    }

    #[test]
    fn test_rejects_empty_columns() {
        let app = AppConfig::parse("[database]\ncolumns = []\n").unwrap();
        assert!(DaemonConfig::from_app(&app).is_err());
    }
}
