//! Station drivers looked up by their configured name

use crate::{IngestError, IngestResult, SimulatorFactory, StationDriver};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use tracing::debug;

/// What a factory needs to build a driver: the LOOP cadence plus the
/// driver's own settings from the station configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOptions {
    /// Seconds between LOOP packets
    pub loop_interval: u64,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl DriverOptions {
    pub fn new(loop_interval: u64) -> Self {
        Self {
            loop_interval,
            settings: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Parse setting `key`, absent settings are `None`
    pub fn parse<T>(&self, key: &str) -> IngestResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| IngestError::Config(format!("{key} = {raw:?}: {e}")))
            })
            .transpose()
    }

    /// Reject settings outside `known`
    pub fn expect_only(&self, driver: &str, known: &[&str]) -> IngestResult<()> {
        match self.settings.keys().find(|k| !known.contains(&k.as_str())) {
            Some(key) => Err(IngestError::Config(format!("{driver} has no setting {key:?}"))),
            None => Ok(()),
        }
    }
}

/// Builds drivers of one kind
pub trait DriverFactory: Send + Sync {
    fn create(&self, options: &DriverOptions) -> IngestResult<Box<dyn StationDriver>>;

    /// Check `options` up front, before any hardware is touched
    fn validate(&self, options: &DriverOptions) -> IngestResult<()>;
}

/// Driver factories by name
pub struct DriverRegistry {
    factories: BTreeMap<String, Box<dyn DriverFactory>>,
}

impl DriverRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Every driver this crate ships
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("simulator", SimulatorFactory);
        registry
    }

    /// Add `factory` under `name`, replacing any factory already there
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: DriverFactory + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn factory(&self, name: &str) -> IngestResult<&dyn DriverFactory> {
        self.factories
            .get(name)
            .map(Box::as_ref)
            .ok_or_else(|| IngestError::UnknownDriver {
                name: name.to_string(),
                known: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    /// Check that `name` exists and accepts `options`
    pub fn validate(&self, name: &str, options: &DriverOptions) -> IngestResult<()> {
        self.factory(name)?.validate(options)
    }

    /// Build the driver configured as `name`
    pub fn create(&self, name: &str, options: &DriverOptions) -> IngestResult<Box<dyn StationDriver>> {
        let factory = self.factory(name)?;
        debug!(driver = name, loop_interval = options.loop_interval, "Creating station driver");
        factory.create(options)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatorMode;
    use weex_core::LoopPacket;

    struct Fixed;

    #[async_trait::async_trait]
    impl StationDriver for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn start(&mut self) -> IngestResult<()> {
            Ok(())
        }
        async fn stop(&mut self) -> IngestResult<()> {
            Ok(())
        }
        async fn get_packet(&mut self) -> IngestResult<LoopPacket> {
            Err(IngestError::Timeout)
        }
        fn is_active(&self) -> bool {
            true
        }
    }

    struct FixedFactory;

    impl DriverFactory for FixedFactory {
        fn create(&self, options: &DriverOptions) -> IngestResult<Box<dyn StationDriver>> {
            self.validate(options)?;
            Ok(Box::new(Fixed))
        }
        fn validate(&self, options: &DriverOptions) -> IngestResult<()> {
            options.expect_only("fixed", &[])
        }
    }

    #[test]
    fn test_builtin_and_custom_drivers() {
        let mut registry = DriverRegistry::builtin();
        registry.register("fixed", FixedFactory);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["fixed", "simulator"]);

        let options = DriverOptions::new(2);
        assert_eq!(registry.create("fixed", &options).unwrap().name(), "fixed");
        assert_eq!(registry.create("simulator", &options).unwrap().name(), "simulator");

        let stray = DriverOptions::new(2).with("port", "/dev/ttyUSB0");
        assert!(matches!(registry.validate("fixed", &stray), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_unknown_driver_lists_known_ones() {
        let registry = DriverRegistry::builtin();
        match registry.create("vantage", &DriverOptions::new(2)) {
            Err(IngestError::UnknownDriver { name, known }) => {
                assert_eq!(name, "vantage");
                assert_eq!(known, "simulator");
            }
            other => panic!("expected UnknownDriver, got {:?}", other.map(|d| d.name().to_string())),
        }
    }

    #[test]
    fn test_typed_settings() {
        let options = DriverOptions::new(5).with("mode", "generator").with("start", "1700000000");
        assert_eq!(options.parse::<SimulatorMode>("mode").unwrap(), Some(SimulatorMode::Generator));
        assert_eq!(options.parse::<i64>("start").unwrap(), Some(1_700_000_000));
        assert_eq!(options.parse::<i64>("missing").unwrap(), None);

        let bad = DriverOptions::new(5).with("start", "yesterday");
        assert!(matches!(bad.parse::<i64>("start"), Err(IngestError::Config(_))));
    }
}
