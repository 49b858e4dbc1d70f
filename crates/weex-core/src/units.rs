//! Unit model: unit groups, unit systems and pairwise conversions
//!
//! Groups, units and conversions follow the WeeWX conventions. The
//! model is assembled once with [`UnitModelBuilder`] and is read-only
//! afterwards; share it behind an `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::types::UnitSystem;
use crate::value::ValueTuple;

/// Unit conversion error
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("Unknown unit system: {0}")]
    UnknownUnitSystem(i32),

    #[error("Unknown unit system name: {0}")]
    UnknownSystemName(String),

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Unknown unit group: {0}")]
    UnknownGroup(String),

    #[error("Unit {unit} is not a member of {group}")]
    UnitNotInGroup { unit: String, group: String },

    #[error("Unit {unit} already belongs to {group}")]
    DuplicateUnit { unit: String, group: String },

    #[error("No conversion registered from {from} to {to}")]
    NoConversion { from: String, to: String },

    #[error("Cannot convert a value whose unit is unknown")]
    UnknownSourceUnit,

    #[error("Value belongs to no unit group")]
    NoGroup,

    #[error("Incompatible units: {left} and {right}")]
    IncompatibleUnits { left: String, right: String },

    #[error("Value shapes do not match")]
    ShapeMismatch,

    #[error("Unit system {system} has no unit for {group}")]
    IncompleteSystem { system: UnitSystem, group: String },
}

pub type UnitResult<T> = Result<T, UnitError>;

/// Scalar conversion function between two units of one group
pub type Converter = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Display metadata for one unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitInfo {
    /// printf-style format (strftime for `unix_epoch`)
    pub format: String,
    pub singular: String,
    pub plural: String,
}

impl UnitInfo {
    pub fn new(format: &str, label: &str) -> Self {
        Self {
            format: format.to_string(),
            singular: label.to_string(),
            plural: label.to_string(),
        }
    }

    pub fn plural(mut self, label: &str) -> Self {
        self.plural = label.to_string();
        self
    }
}

/// A named category of physical quantity and its convertible units
#[derive(Debug, Clone)]
pub struct UnitGroup {
    name: String,
    units: BTreeMap<String, UnitInfo>,
}

impl UnitGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.units.contains_key(unit)
    }

    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }
}

/// Unit of a rate derived from a unit (e.g. `mm` -> `mm_per_hour`)
#[derive(Debug, Clone)]
struct RateUnit {
    unit: String,
    per_second_factor: f64,
}

/// Resolved unit model, immutable after [`UnitModelBuilder::build`]
pub struct UnitModel {
    groups: HashMap<String, UnitGroup>,
    unit_groups: HashMap<String, String>,
    obs_groups: HashMap<String, String>,
    systems: HashMap<UnitSystem, HashMap<String, String>>,
    conversions: HashMap<String, HashMap<(String, String), Converter>>,
    rates: HashMap<String, RateUnit>,
}

impl fmt::Debug for UnitModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitModel")
            .field("groups", &self.groups.len())
            .field("observation_types", &self.obs_groups.len())
            .finish()
    }
}

impl UnitModel {
    /// The built-in WeeWX groups, units and systems with no overrides
    pub fn builtin() -> UnitResult<Self> {
        UnitModelBuilder::with_defaults()?.build()
    }

    /// Unit group an observation type belongs to, `None` for "no group"
    pub fn group_of(&self, obs_type: &str) -> Option<&str> {
        self.obs_groups.get(obs_type).map(String::as_str)
    }

    pub fn group(&self, name: &str) -> Option<&UnitGroup> {
        self.groups.get(name)
    }

    pub fn group_of_unit(&self, unit: &str) -> Option<&str> {
        self.unit_groups.get(unit).map(String::as_str)
    }

    pub fn unit_info(&self, unit: &str) -> Option<&UnitInfo> {
        let group = self.unit_groups.get(unit)?;
        self.groups.get(group)?.units.get(unit)
    }

    /// Canonical unit of `group` in `system`
    pub fn unit_for(&self, system: UnitSystem, group: &str) -> Option<&str> {
        self.systems.get(&system)?.get(group).map(String::as_str)
    }

    /// Unit and group an observation type carries in `system`
    pub fn std_unit(&self, system: UnitSystem, obs_type: &str) -> (Option<&str>, Option<&str>) {
        match self.group_of(obs_type) {
            Some(group) => (self.unit_for(system, group), Some(group)),
            None => (None, None),
        }
    }

    /// Wrap a raw value of `obs_type` expressed in `system`
    pub fn value_tuple(
        &self,
        obs_type: &str,
        value: impl Into<crate::value::Value>,
        system: UnitSystem,
    ) -> ValueTuple {
        let (unit, group) = self.std_unit(system, obs_type);
        ValueTuple::new(value, unit, group)
    }

    /// Convert a tuple into `target_unit` of the same group.
    pub fn convert(&self, vt: &ValueTuple, target_unit: &str) -> UnitResult<ValueTuple> {
        let from = vt.unit().ok_or(UnitError::UnknownSourceUnit)?;
        let group_name = vt.group().ok_or(UnitError::NoGroup)?;
        let group = self
            .groups
            .get(group_name)
            .ok_or_else(|| UnitError::UnknownGroup(group_name.to_string()))?;
        if !group.contains(target_unit) {
            return Err(UnitError::UnitNotInGroup {
                unit: target_unit.to_string(),
                group: group_name.to_string(),
            });
        }
        let converter = self
            .conversions
            .get(group_name)
            .and_then(|table| table.get(&(from.to_string(), target_unit.to_string())))
            .ok_or_else(|| UnitError::NoConversion {
                from: from.to_string(),
                to: target_unit.to_string(),
            })?;
        let value = vt.value().map(|v| converter(v));
        Ok(ValueTuple::new(value, Some(target_unit), Some(group_name)))
    }

    /// Convert a tuple into the canonical unit of `system`
    pub fn convert_std(&self, vt: &ValueTuple, system: UnitSystem) -> UnitResult<ValueTuple> {
        let group = vt.group().ok_or(UnitError::NoGroup)?;
        let unit = self
            .unit_for(system, group)
            .ok_or_else(|| UnitError::IncompleteSystem {
                system,
                group: group.to_string(),
            })?;
        self.convert(vt, unit)
    }

    /// Resolve a unit system plus per-group overrides into target units.
    pub fn target_units<'a>(
        &self,
        system: UnitSystem,
        overrides: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> UnitResult<TargetUnits> {
        let mut units = self
            .systems
            .get(&system)
            .cloned()
            .unwrap_or_default();
        for (group, unit) in overrides {
            let members = self
                .groups
                .get(group)
                .ok_or_else(|| UnitError::UnknownGroup(group.to_string()))?;
            if !members.contains(unit) {
                return Err(UnitError::UnitNotInGroup {
                    unit: unit.to_string(),
                    group: group.to_string(),
                });
            }
            units.insert(group.to_string(), unit.to_string());
        }
        Ok(TargetUnits { system, units })
    }

    /// Convert into whatever unit `targets` assigns to the tuple's group
    pub fn convert_to_target(&self, vt: &ValueTuple, targets: &TargetUnits) -> UnitResult<ValueTuple> {
        let group = vt.group().ok_or(UnitError::NoGroup)?;
        let unit = targets.unit_for(group).ok_or_else(|| UnitError::IncompleteSystem {
            system: targets.system,
            group: group.to_string(),
        })?;
        self.convert(vt, unit)
    }

    /// Rate unit for a time derivative of `unit`, with the factor that
    /// turns a per-second derivative into that unit.
    pub fn rate_unit(&self, unit: &str) -> Option<(&str, &str, f64)> {
        let rate = self.rates.get(unit)?;
        let group = self.group_of_unit(&rate.unit)?;
        Some((rate.unit.as_str(), group, rate.per_second_factor))
    }
}

/// A unit system with per-group overrides applied, e.g. for one report
#[derive(Debug, Clone, PartialEq)]
pub struct TargetUnits {
    system: UnitSystem,
    units: HashMap<String, String>,
}

impl TargetUnits {
    pub fn system(&self) -> UnitSystem {
        self.system
    }

    pub fn unit_for(&self, group: &str) -> Option<&str> {
        self.units.get(group).map(String::as_str)
    }
}

/// Mutable assembly stage of a [`UnitModel`]
#[derive(Default)]
pub struct UnitModelBuilder {
    groups: HashMap<String, UnitGroup>,
    unit_groups: HashMap<String, String>,
    obs_groups: HashMap<String, String>,
    systems: HashMap<UnitSystem, HashMap<String, String>>,
    conversions: HashMap<String, HashMap<(String, String), Converter>>,
    rates: HashMap<String, RateUnit>,
}

impl UnitModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder preloaded with the WeeWX defaults
    pub fn with_defaults() -> UnitResult<Self> {
        let mut builder = Self::new();
        crate::defaults::install(&mut builder)?;
        Ok(builder)
    }

    pub fn add_group(&mut self, name: &str) -> &mut Self {
        self.groups.entry(name.to_string()).or_insert_with(|| UnitGroup {
            name: name.to_string(),
            units: BTreeMap::new(),
        });
        self
    }

    /// Add a unit to a group, registering its identity conversion
    pub fn add_unit(&mut self, group: &str, unit: &str, info: UnitInfo) -> UnitResult<&mut Self> {
        if let Some(owner) = self.unit_groups.get(unit) {
            if owner != group {
                return Err(UnitError::DuplicateUnit {
                    unit: unit.to_string(),
                    group: owner.clone(),
                });
            }
        }
        let members = self
            .groups
            .get_mut(group)
            .ok_or_else(|| UnitError::UnknownGroup(group.to_string()))?;
        members.units.insert(unit.to_string(), info);
        self.unit_groups.insert(unit.to_string(), group.to_string());
        self.conversions
            .entry(group.to_string())
            .or_default()
            .insert((unit.to_string(), unit.to_string()), Arc::new(|v| v));
        Ok(self)
    }

    /// Register the conversion `from -> to`. Both units must share a group.
    pub fn add_conversion<F>(&mut self, from: &str, to: &str, f: F) -> UnitResult<&mut Self>
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        let group = self.shared_group(from, to)?;
        self.conversions
            .entry(group)
            .or_default()
            .insert((from.to_string(), to.to_string()), Arc::new(f));
        Ok(self)
    }

    /// Register every pairwise conversion between units that differ only by
    /// a scale factor. Each entry gives the size of the unit in a common base.
    pub fn add_linear_units(&mut self, scales: &[(&str, f64)]) -> UnitResult<&mut Self> {
        for &(from, from_scale) in scales {
            for &(to, to_scale) in scales {
                if from != to {
                    let factor = from_scale / to_scale;
                    self.add_conversion(from, to, move |v| v * factor)?;
                }
            }
        }
        Ok(self)
    }

    pub fn assign_obs(&mut self, obs_type: &str, group: &str) -> UnitResult<&mut Self> {
        if !self.groups.contains_key(group) {
            return Err(UnitError::UnknownGroup(group.to_string()));
        }
        self.obs_groups.insert(obs_type.to_string(), group.to_string());
        Ok(self)
    }

    pub fn set_system_unit(
        &mut self,
        system: UnitSystem,
        group: &str,
        unit: &str,
    ) -> UnitResult<&mut Self> {
        let members = self
            .groups
            .get(group)
            .ok_or_else(|| UnitError::UnknownGroup(group.to_string()))?;
        if !members.contains(unit) {
            return Err(UnitError::UnitNotInGroup {
                unit: unit.to_string(),
                group: group.to_string(),
            });
        }
        self.systems
            .entry(system)
            .or_default()
            .insert(group.to_string(), unit.to_string());
        Ok(self)
    }

    /// Same unit for `group` in every built-in system
    pub fn set_all_systems(&mut self, group: &str, unit: &str) -> UnitResult<&mut Self> {
        for system in UnitSystem::ALL {
            self.set_system_unit(system, group, unit)?;
        }
        Ok(self)
    }

    pub fn set_format(&mut self, unit: &str, format: &str) -> UnitResult<&mut Self> {
        self.info_mut(unit)?.format = format.to_string();
        Ok(self)
    }

    pub fn set_label(&mut self, unit: &str, singular: &str, plural: &str) -> UnitResult<&mut Self> {
        let info = self.info_mut(unit)?;
        info.singular = singular.to_string();
        info.plural = plural.to_string();
        Ok(self)
    }

    /// Declare `rate_unit` as the time derivative of `unit`; `per_hour`
    /// rates are expressed with a factor of 3600.
    pub fn add_rate(&mut self, unit: &str, rate_unit: &str, per_second_factor: f64) -> UnitResult<&mut Self> {
        for u in [unit, rate_unit] {
            if !self.unit_groups.contains_key(u) {
                return Err(UnitError::UnknownUnit(u.to_string()));
            }
        }
        self.rates.insert(
            unit.to_string(),
            RateUnit {
                unit: rate_unit.to_string(),
                per_second_factor,
            },
        );
        Ok(self)
    }

    /// Validate and freeze the model
    pub fn build(self) -> UnitResult<UnitModel> {
        for system in UnitSystem::ALL {
            let units = self.systems.get(&system);
            for group in self.groups.keys() {
                if units.and_then(|u| u.get(group)).is_none() {
                    return Err(UnitError::IncompleteSystem {
                        system,
                        group: group.clone(),
                    });
                }
            }
        }
        Ok(UnitModel {
            groups: self.groups,
            unit_groups: self.unit_groups,
            obs_groups: self.obs_groups,
            systems: self.systems,
            conversions: self.conversions,
            rates: self.rates,
        })
    }

    fn shared_group(&self, from: &str, to: &str) -> UnitResult<String> {
        let from_group = self
            .unit_groups
            .get(from)
            .ok_or_else(|| UnitError::UnknownUnit(from.to_string()))?;
        let to_group = self
            .unit_groups
            .get(to)
            .ok_or_else(|| UnitError::UnknownUnit(to.to_string()))?;
        if from_group != to_group {
            return Err(UnitError::UnitNotInGroup {
                unit: to.to_string(),
                group: from_group.clone(),
            });
        }
        Ok(from_group.clone())
    }

    fn info_mut(&mut self, unit: &str) -> UnitResult<&mut UnitInfo> {
        let group = self
            .unit_groups
            .get(unit)
            .ok_or_else(|| UnitError::UnknownUnit(unit.to_string()))?;
        self.groups
            .get_mut(group)
            .and_then(|g| g.units.get_mut(unit))
            .ok_or_else(|| UnitError::UnknownUnit(unit.to_string()))
    }
}
