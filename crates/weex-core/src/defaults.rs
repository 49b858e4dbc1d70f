//! Built-in unit groups, units, systems and observation membership

use crate::types::UnitSystem::{Metric, MetricWx, Us};
use crate::units::{UnitInfo, UnitModelBuilder, UnitResult};

const KELVIN_OFFSET: f64 = 273.15;

/// Groups whose canonical unit differs between systems: (group, US, METRIC, METRICWX)
const SYSTEM_UNITS: &[(&str, &str, &str, &str)] = &[
    ("group_temperature", "degree_F", "degree_C", "degree_C"),
    ("group_pressure", "inHg", "mbar", "mbar"),
    ("group_pressurerate", "inHg_per_hour", "mbar_per_hour", "mbar_per_hour"),
    ("group_rain", "inch", "cm", "mm"),
    ("group_rainrate", "inch_per_hour", "cm_per_hour", "mm_per_hour"),
    ("group_speed", "mile_per_hour", "km_per_hour", "meter_per_second"),
    ("group_altitude", "foot", "meter", "meter"),
    ("group_distance", "mile", "km", "km"),
    ("group_degree_day", "degree_F_day", "degree_C_day", "degree_C_day"),
];

/// Groups with one unit in every system
const SHARED_UNITS: &[(&str, &str)] = &[
    ("group_direction", "degree_compass"),
    ("group_percent", "percent"),
    ("group_radiation", "watt_per_meter_squared"),
    ("group_uv", "uv_index"),
    ("group_interval", "minute"),
    ("group_elapsed", "second"),
    ("group_time", "unix_epoch"),
    ("group_count", "count"),
    ("group_boolean", "boolean"),
    ("group_volt", "volt"),
];

const OBS_GROUPS: &[(&str, &str)] = &[
    ("dateTime", "group_time"),
    ("interval", "group_interval"),
    ("outTemp", "group_temperature"),
    ("inTemp", "group_temperature"),
    ("dewpoint", "group_temperature"),
    ("heatindex", "group_temperature"),
    ("windchill", "group_temperature"),
    ("humidex", "group_temperature"),
    ("appTemp", "group_temperature"),
    ("extraTemp1", "group_temperature"),
    ("extraTemp2", "group_temperature"),
    ("extraTemp3", "group_temperature"),
    ("soilTemp1", "group_temperature"),
    ("barometer", "group_pressure"),
    ("pressure", "group_pressure"),
    ("altimeter", "group_pressure"),
    ("rain", "group_rain"),
    ("ET", "group_rain"),
    ("hail", "group_rain"),
    ("rainRate", "group_rainrate"),
    ("hailRate", "group_rainrate"),
    ("windSpeed", "group_speed"),
    ("windGust", "group_speed"),
    ("windDir", "group_direction"),
    ("windGustDir", "group_direction"),
    ("outHumidity", "group_percent"),
    ("inHumidity", "group_percent"),
    ("extraHumid1", "group_percent"),
    ("rxCheckPercent", "group_percent"),
    ("radiation", "group_radiation"),
    ("UV", "group_uv"),
    ("cloudbase", "group_altitude"),
    ("windrun", "group_distance"),
    ("heatdeg", "group_degree_day"),
    ("cooldeg", "group_degree_day"),
    ("growdeg", "group_degree_day"),
    ("consBatteryVoltage", "group_volt"),
];

pub(crate) fn install(b: &mut UnitModelBuilder) -> UnitResult<()> {
    temperature(b)?;

    b.add_group("group_pressure");
    b.add_unit("group_pressure", "inHg", UnitInfo::new("%.3f", " inHg"))?;
    b.add_unit("group_pressure", "mbar", UnitInfo::new("%.1f", " mbar"))?;
    b.add_unit("group_pressure", "hPa", UnitInfo::new("%.1f", " hPa"))?;
    b.add_unit("group_pressure", "kPa", UnitInfo::new("%.2f", " kPa"))?;
    b.add_unit("group_pressure", "mmHg", UnitInfo::new("%.1f", " mmHg"))?;
    b.add_linear_units(&[
        ("inHg", 33.863_886_666_7),
        ("mbar", 1.0),
        ("hPa", 1.0),
        ("kPa", 10.0),
        ("mmHg", 1.333_223_874_15),
    ])?;

    b.add_group("group_pressurerate");
    b.add_unit("group_pressurerate", "inHg_per_hour", UnitInfo::new("%.4f", " inHg/h"))?;
    b.add_unit("group_pressurerate", "mbar_per_hour", UnitInfo::new("%.2f", " mbar/h"))?;
    b.add_unit("group_pressurerate", "hPa_per_hour", UnitInfo::new("%.2f", " hPa/h"))?;
    b.add_unit("group_pressurerate", "kPa_per_hour", UnitInfo::new("%.3f", " kPa/h"))?;
    b.add_unit("group_pressurerate", "mmHg_per_hour", UnitInfo::new("%.2f", " mmHg/h"))?;
    b.add_linear_units(&[
        ("inHg_per_hour", 33.863_886_666_7),
        ("mbar_per_hour", 1.0),
        ("hPa_per_hour", 1.0),
        ("kPa_per_hour", 10.0),
        ("mmHg_per_hour", 1.333_223_874_15),
    ])?;

    b.add_group("group_rain");
    b.add_unit("group_rain", "inch", UnitInfo::new("%.2f", " in"))?;
    b.add_unit("group_rain", "cm", UnitInfo::new("%.2f", " cm"))?;
    b.add_unit("group_rain", "mm", UnitInfo::new("%.1f", " mm"))?;
    b.add_linear_units(&[("inch", 25.4), ("cm", 10.0), ("mm", 1.0)])?;

    b.add_group("group_rainrate");
    b.add_unit("group_rainrate", "inch_per_hour", UnitInfo::new("%.2f", " in/h"))?;
    b.add_unit("group_rainrate", "cm_per_hour", UnitInfo::new("%.2f", " cm/h"))?;
    b.add_unit("group_rainrate", "mm_per_hour", UnitInfo::new("%.1f", " mm/h"))?;
    b.add_linear_units(&[("inch_per_hour", 25.4), ("cm_per_hour", 10.0), ("mm_per_hour", 1.0)])?;

    b.add_group("group_speed");
    b.add_unit("group_speed", "mile_per_hour", UnitInfo::new("%.0f", " mph"))?;
    b.add_unit("group_speed", "km_per_hour", UnitInfo::new("%.0f", " km/h"))?;
    b.add_unit("group_speed", "meter_per_second", UnitInfo::new("%.1f", " m/s"))?;
    b.add_unit("group_speed", "knot", UnitInfo::new("%.0f", " knot").plural(" knots"))?;
    b.add_linear_units(&[
        ("mile_per_hour", 0.447_04),
        ("km_per_hour", 1.0 / 3.6),
        ("meter_per_second", 1.0),
        ("knot", 1852.0 / 3600.0),
    ])?;

    b.add_group("group_altitude");
    b.add_unit("group_altitude", "foot", UnitInfo::new("%.0f", " foot").plural(" feet"))?;
    b.add_unit("group_altitude", "meter", UnitInfo::new("%.0f", " meter").plural(" meters"))?;
    b.add_linear_units(&[("foot", 0.3048), ("meter", 1.0)])?;

    b.add_group("group_distance");
    b.add_unit("group_distance", "mile", UnitInfo::new("%.1f", " mile").plural(" miles"))?;
    b.add_unit("group_distance", "km", UnitInfo::new("%.1f", " km"))?;
    b.add_linear_units(&[("mile", 1.609_344), ("km", 1.0)])?;

    b.add_group("group_degree_day");
    b.add_unit("group_degree_day", "degree_F_day", UnitInfo::new("%.1f", "°F-day").plural("°F-days"))?;
    b.add_unit("group_degree_day", "degree_C_day", UnitInfo::new("%.1f", "°C-day").plural("°C-days"))?;
    b.add_linear_units(&[("degree_F_day", 5.0 / 9.0), ("degree_C_day", 1.0)])?;

    b.add_group("group_elapsed");
    b.add_unit("group_elapsed", "second", UnitInfo::new("%.0f", " second").plural(" seconds"))?;
    b.add_unit("group_elapsed", "hour", UnitInfo::new("%.1f", " hour").plural(" hours"))?;
    b.add_unit("group_elapsed", "day", UnitInfo::new("%.1f", " day").plural(" days"))?;
    b.add_linear_units(&[("second", 1.0), ("hour", 3600.0), ("day", 86400.0)])?;

    single_unit(b, "group_interval", "minute", UnitInfo::new("%.0f", " minute").plural(" minutes"))?;
    single_unit(b, "group_direction", "degree_compass", UnitInfo::new("%.0f", "°"))?;
    single_unit(b, "group_percent", "percent", UnitInfo::new("%.0f", "%"))?;
    single_unit(b, "group_radiation", "watt_per_meter_squared", UnitInfo::new("%.0f", " W/m²"))?;
    single_unit(b, "group_uv", "uv_index", UnitInfo::new("%.1f", ""))?;
    single_unit(b, "group_time", "unix_epoch", UnitInfo::new("%x %X", ""))?;
    single_unit(b, "group_count", "count", UnitInfo::new("%d", ""))?;
    single_unit(b, "group_boolean", "boolean", UnitInfo::new("%d", ""))?;
    single_unit(b, "group_volt", "volt", UnitInfo::new("%.1f", " V"))?;

    for &(group, us, metric, metricwx) in SYSTEM_UNITS {
        b.set_system_unit(Us, group, us)?;
        b.set_system_unit(Metric, group, metric)?;
        b.set_system_unit(MetricWx, group, metricwx)?;
    }
    for &(group, unit) in SHARED_UNITS {
        b.set_all_systems(group, unit)?;
    }

    for &(obs, group) in OBS_GROUPS {
        b.assign_obs(obs, group)?;
    }

    for (depth, rate, scale) in [
        ("inch", "inch_per_hour", 3600.0),
        ("cm", "cm_per_hour", 3600.0),
        ("mm", "mm_per_hour", 3600.0),
        ("inHg", "inHg_per_hour", 3600.0),
        ("mbar", "mbar_per_hour", 3600.0),
        ("hPa", "hPa_per_hour", 3600.0),
        ("kPa", "kPa_per_hour", 3600.0),
        ("mmHg", "mmHg_per_hour", 3600.0),
    ] {
        b.add_rate(depth, rate, scale)?;
    }
    Ok(())
}

fn temperature(b: &mut UnitModelBuilder) -> UnitResult<()> {
    b.add_group("group_temperature");
    b.add_unit("group_temperature", "degree_F", UnitInfo::new("%.1f", "°F"))?;
    b.add_unit("group_temperature", "degree_C", UnitInfo::new("%.1f", "°C"))?;
    b.add_unit("group_temperature", "degree_K", UnitInfo::new("%.2f", " K"))?;
    b.add_conversion("degree_F", "degree_C", |f| (f - 32.0) * 5.0 / 9.0)?;
    b.add_conversion("degree_C", "degree_F", |c| c * 9.0 / 5.0 + 32.0)?;
    b.add_conversion("degree_C", "degree_K", |c| c + KELVIN_OFFSET)?;
    b.add_conversion("degree_K", "degree_C", |k| k - KELVIN_OFFSET)?;
    b.add_conversion("degree_F", "degree_K", |f| (f - 32.0) * 5.0 / 9.0 + KELVIN_OFFSET)?;
    b.add_conversion("degree_K", "degree_F", |k| (k - KELVIN_OFFSET) * 9.0 / 5.0 + 32.0)?;
    Ok(())
}

fn single_unit(b: &mut UnitModelBuilder, group: &str, unit: &str, info: UnitInfo) -> UnitResult<()> {
    b.add_group(group);
    b.add_unit(group, unit, info)?;
    Ok(())
}
