//! Built-in derived observation types

use async_trait::async_trait;
use weex_core::{ArchiveRecord, DaySummary, TimeSpan, UnitModel, UnitSystem, ValueTuple, SECONDS_PER_DAY};

use crate::combine;
use crate::engine::{boolean, result_tuple, time_tuple};
use crate::error::{QueryError, QueryResult};
use crate::op::{AggregateOp, Verb};
use crate::xtypes::{QueryContext, Series, XTypeProvider};

const TEMPERATURE: &str = "group_temperature";
const HUMIDITY_INPUTS: &[&str] = &["outTemp", "outHumidity"];
const WIND_INPUTS: &[&str] = &["outTemp", "windSpeed"];

/// Dewpoint, heat index, wind chill and humidex from outTemp, outHumidity
/// and windSpeed
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedWeather;

impl DerivedWeather {
    /// Observation types each derived type is computed from
    fn inputs(obs_type: &str) -> Option<&'static [&'static str]> {
        match obs_type {
            "dewpoint" | "heatindex" | "humidex" => Some(HUMIDITY_INPUTS),
            "windchill" => Some(WIND_INPUTS),
            _ => None,
        }
    }

    /// Derived value in the record's own unit system
    fn derive(obs_type: &str, record: &ArchiveRecord, model: &UnitModel) -> QueryResult<Option<f64>> {
        let system = record.us_units;
        let Some(temp) = record.get("outTemp") else {
            return Ok(None);
        };
        let temp = model.value_tuple("outTemp", temp, system);

        let derived = match obs_type {
            "dewpoint" | "humidex" => {
                let Some(humidity) = record.get("outHumidity") else {
                    return Ok(None);
                };
                let Some(t_c) = model.convert(&temp, "degree_C")?.raw() else {
                    return Ok(None);
                };
                let value = if obs_type == "dewpoint" {
                    dewpoint_c(t_c, humidity)
                } else {
                    humidex_c(t_c, humidity)
                };
                value.map(|v| ValueTuple::scalar(v, "degree_C", TEMPERATURE))
            }
            "heatindex" => {
                let Some(humidity) = record.get("outHumidity") else {
                    return Ok(None);
                };
                let Some(t_f) = model.convert(&temp, "degree_F")?.raw() else {
                    return Ok(None);
                };
                Some(ValueTuple::scalar(heatindex_f(t_f, humidity), "degree_F", TEMPERATURE))
            }
            "windchill" => {
                let Some(speed) = record.get("windSpeed") else {
                    return Ok(None);
                };
                let speed = model.value_tuple("windSpeed", speed, system);
                let (Some(t_f), Some(mph)) = (
                    model.convert(&temp, "degree_F")?.raw(),
                    model.convert(&speed, "mile_per_hour")?.raw(),
                ) else {
                    return Ok(None);
                };
                Some(ValueTuple::scalar(windchill_f(t_f, mph), "degree_F", TEMPERATURE))
            }
            _ => return Err(QueryError::UnknownObservationType(obs_type.to_string())),
        };

        match derived {
            Some(vt) => Ok(model.convert_std(&vt, system)?.raw()),
            None => Ok(None),
        }
    }

    async fn derived_records(
        obs_type: &str,
        span: &TimeSpan,
        ctx: &mut QueryContext<'_>,
    ) -> QueryResult<Vec<(ArchiveRecord, Option<f64>)>> {
        let inputs = Self::inputs(obs_type)
            .ok_or_else(|| QueryError::UnknownObservationType(obs_type.to_string()))?;
        if !inputs.iter().all(|i| ctx.snapshot.has_column(i)) {
            return Err(QueryError::UnknownObservationType(obs_type.to_string()));
        }
        let records = ctx.snapshot.samples(span, inputs).await?;
        let mut derived = Vec::with_capacity(records.len());
        for record in records {
            let value = Self::derive(obs_type, &record, ctx.model)?;
            derived.push((record, value));
        }
        Ok(derived)
    }
}

#[async_trait]
impl XTypeProvider for DerivedWeather {
    fn name(&self) -> &str {
        "derived-weather"
    }

    fn get_scalar(&self, obs_type: &str, record: &ArchiveRecord, model: &UnitModel) -> QueryResult<ValueTuple> {
        if Self::inputs(obs_type).is_none() {
            return Err(QueryError::UnknownObservationType(obs_type.to_string()));
        }
        let value = Self::derive(obs_type, record, model)?;
        Ok(model.value_tuple(obs_type, value, record.us_units))
    }

    async fn get_series(&self, obs_type: &str, span: &TimeSpan, ctx: &mut QueryContext<'_>) -> QueryResult<Series> {
        let derived = Self::derived_records(obs_type, span, ctx).await?;
        let (unit, group) = ctx.model.std_unit(ctx.snapshot.unit_system(), obs_type);
        Ok(Series {
            start: time_tuple(derived.iter().map(|(r, _)| r.date_time - r.interval_secs())),
            stop: time_tuple(derived.iter().map(|(r, _)| r.date_time)),
            data: ValueTuple::new(derived.iter().map(|(_, v)| *v).collect::<Vec<_>>(), unit, group),
        })
    }

    async fn get_aggregate(
        &self,
        obs_type: &str,
        op: &AggregateOp,
        span: &TimeSpan,
        _threshold: Option<&ValueTuple>,
        ctx: &mut QueryContext<'_>,
    ) -> QueryResult<ValueTuple> {
        let Some(inputs) = Self::inputs(obs_type) else {
            return Err(QueryError::UnknownObservationType(obs_type.to_string()));
        };
        let verb = match op.verb() {
            Some(
                verb @ (Verb::Avg
                | Verb::Sum
                | Verb::Min
                | Verb::Max
                | Verb::Count
                | Verb::First
                | Verb::Last
                | Verb::FirstTime
                | Verb::LastTime
                | Verb::MinTime
                | Verb::MaxTime
                | Verb::Exists
                | Verb::HasData),
            ) => verb,
            _ => return Err(QueryError::unknown_aggregation(obs_type, op)),
        };

        if verb == Verb::Exists {
            return Ok(boolean(inputs.iter().all(|i| ctx.snapshot.has_column(i))));
        }

        let derived = Self::derived_records(obs_type, span, ctx).await?;
        if verb == Verb::HasData {
            return Ok(boolean(derived.iter().any(|(_, v)| v.is_some())));
        }

        let mut summary = DaySummary::new(span.start);
        for (record, value) in &derived {
            summary.add(*value, record.date_time, record.interval_secs());
        }
        let (unit, group) = ctx.model.std_unit(ctx.snapshot.unit_system(), obs_type);
        Ok(result_tuple(verb, combine::day_verb(verb, &[summary]), unit, group))
    }
}

/// Magnus formula dewpoint; undefined for non-positive humidity
pub fn dewpoint_c(t_c: f64, rh: f64) -> Option<f64> {
    if rh <= 0.0 {
        return None;
    }
    const B: f64 = 17.625;
    const C: f64 = 243.04;
    let gamma = (rh / 100.0).ln() + B * t_c / (C + t_c);
    Some(C * gamma / (B - gamma))
}

/// Rothfusz regression; below 80°F the air temperature is returned
pub fn heatindex_f(t_f: f64, rh: f64) -> f64 {
    if t_f < 80.0 {
        return t_f;
    }
    -42.379 + 2.049_015_23 * t_f + 10.143_331_27 * rh
        - 0.224_755_41 * t_f * rh
        - 6.837_83e-3 * t_f * t_f
        - 5.481_717e-2 * rh * rh
        + 1.228_74e-3 * t_f * t_f * rh
        + 8.528_2e-4 * t_f * rh * rh
        - 1.99e-6 * t_f * t_f * rh * rh
}

/// NWS wind chill; defined only below 50°F with wind above 3 mph
pub fn windchill_f(t_f: f64, v_mph: f64) -> f64 {
    if t_f >= 50.0 || v_mph <= 3.0 {
        return t_f;
    }
    let v = v_mph.powf(0.16);
    35.74 + 0.6215 * t_f - 35.75 * v + 0.4275 * t_f * v
}

/// Canadian humidex; never below the air temperature
pub fn humidex_c(t_c: f64, rh: f64) -> Option<f64> {
    let td = dewpoint_c(t_c, rh)?;
    let e = 6.11 * (5417.7530 * (1.0 / 273.16 - 1.0 / (273.15 + td))).exp();
    let h = t_c + 0.5555 * (e - 10.0);
    Some(h.max(t_c))
}

/// Heating, cooling and growing degree days from daily mean outTemp
#[derive(Debug, Clone)]
pub struct DegreeDays {
    heating_base: ValueTuple,
    cooling_base: ValueTuple,
    growing_base: ValueTuple,
}

impl Default for DegreeDays {
    fn default() -> Self {
        Self {
            heating_base: ValueTuple::scalar(65.0, "degree_F", TEMPERATURE),
            cooling_base: ValueTuple::scalar(65.0, "degree_F", TEMPERATURE),
            growing_base: ValueTuple::scalar(50.0, "degree_F", TEMPERATURE),
        }
    }
}

impl DegreeDays {
    pub fn with_bases(heating: ValueTuple, cooling: ValueTuple, growing: ValueTuple) -> Self {
        Self {
            heating_base: heating,
            cooling_base: cooling,
            growing_base: growing,
        }
    }

    fn base(&self, obs_type: &str) -> Option<&ValueTuple> {
        match obs_type {
            "heatdeg" => Some(&self.heating_base),
            "cooldeg" => Some(&self.cooling_base),
            "growdeg" => Some(&self.growing_base),
            _ => None,
        }
    }

    fn unit(system: UnitSystem) -> &'static str {
        match system {
            UnitSystem::Us => "degree_F_day",
            _ => "degree_C_day",
        }
    }

    /// Degree days for each day row with outTemp data, in the database
    /// temperature unit
    async fn daily(&self, obs_type: &str, span: &TimeSpan, ctx: &mut QueryContext<'_>) -> QueryResult<Vec<(i64, f64)>> {
        let base = self
            .base(obs_type)
            .ok_or_else(|| QueryError::UnknownObservationType(obs_type.to_string()))?;
        if !ctx.snapshot.has_column("outTemp") {
            return Err(QueryError::UnknownObservationType(obs_type.to_string()));
        }
        if !ctx.snapshot.clock().is_day_aligned(span) {
            return Err(QueryError::Timespan(format!(
                "{obs_type} needs whole days, got {}..{}",
                span.start, span.stop
            )));
        }
        let Some(base) = ctx.model.convert_std(base, ctx.snapshot.unit_system())?.raw() else {
            return Ok(Vec::new());
        };

        let days = ctx.snapshot.get_day_range("outTemp", span).await?;
        Ok(days
            .iter()
            .filter_map(|d| d.avg().map(|avg| (d.day, avg)))
            .map(|(day, avg)| {
                let dd = match obs_type {
                    "heatdeg" => base - avg,
                    _ => avg - base,
                };
                (day, dd.max(0.0))
            })
            .collect())
    }
}

#[async_trait]
impl XTypeProvider for DegreeDays {
    fn name(&self) -> &str {
        "degree-days"
    }

    async fn get_series(&self, obs_type: &str, span: &TimeSpan, ctx: &mut QueryContext<'_>) -> QueryResult<Series> {
        let daily = self.daily(obs_type, span, ctx).await?;
        let unit = Self::unit(ctx.snapshot.unit_system());
        Ok(Series {
            start: time_tuple(daily.iter().map(|(day, _)| *day)),
            stop: time_tuple(daily.iter().map(|(day, _)| day + SECONDS_PER_DAY)),
            data: ValueTuple::new(
                daily.iter().map(|(_, v)| Some(*v)).collect::<Vec<_>>(),
                Some(unit),
                Some("group_degree_day"),
            ),
        })
    }

    /// `avg` divides by the days that have outTemp data, not by the days in `span`
    async fn get_aggregate(
        &self,
        obs_type: &str,
        op: &AggregateOp,
        span: &TimeSpan,
        _threshold: Option<&ValueTuple>,
        ctx: &mut QueryContext<'_>,
    ) -> QueryResult<ValueTuple> {
        if self.base(obs_type).is_none() {
            return Err(QueryError::UnknownObservationType(obs_type.to_string()));
        }
        let verb = match op.verb() {
            Some(verb @ (Verb::Sum | Verb::Avg)) => verb,
            _ => return Err(QueryError::unknown_aggregation(obs_type, op)),
        };

        let daily = self.daily(obs_type, span, ctx).await?;
        let unit = Self::unit(ctx.snapshot.unit_system());
        let value = if daily.is_empty() {
            None
        } else {
            let total: f64 = daily.iter().map(|(_, v)| v).sum();
            Some(match verb {
                Verb::Avg => total / daily.len() as f64,
                _ => total,
            })
        };
        Ok(ValueTuple::new(value, Some(unit), Some("group_degree_day")))
    }
}
