//! Aggregation engine: answers `(obs_type, verb, span, threshold)` queries
//! from the daily summaries or the raw archive

use std::sync::Arc;
use tracing::{debug, instrument};
use weex_core::{
    ArchiveRecord, DaySummary, TargetUnits, TimeSpan, UnitError, UnitModel, Value, ValueTuple,
    SECONDS_PER_DAY,
};
use weex_db::{DbClient, ReadSnapshot};

use crate::combine;
use crate::error::{QueryError, QueryResult};
use crate::op::{AggregateOp, Verb, VerbClass};
use crate::samples;
use crate::xtypes::{QueryContext, Series, XTypeRegistry};

/// Read-side query entry point. Cheap to clone the handles it holds; share
/// one per process behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    db: DbClient,
    model: Arc<UnitModel>,
    registry: Arc<XTypeRegistry>,
}

impl AggregationEngine {
    pub fn new(db: DbClient, model: Arc<UnitModel>, registry: Arc<XTypeRegistry>) -> Self {
        Self { db, model, registry }
    }

    pub fn db(&self) -> &DbClient {
        &self.db
    }

    pub fn model(&self) -> &UnitModel {
        &self.model
    }

    pub fn registry(&self) -> &XTypeRegistry {
        &self.registry
    }

    /// Aggregate `obs_type` over `span`, in the database unit system
    #[instrument(level = "debug", skip(self, threshold))]
    pub async fn aggregate(
        &self,
        obs_type: &str,
        op: &AggregateOp,
        span: &TimeSpan,
        threshold: Option<&ValueTuple>,
    ) -> QueryResult<ValueTuple> {
        let mut snapshot = self.db.snapshot().await?;
        let result = {
            let mut ctx = self.context(&mut snapshot);
            aggregate_in(obs_type, op, span, threshold, &mut ctx).await
        };
        let closed = snapshot.close().await;
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Aggregate, then express the result in `targets`
    pub async fn aggregate_converted(
        &self,
        obs_type: &str,
        op: &AggregateOp,
        span: &TimeSpan,
        threshold: Option<&ValueTuple>,
        targets: &TargetUnits,
    ) -> QueryResult<ValueTuple> {
        let vt = self.aggregate(obs_type, op, span, threshold).await?;
        if vt.unit().is_none() || vt.group().is_none() {
            return Ok(vt);
        }
        Ok(self.model.convert_to_target(&vt, targets)?)
    }

    /// Time series of `obs_type` over `span`: the raw archive values, or
    /// one aggregate per `interval` seconds when `aggregation` is given
    #[instrument(level = "debug", skip(self))]
    pub async fn series(
        &self,
        obs_type: &str,
        span: &TimeSpan,
        aggregation: Option<(AggregateOp, i64)>,
    ) -> QueryResult<Series> {
        let mut snapshot = self.db.snapshot().await?;
        let result = {
            let mut ctx = self.context(&mut snapshot);
            series_in(obs_type, span, aggregation.as_ref(), &mut ctx).await
        };
        let closed = snapshot.close().await;
        let series = result?;
        closed?;
        Ok(series)
    }

    /// Value of `obs_type` for one record, stored or derived
    pub fn scalar(&self, obs_type: &str, record: &ArchiveRecord) -> QueryResult<ValueTuple> {
        if let Some(value) = record.values.get(obs_type) {
            return Ok(self.model.value_tuple(obs_type, *value, record.us_units));
        }
        self.registry.resolve_scalar(obs_type, record, &self.model)
    }

    fn context<'a>(&'a self, snapshot: &'a mut ReadSnapshot) -> QueryContext<'a> {
        QueryContext {
            snapshot,
            model: self.model.as_ref(),
            registry: self.registry.as_ref(),
        }
    }
}

/// Aggregate inside an open snapshot. Providers call this to build on
/// stored data within the same snapshot.
pub async fn aggregate_in(
    obs_type: &str,
    op: &AggregateOp,
    span: &TimeSpan,
    threshold: Option<&ValueTuple>,
    ctx: &mut QueryContext<'_>,
) -> QueryResult<ValueTuple> {
    if let Some(verb) = op.verb() {
        if ctx.snapshot.has_column(obs_type) {
            return builtin(obs_type, verb, span, threshold, ctx).await;
        }
    }

    debug!("Delegating {} of {} to xtype providers", op, obs_type);
    let registry = ctx.registry;
    match registry.resolve_aggregate(obs_type, op, span, threshold, ctx).await {
        Err(QueryError::UnknownObservationType(_)) if op.verb() == Some(Verb::Exists) => Ok(boolean(false)),
        Err(QueryError::UnknownObservationType(_)) if ctx.snapshot.has_column(obs_type) => {
            Err(QueryError::unknown_aggregation(obs_type, op))
        }
        answer => answer,
    }
}

/// Series inside an open snapshot
pub async fn series_in(
    obs_type: &str,
    span: &TimeSpan,
    aggregation: Option<&(AggregateOp, i64)>,
    ctx: &mut QueryContext<'_>,
) -> QueryResult<Series> {
    let Some((op, interval)) = aggregation else {
        if ctx.snapshot.has_column(obs_type) {
            let records = ctx.snapshot.samples(span, &[obs_type]).await?;
            let (unit, group) = ctx.model.std_unit(ctx.snapshot.unit_system(), obs_type);
            return Ok(Series {
                start: time_tuple(records.iter().map(|r| r.date_time - r.interval_secs())),
                stop: time_tuple(records.iter().map(|r| r.date_time)),
                data: ValueTuple::new(
                    records.iter().map(|r| r.get(obs_type)).collect::<Vec<_>>(),
                    unit,
                    group,
                ),
            });
        }
        let registry = ctx.registry;
        return registry.resolve_series(obs_type, span, ctx).await;
    };

    if *interval <= 0 {
        return Err(QueryError::Timespan(format!("aggregation interval must be positive, got {interval}")));
    }

    let spans = span.intervals(*interval);
    let mut data = Vec::with_capacity(spans.len());
    let mut unit = None;
    let mut group = None;
    for sub in &spans {
        let vt = aggregate_in(obs_type, op, sub, None, ctx).await?;
        if unit.is_none() && group.is_none() {
            unit = vt.unit().map(str::to_string);
            group = vt.group().map(str::to_string);
        }
        data.push(vt.raw());
    }

    Ok(Series {
        start: time_tuple(spans.iter().map(|s| s.start)),
        stop: time_tuple(spans.iter().map(|s| s.stop)),
        data: ValueTuple::new(data, unit.as_deref(), group.as_deref()),
    })
}

async fn builtin(
    obs_type: &str,
    verb: Verb,
    span: &TimeSpan,
    threshold: Option<&ValueTuple>,
    ctx: &mut QueryContext<'_>,
) -> QueryResult<ValueTuple> {
    let system = ctx.snapshot.unit_system();
    let (unit, group) = ctx.model.std_unit(system, obs_type);

    match verb.class() {
        VerbClass::DayDecomposable => {
            if verb.spans_days() && span.length() < SECONDS_PER_DAY {
                return Err(QueryError::Timespan(format!(
                    "{verb} needs a span of at least one day, got {} seconds",
                    span.length()
                )));
            }
            let days = day_rows(obs_type, span, ctx.snapshot).await?;
            Ok(result_tuple(verb, combine::day_verb(verb, &days), unit, group))
        }
        VerbClass::Threshold => {
            let (stat, comparison) = verb
                .threshold()
                .ok_or_else(|| QueryError::unknown_aggregation(obs_type, verb))?;
            if span.length() < SECONDS_PER_DAY {
                return Err(QueryError::Timespan(format!(
                    "{verb} needs a span of at least one day, got {} seconds",
                    span.length()
                )));
            }
            let threshold = threshold.ok_or_else(|| QueryError::MissingThreshold(verb.name().to_string()))?;
            let group = group.ok_or(UnitError::NoGroup)?;
            if threshold.group() != Some(group) {
                return Err(UnitError::IncompatibleUnits {
                    left: threshold.unit().unwrap_or_default().to_string(),
                    right: unit.unwrap_or_default().to_string(),
                }
                .into());
            }
            let limit = ctx.model.convert_std(threshold, system)?.raw();
            let days = day_rows(obs_type, span, ctx.snapshot).await?;
            let count = limit.and_then(|limit| combine::threshold_count(stat, comparison, limit, &days));
            Ok(result_tuple(verb, count, unit, Some(group)))
        }
        VerbClass::SampleLevel => sample_verb(obs_type, verb, span, unit, group, ctx).await,
    }
}

async fn sample_verb(
    obs_type: &str,
    verb: Verb,
    span: &TimeSpan,
    unit: Option<&str>,
    group: Option<&str>,
    ctx: &mut QueryContext<'_>,
) -> QueryResult<ValueTuple> {
    match verb {
        Verb::Exists => Ok(boolean(true)),
        Verb::HasData => {
            let records = ctx.snapshot.samples(span, &[obs_type]).await?;
            Ok(boolean(samples::has_data(&records, obs_type)))
        }
        Verb::Diff => {
            let records = ctx.snapshot.samples(span, &[obs_type]).await?;
            let value = samples::diff(&samples::values(&records, obs_type));
            Ok(ValueTuple::new(value, unit, group))
        }
        Verb::Rms => {
            let records = ctx.snapshot.samples(span, &[obs_type]).await?;
            let value = samples::rms(&samples::values(&records, obs_type));
            Ok(ValueTuple::new(value, unit, group))
        }
        Verb::Tderiv => {
            let records = ctx.snapshot.samples(span, &[obs_type]).await?;
            let per_second = samples::tderiv(&samples::values(&records, obs_type));
            match unit.and_then(|u| ctx.model.rate_unit(u)) {
                Some((rate, rate_group, factor)) => {
                    Ok(ValueTuple::new(per_second.map(|v| v * factor), Some(rate), Some(rate_group)))
                }
                None => Ok(ValueTuple::new(per_second, None, None)),
            }
        }
        Verb::VecAvg | Verb::VecDir => {
            let direction = samples::direction_partner(obs_type)
                .ok_or_else(|| QueryError::unknown_aggregation(obs_type, verb))?;
            let records = ctx.snapshot.samples(span, &[obs_type, direction]).await?;
            let sum = samples::vector(&records, obs_type, direction);
            Ok(match verb {
                Verb::VecAvg => ValueTuple::new(sum.average_speed(), unit, group),
                _ => result_tuple(verb, sum.direction(), unit, group),
            })
        }
        _ => Err(QueryError::unknown_aggregation(obs_type, verb)),
    }
}

/// Day rows covering `span`: read from the daily tables when the span is
/// whole days, otherwise rebuilt from the raw records it holds
async fn day_rows(obs_type: &str, span: &TimeSpan, snapshot: &mut ReadSnapshot) -> QueryResult<Vec<DaySummary>> {
    let clock = snapshot.clock();
    if clock.is_day_aligned(span) {
        return Ok(snapshot.get_day_range(obs_type, span).await?);
    }
    let records = snapshot.samples(span, &[obs_type]).await?;
    Ok(combine::bucket_by_day(&clock, &records, obs_type))
}

/// Wrap a verb's value in the unit its kind of result carries
pub(crate) fn result_tuple(verb: Verb, value: Option<f64>, unit: Option<&str>, group: Option<&str>) -> ValueTuple {
    if verb == Verb::Count || verb.class() == VerbClass::Threshold {
        ValueTuple::new(value, Some("count"), Some("group_count"))
    } else if verb.is_time() {
        ValueTuple::new(value, Some("unix_epoch"), Some("group_time"))
    } else if verb == Verb::VecDir {
        ValueTuple::new(value, Some("degree_compass"), Some("group_direction"))
    } else if matches!(verb, Verb::Exists | Verb::HasData) {
        ValueTuple::new(value, Some("boolean"), Some("group_boolean"))
    } else {
        ValueTuple::new(value, unit, group)
    }
}

pub(crate) fn boolean(flag: bool) -> ValueTuple {
    ValueTuple::new(if flag { 1.0 } else { 0.0 }, Some("boolean"), Some("group_boolean"))
}

pub(crate) fn time_tuple(times: impl Iterator<Item = i64>) -> ValueTuple {
    let values: Vec<Option<f64>> = times.map(|t| Some(t as f64)).collect();
    ValueTuple::new(Value::from(values), Some("unix_epoch"), Some("group_time"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_units() {
        let vt = result_tuple(Verb::Count, Some(3.0), Some("degree_F"), Some("group_temperature"));
        assert_eq!(vt.unit(), Some("count"));
        let vt = result_tuple(Verb::MaxTime, Some(10.0), Some("degree_F"), Some("group_temperature"));
        assert_eq!(vt.group(), Some("group_time"));
        let vt = result_tuple(Verb::SumGe, None, Some("mm"), Some("group_rain"));
        assert_eq!(vt.group(), Some("group_count"));
        assert!(vt.is_null());
        let vt = result_tuple(Verb::Max, Some(70.0), Some("degree_F"), Some("group_temperature"));
        assert_eq!(vt.unit(), Some("degree_F"));
    }

    #[test]
    fn test_time_tuple_is_series() {
        let vt = time_tuple([300_i64, 600].into_iter());
        assert_eq!(vt.value().as_series(), Some(&[Some(300.0), Some(600.0)][..]));
    }
}
