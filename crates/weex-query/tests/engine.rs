//! Aggregation queries against an on-disk archive

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use weex_core::{ArchiveRecord, TimeSpan, UnitModel, UnitSystem, ValueTuple, SECONDS_PER_DAY};
use weex_db::{DbClient, DbOptions};
use weex_query::{
    aggregate_in, AggregateOp, AggregationEngine, QueryContext, QueryError, QueryPool, QueryRequest,
    QueryResult, Verb, XTypeProvider, XTypeRegistry,
};

// 2024-03-10 00:00:00 UTC
const MIDNIGHT: i64 = 1_710_028_800;
const DAY: i64 = SECONDS_PER_DAY;

async fn setup(registry: XTypeRegistry) -> Result<(TempDir, DbClient, AggregationEngine)> {
    let dir = tempfile::tempdir()?;
    let db = DbClient::open(
        DbOptions::new(dir.path().join("weewx.sdb"))
            .unit_system(UnitSystem::MetricWx)
            .columns(["outTemp", "outHumidity", "rain", "barometer", "windSpeed", "windDir"]),
    )
    .await?;
    let model = Arc::new(UnitModel::builtin()?);
    let engine = AggregationEngine::new(db.clone(), model, Arc::new(registry));
    Ok((dir, db, engine))
}

fn rec(ts: i64) -> ArchiveRecord {
    ArchiveRecord::new(ts, UnitSystem::MetricWx, 5)
}

fn days(n: i64) -> TimeSpan {
    TimeSpan::new(MIDNIGHT, MIDNIGHT + n * DAY)
}

fn op(name: &str) -> AggregateOp {
    AggregateOp::from(name)
}

/// Daily rain totals of 4, 6 and 5 mm, one record per day
async fn seed_rain(db: &DbClient) -> Result<()> {
    for (i, mm) in [4.0, 6.0, 5.0].iter().enumerate() {
        db.add_record(&rec(MIDNIGHT + i as i64 * DAY + 300).with("rain", *mm)).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_threshold_counts_days() -> Result<()> {
    let (_dir, db, engine) = setup(XTypeRegistry::with_defaults()).await?;
    seed_rain(&db).await?;

    let five_mm = ValueTuple::scalar(5.0, "mm", "group_rain");
    let vt = engine.aggregate("rain", &op("sum_ge"), &days(3), Some(&five_mm)).await?;
    assert_eq!(vt.raw(), Some(2.0));
    assert_eq!(vt.unit(), Some("count"));

    // 0.2 in is 5.08 mm
    let inches = ValueTuple::scalar(0.2, "inch", "group_rain");
    let vt = engine.aggregate("rain", &op("sum_ge"), &days(3), Some(&inches)).await?;
    assert_eq!(vt.raw(), Some(1.0));

    let vt = engine.aggregate("rain", &op("sum_le"), &days(3), Some(&five_mm)).await?;
    assert_eq!(vt.raw(), Some(2.0));
    Ok(())
}

#[tokio::test]
async fn test_threshold_errors() -> Result<()> {
    let (_dir, db, engine) = setup(XTypeRegistry::with_defaults()).await?;
    seed_rain(&db).await?;

    let missing = engine.aggregate("rain", &op("sum_ge"), &days(3), None).await;
    assert!(matches!(missing, Err(QueryError::MissingThreshold(_))));

    let celsius = ValueTuple::scalar(5.0, "degree_C", "group_temperature");
    let mismatch = engine.aggregate("rain", &op("sum_ge"), &days(3), Some(&celsius)).await;
    assert!(matches!(mismatch, Err(QueryError::Conversion(_))));

    let short = TimeSpan::new(MIDNIGHT, MIDNIGHT + 3600);
    let five_mm = ValueTuple::scalar(5.0, "mm", "group_rain");
    let too_short = engine.aggregate("rain", &op("sum_ge"), &short, Some(&five_mm)).await;
    assert!(matches!(too_short, Err(QueryError::Timespan(_))));
    Ok(())
}

#[tokio::test]
async fn test_daily_and_raw_paths_agree() -> Result<()> {
    let (_dir, db, engine) = setup(XTypeRegistry::with_defaults()).await?;
    for i in 0..36 {
        let ts = MIDNIGHT + (i + 1) * 7200;
        db.add_record(&rec(ts).with("outTemp", (i % 7) as f64).with("rain", 0.5)).await?;
    }

    // Same records, but the first span is whole days and the second is not
    let aligned = days(3);
    let ragged = TimeSpan::new(MIDNIGHT - 60, MIDNIGHT + 3 * DAY);
    for verb in ["sum", "avg", "min", "max", "count", "mintime", "maxtime", "first", "last", "maxsum"] {
        let a = engine.aggregate("rain", &op(verb), &aligned, None).await?;
        let b = engine.aggregate("rain", &op(verb), &ragged, None).await?;
        assert_eq!(a, b, "rain {verb}");
        let a = engine.aggregate("outTemp", &op(verb), &aligned, None).await?;
        let b = engine.aggregate("outTemp", &op(verb), &ragged, None).await?;
        assert_eq!(a, b, "outTemp {verb}");
    }

    let total = engine.aggregate("rain", &op("sum"), &aligned, None).await?;
    assert_eq!(total.raw(), Some(18.0));
    assert_eq!(total.unit(), Some("mm"));
    Ok(())
}

#[tokio::test]
async fn test_no_data_is_null_not_error() -> Result<()> {
    let (_dir, db, engine) = setup(XTypeRegistry::with_defaults()).await?;
    seed_rain(&db).await?;

    let empty = TimeSpan::new(MIDNIGHT + 10 * DAY, MIDNIGHT + 12 * DAY);
    for verb in ["avg", "sum", "count", "max", "maxtime", "diff", "rms", "vecavg"] {
        let obs = if verb == "vecavg" { "windSpeed" } else { "outTemp" };
        let vt = engine.aggregate(obs, &op(verb), &empty, None).await?;
        assert!(vt.is_null(), "{verb}");
    }

    let vt = engine.aggregate("outTemp", &op("avg"), &empty, None).await?;
    assert_eq!(vt.unit(), Some("degree_C"));
    let vt = engine.aggregate("outTemp", &op("has_data"), &days(3), None).await?;
    assert_eq!(vt.raw(), Some(0.0));
    let vt = engine.aggregate("rain", &op("has_data"), &days(3), None).await?;
    assert_eq!(vt.raw(), Some(1.0));
    Ok(())
}

#[tokio::test]
async fn test_over_day_verbs_need_a_day() -> Result<()> {
    let (_dir, db, engine) = setup(XTypeRegistry::with_defaults()).await?;
    db.add_record(&rec(MIDNIGHT + 300).with("outTemp", 4.0)).await?;

    let hour = TimeSpan::new(MIDNIGHT, MIDNIGHT + 3600);
    let result = engine.aggregate("outTemp", &op("maxmin"), &hour, None).await;
    assert!(matches!(result, Err(QueryError::Timespan(_))));

    let vt = engine.aggregate("outTemp", &op("maxmin"), &days(1), None).await?;
    assert_eq!(vt.raw(), Some(4.0));
    Ok(())
}

#[tokio::test]
async fn test_vector_uniform_wind() -> Result<()> {
    let (_dir, db, engine) = setup(XTypeRegistry::with_defaults()).await?;
    for i in 1..=5 {
        db.add_record(&rec(MIDNIGHT + i * 300).with("windSpeed", 10.0).with("windDir", 90.0))
            .await?;
    }

    let avg = engine.aggregate("windSpeed", &op("vecavg"), &days(1), None).await?;
    assert!((avg.raw().unwrap() - 10.0).abs() < 1e-9);
    assert_eq!(avg.unit(), Some("meter_per_second"));

    let dir = engine.aggregate("windSpeed", &op("vecdir"), &days(1), None).await?;
    assert!((dir.raw().unwrap() - 90.0).abs() < 1e-9);
    assert_eq!(dir.unit(), Some("degree_compass"));

    let result = engine.aggregate("outTemp", &op("vecavg"), &days(1), None).await;
    assert!(matches!(result, Err(QueryError::UnknownAggregation { .. })));
    Ok(())
}

#[tokio::test]
async fn test_tderiv_uses_rate_unit() -> Result<()> {
    let (_dir, db, engine) = setup(XTypeRegistry::with_defaults()).await?;
    db.add_record(&rec(MIDNIGHT + 300).with("barometer", 1010.0)).await?;
    db.add_record(&rec(MIDNIGHT + 1800).with("barometer", 1011.0)).await?;
    db.add_record(&rec(MIDNIGHT + 3900).with("barometer", 1013.0)).await?;

    let vt = engine.aggregate("barometer", &op("tderiv"), &days(1), None).await?;
    assert!((vt.raw().unwrap() - 3.0).abs() < 1e-9);
    assert_eq!(vt.unit(), Some("mbar_per_hour"));

    let diff = engine.aggregate("barometer", &op("diff"), &days(1), None).await?;
    assert_eq!(diff.raw(), Some(3.0));

    let one = TimeSpan::new(MIDNIGHT, MIDNIGHT + 600);
    let vt = engine.aggregate("barometer", &op("tderiv"), &one, None).await?;
    assert!(vt.is_null());
    Ok(())
}

#[tokio::test]
async fn test_unknown_types_and_verbs() -> Result<()> {
    let (_dir, _db, engine) = setup(XTypeRegistry::with_defaults()).await?;

    let result = engine.aggregate("leafWet1", &op("avg"), &days(1), None).await;
    assert!(matches!(result, Err(QueryError::UnknownObservationType(t)) if t == "leafWet1"));

    let result = engine.aggregate("outTemp", &op("median"), &days(1), None).await;
    assert!(matches!(result, Err(QueryError::UnknownAggregation { .. })));

    let result = engine.aggregate("dewpoint", &op("rms"), &days(1), None).await;
    assert!(matches!(result, Err(QueryError::UnknownAggregation { .. })));

    let vt = engine.aggregate("leafWet1", &op("exists"), &days(1), None).await?;
    assert_eq!(vt.raw(), Some(0.0));
    let vt = engine.aggregate("outTemp", &op("exists"), &days(1), None).await?;
    assert_eq!(vt.raw(), Some(1.0));
    Ok(())
}

#[tokio::test]
async fn test_derived_types_with_default_columns() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = DbClient::open(DbOptions::new(dir.path().join("weewx.sdb")).unit_system(UnitSystem::MetricWx)).await?;
    let model = Arc::new(UnitModel::builtin()?);
    let engine = AggregationEngine::new(db.clone(), model, Arc::new(XTypeRegistry::with_defaults()));
    assert!(db.has_column("outTemp"));
    assert!(!db.has_column("dewpoint"));

    db.add_record(&rec(MIDNIGHT + 300).with("outTemp", 20.0).with("outHumidity", 100.0)).await?;

    let avg = engine.aggregate("dewpoint", &op("avg"), &days(1), None).await?;
    assert!((avg.raw().unwrap() - 20.0).abs() < 1e-9);
    assert_eq!(avg.unit(), Some("degree_C"));

    let mut snapshot = db.snapshot().await?;
    let stored = snapshot.record(MIDNIGHT + 300).await?.unwrap();
    let scalar = engine.scalar("dewpoint", &stored)?;
    assert!((scalar.raw().unwrap() - 20.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_derived_dewpoint() -> Result<()> {
    let (_dir, db, engine) = setup(XTypeRegistry::with_defaults()).await?;
    for (i, t) in [18.0, 20.0, 22.0].iter().enumerate() {
        let ts = MIDNIGHT + (i as i64 + 1) * 300;
        db.add_record(&rec(ts).with("outTemp", *t).with("outHumidity", 100.0)).await?;
    }

    let avg = engine.aggregate("dewpoint", &op("avg"), &days(1), None).await?;
    assert!((avg.raw().unwrap() - 20.0).abs() < 1e-9);
    assert_eq!(avg.unit(), Some("degree_C"));

    let max_time = engine.aggregate("dewpoint", &op("maxtime"), &days(1), None).await?;
    assert_eq!(max_time.raw(), Some((MIDNIGHT + 900) as f64));

    let series = engine.series("dewpoint", &days(1), None).await?;
    let data = series.data.value().as_series().unwrap();
    assert_eq!(data.len(), 3);
    assert!((data[0].unwrap() - 18.0).abs() < 1e-9);

    let record = rec(MIDNIGHT).with("outTemp", 30.0).with("outHumidity", 100.0);
    let scalar = engine.scalar("dewpoint", &record)?;
    assert!((scalar.raw().unwrap() - 30.0).abs() < 1e-9);
    let stored = engine.scalar("outTemp", &record)?;
    assert_eq!(stored.unit(), Some("degree_C"));
    Ok(())
}

#[tokio::test]
async fn test_degree_days() -> Result<()> {
    let (_dir, db, engine) = setup(XTypeRegistry::with_defaults()).await?;
    db.add_record(&rec(MIDNIGHT + 300).with("outTemp", 10.0)).await?;
    db.add_record(&rec(MIDNIGHT + DAY + 300).with("outTemp", 20.0)).await?;

    // 65°F is 18.333°C
    let heat = engine.aggregate("heatdeg", &op("sum"), &days(2), None).await?;
    assert!((heat.raw().unwrap() - 25.0 / 3.0).abs() < 1e-9);
    assert_eq!(heat.unit(), Some("degree_C_day"));

    let cool = engine.aggregate("cooldeg", &op("avg"), &days(2), None).await?;
    assert!((cool.raw().unwrap() - 5.0 / 6.0).abs() < 1e-9);
    // The third day has no readings and does not dilute the average
    let cool = engine.aggregate("cooldeg", &op("avg"), &days(3), None).await?;
    assert!((cool.raw().unwrap() - 5.0 / 6.0).abs() < 1e-9);

    let grow = engine.aggregate("growdeg", &op("sum"), &days(2), None).await?;
    assert!((grow.raw().unwrap() - 10.0).abs() < 1e-9);

    let ragged = TimeSpan::new(MIDNIGHT, MIDNIGHT + DAY + 3600);
    let result = engine.aggregate("heatdeg", &op("sum"), &ragged, None).await;
    assert!(matches!(result, Err(QueryError::Timespan(_))));
    Ok(())
}

#[tokio::test]
async fn test_series_forms() -> Result<()> {
    let (_dir, db, engine) = setup(XTypeRegistry::with_defaults()).await?;
    seed_rain(&db).await?;

    let raw = engine.series("rain", &days(3), None).await?;
    assert_eq!(raw.data.value().as_series(), Some(&[Some(4.0), Some(6.0), Some(5.0)][..]));
    assert_eq!(raw.stop.value().as_series().map(|s| s[0]), Some(Some((MIDNIGHT + 300) as f64)));
    assert_eq!(raw.start.value().as_series().map(|s| s[0]), Some(Some(MIDNIGHT as f64)));

    let daily = engine.series("rain", &days(4), Some((op("sum"), DAY))).await?;
    assert_eq!(
        daily.data.value().as_series(),
        Some(&[Some(4.0), Some(6.0), Some(5.0), None][..])
    );
    assert_eq!(daily.data.unit(), Some("mm"));
    assert_eq!(daily.start.group(), Some("group_time"));
    Ok(())
}

#[tokio::test]
async fn test_converted_result() -> Result<()> {
    let (_dir, db, engine) = setup(XTypeRegistry::with_defaults()).await?;
    seed_rain(&db).await?;

    let no_overrides: [(&str, &str); 0] = [];
    let targets = engine.model().target_units(UnitSystem::Us, no_overrides)?;
    let vt = engine
        .aggregate_converted("rain", &op("sum"), &days(3), None, &targets)
        .await?;
    assert_eq!(vt.unit(), Some("inch"));
    assert!((vt.raw().unwrap() - 15.0 / 25.4).abs() < 1e-9);

    let count = engine
        .aggregate_converted("rain", &op("count"), &days(3), None, &targets)
        .await?;
    assert_eq!(count.raw(), Some(3.0));
    Ok(())
}

/// Custom verb built from two built-in aggregates in the same snapshot
struct Range;

#[async_trait]
impl XTypeProvider for Range {
    fn name(&self) -> &str {
        "range"
    }

    async fn get_aggregate(
        &self,
        obs_type: &str,
        op: &AggregateOp,
        span: &TimeSpan,
        _threshold: Option<&ValueTuple>,
        ctx: &mut QueryContext<'_>,
    ) -> QueryResult<ValueTuple> {
        if op.name() != "range" {
            return Err(QueryError::unknown_aggregation(obs_type, op));
        }
        let max = aggregate_in(obs_type, &Verb::Max.into(), span, None, ctx).await?;
        let min = aggregate_in(obs_type, &Verb::Min.into(), span, None, ctx).await?;
        Ok(max.checked_sub(&min)?)
    }
}

#[tokio::test]
async fn test_custom_verb_provider() -> Result<()> {
    let registry = XTypeRegistry::with_defaults();
    registry.register(Arc::new(Range), 10);
    let (_dir, db, engine) = setup(registry).await?;
    for (i, t) in [3.0, 11.5, 7.0].iter().enumerate() {
        db.add_record(&rec(MIDNIGHT + (i as i64 + 1) * 300).with("outTemp", *t)).await?;
    }

    let vt = engine.aggregate("outTemp", &op("range"), &days(1), None).await?;
    assert_eq!(vt.raw(), Some(8.5));
    assert_eq!(vt.unit(), Some("degree_C"));
    Ok(())
}

/// Never finishes in time
struct Slow;

#[async_trait]
impl XTypeProvider for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    async fn get_aggregate(
        &self,
        obs_type: &str,
        _op: &AggregateOp,
        _span: &TimeSpan,
        _threshold: Option<&ValueTuple>,
        _ctx: &mut QueryContext<'_>,
    ) -> QueryResult<ValueTuple> {
        if obs_type != "slow" {
            return Err(QueryError::UnknownObservationType(obs_type.to_string()));
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(ValueTuple::new(1.0, None, None))
    }
}

async fn pool(timeout: Option<Duration>) -> Result<(TempDir, DbClient, QueryPool)> {
    let registry = XTypeRegistry::with_defaults();
    registry.register(Arc::new(Slow), 0);
    let (dir, db, engine) = setup(registry).await?;
    Ok((dir, db, QueryPool::new(Arc::new(engine), 2, timeout)))
}

#[tokio::test]
async fn test_pool_runs_concurrent_queries() -> Result<()> {
    let (_dir, db, pool) = pool(None).await?;
    seed_rain(&db).await?;

    let handles: Vec<_> = (0..8)
        .map(|_| pool.submit(QueryRequest::new("rain", Verb::Sum, days(3))))
        .collect();
    for handle in handles {
        assert_eq!(handle.join().await?.raw(), Some(15.0));
    }

    let five_mm = ValueTuple::scalar(5.0, "mm", "group_rain");
    let request = QueryRequest::new("rain", "sum_ge", days(3)).with_threshold(five_mm);
    assert_eq!(pool.submit(request).join().await?.raw(), Some(2.0));
    Ok(())
}

#[tokio::test]
async fn test_pool_cancel() -> Result<()> {
    let (_dir, _db, pool) = pool(None).await?;

    let handle = pool.submit(QueryRequest::new("slow", "avg", days(1)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();
    assert!(matches!(handle.join().await, Err(QueryError::Cancelled)));
    Ok(())
}

#[tokio::test]
async fn test_pool_timeout() -> Result<()> {
    let (_dir, _db, pool) = pool(Some(Duration::from_millis(50))).await?;

    let handle = pool.submit(QueryRequest::new("slow", "avg", days(1)));
    assert!(matches!(handle.join().await, Err(QueryError::TimedOut)));
    Ok(())
}

#[tokio::test]
async fn test_pool_shutdown_cancels_new_work() -> Result<()> {
    let (_dir, _db, pool) = pool(None).await?;
    pool.shutdown();

    let handle = pool.submit(QueryRequest::new("rain", "sum", days(1)));
    assert!(matches!(handle.join().await, Err(QueryError::Cancelled)));
    Ok(())
}
