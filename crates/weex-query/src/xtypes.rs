//! Extension point for derived observation types and aggregation verbs
//!
//! Providers are consulted from highest to lowest priority. A provider that
//! does not handle a request declines with `UnknownObservationType` or
//! `UnknownAggregation` and the next one is tried; any other outcome,
//! success or failure, is the answer.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::debug;
use weex_core::{ArchiveRecord, TimeSpan, UnitModel, ValueTuple};
use weex_db::ReadSnapshot;

use crate::error::{QueryError, QueryResult};
use crate::op::AggregateOp;

/// Everything a provider may read while answering one query
pub struct QueryContext<'a> {
    pub snapshot: &'a mut ReadSnapshot,
    pub model: &'a UnitModel,
    pub registry: &'a XTypeRegistry,
}

/// Series answer: interval start times, stop times and values, index aligned
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub start: ValueTuple,
    pub stop: ValueTuple,
    pub data: ValueTuple,
}

#[async_trait]
pub trait XTypeProvider: Send + Sync {
    fn name(&self) -> &str;

    fn get_scalar(&self, obs_type: &str, _record: &ArchiveRecord, _model: &UnitModel) -> QueryResult<ValueTuple> {
        Err(QueryError::UnknownObservationType(obs_type.to_string()))
    }

    async fn get_series(
        &self,
        obs_type: &str,
        _span: &TimeSpan,
        _ctx: &mut QueryContext<'_>,
    ) -> QueryResult<Series> {
        Err(QueryError::UnknownObservationType(obs_type.to_string()))
    }

    async fn get_aggregate(
        &self,
        obs_type: &str,
        _op: &AggregateOp,
        _span: &TimeSpan,
        _threshold: Option<&ValueTuple>,
        _ctx: &mut QueryContext<'_>,
    ) -> QueryResult<ValueTuple> {
        Err(QueryError::UnknownObservationType(obs_type.to_string()))
    }
}

struct Registered {
    priority: i32,
    provider: Arc<dyn XTypeProvider>,
}

/// Ranked list of providers, filled during startup
#[derive(Default)]
pub struct XTypeRegistry {
    providers: RwLock<Vec<Registered>>,
}

impl std::fmt::Debug for XTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl XTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in derived weather and degree-day types
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(crate::derived::DerivedWeather), 100);
        registry.register(Arc::new(crate::derived::DegreeDays::default()), 100);
        registry
    }

    /// Add a provider. Higher priorities are consulted first; equal
    /// priorities keep registration order.
    pub fn register(&self, provider: Arc<dyn XTypeProvider>, priority: i32) {
        debug!("Registering xtype provider {} at priority {}", provider.name(), priority);
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        let at = providers
            .iter()
            .position(|r| r.priority < priority)
            .unwrap_or(providers.len());
        providers.insert(at, Registered { priority, provider });
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn XTypeProvider>> {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| Arc::clone(&r.provider))
            .collect()
    }

    pub fn resolve_scalar(&self, obs_type: &str, record: &ArchiveRecord, model: &UnitModel) -> QueryResult<ValueTuple> {
        let mut declines = Declines::default();
        for provider in self.snapshot() {
            match provider.get_scalar(obs_type, record, model) {
                Err(e) if e.is_decline() => declines.note(e),
                answer => return answer,
            }
        }
        Err(declines.into_error(obs_type))
    }

    pub async fn resolve_series(
        &self,
        obs_type: &str,
        span: &TimeSpan,
        ctx: &mut QueryContext<'_>,
    ) -> QueryResult<Series> {
        let mut declines = Declines::default();
        for provider in self.snapshot() {
            match provider.get_series(obs_type, span, ctx).await {
                Err(e) if e.is_decline() => declines.note(e),
                answer => return answer,
            }
        }
        Err(declines.into_error(obs_type))
    }

    pub async fn resolve_aggregate(
        &self,
        obs_type: &str,
        op: &AggregateOp,
        span: &TimeSpan,
        threshold: Option<&ValueTuple>,
        ctx: &mut QueryContext<'_>,
    ) -> QueryResult<ValueTuple> {
        let mut declines = Declines::default();
        for provider in self.snapshot() {
            match provider.get_aggregate(obs_type, op, span, threshold, ctx).await {
                Err(e) if e.is_decline() => declines.note(e),
                answer => return answer,
            }
        }
        Err(declines.into_error(obs_type))
    }
}

/// Keeps the most informative decline: a provider that knew the type but
/// not the verb outranks one that knew neither.
#[derive(Default)]
struct Declines {
    aggregation: Option<QueryError>,
}

impl Declines {
    fn note(&mut self, err: QueryError) {
        if self.aggregation.is_none() && matches!(err, QueryError::UnknownAggregation { .. }) {
            self.aggregation = Some(err);
        }
    }

    fn into_error(self, obs_type: &str) -> QueryError {
        self.aggregation
            .unwrap_or_else(|| QueryError::UnknownObservationType(obs_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weex_core::UnitSystem;

    struct Fixed {
        name: &'static str,
        obs_type: &'static str,
        value: f64,
    }

    #[async_trait]
    impl XTypeProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn get_scalar(&self, obs_type: &str, _record: &ArchiveRecord, _model: &UnitModel) -> QueryResult<ValueTuple> {
            if obs_type != self.obs_type {
                return Err(QueryError::UnknownObservationType(obs_type.to_string()));
            }
            Ok(ValueTuple::new(self.value, None, None))
        }
    }

    struct KnowsTypeOnly;

    #[async_trait]
    impl XTypeProvider for KnowsTypeOnly {
        fn name(&self) -> &str {
            "knows-type"
        }

        fn get_scalar(&self, obs_type: &str, _record: &ArchiveRecord, _model: &UnitModel) -> QueryResult<ValueTuple> {
            Err(QueryError::unknown_aggregation(obs_type, "scalar"))
        }
    }

    fn record() -> ArchiveRecord {
        ArchiveRecord::new(300, UnitSystem::Us, 5)
    }

    #[test]
    fn test_priority_order() {
        let model = UnitModel::builtin().unwrap();
        let registry = XTypeRegistry::new();
        registry.register(Arc::new(Fixed { name: "low", obs_type: "foo", value: 1.0 }), 10);
        registry.register(Arc::new(Fixed { name: "high", obs_type: "foo", value: 2.0 }), 50);
        registry.register(Arc::new(Fixed { name: "high-later", obs_type: "foo", value: 3.0 }), 50);

        assert_eq!(registry.names(), vec!["high", "high-later", "low"]);
        let vt = registry.resolve_scalar("foo", &record(), &model).unwrap();
        assert_eq!(vt.raw(), Some(2.0));
    }

    #[test]
    fn test_declines_fall_through() {
        let model = UnitModel::builtin().unwrap();
        let registry = XTypeRegistry::new();
        registry.register(Arc::new(Fixed { name: "a", obs_type: "foo", value: 1.0 }), 50);
        registry.register(Arc::new(Fixed { name: "b", obs_type: "bar", value: 7.0 }), 10);

        assert_eq!(registry.resolve_scalar("bar", &record(), &model).unwrap().raw(), Some(7.0));
        assert!(matches!(
            registry.resolve_scalar("baz", &record(), &model),
            Err(QueryError::UnknownObservationType(t)) if t == "baz"
        ));
    }

    #[test]
    fn test_aggregation_decline_is_reported() {
        let model = UnitModel::builtin().unwrap();
        let registry = XTypeRegistry::new();
        registry.register(Arc::new(Fixed { name: "a", obs_type: "foo", value: 1.0 }), 50);
        registry.register(Arc::new(KnowsTypeOnly), 10);

        assert!(matches!(
            registry.resolve_scalar("baz", &record(), &model),
            Err(QueryError::UnknownAggregation { .. })
        ));
    }

    #[test]
    fn test_empty_registry() {
        let model = UnitModel::builtin().unwrap();
        let registry = XTypeRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.resolve_scalar("foo", &record(), &model).is_err());
    }
}
