use std::sync::Arc;

use crate::database::SampleStore;
use crate::error::QueryError;
use crate::ingest::{AlertEvaluator, LatestCache};
use crate::types::{Sample, StoreRecord};

/// Read-only side: never goes through the ingest pipeline.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn SampleStore>,
    cache: Arc<LatestCache>,
    evaluator: AlertEvaluator,
    history_limit: usize,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn SampleStore>,
        cache: Arc<LatestCache>,
        evaluator: AlertEvaluator,
        history_limit: usize,
    ) -> Self {
        Self {
            store,
            cache,
            evaluator,
            history_limit,
        }
    }

    pub fn latest(&self) -> Result<Sample, QueryError> {
        self.cache.get().ok_or(QueryError::NoData)
    }

    /// 最近一条样本的告警状态；还没有数据时为 false
    pub fn alert(&self) -> bool {
        self.cache
            .get()
            .map(|sample| self.evaluator.evaluate(&sample))
            .unwrap_or(false)
    }

    /// Newest first, capped at the configured history limit.
    pub fn history(&self, limit: Option<usize>) -> Result<Vec<Sample>, QueryError> {
        let limit = limit.map_or(self.history_limit, |n| n.min(self.history_limit));
        let records = self.store.recent(limit)?;
        Ok(records.into_iter().map(|r| r.sample).collect())
    }

    /// Every stored record in insertion order, for the CSV export.
    pub fn records(&self) -> Result<Vec<StoreRecord>, QueryError> {
        Ok(self.store.all()?)
    }

    pub fn record_count(&self) -> Result<usize, QueryError> {
        Ok(self.store.count()?)
    }

    /// 启动时用库里最新一条记录预热缓存
    pub fn warm_cache(&self) -> Result<Option<Sample>, QueryError> {
        let newest = self.store.recent(1)?.into_iter().next().map(|r| r.sample);
        if let Some(sample) = &newest {
            self.cache.set(sample.clone());
        }
        Ok(newest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::pipeline::tests::{t, MemoryStore};
    use crate::types::Reading;

    fn service(store: Arc<MemoryStore>, history_limit: usize) -> (QueryService, Arc<LatestCache>) {
        let cache = Arc::new(LatestCache::new());
        let svc = QueryService::new(store, Arc::clone(&cache), AlertEvaluator::default(), history_limit);
        (svc, cache)
    }

    fn fill(store: &MemoryStore, n: usize) {
        for i in 0..n {
            store.append(&Sample::new(Reading::new(i as f64, 0.0, 0.0), t(i as i64 * 100))).unwrap();
        }
    }

    #[test]
    fn latest_and_alert_before_any_data() {
        let (svc, _) = service(Arc::new(MemoryStore::default()), 500);
        assert!(matches!(svc.latest(), Err(QueryError::NoData)));
        assert!(!svc.alert());
    }

    #[test]
    fn alert_mirrors_cached_sample() {
        let (svc, cache) = service(Arc::new(MemoryStore::default()), 500);
        cache.set(Sample::new(Reading::new(0.0, 0.0, 20.0), t(0)));
        assert!(svc.alert());
        cache.set(Sample::new(Reading::new(0.0, 0.0, 15.0), t(200)));
        assert!(!svc.alert());
    }

    #[test]
    fn history_is_capped_and_newest_first() {
        let store = Arc::new(MemoryStore::default());
        fill(&store, 10);
        let (svc, _) = service(store, 4);

        let history = svc.history(None).unwrap();
        let axes: Vec<f64> = history.iter().map(Sample::ax).collect();
        assert_eq!(axes, vec![9.0, 8.0, 7.0, 6.0]);

        assert_eq!(svc.history(Some(2)).unwrap().len(), 2);
        assert_eq!(svc.history(Some(100)).unwrap().len(), 4);
        assert!(svc.history(Some(0)).unwrap().is_empty());
    }

    #[test]
    fn records_keep_insertion_order() {
        let store = Arc::new(MemoryStore::default());
        let (svc, _) = service(Arc::clone(&store), 500);
        assert!(svc.records().unwrap().is_empty());

        fill(&store, 3);
        let ids: Vec<i64> = svc.records().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn warm_cache_uses_newest_record() {
        let store = Arc::new(MemoryStore::default());
        let (svc, cache) = service(Arc::clone(&store), 500);
        assert_eq!(svc.warm_cache().unwrap(), None);
        assert_eq!(cache.get(), None);

        fill(&store, 3);
        svc.warm_cache().unwrap();
        assert_eq!(cache.get().unwrap().ax(), 2.0);
        assert_eq!(svc.record_count().unwrap(), 3);
    }
}
