use crate::recordings::models::Recording;
use crate::recordings::repository::{RecordRepository, RepositoryError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// How long a fetched result is served without going back to the store
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum QueryKey {
    Recent { limit: usize },
    Record { id: String },
    Search { term: String, limit: usize },
}

#[derive(Debug, Clone)]
enum CachedValue {
    List(Vec<Recording>),
    Record(Option<Recording>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    fetched_at: Instant,
}

/// Stale-time cache in front of another repository.
///
/// Clones share the same entries, so invalidating one clone invalidates all.
#[derive(Clone)]
pub struct CachedRepository {
    inner: Arc<dyn RecordRepository>,
    stale_time: Duration,
    entries: Arc<RwLock<HashMap<QueryKey, CacheEntry>>>,
}

impl CachedRepository {
    pub fn new(inner: Arc<dyn RecordRepository>) -> Self {
        Self::with_stale_time(inner, DEFAULT_STALE_TIME)
    }

    pub fn with_stale_time(inner: Arc<dyn RecordRepository>, stale_time: Duration) -> Self {
        Self {
            inner,
            stale_time,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Drop every cached result
    pub async fn invalidate(&self) {
        let mut entries = self.entries.write().await;
        debug!("Invalidating {} cached recording queries", entries.len());
        entries.clear();
    }

    async fn fresh(&self, key: &QueryKey) -> Option<CachedValue> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.stale_time)
            .map(|entry| entry.value.clone())
    }

    async fn store(&self, key: QueryKey, value: CachedValue) {
        self.entries.write().await.insert(
            key,
            CacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    async fn cached_list<F>(&self, key: QueryKey, fetch: F) -> Result<Vec<Recording>, RepositoryError>
    where
        F: std::future::Future<Output = Result<Vec<Recording>, RepositoryError>>,
    {
        if let Some(CachedValue::List(list)) = self.fresh(&key).await {
            return Ok(list);
        }
        let list = fetch.await?;
        self.store(key, CachedValue::List(list.clone())).await;
        Ok(list)
    }
}

#[async_trait::async_trait]
impl RecordRepository for CachedRepository {
    async fn list_recent(&self, limit: usize) -> Result<Vec<Recording>, RepositoryError> {
        self.cached_list(QueryKey::Recent { limit }, self.inner.list_recent(limit))
            .await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Recording>, RepositoryError> {
        let key = QueryKey::Record { id: id.to_string() };
        if let Some(CachedValue::Record(record)) = self.fresh(&key).await {
            return Ok(record);
        }
        let record = self.inner.get_by_id(id).await?;
        self.store(key, CachedValue::Record(record.clone())).await;
        Ok(record)
    }

    async fn search_by_phone_prefix(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Recording>, RepositoryError> {
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let key = QueryKey::Search {
            term: term.to_string(),
            limit,
        };
        self.cached_list(key, self.inner.search_by_phone_prefix(term, limit))
            .await
    }
}
