// Fetch-or-cache layer
//
// Serves a query from the backing store when it already has matching rows,
// otherwise runs a caller-supplied populate routine, writes its rows back in
// one transaction and answers from the store.

use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::api::middleware::AppError;
use crate::models::RecordSet;
use crate::services::query_builder::{CompiledQuery, Query};
use crate::storage::sqlite::SqliteStorage;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Transactions answered from the store
    pub hits: u64,
    /// Transactions that had to populate
    pub misses: u64,
    /// Successful write-backs
    pub populations: u64,
    /// Populate or write-back failures
    pub failures: u64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type KeyLocks = SyncMutex<HashMap<String, Arc<Mutex<()>>>>;

/// One transaction's claim on a key's lock. Dropping the last claim removes
/// the map entry, including when the transaction future is dropped
/// mid-flight.
struct KeyLockEntry<'a> {
    lock: Arc<Mutex<()>>,
    key: String,
    locks: &'a KeyLocks,
}

impl Drop for KeyLockEntry<'_> {
    fn drop(&mut self) {
        if let Ok(mut locks) = self.locks.lock() {
            // Only the map and this claim still hold it
            let last = locks
                .get(&self.key)
                .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
            if last {
                locks.remove(&self.key);
            }
        }
    }
}

/// Runs fetch-or-cache transactions against one backing store.
///
/// Transactions on the same cache key are serialized, so concurrent callers
/// asking for the same rows trigger a single remote fetch.
pub struct FetchOrCacheService {
    storage: Arc<SqliteStorage>,
    key_locks: KeyLocks,
    stats: Mutex<CacheStats>,
    default_timeout: Duration,
}

impl FetchOrCacheService {
    pub fn new(storage: Arc<SqliteStorage>) -> Self {
        Self {
            storage,
            key_locks: SyncMutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
            default_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn storage(&self) -> &Arc<SqliteStorage> {
        &self.storage
    }

    /// Stable key for a query: target table plus a hash of its rendered SQL
    /// and bound values
    pub fn cache_key(query: &Query) -> Result<String, AppError> {
        let table = query.target_table()?;
        let CompiledQuery { sql, params } = query.to_select_sql(None)?;

        let mut hasher = DefaultHasher::new();
        sql.hash(&mut hasher);
        for param in &params {
            param.to_string().hash(&mut hasher);
        }
        Ok(format!("{}:{:x}", table, hasher.finish()))
    }

    /// Plain read of the backing store; never populates
    pub async fn fetch(&self, query: &Query, limit: Option<usize>) -> Result<RecordSet, AppError> {
        self.storage.select(query, limit).await
    }

    /// Run the fetch-or-cache transaction with the default deadline
    pub async fn get_data<F, Fut>(&self, query: &Query, populate: F) -> Result<RecordSet, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RecordSet, AppError>>,
    {
        self.get_data_with_timeout(query, populate, self.default_timeout).await
    }

    /// Check the store, populate on a miss, write back, then answer from the
    /// store. A failed or timed-out populate leaves the store untouched and
    /// surfaces as `DataUnavailable`. Only single-table queries are accepted,
    /// since fetched rows land in the target table alone.
    pub async fn get_data_with_timeout<F, Fut>(
        &self,
        query: &Query,
        populate: F,
        timeout: Duration,
    ) -> Result<RecordSet, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RecordSet, AppError>>,
    {
        if query.tables().len() != 1 {
            return Err(AppError::Validation(
                "Fetch-or-cache transactions run on a single table".to_string(),
            ));
        }
        let key = Self::cache_key(query)?;

        let entry = self.claim_key(&key)?;
        let _held = entry.lock.lock().await;
        self.run_transaction(query, &key, populate, timeout).await
    }

    fn claim_key(&self, key: &str) -> Result<KeyLockEntry<'_>, AppError> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| AppError::Internal("Cache key locks poisoned".to_string()))?;
        let lock = locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        Ok(KeyLockEntry {
            lock,
            key: key.to_string(),
            locks: &self.key_locks,
        })
    }

    async fn run_transaction<F, Fut>(
        &self,
        query: &Query,
        key: &str,
        populate: F,
        timeout: Duration,
    ) -> Result<RecordSet, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RecordSet, AppError>>,
    {
        let probe = self.storage.select(query, Some(1)).await?;
        if !probe.is_empty() {
            self.stats.lock().await.hits += 1;
            tracing::debug!("Cache hit for {}", key);
            return self.storage.select(query, None).await;
        }

        self.stats.lock().await.misses += 1;
        tracing::info!("Cache miss for {}, populating", key);

        let start_time = Instant::now();
        let fetched = match tokio::time::timeout(timeout, populate()).await {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                self.stats.lock().await.failures += 1;
                tracing::warn!("Populate for {} failed: {}", key, e);
                return Err(AppError::data_unavailable(e));
            }
            Err(_) => {
                self.stats.lock().await.failures += 1;
                tracing::warn!("Populate for {} timed out after {:?}", key, timeout);
                return Err(AppError::data_unavailable(AppError::Timeout(format!(
                    "Populate for {} did not complete within {:?}",
                    key, timeout
                ))));
            }
        };

        let table = query.target_table()?;
        if let Some(row) = fetched.rows().iter().position(|r| !query.matches_target(r)) {
            self.stats.lock().await.failures += 1;
            tracing::warn!("Populate for {} returned row {} outside the query", key, row);
            return Err(AppError::Validation(format!(
                "Populated row {} does not satisfy the query on {}",
                row, table
            )));
        }

        let population = match self.storage.write_back(table, &fetched, key).await {
            Ok(population) => population,
            Err(e) => {
                self.stats.lock().await.failures += 1;
                tracing::error!("Write-back into {} failed: {}", table, e);
                return Err(e);
            }
        };
        self.stats.lock().await.populations += 1;

        let stored = self.storage.select(query, None).await?;
        tracing::info!(
            "Populated {} rows into {} in {} ms",
            population.row_count,
            table,
            start_time.elapsed().as_millis()
        );

        Ok(stored)
    }

    /// Delete the rows a query matches so the next transaction repopulates
    pub async fn invalidate(&self, query: &Query) -> Result<usize, AppError> {
        let deleted = self.storage.delete_matching(query).await?;
        tracing::info!("Invalidated {} cached rows for {}", deleted, Self::cache_key(query)?);
        Ok(deleted)
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }
}
