use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::api::middleware::AppError;
use crate::models::{AdapterInfo, AdapterOrigin, Params};
use crate::services::adapters::DataAdapter;

/// Registry key for an alias: trimmed and upper-cased
pub fn normalize_alias(alias: &str) -> String {
    alias.trim().to_uppercase()
}

struct RegisteredAdapter {
    adapter: Arc<dyn DataAdapter>,
    origin: AdapterOrigin,
    active: bool,
    message: String,
    registered_at: DateTime<Utc>,
}

impl RegisteredAdapter {
    fn info(&self, alias: &str) -> AdapterInfo {
        AdapterInfo {
            alias: alias.to_string(),
            active: self.active,
            message: self.message.clone(),
            origin: self.origin,
            needs_proxy: self.adapter.needs_proxy(),
            registered_at: self.registered_at,
        }
    }
}

/// Alias -> adapter mapping shared by built-in and runtime-registered sources.
///
/// Duplicate aliases are rejected; `unregister` is the only way to replace an
/// adapter. Lookups take a read lock, so concurrent resolves never block
/// each other.
pub struct ConnectorRegistry {
    adapters: RwLock<HashMap<String, RegisteredAdapter>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Registry pre-populated with the given built-in adapters
    pub async fn with_builtins(builtins: Vec<Arc<dyn DataAdapter>>) -> Self {
        let registry = Self::new();
        for adapter in builtins {
            if let Err(e) = registry.insert(adapter, AdapterOrigin::Builtin).await {
                warn!("Skipping built-in adapter: {}", e);
            }
        }
        registry
    }

    /// Register a user-supplied adapter.
    ///
    /// A failed compatibility smoke test does not fail registration: the
    /// adapter is kept inactive with its diagnostic. Empty or duplicate
    /// aliases are rejected.
    pub async fn register(&self, adapter: Arc<dyn DataAdapter>) -> Result<AdapterInfo, AppError> {
        self.insert(adapter, AdapterOrigin::Dynamic).await
    }

    async fn insert(&self, adapter: Arc<dyn DataAdapter>, origin: AdapterOrigin) -> Result<AdapterInfo, AppError> {
        let alias = normalize_alias(adapter.alias());
        if alias.is_empty() {
            return Err(AppError::Validation("Adapter alias cannot be empty".to_string()));
        }

        // Smoke test outside the lock; adapters are expected to be cheap here
        let compatibility = adapter.is_compatible(&Params::new());

        let mut adapters = self.adapters.write().await;
        if adapters.contains_key(&alias) {
            return Err(AppError::Conflict(format!("Adapter {} is already registered", alias)));
        }

        if compatibility.ok {
            info!("Registered {:?} adapter {}", origin, alias);
        } else {
            warn!(
                "Registered {:?} adapter {} as inactive: {}",
                origin, alias, compatibility.message
            );
        }

        let entry = RegisteredAdapter {
            adapter,
            origin,
            active: compatibility.ok,
            message: compatibility.message,
            registered_at: Utc::now(),
        };
        let info = entry.info(&alias);
        adapters.insert(alias, entry);
        Ok(info)
    }

    /// Remove an adapter; returns whether one was registered under `alias`
    pub async fn unregister(&self, alias: &str) -> bool {
        let alias = normalize_alias(alias);
        let removed = self.adapters.write().await.remove(&alias).is_some();
        if removed {
            info!("Unregistered adapter {}", alias);
        }
        removed
    }

    /// Exact (case-normalized) lookup of an active adapter
    pub async fn resolve(&self, alias: &str) -> Result<Arc<dyn DataAdapter>, AppError> {
        let key = normalize_alias(alias);
        let adapters = self.adapters.read().await;
        let entry = adapters
            .get(&key)
            .ok_or_else(|| AppError::NotFound(format!("No adapter registered under alias {}", key)))?;

        if !entry.active {
            return Err(AppError::IncompatibleSource {
                alias: key,
                message: entry.message.clone(),
            });
        }

        debug!("Resolved adapter {}", key);
        Ok(entry.adapter.clone())
    }

    pub async fn info(&self, alias: &str) -> Option<AdapterInfo> {
        let key = normalize_alias(alias);
        self.adapters.read().await.get(&key).map(|entry| entry.info(&key))
    }

    /// Every registered adapter, active or not, sorted by alias
    pub async fn list(&self) -> Vec<AdapterInfo> {
        let adapters = self.adapters.read().await;
        let mut infos: Vec<AdapterInfo> = adapters.iter().map(|(alias, entry)| entry.info(alias)).collect();
        infos.sort_by(|a, b| a.alias.cmp(&b.alias));
        infos
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
