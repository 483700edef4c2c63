use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::NoTls;

use crate::api::middleware::AppError;
use crate::models::Credential;

/// PostgreSQL connection parameters taken from a credential entry
#[derive(Clone, PartialEq, Eq)]
pub struct PgConnectionSpec {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl PgConnectionSpec {
    /// Identity fields `host`, `user`, `database` (required) and `port`
    /// (default 5432); the credential secret is the password
    pub fn from_credential(credential: &Credential) -> Result<Self, AppError> {
        let field = |key: &str| {
            credential
                .identity_field(key)
                .map(str::to_string)
                .ok_or_else(|| {
                    AppError::Fetch(format!(
                        "Credentials for {} are missing identity field '{}'",
                        credential.alias, key
                    ))
                })
        };

        let port = match credential.identity_field("port") {
            Some(p) => p.parse::<u16>().map_err(|_| {
                AppError::Fetch(format!("Invalid port '{}' in credentials for {}", p, credential.alias))
            })?,
            None => 5432,
        };

        Ok(Self {
            host: field("host")?,
            port,
            user: field("user")?,
            password: credential.secret.clone(),
            database: field("database")?,
        })
    }

    /// Pool key without the password
    pub fn pool_key(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

impl fmt::Debug for PgConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PgConnectionSpec({})", self.pool_key())
    }
}

/// Connection pool manager that maintains one pool per PostgreSQL endpoint
pub struct ConnectionPoolManager {
    pools: Arc<RwLock<HashMap<String, (PgConnectionSpec, Pool)>>>,
    max_pool_size: usize,
}

impl ConnectionPoolManager {
    /// Create a new connection pool manager with default settings
    pub fn new() -> Self {
        Self::with_max_size(16)
    }

    pub fn with_max_size(max_pool_size: usize) -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
            max_pool_size,
        }
    }

    /// Get or create a pool for `spec`. A changed password for the same
    /// endpoint replaces the old pool.
    /// This method is safe to call concurrently from multiple tasks
    pub async fn get_or_create_pool(&self, spec: &PgConnectionSpec) -> Result<Pool, AppError> {
        let key = spec.pool_key();

        // Fast path: check if pool already exists (read lock)
        {
            let pools = self.pools.read().await;
            if let Some((existing, pool)) = pools.get(&key) {
                if existing == spec {
                    tracing::debug!("Using existing connection pool for: {}", key);
                    return Ok(pool.clone());
                }
            }
        }

        // Slow path: create new pool (write lock)
        let mut pools = self.pools.write().await;

        // Double-check in case another task created the pool while we were waiting
        if let Some((existing, pool)) = pools.get(&key) {
            if existing == spec {
                return Ok(pool.clone());
            }
            tracing::info!("Credentials changed for {}, replacing connection pool", key);
        }

        tracing::info!(
            "Creating new connection pool for: {} (max_size: {})",
            key,
            self.max_pool_size
        );

        let mut cfg = PoolConfig::new();
        cfg.host = Some(spec.host.clone());
        cfg.port = Some(spec.port);
        cfg.user = Some(spec.user.clone());
        cfg.password = Some(spec.password.clone());
        cfg.dbname = Some(spec.database.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)
            .map_err(|e| {
                tracing::error!("Failed to create connection pool for {}: {}", key, e);
                AppError::Connection(format!("Failed to create connection pool: {}", e))
            })?;
        pool.resize(self.max_pool_size);

        pools.insert(key, (spec.clone(), pool.clone()));
        Ok(pool)
    }

    /// Drop the pool for an endpoint
    pub async fn remove_pool(&self, spec: &PgConnectionSpec) -> bool {
        let removed = self.pools.write().await.remove(&spec.pool_key()).is_some();
        if removed {
            tracing::info!("Removed connection pool for: {}", spec.pool_key());
        }
        removed
    }

    /// Get the number of active pools
    pub async fn pool_count(&self) -> usize {
        self.pools.read().await.len()
    }
}

impl Default for ConnectionPoolManager {
    fn default() -> Self {
        Self::new()
    }
}
