use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::models::ProxyConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub fetch: FetchConfig,
    pub pool: PoolConfig,
    pub proxy: Option<ProxySettings>,
    pub logging: LoggingConfig,
}

/// Backing store for cached report data
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Deadline for one adapter call or one fetch-or-cache transaction
    pub timeout_secs: u64,
    /// Bound on concurrently fetched sources
    pub max_concurrency: usize,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub max_size: usize,
}

/// Proxy seeded into the session at startup
#[derive(Clone, Deserialize)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
}

impl ProxySettings {
    pub fn to_proxy_config(&self) -> ProxyConfig {
        let proxy = ProxyConfig::new(self.host.clone(), self.port);
        match (&self.user, &self.pass) {
            (Some(user), Some(pass)) => proxy.with_auth(user.clone(), pass.clone()),
            _ => proxy,
        }
    }
}

impl std::fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("database.url", "./report_cache.db")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("fetch.timeout_secs", 30)?
            .set_default("fetch.max_concurrency", num_cpus::get() as u64)?
            .set_default("pool.max_size", 16)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        // Load from environment variables
        if let Ok(database_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", database_url)?;
        }

        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        if let Ok(timeout) = env::var("FETCH_TIMEOUT_SECS") {
            builder = builder.set_override("fetch.timeout_secs", timeout.parse::<u64>().unwrap_or(30))?;
        }

        if let Ok(concurrency) = env::var("FETCH_MAX_CONCURRENCY") {
            if let Ok(concurrency) = concurrency.parse::<u64>() {
                builder = builder.set_override("fetch.max_concurrency", concurrency.max(1))?;
            }
        }

        if let Ok(max_size) = env::var("POOL_MAX_SIZE") {
            builder = builder.set_override("pool.max_size", max_size.parse::<u64>().unwrap_or(16))?;
        }

        // The proxy section only exists when a host is configured
        if let Ok(proxy_host) = env::var("PROXY_HOST") {
            let proxy_port = env::var("PROXY_PORT")
                .ok()
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(8080);
            builder = builder
                .set_override("proxy.host", proxy_host)?
                .set_override("proxy.port", proxy_port)?;

            if let Ok(user) = env::var("PROXY_USER") {
                builder = builder.set_override("proxy.user", user)?;
            }
            if let Ok(pass) = env::var("PROXY_PASS") {
                builder = builder.set_override("proxy.pass", pass)?;
            }
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
