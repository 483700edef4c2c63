use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::api::middleware::AppError;
use crate::models::{Credential, ProxyConfig, ResolvedAccess};
use crate::services::registry::normalize_alias;

/// Per-alias credentials plus one proxy configuration.
///
/// Written rarely (setup), read on every fetch. Both tables sit behind
/// readers-writer locks so concurrent fetches never serialize on reads.
#[derive(Default)]
pub struct CredentialStore {
    credentials: RwLock<HashMap<String, Credential>>,
    proxy: RwLock<Option<ProxyConfig>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the credential for `alias`, replacing any previous one
    pub async fn set_credentials(
        &self,
        alias: &str,
        secret: impl Into<String>,
        identity: BTreeMap<String, String>,
    ) -> Result<(), AppError> {
        let key = normalize_alias(alias);
        if key.is_empty() {
            return Err(AppError::Validation("Credential alias cannot be empty".to_string()));
        }

        let credential = Credential::new(key.clone(), secret, identity);
        let replaced = self.credentials.write().await.insert(key.clone(), credential).is_some();
        tracing::info!(
            "{} credentials for {}",
            if replaced { "Replaced" } else { "Stored" },
            key
        );
        Ok(())
    }

    pub async fn remove_credentials(&self, alias: &str) -> bool {
        self.credentials.write().await.remove(&normalize_alias(alias)).is_some()
    }

    pub async fn credential(&self, alias: &str) -> Option<Credential> {
        self.credentials.read().await.get(&normalize_alias(alias)).cloned()
    }

    /// Replace the proxy configuration
    pub async fn set_proxy(&self, proxy: ProxyConfig) {
        tracing::info!("Proxy set to {}", proxy.url());
        *self.proxy.write().await = Some(proxy);
    }

    pub async fn clear_proxy(&self) {
        *self.proxy.write().await = None;
    }

    pub async fn proxy(&self) -> Option<ProxyConfig> {
        self.proxy.read().await.clone()
    }

    /// Credential and proxy for one fetch.
    ///
    /// A missing credential is not an error. The proxy is included when the
    /// caller asks for it (`use_proxy = Some(true)`), or when the adapter
    /// needs it and the caller has not opted out (`Some(false)`).
    pub async fn resolve_for_fetch(
        &self,
        alias: &str,
        adapter_needs_proxy: bool,
        use_proxy: Option<bool>,
    ) -> ResolvedAccess {
        let credential = self.credential(alias).await;
        let wants_proxy = use_proxy.unwrap_or(adapter_needs_proxy);
        let proxy = if wants_proxy { self.proxy().await } else { None };

        ResolvedAccess { credential, proxy }
    }
}
