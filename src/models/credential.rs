use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Secret and identity fields for one source alias
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub alias: String,
    /// Non-secret identity fields such as `user`, `host` or `database`
    #[serde(default)]
    pub identity: BTreeMap<String, String>,
    #[serde(skip_serializing)]
    pub secret: String,
}

impl Credential {
    pub fn new(
        alias: impl Into<String>,
        secret: impl Into<String>,
        identity: BTreeMap<String, String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            identity,
            secret: secret.into(),
        }
    }

    pub fn identity_field(&self, key: &str) -> Option<&str> {
        self.identity.get(key).map(String::as_str)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("alias", &self.alias)
            .field("identity", &self.identity)
            .field("secret", &"***")
            .finish()
    }
}

/// Network egress proxy applied to adapters that need one
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub pass: Option<String>,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            user: None,
            pass: None,
        }
    }

    pub fn with_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.pass = Some(pass.into());
        self
    }

    /// Proxy endpoint without credentials, e.g. `http://proxy.local:3128`
    pub fn url(&self) -> String {
        if self.host.contains("://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Credential and proxy injected into one adapter invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAccess {
    pub credential: Option<Credential>,
    pub proxy: Option<ProxyConfig>,
}
