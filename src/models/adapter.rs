use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of an adapter's compatibility self-check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
    pub ok: bool,
    pub message: String,
}

impl Compatibility {
    pub fn compatible() -> Self {
        Self {
            ok: true,
            message: String::new(),
        }
    }

    pub fn incompatible(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Where a registered adapter came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterOrigin {
    Builtin,
    Dynamic,
}

/// Registry listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub alias: String,
    pub active: bool,
    /// Diagnostic from the registration-time compatibility check; empty when active
    pub message: String,
    pub origin: AdapterOrigin,
    pub needs_proxy: bool,
    pub registered_at: DateTime<Utc>,
}
