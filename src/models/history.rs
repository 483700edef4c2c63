use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One committed write-back of fetched rows into the cache store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    pub id: String,
    pub cache_key: String,
    pub table_name: String,
    pub row_count: usize,
    pub populated_at: DateTime<Utc>,
}

impl PopulationRecord {
    pub fn new(cache_key: impl Into<String>, table_name: impl Into<String>, row_count: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cache_key: cache_key.into(),
            table_name: table_name.into(),
            row_count,
            populated_at: Utc::now(),
        }
    }
}
