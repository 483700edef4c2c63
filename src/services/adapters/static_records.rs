use crate::api::middleware::AppError;
use crate::models::{Compatibility, Params, Record, ResolvedAccess};
use crate::services::adapters::adapter::DataAdapter;

/// Adapter serving a fixed, in-memory set of records
pub struct StaticAdapter {
    alias: String,
    records: Vec<Record>,
}

impl StaticAdapter {
    pub fn new(alias: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            alias: alias.into(),
            records,
        }
    }
}

#[async_trait::async_trait]
impl DataAdapter for StaticAdapter {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn is_compatible(&self, _params: &Params) -> Compatibility {
        Compatibility::compatible()
    }

    async fn fetch(&self, _params: &Params, _access: &ResolvedAccess) -> Result<Vec<Record>, AppError> {
        Ok(self.records.clone())
    }
}
