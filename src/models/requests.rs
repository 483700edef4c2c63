use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::api::middleware::AppError;
use crate::models::Params;
use crate::services::query_builder::{column, select, Operator, Predicate, Query};

/// Body of `POST /api/adapters/{alias}/data`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetDataRequest {
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub as_table: bool,
    #[serde(default)]
    pub use_proxy: Option<bool>,
}

/// Body of `PUT /api/credentials/{alias}`
#[derive(Debug, Clone, Deserialize)]
pub struct SetCredentialRequest {
    pub secret: String,
    #[serde(default)]
    pub identity: BTreeMap<String, String>,
}

/// Body of `PUT /api/proxy`
#[derive(Debug, Clone, Deserialize)]
pub struct SetProxyRequest {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
}

/// One `table.column <op> value` comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    pub table: String,
    pub column: String,
    pub op: Operator,
    pub value: Value,
}

impl FilterSpec {
    pub fn to_predicate(&self) -> Predicate {
        let col = column(self.table.clone(), self.column.clone());
        match self.op {
            Operator::Eq => col.eq(self.value.clone()),
            Operator::Ne => col.ne(self.value.clone()),
            Operator::Lt => col.lt(self.value.clone()),
            Operator::Le => col.le(self.value.clone()),
            Operator::Gt => col.gt(self.value.clone()),
            Operator::Ge => col.ge(self.value.clone()),
        }
    }
}

fn build_query(tables: &[String], filters: &[FilterSpec]) -> Result<Query, AppError> {
    if tables.is_empty() {
        return Err(AppError::Validation("At least one table is required".to_string()));
    }
    Ok(select(tables.iter().cloned()).filter_all(filters.iter().map(FilterSpec::to_predicate)))
}

/// Body of `POST /api/cache/query`
#[derive(Debug, Clone, Deserialize)]
pub struct CacheQueryRequest {
    pub tables: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    pub limit: Option<usize>,
}

impl CacheQueryRequest {
    pub fn to_query(&self) -> Result<Query, AppError> {
        build_query(&self.tables, &self.filters)
    }
}

/// Remote source feeding a cache population
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    pub alias: String,
    #[serde(default)]
    pub params: Params,
}

/// Body of `POST /api/cache/populate`
#[derive(Debug, Clone, Deserialize)]
pub struct PopulateRequest {
    pub tables: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    pub source: SourceSpec,
    /// Project fetched records onto these columns; defaults to the target
    /// table's columns
    pub columns: Option<Vec<String>>,
}

impl PopulateRequest {
    pub fn to_query(&self) -> Result<Query, AppError> {
        build_query(&self.tables, &self.filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_populate_request() {
        let request: PopulateRequest = serde_json::from_value(json!({
            "tables": ["risk"],
            "filters": [{"table": "risk", "column": "cob_dt", "op": "eq", "value": "2019-01-14"}],
            "source": {"alias": "mock"}
        }))
        .unwrap();

        assert!(request.columns.is_none());
        assert!(request.source.params.is_empty());

        let compiled = request.to_query().unwrap().to_select_sql(None).unwrap();
        assert!(compiled.sql.ends_with("WHERE \"risk\".\"cob_dt\" = ?1"));
        assert_eq!(compiled.params, vec![json!("2019-01-14")]);
    }

    #[test]
    fn test_get_data_request_defaults() {
        let request: GetDataRequest = serde_json::from_value(json!({"as_table": true})).unwrap();
        assert!(request.as_table);
        assert!(request.params.is_empty());
        assert!(request.use_proxy.is_none());
    }

    #[test]
    fn test_query_requires_tables() {
        let request: CacheQueryRequest = serde_json::from_value(json!({"tables": []})).unwrap();
        assert!(matches!(request.to_query(), Err(AppError::Validation(_))));
    }
}
