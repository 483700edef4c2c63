// PostgreSQL adapter using connection pooling for optimal resource management
use crate::api::middleware::AppError;
use crate::models::{Compatibility, Params, Record, ResolvedAccess};
use crate::services::adapters::adapter::{optional_str, optional_u64, required_str, DataAdapter};
use crate::services::connection_pool::{ConnectionPoolManager, PgConnectionSpec};
use crate::validation::SqlValidator;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_postgres::types::Type;

pub const POSTGRES_ALIAS: &str = "POSTGRES";

/// Read-only SELECTs against PostgreSQL.
///
/// Params: `sql`, optional `limit`. Connection identity comes from the
/// credential stored for the alias.
pub struct PostgreSQLAdapter {
    pool_manager: Arc<ConnectionPoolManager>,
}

impl PostgreSQLAdapter {
    pub fn new(pool_manager: Arc<ConnectionPoolManager>) -> Self {
        Self { pool_manager }
    }

    fn row_to_record(row: &tokio_postgres::Row) -> Record {
        let mut record = Record::new();
        for (idx, column) in row.columns().iter().enumerate() {
            let value: Value = match *column.type_() {
                Type::INT2 => row.get::<_, Option<i16>>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
                Type::INT4 => row.get::<_, Option<i32>>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
                Type::INT8 => row.get::<_, Option<i64>>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
                Type::FLOAT4 => row.get::<_, Option<f32>>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
                Type::FLOAT8 => row.get::<_, Option<f64>>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
                Type::BOOL => row.get::<_, Option<bool>>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
                Type::TIMESTAMPTZ => row
                    .get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
                    .map(|v| json!(v.to_rfc3339()))
                    .unwrap_or(Value::Null),
                Type::TIMESTAMP => row
                    .get::<_, Option<chrono::NaiveDateTime>>(idx)
                    .map(|v| json!(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
                    .unwrap_or(Value::Null),
                Type::DATE => row
                    .get::<_, Option<chrono::NaiveDate>>(idx)
                    .map(|v| json!(v.to_string()))
                    .unwrap_or(Value::Null),
                _ => {
                    // TEXT, VARCHAR, NAME and anything else representable as a string
                    match row.try_get::<_, Option<String>>(idx) {
                        Ok(Some(v)) => json!(v),
                        Ok(None) => Value::Null,
                        Err(_) => {
                            tracing::warn!(
                                "Unsupported column type {} for column {}, using NULL",
                                column.type_().name(),
                                column.name()
                            );
                            Value::Null
                        }
                    }
                }
            };
            record.insert(column.name().to_string(), value);
        }
        record
    }
}

#[async_trait::async_trait]
impl DataAdapter for PostgreSQLAdapter {
    fn alias(&self) -> &str {
        POSTGRES_ALIAS
    }

    fn is_compatible(&self, params: &Params) -> Compatibility {
        match optional_str(params, "sql") {
            Ok(Some(sql)) => match SqlValidator::validate_select_only(sql) {
                Ok(()) => Compatibility::compatible(),
                Err(e) => Compatibility::incompatible(e.to_string()),
            },
            Ok(None) => Compatibility::compatible(),
            Err(e) => Compatibility::incompatible(e.to_string()),
        }
    }

    async fn fetch(&self, params: &Params, access: &ResolvedAccess) -> Result<Vec<Record>, AppError> {
        let credential = access.credential.as_ref().ok_or_else(|| {
            AppError::Fetch(format!("No credentials configured for {}", POSTGRES_ALIAS))
        })?;
        let spec = PgConnectionSpec::from_credential(credential)?;
        let (sql, _) = SqlValidator::prepare(required_str(params, "sql")?, optional_u64(params, "limit")?)?;

        let pool = self.pool_manager.get_or_create_pool(&spec).await?;
        let client = pool
            .get()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to get connection from pool: {}", e)))?;

        let rows = client.query(sql.as_str(), &[]).await.map_err(|e| {
            let details = match e.as_db_error() {
                Some(db_error) => format!("Code: {}, Message: {}", db_error.code().code(), db_error.message()),
                None => e.to_string(),
            };
            AppError::Fetch(format!("Query execution failed: {}", details))
        })?;

        tracing::debug!("PostgreSQL query on {} returned {} rows", spec.pool_key(), rows.len());
        Ok(rows.iter().map(Self::row_to_record).collect())
    }
}
