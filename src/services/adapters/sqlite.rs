// SQLite source adapter: read-only SELECTs against a database file
use crate::api::middleware::AppError;
use crate::models::{Compatibility, Params, Record, ResolvedAccess};
use crate::services::adapters::adapter::{optional_str, optional_u64, required_str, DataAdapter};
use crate::storage::sqlite::sql_to_json;
use crate::validation::SqlValidator;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

pub const SQLITE_ALIAS: &str = "SQLITE";

/// Params: `path`, `sql` (single SELECT), optional `limit`
pub struct SqliteSourceAdapter;

impl SqliteSourceAdapter {
    fn run_query(path: &str, sql: &str) -> Result<Vec<Record>, AppError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| AppError::Fetch(format!("Failed to open SQLite database {}: {}", path, e)))?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::Fetch(format!("Query preparation failed: {}", e)))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt
            .query([])
            .map_err(|e| AppError::Fetch(format!("Query execution failed: {}", e)))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| AppError::Fetch(format!("Failed to read row: {}", e)))?
        {
            let mut record = Record::new();
            for (idx, column) in columns.iter().enumerate() {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| AppError::Fetch(format!("Failed to read column {}: {}", column, e)))?;
                record.insert(column.clone(), sql_to_json(value));
            }
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl DataAdapter for SqliteSourceAdapter {
    fn alias(&self) -> &str {
        SQLITE_ALIAS
    }

    fn is_compatible(&self, params: &Params) -> Compatibility {
        match optional_str(params, "path") {
            Ok(Some(path)) if !Path::new(path).is_file() => {
                return Compatibility::incompatible(format!("SQLite database {} does not exist", path));
            }
            Err(e) => return Compatibility::incompatible(e.to_string()),
            _ => {}
        }

        match optional_str(params, "sql") {
            Ok(Some(sql)) => match SqlValidator::validate_select_only(sql) {
                Ok(()) => Compatibility::compatible(),
                Err(e) => Compatibility::incompatible(e.to_string()),
            },
            Ok(None) => Compatibility::compatible(),
            Err(e) => Compatibility::incompatible(e.to_string()),
        }
    }

    async fn fetch(&self, params: &Params, _access: &ResolvedAccess) -> Result<Vec<Record>, AppError> {
        let path = required_str(params, "path")?.to_string();
        let (sql, limit_applied) = SqlValidator::prepare(required_str(params, "sql")?, optional_u64(params, "limit")?)?;

        tracing::debug!("Running SQLite query against {} (limit applied: {})", path, limit_applied);

        // rusqlite is blocking
        tokio::task::spawn_blocking(move || Self::run_query(&path, &sql))
            .await
            .map_err(|e| AppError::Internal(format!("SQLite fetch task failed: {}", e)))?
    }
}
