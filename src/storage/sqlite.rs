use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Transaction};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::middleware::AppError;
use crate::models::{PopulationRecord, Record, RecordSet, TableSchema};
use crate::services::query_builder::{CompiledQuery, Query};
use crate::validation::quote_identifier;

/// SQLite backing store for cached report data
/// Uses tokio::Mutex for async-friendly locking
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the store at `db_path`. Accepts `sqlite:` URLs and `:memory:`.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, AppError> {
        // Handle SQLite URL format (sqlite:./path or sqlite://path)
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path: &str = if path_str.starts_with("sqlite:") {
            path_str.trim_start_matches("sqlite:").trim_start_matches("//")
        } else {
            path_str.as_ref()
        };

        let conn = if clean_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(clean_path)?
        };
        Self::from_connection(conn).await
    }

    pub async fn in_memory() -> Result<Self, AppError> {
        Self::from_connection(Connection::open_in_memory()?).await
    }

    async fn from_connection(conn: Connection) -> Result<Self, AppError> {
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize bookkeeping tables
    async fn init_schema(&self) -> Result<(), AppError> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS population_history (
                id TEXT PRIMARY KEY,
                cache_key TEXT NOT NULL,
                table_name TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                populated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_population_history_at ON population_history(populated_at DESC)",
            [],
        )?;

        Ok(())
    }

    /// Create a data table if it does not exist yet
    pub async fn create_table(&self, schema: &TableSchema) -> Result<(), AppError> {
        let sql = schema.create_sql()?;
        let conn = self.conn.lock().await;
        conn.execute(&sql, [])?;
        tracing::info!("Ensured table {} ({} columns)", schema.name, schema.columns.len());
        Ok(())
    }

    /// Column names of `table` in declaration order; empty if the table is missing
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>, AppError> {
        let conn = self.conn.lock().await;
        Ok(Self::columns_of(&conn, table)?)
    }

    fn columns_of(conn: &Connection, table: &str) -> Result<Vec<String>, AppError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)?))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut columns = Vec::new();
        for name in names {
            columns.push(name?);
        }
        Ok(columns)
    }

    /// Total row count of one table
    pub async fn count_rows(&self, table: &str) -> Result<usize, AppError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)?),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Execute a query and return the matching rows
    pub async fn select(&self, query: &Query, limit: Option<usize>) -> Result<RecordSet, AppError> {
        let CompiledQuery { sql, params } = query.to_select_sql(limit)?;
        let bound: Vec<SqlValue> = params.iter().map(json_to_sql).collect();

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query(params_from_iter(bound.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (idx, column) in columns.iter().enumerate() {
                record.insert(column.clone(), sql_to_json(row.get_ref(idx)?));
            }
            records.push(record);
        }

        // Duplicate names across joined tables collapse to one key
        let mut seen = HashSet::new();
        let columns = columns.into_iter().filter(|c| seen.insert(c.clone())).collect();
        Ok(RecordSet::from_parts(columns, records))
    }

    /// Insert all records into `table` inside one transaction, without a
    /// population record
    #[cfg(test)]
    pub(crate) async fn insert_records(&self, table: &str, records: &RecordSet) -> Result<usize, AppError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(store_write)?;
        let inserted = Self::insert_into(&tx, table, records)?;
        tx.commit().map_err(store_write)?;
        Ok(inserted)
    }

    /// Insert fetched rows and their population record in one transaction.
    /// Either everything becomes visible or nothing does.
    pub async fn write_back(
        &self,
        table: &str,
        records: &RecordSet,
        cache_key: &str,
    ) -> Result<PopulationRecord, AppError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(store_write)?;

        let inserted = Self::insert_into(&tx, table, records)?;
        let population = PopulationRecord::new(cache_key, table, inserted);
        tx.execute(
            r#"
            INSERT INTO population_history (id, cache_key, table_name, row_count, populated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            rusqlite::params![
                population.id,
                population.cache_key,
                population.table_name,
                population.row_count as i64,
                population.populated_at.to_rfc3339(),
            ],
        )
        .map_err(store_write)?;

        tx.commit().map_err(store_write)?;
        tracing::debug!("Committed {} rows into {}", inserted, table);
        Ok(population)
    }

    fn insert_into(tx: &Transaction<'_>, table: &str, records: &RecordSet) -> Result<usize, AppError> {
        if records.is_empty() {
            return Ok(0);
        }

        let known = Self::columns_of(tx, table)?;
        if known.is_empty() {
            return Err(AppError::StoreWrite(format!("Table {} does not exist", table)));
        }
        if let Some(unknown) = records.columns().iter().find(|c| !known.contains(c)) {
            return Err(AppError::StoreWrite(format!(
                "Column {} does not exist in table {}",
                unknown, table
            )));
        }

        let quoted = records
            .columns()
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Result<Vec<_>, _>>()?;
        let sql = if quoted.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table)?)
        } else {
            let placeholders = (1..=quoted.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_identifier(table)?,
                quoted.join(", "),
                placeholders.join(", ")
            )
        };

        let mut stmt = tx.prepare(&sql).map_err(store_write)?;
        for record in records.rows() {
            let values: Vec<SqlValue> = records
                .columns()
                .iter()
                .map(|c| record.get(c).map(json_to_sql).unwrap_or(SqlValue::Null))
                .collect();
            stmt.execute(params_from_iter(values.iter())).map_err(store_write)?;
        }

        Ok(records.len())
    }

    /// Delete rows matching a single-table query
    pub async fn delete_matching(&self, query: &Query) -> Result<usize, AppError> {
        let CompiledQuery { sql, params } = query.to_delete_sql()?;
        let bound: Vec<SqlValue> = params.iter().map(json_to_sql).collect();
        let conn = self.conn.lock().await;
        let deleted = conn.execute(&sql, params_from_iter(bound.iter())).map_err(store_write)?;
        Ok(deleted)
    }

    /// Most recent write-backs first
    pub async fn list_population_history(&self, limit: usize) -> Result<Vec<PopulationRecord>, AppError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, cache_key, table_name, row_count, populated_at FROM population_history ORDER BY populated_at DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(rusqlite::params![limit as i64], |row| {
            let populated_at: String = row.get(4)?;
            Ok(PopulationRecord {
                id: row.get(0)?,
                cache_key: row.get(1)?,
                table_name: row.get(2)?,
                row_count: row.get::<_, i64>(3)? as usize,
                populated_at: chrono::DateTime::parse_from_rfc3339(&populated_at)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            4,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
            })
        })?;

        let mut history = Vec::new();
        for row in rows {
            history.push(row?);
        }
        Ok(history)
    }
}

fn store_write(err: rusqlite::Error) -> AppError {
    AppError::StoreWrite(err.to_string())
}

/// JSON scalar -> SQLite value. Booleans become 0/1, nested values are stored as JSON text.
pub(crate) fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// SQLite value -> JSON scalar. Blobs are rendered as lowercase hex.
pub(crate) fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(b.iter().map(|byte| format!("{:02x}", byte)).collect()),
    }
}
