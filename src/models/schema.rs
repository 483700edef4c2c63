use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::middleware::AppError;
use crate::validation::quote_identifier;

/// Storage type of a backing-store column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
    /// Stored as RFC 3339 text
    Timestamp,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text | ColumnType::Timestamp => "TEXT",
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: None,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Ordered column declarations for one backing-store table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Render `CREATE TABLE IF NOT EXISTS` for this schema
    pub fn create_sql(&self) -> Result<String, AppError> {
        if self.columns.is_empty() {
            return Err(AppError::Validation(format!(
                "Table {} must declare at least one column",
                self.name
            )));
        }

        let primary_keys: Vec<&ColumnDef> = self.columns.iter().filter(|c| c.primary_key).collect();
        let mut parts = Vec::with_capacity(self.columns.len() + 1);

        for column in &self.columns {
            let mut part = format!("{} {}", quote_identifier(&column.name)?, column.column_type.sql_type());
            if primary_keys.len() == 1 && column.primary_key {
                part.push_str(" PRIMARY KEY");
            }
            if !column.nullable {
                part.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                part.push_str(" DEFAULT ");
                part.push_str(&default_literal(default)?);
            }
            parts.push(part);
        }

        if primary_keys.len() > 1 {
            let keys = primary_keys
                .iter()
                .map(|c| quote_identifier(&c.name))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(&self.name)?,
            parts.join(", ")
        ))
    }
}

fn default_literal(value: &Value) -> Result<String, AppError> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        other => Err(AppError::Validation(format!(
            "Column defaults must be scalar, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_sql_single_primary_key() {
        let schema = TableSchema::new("risk")
            .column(ColumnDef::new("id", ColumnType::Integer).primary_key())
            .column(ColumnDef::new("cob_dt", ColumnType::Text).not_null())
            .column(ColumnDef::new("desk", ColumnType::Text).with_default("FX"));

        let sql = schema.create_sql().unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"risk\" (\"id\" INTEGER PRIMARY KEY NOT NULL, \"cob_dt\" TEXT NOT NULL, \"desk\" TEXT DEFAULT 'FX')"
        );
    }

    #[test]
    fn test_create_sql_composite_key() {
        let schema = TableSchema::new("prices")
            .column(ColumnDef::new("ticker", ColumnType::Text).primary_key())
            .column(ColumnDef::new("day", ColumnType::Timestamp).primary_key())
            .column(ColumnDef::new("close", ColumnType::Real));

        let sql = schema.create_sql().unwrap();
        assert!(sql.ends_with("PRIMARY KEY (\"ticker\", \"day\"))"));
        assert!(!sql.contains("TEXT PRIMARY KEY"));
    }

    #[test]
    fn test_create_sql_rejects_bad_identifiers() {
        let schema = TableSchema::new("risk; DROP TABLE x")
            .column(ColumnDef::new("id", ColumnType::Integer));
        assert!(schema.create_sql().is_err());

        let schema = TableSchema::new("risk")
            .column(ColumnDef::new("n", ColumnType::Integer).with_default(json!([1])));
        assert!(schema.create_sql().is_err());
    }

    #[test]
    fn test_schema_deserialize_defaults() {
        let schema: TableSchema = serde_json::from_value(json!({
            "name": "risk",
            "columns": [{"name": "cob_dt", "column_type": "text"}]
        }))
        .unwrap();
        assert!(schema.columns[0].nullable);
        assert!(!schema.columns[0].primary_key);
    }
}
