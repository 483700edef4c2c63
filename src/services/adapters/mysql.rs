// MySQL adapter: one short-lived connection per fetch
use crate::api::middleware::AppError;
use crate::models::{Compatibility, Credential, Params, Record, ResolvedAccess};
use crate::services::adapters::adapter::{optional_str, optional_u64, required_str, DataAdapter};
use crate::validation::SqlValidator;
use mysql_async::{prelude::*, Conn, Opts, OptsBuilder, Row, Value as MySqlValue};
use serde_json::{json, Value};

pub const MYSQL_ALIAS: &str = "MYSQL";

/// Read-only SELECTs against MySQL/MariaDB.
///
/// Params: `sql`, optional `limit`. Identity fields `host`, `user`,
/// `database` and optional `port` come from the alias credential.
pub struct MySQLAdapter;

impl MySQLAdapter {
    fn opts_from_credential(credential: &Credential) -> Result<Opts, AppError> {
        let field = |key: &str| {
            credential.identity_field(key).map(str::to_string).ok_or_else(|| {
                AppError::Fetch(format!(
                    "Credentials for {} are missing identity field '{}'",
                    credential.alias, key
                ))
            })
        };

        let port = match credential.identity_field("port") {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| AppError::Fetch(format!("Invalid port '{}' in credentials for {}", p, credential.alias)))?,
            None => 3306,
        };

        let builder = OptsBuilder::default()
            .ip_or_hostname(field("host")?)
            .tcp_port(port)
            .user(Some(field("user")?))
            .pass(Some(credential.secret.clone()))
            .db_name(Some(field("database")?));
        Ok(Opts::from(builder))
    }

    /// Convert MySQL value to JSON
    fn mysql_value_to_json(mysql_val: MySqlValue) -> Value {
        match mysql_val {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(s) => json!(s),
                Err(_) => Value::Null,
            },
            MySqlValue::Int(i) => json!(i),
            MySqlValue::UInt(u) => json!(u),
            MySqlValue::Float(f) => json!(f),
            MySqlValue::Double(d) => json!(d),
            MySqlValue::Date(y, m, d, h, min, s, _) => {
                json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }

    fn row_to_record(row: Row) -> Record {
        let columns = row.columns();
        let mut values = row.unwrap();
        let mut record = Record::new();
        for (idx, column) in columns.iter().enumerate() {
            let value = std::mem::replace(&mut values[idx], MySqlValue::NULL);
            record.insert(column.name_str().to_string(), Self::mysql_value_to_json(value));
        }
        record
    }
}

#[async_trait::async_trait]
impl DataAdapter for MySQLAdapter {
    fn alias(&self) -> &str {
        MYSQL_ALIAS
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
        let credential = access
            .credential
            .as_ref()
            .ok_or_else(|| AppError::Fetch(format!("No credentials configured for {}", MYSQL_ALIAS)))?;
        let opts = Self::opts_from_credential(credential)?;
        let (sql, _) = SqlValidator::prepare(required_str(params, "sql")?, optional_u64(params, "limit")?)?;

        let mut conn = Conn::new(opts)
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to connect to MySQL: {}", e)))?;

        let rows: Vec<Row> = conn
            .query(sql)
            .await
            .map_err(|e| AppError::Fetch(format!("Query execution failed: {}", e)))?;

        if let Err(e) = conn.disconnect().await {
            tracing::warn!("Failed to close MySQL connection cleanly: {}", e);
        }

        Ok(rows.into_iter().map(Self::row_to_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_value_conversion() {
        assert_eq!(MySQLAdapter::mysql_value_to_json(MySqlValue::NULL), Value::Null);
        assert_eq!(MySQLAdapter::mysql_value_to_json(MySqlValue::Int(-4)), json!(-4));
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(MySqlValue::Bytes(b"FX".to_vec())),
            json!("FX")
        );
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(MySqlValue::Date(2019, 1, 14, 0, 0, 0, 0)),
            json!("2019-01-14 00:00:00")
        );
    }

    #[test]
    fn test_opts_require_identity() {
        let credential = Credential::new("MYSQL", "pw", BTreeMap::new());
        assert!(MySQLAdapter::opts_from_credential(&credential).is_err());

        let mut identity = BTreeMap::new();
        identity.insert("host".to_string(), "db.local".to_string());
        identity.insert("user".to_string(), "report".to_string());
        identity.insert("database".to_string(), "risk".to_string());
        let opts = MySQLAdapter::opts_from_credential(&Credential::new("MYSQL", "pw", identity)).unwrap();
        assert_eq!(opts.tcp_port(), 3306);
        assert_eq!(opts.user(), Some("report"));
        assert_eq!(opts.db_name(), Some("risk"));
    }

    #[tokio::test]
    async fn test_fetch_without_credentials_fails() {
        let params: Params = serde_json::from_value(serde_json::json!({"sql": "SELECT 1"})).unwrap();
        let err = MySQLAdapter.fetch(&params, &ResolvedAccess::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
    }
}
