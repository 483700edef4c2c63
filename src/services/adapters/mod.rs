// Data-source adapters: the contract plus the built-in implementations
pub mod adapter;
pub mod http_json;
pub mod json_file;
pub mod mysql;
pub mod postgresql;
pub mod sqlite;
pub mod static_records;

pub use adapter::DataAdapter;
pub use http_json::{HttpJsonAdapter, HTTP_JSON_ALIAS};
pub use json_file::{JsonFileAdapter, JSON_FILE_ALIAS};
pub use mysql::{MySQLAdapter, MYSQL_ALIAS};
pub use postgresql::{PostgreSQLAdapter, POSTGRES_ALIAS};
pub use sqlite::{SqliteSourceAdapter, SQLITE_ALIAS};
pub use static_records::StaticAdapter;

use crate::services::ConnectionPoolManager;
use std::sync::Arc;
use std::time::Duration;

/// Adapters that ship with the crate, registered at startup
pub fn builtin_adapters(
    pool_manager: Arc<ConnectionPoolManager>,
    request_timeout: Duration,
) -> Vec<Arc<dyn DataAdapter>> {
    vec![
        Arc::new(SqliteSourceAdapter),
        Arc::new(PostgreSQLAdapter::new(pool_manager)),
        Arc::new(MySQLAdapter),
        Arc::new(HttpJsonAdapter::new(request_timeout)),
        Arc::new(JsonFileAdapter),
    ]
}
