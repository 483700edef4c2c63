// Flat-file adapter for JSON documents on the local filesystem
use crate::api::middleware::AppError;
use crate::models::{Compatibility, Params, Record, ResolvedAccess};
use crate::services::adapters::adapter::{json_to_records, optional_str, required_str, DataAdapter};

pub const JSON_FILE_ALIAS: &str = "JSON_FILE";

/// Reads records from a JSON file.
///
/// Params: `path` (required), `records_path` (optional dot path to the array).
pub struct JsonFileAdapter;

#[async_trait::async_trait]
impl DataAdapter for JsonFileAdapter {
    fn alias(&self) -> &str {
        JSON_FILE_ALIAS
    }

    fn is_compatible(&self, params: &Params) -> Compatibility {
        if let Err(e) = optional_str(params, "path").and(optional_str(params, "records_path")) {
            return Compatibility::incompatible(e.to_string());
        }
        Compatibility::compatible()
    }

    async fn fetch(&self, params: &Params, _access: &ResolvedAccess) -> Result<Vec<Record>, AppError> {
        let path = required_str(params, "path")?;
        let records_path = optional_str(params, "records_path")?;

        tracing::debug!("Reading JSON records from {}", path);
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to read {}: {}", path, e)))?;

        let document: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|e| AppError::Fetch(format!("Failed to parse {} as JSON: {}", path, e)))?;

        json_to_records(document, records_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn params(value: serde_json::Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_reads_records_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"result": [{{"ticker": "ABC", "close": 10.5}}, {{"ticker": "XYZ"}}]}}"#).unwrap();

        let p = params(json!({
            "path": file.path().to_string_lossy(),
            "records_path": "result",
        }));
        let records = JsonFileAdapter.fetch(&p, &ResolvedAccess::default()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["ticker"], json!("ABC"));
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let p = params(json!({"path": "/definitely/not/here.json"}));
        let err = JsonFileAdapter.fetch(&p, &ResolvedAccess::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_malformed_file_is_fetch_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let p = params(json!({"path": file.path().to_string_lossy()}));
        let err = JsonFileAdapter.fetch(&p, &ResolvedAccess::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
    }

    #[test]
    fn test_compatibility() {
        assert!(JsonFileAdapter.is_compatible(&Params::new()).ok);
        assert!(!JsonFileAdapter.is_compatible(&params(json!({"path": 5}))).ok);
    }
}
