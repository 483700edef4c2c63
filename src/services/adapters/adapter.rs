// Data-source adapter contract shared by built-in and user-supplied sources
use crate::api::middleware::AppError;
use crate::models::{Compatibility, Params, Record, ResolvedAccess};
use serde_json::Value;

/// A pluggable data source.
///
/// The registry and the session only ever see this trait, so an adapter
/// shipped with the crate and one registered at runtime are indistinguishable
/// on the resolve path.
#[async_trait::async_trait]
pub trait DataAdapter: Send + Sync {
    /// Registry key. Normalized (trimmed, upper-cased) on registration.
    fn alias(&self) -> &str;

    /// Whether the session's proxy applies to this source by default
    fn needs_proxy(&self) -> bool {
        false
    }

    /// Cheap, side-effect-free precondition check.
    ///
    /// Called with empty params at registration time and with the caller's
    /// params before every fetch. Reports problems instead of failing.
    fn is_compatible(&self, params: &Params) -> Compatibility;

    /// Retrieve records. Failures are terminal for the call; nothing retries.
    async fn fetch(&self, params: &Params, access: &ResolvedAccess) -> Result<Vec<Record>, AppError>;
}

/// Required string parameter
pub fn required_str<'a>(params: &'a Params, key: &str) -> Result<&'a str, AppError> {
    match params.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(_) => Err(AppError::Validation(format!("Parameter '{}' must be a non-empty string", key))),
        None => Err(AppError::Validation(format!("Missing required parameter '{}'", key))),
    }
}

/// Optional string parameter; wrong types are reported, not ignored
pub fn optional_str<'a>(params: &'a Params, key: &str) -> Result<Option<&'a str>, AppError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(AppError::Validation(format!("Parameter '{}' must be a string", key))),
    }
}

/// Optional non-negative integer parameter
pub fn optional_u64(params: &Params, key: &str) -> Result<Option<u64>, AppError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("Parameter '{}' must be a non-negative integer", key))),
    }
}

/// Turn a parsed JSON document into records.
///
/// `records_path` is a dot-separated path to the array of records inside the
/// document (e.g. `data.items`). An array of objects yields one record per
/// element, a single object yields one record.
pub fn json_to_records(document: Value, records_path: Option<&str>) -> Result<Vec<Record>, AppError> {
    let mut node = document;
    if let Some(path) = records_path.filter(|p| !p.is_empty()) {
        for segment in path.split('.') {
            node = match node {
                Value::Object(mut map) => map.remove(segment).ok_or_else(|| {
                    AppError::Fetch(format!("Path segment '{}' not found in response", segment))
                })?,
                Value::Array(mut items) => {
                    let idx: usize = segment.parse().map_err(|_| {
                        AppError::Fetch(format!("Path segment '{}' is not an array index", segment))
                    })?;
                    if idx >= items.len() {
                        return Err(AppError::Fetch(format!("Array index {} out of range", idx)));
                    }
                    items.swap_remove(idx)
                }
                _ => {
                    return Err(AppError::Fetch(format!(
                        "Cannot descend into scalar at path segment '{}'",
                        segment
                    )))
                }
            };
        }
    }

    match node {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(AppError::Fetch(format!(
                    "Record {} is not an object: {}",
                    idx, other
                ))),
            })
            .collect(),
        Value::Object(map) => Ok(vec![map]),
        other => Err(AppError::Fetch(format!("Expected an array of records, got {}", other))),
    }
}
