use axum::{
    extract::{Query as QueryParams, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{CacheQueryRequest, PopulateRequest, RecordSet, TableSchema};
use crate::services::CacheStats;

/// Create a backing-store table if it does not exist yet
pub async fn create_table(
    State(state): State<AppState>,
    Json(schema): Json<TableSchema>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    state.cache.storage().create_table(&schema).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "table": schema.name,
            "columns": schema.column_names()
        })),
    ))
}

/// Read cached rows; never populates
pub async fn query_cache(
    State(state): State<AppState>,
    Json(payload): Json<CacheQueryRequest>,
) -> Result<Json<RecordSet>, AppError> {
    let query = payload.to_query()?;
    let rows = state.cache.fetch(&query, payload.limit).await?;
    Ok(Json(rows))
}

/// Run a fetch-or-cache transaction fed by one remote source
pub async fn populate(
    State(state): State<AppState>,
    Json(payload): Json<PopulateRequest>,
) -> Result<Json<RecordSet>, AppError> {
    let query = payload.to_query()?;
    let table = query.target_table()?.to_string();

    let table_columns = state.cache.storage().table_columns(&table).await?;
    if table_columns.is_empty() {
        return Err(AppError::NotFound(format!("Table {} does not exist", table)));
    }

    let session = state.session.clone();
    let source = payload.source;
    let requested = payload.columns;
    let wanted = query.clone();

    let rows = state
        .cache
        .get_data(&query, || async move {
            // Sources may return more than the query selects; only matching
            // rows are stored
            let fetched = session
                .get_records(&source.alias, &source.params)
                .await?
                .retain(|r| wanted.matches_target(r));
            // Default projection keeps only fields the table declares, so
            // column defaults apply to the rest
            let columns = requested.unwrap_or_else(|| {
                table_columns
                    .into_iter()
                    .filter(|c| fetched.columns().contains(c))
                    .collect()
            });
            Ok(fetched.project(&columns))
        })
        .await?;

    Ok(Json(rows))
}

/// Delete the rows a query selects so the next populate refetches
pub async fn invalidate(
    State(state): State<AppState>,
    Json(payload): Json<CacheQueryRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let query = payload.to_query()?;
    let deleted = state.cache.invalidate(&query).await?;
    Ok(Json(serde_json::json!({
        "deleted": deleted
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// Most recent write-backs first
pub async fn population_history(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<HistoryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = params.limit.unwrap_or(50).min(1000);
    let history = state.cache.storage().list_population_history(limit).await?;
    Ok(Json(serde_json::json!({
        "history": history
    })))
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats().await)
}
