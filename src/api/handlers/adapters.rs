use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{AdapterInfo, DataOutput, GetDataRequest};
use crate::services::GetDataOptions;

/// List every registered adapter, active or not
pub async fn list_adapters(State(state): State<AppState>) -> Json<serde_json::Value> {
    let adapters = state.session.registry().list().await;
    Json(serde_json::json!({
        "adapters": adapters
    }))
}

pub async fn get_adapter(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<Json<AdapterInfo>, AppError> {
    state
        .session
        .registry()
        .info(&alias)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No adapter registered under alias {}", alias)))
}

/// Fetch data from one source through the session
pub async fn get_data(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    Json(payload): Json<GetDataRequest>,
) -> Result<Json<DataOutput>, AppError> {
    tracing::info!("Fetching data from {}", alias);

    let options = GetDataOptions {
        as_table: payload.as_table,
        use_proxy: payload.use_proxy,
        timeout: None,
    };
    let output = state.session.get_data(&alias, &payload.params, &options).await?;

    Ok(Json(output))
}
