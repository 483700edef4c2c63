use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{ProxyConfig, SetCredentialRequest, SetProxyRequest};

/// Store (or replace) the credential for one alias
pub async fn set_credentials(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    Json(payload): Json<SetCredentialRequest>,
) -> Result<StatusCode, AppError> {
    if payload.secret.is_empty() {
        return Err(AppError::Validation("Secret cannot be empty".to_string()));
    }

    state
        .session
        .credentials()
        .set_credentials(&alias, payload.secret, payload.identity)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_credentials(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.session.credentials().remove_credentials(&alias).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("No credentials stored for {}", alias)))
    }
}

/// Replace the session's proxy configuration
pub async fn set_proxy(
    State(state): State<AppState>,
    Json(payload): Json<SetProxyRequest>,
) -> Result<StatusCode, AppError> {
    if payload.host.trim().is_empty() {
        return Err(AppError::Validation("Proxy host cannot be empty".to_string()));
    }
    if payload.port == 0 {
        return Err(AppError::Validation("Proxy port must be non-zero".to_string()));
    }

    let mut proxy = ProxyConfig::new(payload.host.trim(), payload.port);
    proxy.user = payload.user;
    proxy.pass = payload.pass;
    state.session.credentials().set_proxy(proxy).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Current proxy; the password is never serialized
pub async fn get_proxy(State(state): State<AppState>) -> Json<serde_json::Value> {
    let proxy = state.session.credentials().proxy().await;
    Json(serde_json::json!({
        "proxy": proxy
    }))
}

pub async fn clear_proxy(State(state): State<AppState>) -> StatusCode {
    state.session.credentials().clear_proxy().await;
    StatusCode::NO_CONTENT
}
