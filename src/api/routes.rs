use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{adapters, cache, credentials, AppState};

/// Create router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/adapters", get(adapters::list_adapters))
        .route("/api/adapters/{alias}", get(adapters::get_adapter))
        .route("/api/adapters/{alias}/data", post(adapters::get_data))
        .route(
            "/api/credentials/{alias}",
            put(credentials::set_credentials).delete(credentials::delete_credentials),
        )
        .route(
            "/api/proxy",
            get(credentials::get_proxy)
                .put(credentials::set_proxy)
                .delete(credentials::clear_proxy),
        )
        .route("/api/cache/tables", post(cache::create_table))
        .route("/api/cache/query", post(cache::query_cache))
        .route("/api/cache/populate", post(cache::populate))
        .route("/api/cache/invalidate", post(cache::invalidate))
        .route("/api/cache/history", get(cache::population_history))
        .route("/api/cache/stats", get(cache::cache_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::AppError;
    use crate::models::{Compatibility, Params, Record, ResolvedAccess};
    use crate::services::adapters::{DataAdapter, StaticAdapter};
    use crate::services::{ConnectorRegistry, DataSession, FetchOrCacheService};
    use crate::storage::SqliteStorage;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("records must be objects"),
        }
    }

    /// Static source that counts its fetches
    struct CountingAdapter {
        inner: StaticAdapter,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl DataAdapter for CountingAdapter {
        fn alias(&self) -> &str {
            self.inner.alias()
        }

        fn is_compatible(&self, params: &Params) -> Compatibility {
            self.inner.is_compatible(params)
        }

        async fn fetch(&self, params: &Params, access: &ResolvedAccess) -> Result<Vec<Record>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(params, access).await
        }
    }

    async fn test_app() -> (Router, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(ConnectorRegistry::new());
        registry
            .register(Arc::new(StaticAdapter::new(
                "MOCK",
                vec![record(json!({"mydata": "x", "number": 1}))],
            )))
            .await
            .unwrap();
        registry
            .register(Arc::new(CountingAdapter {
                inner: StaticAdapter::new(
                    "RISK_FEED",
                    vec![
                        record(json!({"cob_dt": "2019-01-14", "desk": "FX", "trader": "a"})),
                        record(json!({"cob_dt": "2019-01-14", "desk": "RATES", "trader": "b"})),
                        record(json!({"cob_dt": "2019-01-14", "desk": "CREDIT", "trader": "c"})),
                    ],
                ),
                calls: calls.clone(),
            }))
            .await
            .unwrap();
        registry
            .register(Arc::new(CountingAdapter {
                inner: StaticAdapter::new(
                    "MIXED_FEED",
                    vec![
                        record(json!({"cob_dt": "2019-01-14", "desk": "FX"})),
                        record(json!({"cob_dt": "2019-01-15", "desk": "RATES"})),
                        record(json!({"cob_dt": "2019-01-16", "desk": "CREDIT"})),
                    ],
                ),
                calls: calls.clone(),
            }))
            .await
            .unwrap();

        let session = Arc::new(DataSession::new(registry));
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let cache = Arc::new(FetchOrCacheService::new(storage));
        (create_router_with_state(AppState::new(session, cache)), calls)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_and_fetch() {
        let (app, _) = test_app().await;

        let (status, body) = send(&app, "GET", "/api/adapters", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["adapters"][0]["alias"], "MOCK");

        let (status, body) = send(&app, "POST", "/api/adapters/mock/data", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["format"], "records");
        assert_eq!(body["rows"][0]["mydata"], "x");

        let (status, body) = send(&app, "POST", "/api/adapters/mock/data", Some(json!({"as_table": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["format"], "table");
        assert_eq!(body["rows"][0], json!(["x", 1]));
    }

    #[tokio::test]
    async fn test_unknown_alias_is_404() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, "POST", "/api/adapters/UNKNOWN/data", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_credentials_and_proxy_setup() {
        let (app, _) = test_app().await;

        let (status, _) = send(
            &app,
            "PUT",
            "/api/credentials/mock",
            Some(json!({"secret": "pw", "identity": {"user": "reporter"}})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(
            &app,
            "PUT",
            "/api/proxy",
            Some(json!({"host": "proxy.local", "port": 3128, "user": "me", "pass": "secret"})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, "GET", "/api/proxy", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["proxy"]["host"], "proxy.local");
        assert!(body["proxy"].get("pass").is_none());

        let (status, _) = send(&app, "DELETE", "/api/credentials/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_populate_then_hit() {
        let (app, calls) = test_app().await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/cache/tables",
            Some(json!({
                "name": "risk",
                "columns": [
                    {"name": "cob_dt", "column_type": "text", "nullable": false},
                    {"name": "desk", "column_type": "text"}
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let populate = json!({
            "tables": ["risk"],
            "filters": [{"table": "risk", "column": "cob_dt", "op": "eq", "value": "2019-01-14"}],
            "source": {"alias": "risk_feed"}
        });

        let (status, first) = send(&app, "POST", "/api/cache/populate", Some(populate.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["columns"], json!(["cob_dt", "desk"]));
        assert_eq!(first["rows"].as_array().unwrap().len(), 3);

        let (_, second) = send(&app, "POST", "/api/cache/populate", Some(populate)).await;
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (status, body) = send(
            &app,
            "POST",
            "/api/cache/query",
            Some(json!({"tables": ["risk"], "limit": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"].as_array().unwrap().len(), 1);

        let (_, history) = send(&app, "GET", "/api/cache/history?limit=5", None).await;
        assert_eq!(history["history"][0]["row_count"], 3);

        let (_, stats) = send(&app, "GET", "/api/cache/stats", None).await;
        assert_eq!(stats["hits"], 1);
        assert_eq!(stats["misses"], 1);
    }

    #[tokio::test]
    async fn test_failed_source_is_502_and_store_untouched() {
        let (app, _) = test_app().await;
        send(
            &app,
            "POST",
            "/api/cache/tables",
            Some(json!({"name": "risk", "columns": [{"name": "cob_dt", "column_type": "text"}]})),
        )
        .await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/cache/populate",
            Some(json!({"tables": ["risk"], "source": {"alias": "UNKNOWN"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "DATA_UNAVAILABLE");

        let (_, rows) = send(&app, "POST", "/api/cache/query", Some(json!({"tables": ["risk"]}))).await;
        assert!(rows["rows"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_populate_stores_only_matching_rows() {
        let (app, calls) = test_app().await;
        send(
            &app,
            "POST",
            "/api/cache/tables",
            Some(json!({
                "name": "risk",
                "columns": [
                    {"name": "cob_dt", "column_type": "text", "nullable": false},
                    {"name": "desk", "column_type": "text"}
                ]
            })),
        )
        .await;

        let populate = |day: &str| {
            json!({
                "tables": ["risk"],
                "filters": [{"table": "risk", "column": "cob_dt", "op": "eq", "value": day}],
                "source": {"alias": "mixed_feed"}
            })
        };

        for _ in 0..3 {
            let (status, body) = send(&app, "POST", "/api/cache/populate", Some(populate("2019-01-15"))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["rows"], json!([{"cob_dt": "2019-01-15", "desk": "RATES"}]));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // No row for this day in the feed, so nothing is stored
        let (status, body) = send(&app, "POST", "/api/cache/populate", Some(populate("2019-01-17"))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["rows"].as_array().unwrap().is_empty());

        // Projecting away the filtered column leaves rows the query cannot select
        let mut narrowed = populate("2019-01-16");
        narrowed["columns"] = json!(["desk"]);
        let (status, body) = send(&app, "POST", "/api/cache/populate", Some(narrowed)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (_, stored) = send(&app, "POST", "/api/cache/query", Some(json!({"tables": ["risk"]}))).await;
        assert_eq!(stored["rows"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_multi_table_populate_is_rejected() {
        let (app, calls) = test_app().await;
        for name in ["risk", "desks"] {
            send(
                &app,
                "POST",
                "/api/cache/tables",
                Some(json!({"name": name, "columns": [{"name": "cob_dt", "column_type": "text"}]})),
            )
            .await;
        }

        let (status, body) = send(
            &app,
            "POST",
            "/api/cache/populate",
            Some(json!({
                "tables": ["risk", "desks"],
                "filters": [{"table": "risk", "column": "cob_dt", "op": "eq", "value": "2019-01-14"}],
                "source": {"alias": "risk_feed"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
