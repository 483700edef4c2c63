use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::middleware::AppError;
use crate::models::{DataOutput, Params, RecordSet};
use crate::services::credentials::CredentialStore;
use crate::services::registry::{normalize_alias, ConnectorRegistry};

/// Per-call options for `get_data`
#[derive(Debug, Clone, Default)]
pub struct GetDataOptions {
    /// Return a `TableView` instead of a `RecordSet`
    pub as_table: bool,
    /// `Some(true)` forces the proxy on, `Some(false)` opts out of it
    pub use_proxy: Option<bool>,
    /// Overrides the session's default deadline
    pub timeout: Option<Duration>,
}

impl GetDataOptions {
    pub fn as_table() -> Self {
        Self {
            as_table: true,
            ..Self::default()
        }
    }
}

/// One entry of a multi-source fetch
#[derive(Debug, Clone)]
pub struct DataRequest {
    pub alias: String,
    pub params: Params,
    pub options: GetDataOptions,
}

impl DataRequest {
    pub fn new(alias: impl Into<String>, params: Params) -> Self {
        Self {
            alias: alias.into(),
            params,
            options: GetDataOptions::default(),
        }
    }
}

/// Context object for data access: the adapter registry plus this session's
/// own credentials and proxy. Nothing here is process-global.
pub struct DataSession {
    registry: Arc<ConnectorRegistry>,
    credentials: CredentialStore,
    default_timeout: Duration,
    max_concurrency: usize,
}

impl DataSession {
    pub fn new(registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            registry,
            credentials: CredentialStore::new(),
            default_timeout: Duration::from_secs(30),
            max_concurrency: num_cpus::get(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.registry
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Resolve `alias`, check compatibility, inject credentials and proxy,
    /// fetch under a deadline and normalize the result.
    ///
    /// All-or-error: a failed call never yields partial records.
    pub async fn get_data(
        &self,
        alias: &str,
        params: &Params,
        options: &GetDataOptions,
    ) -> Result<DataOutput, AppError> {
        let adapter = self.registry.resolve(alias).await?;

        let compatibility = adapter.is_compatible(params);
        if !compatibility.ok {
            let alias = normalize_alias(alias);
            tracing::warn!("Source {} is incompatible: {}", alias, compatibility.message);
            return Err(AppError::IncompatibleSource {
                alias,
                message: compatibility.message,
            });
        }

        let access = self
            .credentials
            .resolve_for_fetch(alias, adapter.needs_proxy(), options.use_proxy)
            .await;
        let timeout = options.timeout.unwrap_or(self.default_timeout);

        let start_time = Instant::now();
        let raw = tokio::time::timeout(timeout, adapter.fetch(params, &access))
            .await
            .map_err(|_| {
                tracing::warn!("Fetch from {} timed out after {:?}", alias, timeout);
                AppError::Timeout(format!("Fetch from {} did not complete within {:?}", alias, timeout))
            })??;

        let records = RecordSet::normalize(raw);
        tracing::info!(
            "Fetched {} rows ({} columns) from {} in {} ms",
            records.len(),
            records.columns().len(),
            alias,
            start_time.elapsed().as_millis()
        );

        Ok(if options.as_table {
            DataOutput::Table(records.into_table())
        } else {
            DataOutput::Records(records)
        })
    }

    /// `get_data` with default options, returning records
    pub async fn get_records(&self, alias: &str, params: &Params) -> Result<RecordSet, AppError> {
        self.get_data(alias, params, &GetDataOptions::default())
            .await
            .map(DataOutput::into_record_set)
    }

    /// Fetch several sources concurrently, bounded by the session's
    /// concurrency limit. Results come back in request order, one per
    /// request; a failing source does not affect the others.
    pub async fn get_many(&self, requests: Vec<DataRequest>) -> Vec<Result<DataOutput, AppError>> {
        let mut results: Vec<(usize, Result<DataOutput, AppError>)> = stream::iter(requests.into_iter().enumerate())
            .map(|(idx, request)| async move {
                let result = self.get_data(&request.alias, &request.params, &request.options).await;
                if let Err(e) = &result {
                    tracing::warn!("Source {} failed: {}", request.alias, e);
                }
                (idx, result)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, result)| result).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Compatibility, Record, ResolvedAccess};
    use crate::services::adapters::{DataAdapter, StaticAdapter};
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("records must be objects"),
        }
    }

    /// Captures the access it was handed and echoes records back
    struct RecordingAdapter {
        alias: String,
        needs_proxy: bool,
        seen: Mutex<Vec<ResolvedAccess>>,
    }

    impl RecordingAdapter {
        fn new(alias: &str, needs_proxy: bool) -> Self {
            Self {
                alias: alias.to_string(),
                needs_proxy,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl DataAdapter for RecordingAdapter {
        fn alias(&self) -> &str {
            &self.alias
        }

        fn needs_proxy(&self) -> bool {
            self.needs_proxy
        }

        fn is_compatible(&self, params: &Params) -> Compatibility {
            if params.contains_key("unsupported") {
                Compatibility::incompatible("parameter 'unsupported' is not supported")
            } else {
                Compatibility::compatible()
            }
        }

        async fn fetch(&self, _params: &Params, access: &ResolvedAccess) -> Result<Vec<Record>, AppError> {
            self.seen.lock().unwrap().push(access.clone());
            Ok(vec![record(json!({"a": 1, "b": 2})), record(json!({"a": 3}))])
        }
    }

    struct FailingAdapter;

    #[async_trait::async_trait]
    impl DataAdapter for FailingAdapter {
        fn alias(&self) -> &str {
            "FAILING"
        }

        fn is_compatible(&self, _params: &Params) -> Compatibility {
            Compatibility::compatible()
        }

        async fn fetch(&self, _params: &Params, _access: &ResolvedAccess) -> Result<Vec<Record>, AppError> {
            Err(AppError::Fetch("connection reset by peer".to_string()))
        }
    }

    struct SlowAdapter;

    #[async_trait::async_trait]
    impl DataAdapter for SlowAdapter {
        fn alias(&self) -> &str {
            "SLOW"
        }

        fn is_compatible(&self, _params: &Params) -> Compatibility {
            Compatibility::compatible()
        }

        async fn fetch(&self, _params: &Params, _access: &ResolvedAccess) -> Result<Vec<Record>, AppError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }
    }

    async fn session_with(adapters: Vec<Arc<dyn DataAdapter>>) -> DataSession {
        let registry = Arc::new(ConnectorRegistry::new());
        for adapter in adapters {
            registry.register(adapter).await.unwrap();
        }
        DataSession::new(registry)
    }

    #[tokio::test]
    async fn test_mock_scenario() {
        let mock = StaticAdapter::new("MOCK", vec![record(json!({"mydata": "x", "number": 1}))]);
        let session = session_with(vec![Arc::new(mock)]).await;

        let records = session.get_records("MOCK", &Params::new()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.rows()[0], record(json!({"mydata": "x", "number": 1})));
    }

    #[tokio::test]
    async fn test_unknown_alias() {
        let session = session_with(vec![]).await;
        let err = session.get_records("UNKNOWN", &Params::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_normalizes_output() {
        let adapter = Arc::new(RecordingAdapter::new("REC", false));
        let session = session_with(vec![adapter]).await;

        let records = session.get_records("REC", &Params::new()).await.unwrap();
        assert_eq!(records.columns(), &["a", "b"]);
        assert_eq!(records.rows()[1], record(json!({"a": 3, "b": null})));
    }

    #[tokio::test]
    async fn test_as_table_same_data() {
        let adapter = Arc::new(RecordingAdapter::new("REC", false));
        let session = session_with(vec![adapter]).await;

        let records = session.get_data("REC", &Params::new(), &GetDataOptions::default()).await.unwrap();
        let table = session.get_data("REC", &Params::new(), &GetDataOptions::as_table()).await.unwrap();

        assert!(matches!(table, DataOutput::Table(_)));
        assert_eq!(table.into_record_set(), records.into_record_set());
    }

    #[tokio::test]
    async fn test_incompatible_params_skip_fetch() {
        let adapter = Arc::new(RecordingAdapter::new("REC", false));
        let session = session_with(vec![adapter.clone()]).await;

        let params: Params = serde_json::from_value(json!({"unsupported": true})).unwrap();
        let err = session.get_records(" rec", &params).await.unwrap_err();
        match err {
            AppError::IncompatibleSource { alias, message } => {
                assert_eq!(alias, "REC");
                assert!(message.contains("unsupported"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(adapter.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credentials_and_proxy_injected() {
        let plain = Arc::new(RecordingAdapter::new("PLAIN", false));
        let proxied = Arc::new(RecordingAdapter::new("WEB", true));
        let session = session_with(vec![plain.clone(), proxied.clone()]).await;

        let mut identity = BTreeMap::new();
        identity.insert("user".to_string(), "reporter".to_string());
        session.credentials().set_credentials("WEB", "pw", identity).await.unwrap();
        session
            .credentials()
            .set_proxy(crate::models::ProxyConfig::new("proxy.local", 3128))
            .await;

        session.get_records("PLAIN", &Params::new()).await.unwrap();
        session.get_records("WEB", &Params::new()).await.unwrap();
        let opt_out = GetDataOptions {
            use_proxy: Some(false),
            ..GetDataOptions::default()
        };
        session.get_data("WEB", &Params::new(), &opt_out).await.unwrap();

        let plain_seen = plain.seen.lock().unwrap();
        assert!(plain_seen[0].credential.is_none());
        assert!(plain_seen[0].proxy.is_none());

        let web_seen = proxied.seen.lock().unwrap();
        assert_eq!(web_seen[0].credential.as_ref().unwrap().secret, "pw");
        assert!(web_seen[0].proxy.is_some());
        assert!(web_seen[1].proxy.is_none());
    }

    #[tokio::test]
    async fn test_fetch_errors_propagate() {
        let session = session_with(vec![Arc::new(FailingAdapter)]).await;
        let err = session.get_records("FAILING", &Params::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_deadline_cancels_fetch() {
        let session = session_with(vec![Arc::new(SlowAdapter)])
            .await
            .with_timeout(Duration::from_millis(50));
        let err = session.get_records("SLOW", &Params::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_get_many_isolates_failures() {
        let mock = StaticAdapter::new("MOCK", vec![record(json!({"n": 1}))]);
        let session = session_with(vec![Arc::new(mock), Arc::new(FailingAdapter)])
            .await
            .with_max_concurrency(2);

        let results = session
            .get_many(vec![
                DataRequest::new("FAILING", Params::new()),
                DataRequest::new("MOCK", Params::new()),
                DataRequest::new("UNKNOWN", Params::new()),
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Err(AppError::Fetch(_))));
        assert_eq!(results[1].as_ref().unwrap().len(), 1);
        assert!(matches!(results[2], Err(AppError::NotFound(_))));
    }
}
