use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;

use super::{DataSource, FetchQuery, SourceError, Table};

const DEFAULT_ENDPOINT: &str = "/data";
const HEALTH_ENDPOINT: &str = "/health";

/// REST endpoint returning a JSON array of row objects.
pub struct RemoteApiSource {
    client: reqwest::Client,
    base_url: String,
    connected: AtomicBool,
}

impl RemoteApiSource {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        if !api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| SourceError::Connection(format!("invalid API key header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            connected: AtomicBool::new(false),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    async fn probe(&self) -> Result<(), SourceError> {
        let response = self.client.get(self.url(HEALTH_ENDPOINT)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                endpoint: HEALTH_ENDPOINT.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataSource for RemoteApiSource {
    #[tracing::instrument(name = "source.remote.connect", skip(self), fields(base_url = %self.base_url))]
    async fn connect(&self) -> bool {
        if self.connected.load(Ordering::Acquire) {
            return true;
        }

        match self.probe().await {
            Ok(()) => {
                self.connected.store(true, Ordering::Release);
                tracing::info!("Remote API reachable");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to API");
                false
            }
        }
    }

    #[tracing::instrument(
        name = "source.remote.fetch",
        skip(self, query),
        fields(endpoint, rows)
    )]
    async fn fetch(&self, query: Option<&FetchQuery>) -> Result<Table, SourceError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(SourceError::NotConnected);
        }

        let endpoint = query
            .and_then(|q| q.endpoint.as_deref())
            .unwrap_or(DEFAULT_ENDPOINT);
        let span = tracing::Span::current();
        span.record("endpoint", endpoint);

        let mut request = self.client.get(self.url(endpoint));
        if let Some(q) = query
            && !q.params.is_empty()
        {
            request = request.query(&q.params);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let table = Table::from_json(body)?;
        span.record("rows", table.len());

        Ok(table)
    }

    fn kind(&self) -> &str {
        "remote_api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn healthy_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_connect_probes_health_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let source = RemoteApiSource::new(&server.uri(), "").unwrap();
        assert!(source.connect().await);
        assert!(source.connect().await);
    }

    #[tokio::test]
    async fn test_connect_fails_on_unhealthy_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = RemoteApiSource::new(&server.uri(), "").unwrap();
        assert!(!source.connect().await);
    }

    #[tokio::test]
    async fn test_fetch_before_connect_is_an_error() {
        let source = RemoteApiSource::new("http://127.0.0.1:9", "").unwrap();
        let err = source.fetch(None).await.unwrap_err();
        assert!(matches!(err, SourceError::NotConnected));
    }

    #[tokio::test]
    async fn test_fetch_default_endpoint_with_bearer_token() {
        let server = healthy_server().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"region": "North", "revenue": 10.5, "quantity": 1}
            ])))
            .mount(&server)
            .await;

        let source = RemoteApiSource::new(&server.uri(), "secret").unwrap();
        assert!(source.connect().await);
        let table = source.fetch(None).await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0]["region"], "North");
    }

    #[tokio::test]
    async fn test_fetch_uses_query_endpoint_and_params() {
        let server = healthy_server().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .and(query_param("week", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let source = RemoteApiSource::new(&server.uri(), "").unwrap();
        source.connect().await;

        let mut query = FetchQuery {
            endpoint: Some("/orders".to_string()),
            ..FetchQuery::default()
        };
        query.params.insert("week".to_string(), "42".to_string());

        let table = source.fetch(Some(&query)).await.unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_propagates_http_errors() {
        let server = healthy_server().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = RemoteApiSource::new(&server.uri(), "").unwrap();
        source.connect().await;
        let err = source.fetch(None).await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_array_body() {
        let server = healthy_server().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": []})))
            .mount(&server)
            .await;

        let source = RemoteApiSource::new(&server.uri(), "").unwrap();
        source.connect().await;
        let err = source.fetch(None).await.unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }
}
