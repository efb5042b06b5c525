//! Generic HTTP search client.
//!
//! Posts `{"query": ..., "max_results": ...}` to a configured endpoint and
//! hands back whatever the backend returns. Shape normalization happens in
//! the pipeline, not here.

use std::time::Duration;

use async_trait::async_trait;
use pactlens_shared::{PactLensError, Result, RetrievalConfig};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::{RetrievalService, USER_AGENT};

/// Search client for a JSON-over-HTTP endpoint.
#[derive(Clone)]
pub struct HttpSearchClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpSearchClient {
    pub fn new(endpoint: Url, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PactLensError::Retrieval(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    /// Build from the `[retrieval]` config section. Returns `None` when no
    /// endpoint is configured.
    pub fn from_config(config: &RetrievalConfig) -> Result<Option<Self>> {
        let Some(endpoint) = config.endpoint.clone() else {
            return Ok(None);
        };
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        Self::new(endpoint, api_key, config.timeout_secs).map(Some)
    }
}

#[async_trait]
impl RetrievalService for HttpSearchClient {
    #[instrument(skip_all, fields(endpoint = %self.endpoint, limit = limit))]
    async fn search(&self, query: &str, limit: u32) -> Result<serde_json::Value> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({"query": query, "max_results": limit}));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PactLensError::Retrieval(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PactLensError::Retrieval(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PactLensError::Retrieval(format!("failed to read body: {e}")))?;
        debug!(bytes = body.len(), "search response received");

        // Some backends answer with plain text; keep it as a string payload.
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpSearchClient {
        let endpoint = Url::parse(&format!("{}/search", server.uri())).unwrap();
        HttpSearchClient::new(endpoint, None, 5).unwrap()
    }

    #[tokio::test]
    async fn posts_query_and_returns_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_json(serde_json::json!({
                "query": "minimum wage California",
                "max_results": 5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"title": "CA Minimum Wage", "url": "https://example.gov/wage"}]
            })))
            .mount(&server)
            .await;

        let value = client_for(&server)
            .search("minimum wage California", 5)
            .await
            .unwrap();
        assert_eq!(value["results"][0]["title"], "CA Minimum Wage");
    }

    #[tokio::test]
    async fn plain_text_body_becomes_string_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("no structured data"))
            .mount(&server)
            .await;

        let value = client_for(&server).search("anything", 3).await.unwrap();
        assert_eq!(value, serde_json::Value::String("no structured data".into()));
    }

    #[tokio::test]
    async fn http_error_is_retrieval_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server).search("anything", 3).await.unwrap_err();
        assert!(matches!(err, PactLensError::Retrieval(_)));
    }

    #[test]
    fn no_endpoint_means_no_client() {
        let config = RetrievalConfig::default();
        assert!(HttpSearchClient::from_config(&config).unwrap().is_none());
    }
}
