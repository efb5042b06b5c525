//! OpenAI-compatible chat completions client (OpenRouter by default).

use std::time::Duration;

use async_trait::async_trait;
use pactlens_shared::{InferenceConfig, PactLensError, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{InferenceService, ResponseFormat, USER_AGENT};

/// Chat completions client.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    json_temperature: f64,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

impl OpenRouterClient {
    /// Build a client from the `[inference]` config section and an API key.
    pub fn new(config: &InferenceConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                PactLensError::InferenceTransport(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            json_temperature: config.json_temperature,
        })
    }

    /// Build a client, reading the API key from the env var named in config.
    pub fn from_config(config: &InferenceConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            PactLensError::config(format!(
                "inference API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;
        Self::new(config, api_key)
    }

    fn request_body(&self, prompt: &str, format: ResponseFormat) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": &self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if format == ResponseFormat::Json {
            body["response_format"] = serde_json::json!({"type": "json_object"});
            body["temperature"] = serde_json::json!(self.json_temperature);
        }
        body
    }
}

#[async_trait]
impl InferenceService for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.model, format = ?format, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str, format: ResponseFormat) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, format))
            .send()
            .await
            .map_err(|e| PactLensError::InferenceTransport(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PactLensError::InferenceTransport(format!(
                "HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ApiResponse = response.json().await.map_err(|e| {
            PactLensError::InferenceTransport(format!("failed to decode response: {e}"))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(response_chars = text.len(), "inference complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> InferenceConfig {
        InferenceConfig {
            base_url: format!("{}/api/v1/", server.uri()),
            ..InferenceConfig::default()
        }
    }

    #[tokio::test]
    async fn json_request_carries_format_and_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "response_format": {"type": "json_object"},
                "temperature": 0.2
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"score\": 80}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&config_for(&server), "sk-test").unwrap();
        let text = client.generate("analyze", ResponseFormat::Json).await.unwrap();
        assert_eq!(text, r#"{"score": 80}"#);
    }

    #[tokio::test]
    async fn text_request_omits_json_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "The notice period is 30 days."}}]
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&config_for(&server), "sk-test").unwrap();
        let body = client.request_body("hi", ResponseFormat::Text);
        assert!(body.get("response_format").is_none());

        let text = client.generate("hi", ResponseFormat::Text).await.unwrap();
        assert!(text.contains("30 days"));
    }

    #[tokio::test]
    async fn missing_content_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&config_for(&server), "sk-test").unwrap();
        let text = client.generate("hi", ResponseFormat::Json).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn http_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&config_for(&server), "sk-test").unwrap();
        let err = client.generate("hi", ResponseFormat::Json).await.unwrap_err();
        assert!(matches!(err, PactLensError::InferenceTransport(_)));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn missing_key_env_is_config_error() {
        let config = InferenceConfig {
            api_key_env: "PL_TEST_NO_SUCH_INFERENCE_KEY".into(),
            ..InferenceConfig::default()
        };
        let err = OpenRouterClient::from_config(&config).err().expect("error");
        assert!(err.to_string().contains("PL_TEST_NO_SUCH_INFERENCE_KEY"));
    }
}
