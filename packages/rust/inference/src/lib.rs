//! Inference and retrieval service clients.
//!
//! The pipeline only talks to these through the [`InferenceService`] and
//! [`RetrievalService`] traits, so tests can substitute scripted doubles.

mod openrouter;
mod search;

use async_trait::async_trait;
use pactlens_shared::Result;

pub use openrouter::OpenRouterClient;
pub use search::HttpSearchClient;

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("PactLens/", env!("CARGO_PKG_VERSION"));

/// Requested shape of an inference response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Structured JSON output, sampled at low temperature.
    Json,
    /// Free-form text.
    Text,
}

/// A text-generation backend.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Generate a response for `prompt`.
    ///
    /// An empty string is a valid return value; callers decide whether that
    /// is an error.
    async fn generate(&self, prompt: &str, format: ResponseFormat) -> Result<String>;
}

/// An external search backend.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    /// Run `query` and return the backend's raw payload.
    async fn search(&self, query: &str, limit: u32) -> Result<serde_json::Value>;
}
