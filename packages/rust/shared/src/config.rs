//! Application configuration for PactLens.
//!
//! User config lives at `~/.pactlens/pactlens.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PactLensError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pactlens.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pactlens";

// ---------------------------------------------------------------------------
// Config structs (matching pactlens.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Inference service settings.
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Retrieval service settings. Retrieval is off unless an endpoint is set.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Text budgets for prompts and retrieval results.
    #[serde(default)]
    pub limits: Limits,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Database file. `~` is expanded to the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Caller identity used for local, single-user operation.
    #[serde(default = "default_caller")]
    pub caller: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            caller: default_caller(),
        }
    }
}

fn default_database_path() -> String {
    "~/.pactlens/pactlens.db".into()
}
fn default_caller() -> String {
    "local".into()
}

/// `[inference]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for every stage.
    #[serde(default = "default_model")]
    pub model: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout.
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature for JSON-mode calls.
    #[serde(default = "default_json_temperature")]
    pub json_temperature: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_inference_timeout(),
            json_temperature: default_json_temperature(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "google/gemini-2.5-flash".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_inference_timeout() -> u64 {
    120
}
fn default_json_temperature() -> f64 {
    0.2
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Search endpoint. When absent, conversational answers are never augmented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Url>,

    /// Name of the env var holding the search API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Results requested per search.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Request timeout.
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: default_search_key_env(),
            max_results: default_max_results(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

fn default_search_key_env() -> String {
    "PACTLENS_SEARCH_API_KEY".into()
}
fn default_max_results() -> u32 {
    5
}
fn default_retrieval_timeout() -> u64 {
    20
}

/// `[limits]` section: character budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Leading characters of the document given to classification.
    #[serde(default = "default_classify_chars")]
    pub classify_chars: usize,

    /// Leading characters of the document given to each chat turn.
    #[serde(default = "default_chat_chars")]
    pub chat_chars: usize,

    /// Leading characters of the document given to full analysis.
    #[serde(default = "default_analysis_chars")]
    pub analysis_chars: usize,

    /// Per-item content budget for normalized retrieval results.
    #[serde(default = "default_retrieval_item_chars")]
    pub retrieval_item_chars: usize,

    /// Budget for a raw string retrieval payload passed through verbatim.
    #[serde(default = "default_retrieval_passthrough_chars")]
    pub retrieval_passthrough_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            classify_chars: default_classify_chars(),
            chat_chars: default_chat_chars(),
            analysis_chars: default_analysis_chars(),
            retrieval_item_chars: default_retrieval_item_chars(),
            retrieval_passthrough_chars: default_retrieval_passthrough_chars(),
        }
    }
}

fn default_classify_chars() -> usize {
    30_000
}
fn default_chat_chars() -> usize {
    20_000
}
fn default_analysis_chars() -> usize {
    120_000
}
fn default_retrieval_item_chars() -> usize {
    500
}
fn default_retrieval_passthrough_chars() -> usize {
    2_000
}

impl Limits {
    /// Classification needs more signal than a chat turn.
    pub fn validate(&self) -> Result<()> {
        if self.classify_chars <= self.chat_chars {
            return Err(PactLensError::config(format!(
                "limits.classify_chars ({}) must be larger than limits.chat_chars ({})",
                self.classify_chars, self.chat_chars
            )));
        }
        if self.chat_chars == 0 || self.analysis_chars == 0 {
            return Err(PactLensError::config("character limits must be non-zero"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pactlens/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PactLensError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pactlens/pactlens.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PactLensError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PactLensError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.limits.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PactLensError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PactLensError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PactLensError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the inference API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.inference.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(PactLensError::config(format!(
            "inference API key not found. Set the {var_name} environment variable."
        ))),
    }
}

impl DefaultsConfig {
    /// Database path with a leading `~` expanded.
    pub fn resolved_database_path(&self) -> Result<PathBuf> {
        match self.database_path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir()
                    .ok_or_else(|| PactLensError::config("could not determine home directory"))?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.database_path)),
        }
    }
}
