//! Application configuration for pagewise.
//!
//! User config lives at `~/.pagewise/pagewise.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PagewiseError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pagewise.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pagewise";

// ---------------------------------------------------------------------------
// Config structs (matching pagewise.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Generative model backend.
    #[serde(default)]
    pub model: ModelConfig,

    /// Embedding backend.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Broken-link probing.
    #[serde(default)]
    pub link_check: LinkCheckConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Number of nearest sections retrieved as context.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum sections analyzed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_concurrency() -> usize {
    4
}

/// `[model]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible chat-completions API.
    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_model_api_key_env")]
    pub api_key_env: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_model_id")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on generated tokens per reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Optional system message sent before every prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// Attempts per request, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            api_key_env: default_model_api_key_env(),
            model: default_model_id(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
            timeout_secs: default_model_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_model_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model_id() -> String {
    "google/gemini-2.0-flash-001".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_model_timeout() -> u64 {
    60
}
fn default_max_retries() -> usize {
    3
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible embeddings API.
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,

    /// Embedding model identifier. Must stay fixed between index build and query.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Optional output dimensionality (for models that support truncation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    /// Maximum texts per embeddings request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Attempts per request, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            api_key_env: default_embedding_api_key_env(),
            model: default_embedding_model(),
            dimensions: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout() -> u64 {
    30
}

/// `[link_check]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCheckConfig {
    /// Timeout for a single HEAD probe, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,

    /// Maximum probes in flight for one section.
    #[serde(default = "default_probe_concurrency")]
    pub concurrency: usize,

    /// Deadline for all probes of one section, in seconds.
    #[serde(default = "default_overall_timeout")]
    pub overall_timeout_secs: u64,

    /// Redirects followed before a probe is abandoned.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Probe links that resolve to loopback/private hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for LinkCheckConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout(),
            concurrency: default_probe_concurrency(),
            overall_timeout_secs: default_overall_timeout(),
            max_redirects: default_max_redirects(),
            allow_private_hosts: false,
        }
    }
}

fn default_probe_timeout() -> u64 {
    5
}
fn default_probe_concurrency() -> usize {
    8
}
fn default_overall_timeout() -> u64 {
    60
}
fn default_max_redirects() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pagewise/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PagewiseError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pagewise/pagewise.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| PagewiseError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| PagewiseError::config(format!("failed to parse {}: {e}", path.display())))?;

    if config.defaults.concurrency == 0 || config.link_check.concurrency == 0 {
        return Err(PagewiseError::config(format!(
            "{}: concurrency must be at least 1",
            path.display()
        )));
    }
    if config.embedding.batch_size == 0 {
        return Err(PagewiseError::config(format!(
            "{}: embedding.batch_size must be at least 1",
            path.display()
        )));
    }

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PagewiseError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PagewiseError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PagewiseError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the model and embedding API key env vars are set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    for var_name in [&config.model.api_key_env, &config.embedding.api_key_env] {
        match std::env::var(var_name) {
            Ok(val) if !val.trim().is_empty() => {}
            _ => {
                return Err(PagewiseError::config(format!(
                    "API key not found. Set the {var_name} environment variable."
                )));
            }
        }
    }
    Ok(())
}
