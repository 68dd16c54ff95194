//! Generative text backends.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use pagewise_shared::{ModelConfig, PagewiseError, Result};

/// Sends a prompt to a generative model and returns its raw reply.
pub trait CompletionModel: Send + Sync {
    /// Identifier of the model, recorded in reports.
    fn model_id(&self) -> &str;

    /// Complete `prompt`. The reply is trimmed of surrounding whitespace.
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (OpenRouter by default).
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: Option<String>,
    max_retries: usize,
}

impl ChatCompletionClient {
    /// Build a client from config, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            PagewiseError::config(format!(
                "model API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;
        Self::new(config, &api_key)
    }

    /// Build a client from config with an explicit API key.
    pub fn new(config: &ModelConfig, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(PagewiseError::config("missing model API key"));
        }
        if config.model.trim().is_empty() {
            return Err(PagewiseError::config("missing model name"));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| PagewiseError::config(format!("invalid model API key: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| PagewiseError::Network(format!("failed to build model HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
            max_retries: config.max_retries.max(1),
        })
    }

    fn messages<'a>(&'a self, prompt: &'a str) -> Vec<ChatMessage<'a>> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        messages
    }
}

impl CompletionModel for ChatCompletionClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: self.messages(prompt),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut attempt = 0usize;
        loop {
            match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: ChatResponse = resp.json().await.map_err(|e| {
                            PagewiseError::Model(format!("failed to parse model response: {e}"))
                        })?;
                        let reply = parsed
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|choice| choice.message.content)
                            .ok_or_else(|| {
                                PagewiseError::Model("model returned no choices".into())
                            })?;
                        debug!(reply_len = reply.len(), "model replied");
                        return Ok(reply.trim().to_string());
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "model request failed, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(PagewiseError::Model(format!(
                        "completion request failed ({status}): {}",
                        truncate(&body, 300)
                    )));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "model request error, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(PagewiseError::Model(format!(
                        "completion request failed: {err}"
                    )));
                }
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}
