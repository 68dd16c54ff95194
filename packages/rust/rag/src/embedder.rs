//! Embedding backends.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pagewise_shared::{EmbeddingConfig, PagewiseError, Result};

/// Turns texts into fixed-dimension vectors.
///
/// Implementations must be deterministic for a given [`model_id`](Self::model_id):
/// an index built with one model is only queryable with vectors from the same model.
pub trait Embedder: Send + Sync {
    /// Identifier of the embedding model (used to check build/query compatibility).
    fn model_id(&self) -> &str;

    /// Embed every text, returning one vector per input in input order.
    fn embed_batch(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;
}

// ---------------------------------------------------------------------------
// HttpEmbedder
// ---------------------------------------------------------------------------

/// Embeddings client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    batch_size: usize,
    max_retries: usize,
}

impl HttpEmbedder {
    /// Build a client from config, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            PagewiseError::config(format!(
                "embedding API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;
        Self::new(config, &api_key)
    }

    /// Build a client from config with an explicit API key.
    pub fn new(config: &EmbeddingConfig, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(PagewiseError::config("missing embedding API key"));
        }
        if config.model.trim().is_empty() {
            return Err(PagewiseError::config("missing embedding model name"));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| PagewiseError::config(format!("invalid embedding API key: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                PagewiseError::Network(format!("failed to build embedding HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries.max(1),
        })
    }

    /// Send one request (at most `batch_size` inputs), retrying transient failures.
    async fn request_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
                dimensions: self.dimensions,
            };

            match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                            PagewiseError::Embedding(format!(
                                "failed to parse embedding response: {e}"
                            ))
                        })?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != inputs.len() {
                            return Err(PagewiseError::Embedding(format!(
                                "backend returned {} embeddings for {} inputs",
                                parsed.data.len(),
                                inputs.len()
                            )));
                        }
                        return Ok(parsed.data.into_iter().map(|e| e.embedding).collect());
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "embedding request failed, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(PagewiseError::Embedding(format!(
                        "embeddings request failed ({status}): {}",
                        truncate(&body, 300)
                    )));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "embedding request error, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(PagewiseError::Embedding(format!(
                        "embeddings request failed: {err}"
                    )));
                }
            }
        }
    }
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            // The API rejects empty strings; a lone space embeds as "no content".
            let inputs: Vec<&str> = chunk
                .iter()
                .map(|t| if t.trim().is_empty() { " " } else { t.as_str() })
                .collect();
            debug!(batch = inputs.len(), model = %self.model, "requesting embeddings");
            vectors.extend(self.request_batch(&inputs).await?);
        }

        Ok(vectors)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body()
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
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
