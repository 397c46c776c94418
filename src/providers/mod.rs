//! Model provider backends.
//!
//! Each backend implements one of the capability traits from
//! `docflow_core` (or [`TextGenerator`](crate::generation::TextGenerator))
//! and is constructed by the [`ModelRegistry`](crate::registry::ModelRegistry)
//! from its `[models.<capability>]` table.
//!
//! | Module | Providers |
//! |--------|-----------|
//! | [`embedding`] | `openai`, `ollama`, `local` (fastembed) |
//! | [`hf`] | `hf-inference` summarization, sentiment, NER, QA |
//! | [`ollama`] | `ollama` text generation |
//!
//! # Retry Strategy
//!
//! All HTTP providers go through [`post_json`], which uses exponential
//! backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

pub mod embedding;
pub mod hf;
pub mod ollama;

use std::time::Duration;

use anyhow::{bail, Result};

use crate::config::ModelConfig;

/// Build an HTTP client honoring the model's timeout.
pub fn http_client(config: &ModelConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Read an API token from the environment variable named by `api_key_env`,
/// or `default_env` when unset. Returns `None` if the variable is empty.
pub fn api_token(config: &ModelConfig, default_env: &str) -> Option<String> {
    let var = config.api_key_env.as_deref().unwrap_or(default_env);
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// POST a JSON body and return the parsed JSON response, retrying
/// transient failures up to `max_retries` times.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    service: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(service, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        service,
                        status,
                        body_text
                    ));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "{} connection error ({}): {}",
                    service,
                    url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", service)))
}
