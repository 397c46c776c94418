//! Text generation through a local Ollama server (`POST /api/generate`).

use anyhow::Result;
use async_trait::async_trait;

use super::{http_client, post_json};
use crate::config::ModelConfig;
use crate::generation::{SamplingParams, TextGenerator};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub struct OllamaGenerator {
    model: String,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("models.generation.model required for Ollama provider"))?;
        let url = config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }

    fn request_body(&self, prompt: &str, params: &SamplingParams) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": params.max_tokens,
                "temperature": params.temperature,
                "top_k": params.top_k,
                "top_p": params.top_p,
                "repeat_penalty": params.repeat_penalty,
            }
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let endpoint = format!("{}/api/generate", self.url);
        let body = self.request_body(prompt, params);
        let json = post_json(&self.client, &endpoint, None, &body, self.max_retries, "Ollama").await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_carries_sampling_options() {
        let mut config = ModelConfig::with_provider("ollama");
        config.model = Some("llama3".to_string());
        let generator = OllamaGenerator::new(&config).unwrap();
        let params = SamplingParams {
            max_tokens: 128,
            temperature: 0.5,
            top_k: 20,
            top_p: 0.9,
            repeat_penalty: 1.1,
        };
        let body = generator.request_body("Write a memo", &params);
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 128);
        assert_eq!(body["options"]["top_k"], 20);
        assert_eq!(body["prompt"], "Write a memo");
    }
}
