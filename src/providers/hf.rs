//! Hugging Face inference-API client.
//!
//! One [`HfInferenceModel`] per configured capability. Requests go to
//! `POST <url>/models/<model>` with an `{"inputs": ...}` body; the token
//! (optional for local TGI-style servers) is read from `HF_API_TOKEN` or
//! the variable named by `api_key_env`.
//!
//! | Capability | `inputs` | Response |
//! |------------|----------|----------|
//! | summarization | text | `[{"summary_text": ..}]` |
//! | sentiment | text | `[[{"label", "score"}, ..]]` or `[{..}]` |
//! | entities | text | `[{"entity" or "entity_group", "score", "word"}]` |
//! | question answering | `{"question", "context"}` | `{"answer", "score", ..}` |

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;

use docflow_core::analysis::{EntityRecognizer, SentimentClassifier, SentimentLabel, Summarizer};
use docflow_core::analysis::TokenEntity;
use docflow_core::retrieval::{ModelAnswer, QuestionAnswerer};

use super::{api_token, http_client, post_json};
use crate::config::ModelConfig;

const DEFAULT_HF_URL: &str = "https://api-inference.huggingface.co";

pub struct HfInferenceModel {
    model: String,
    endpoint: String,
    token: Option<String>,
    max_retries: u32,
    client: reqwest::Client,
}

impl HfInferenceModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model name required for hf-inference provider"))?;
        let base = config.url.as_deref().unwrap_or(DEFAULT_HF_URL);
        Ok(Self {
            endpoint: format!("{}/models/{}", base.trim_end_matches('/'), model),
            model,
            token: api_token(config, "HF_API_TOKEN"),
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }

    async fn infer(&self, inputs: serde_json::Value) -> Result<serde_json::Value> {
        let body = serde_json::json!({ "inputs": inputs });
        post_json(
            &self.client,
            &self.endpoint,
            self.token.as_deref(),
            &body,
            self.max_retries,
            "Hugging Face",
        )
        .await
    }
}

#[derive(Deserialize)]
struct SummaryItem {
    summary_text: String,
}

#[derive(Deserialize, Clone)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Deserialize)]
struct NerItem {
    #[serde(alias = "entity_group")]
    entity: String,
    score: f64,
    word: String,
}

#[derive(Deserialize)]
struct QaAnswer {
    answer: String,
    score: f64,
}

fn parse_summary(json: serde_json::Value) -> Result<String> {
    let items: Vec<SummaryItem> = serde_json::from_value(json)
        .map_err(|e| anyhow::anyhow!("Invalid summarization response: {}", e))?;
    Ok(items
        .into_iter()
        .map(|i| i.summary_text)
        .collect::<Vec<_>>()
        .join(" "))
}

/// Highest-scoring label from either the nested or the flat response shape.
fn parse_sentiment(json: serde_json::Value) -> Result<SentimentLabel> {
    let labels: Vec<LabelScore> = match serde_json::from_value::<Vec<Vec<LabelScore>>>(json.clone()) {
        Ok(nested) => nested.into_iter().flatten().collect(),
        Err(_) => serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("Invalid sentiment response: {}", e))?,
    };
    let best = labels
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score));
    match best {
        Some(l) => Ok(SentimentLabel {
            label: l.label,
            score: l.score,
        }),
        None => bail!("Invalid sentiment response: no labels"),
    }
}

fn parse_entities(json: serde_json::Value) -> Result<Vec<TokenEntity>> {
    let items: Vec<NerItem> = serde_json::from_value(json)
        .map_err(|e| anyhow::anyhow!("Invalid token-classification response: {}", e))?;
    Ok(items
        .into_iter()
        .map(|i| TokenEntity {
            word: i.word,
            label: i.entity,
            score: i.score,
        })
        .collect())
}

#[async_trait]
impl Summarizer for HfInferenceModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, text: &str) -> Result<String> {
        parse_summary(self.infer(serde_json::json!(text)).await?)
    }
}

#[async_trait]
impl SentimentClassifier for HfInferenceModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn classify(&self, text: &str) -> Result<SentimentLabel> {
        parse_sentiment(self.infer(serde_json::json!(text)).await?)
    }
}

#[async_trait]
impl EntityRecognizer for HfInferenceModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn recognize(&self, text: &str) -> Result<Vec<TokenEntity>> {
        parse_entities(self.infer(serde_json::json!(text)).await?)
    }
}

#[async_trait]
impl QuestionAnswerer for HfInferenceModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn answer(&self, question: &str, context: &str) -> Result<ModelAnswer> {
        let json = self
            .infer(serde_json::json!({ "question": question, "context": context }))
            .await?;
        let answer: QaAnswer = serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("Invalid question-answering response: {}", e))?;
        Ok(ModelAnswer {
            answer: answer.answer,
            score: answer.score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_nested_and_flat_shapes() {
        let nested = serde_json::json!([[
            { "label": "NEGATIVE", "score": 0.1 },
            { "label": "POSITIVE", "score": 0.9 }
        ]]);
        let label = parse_sentiment(nested).unwrap();
        assert_eq!(label.label, "POSITIVE");
        assert!((label.signed() - 0.9).abs() < 1e-9);

        let flat = serde_json::json!([{ "label": "NEGATIVE", "score": 0.75 }]);
        assert!((parse_sentiment(flat).unwrap().signed() + 0.75).abs() < 1e-9);

        assert!(parse_sentiment(serde_json::json!([])).is_err());
    }

    #[test]
    fn test_entities_accept_entity_group() {
        let json = serde_json::json!([
            { "entity": "B-PER", "score": 0.99, "word": "Ada" },
            { "entity_group": "ORG", "score": 0.8, "word": "Acme" }
        ]);
        let tokens = parse_entities(json).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].label, "ORG");
    }

    #[test]
    fn test_summary_joins_items() {
        let json = serde_json::json!([{ "summary_text": "One." }, { "summary_text": "Two." }]);
        assert_eq!(parse_summary(json).unwrap(), "One. Two.");
    }

    #[test]
    fn test_endpoint_uses_model_path() {
        let mut config = ModelConfig::with_provider("hf-inference");
        config.model = Some("facebook/bart-large-cnn".to_string());
        config.url = Some("http://localhost:8080/".to_string());
        let model = HfInferenceModel::new(&config).unwrap();
        assert_eq!(
            model.endpoint,
            "http://localhost:8080/models/facebook/bart-large-cnn"
        );
    }
}
