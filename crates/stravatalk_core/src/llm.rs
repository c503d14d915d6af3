use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    // Optional override for OpenAI-compatible relays and local gateways
    pub base_url: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY is not set; see README for configuration")?;
        let model =
            std::env::var("STRAVATALK_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let base_url = std::env::var("STRAVATALK_LLM_BASE").ok();
        Ok(Self {
            api_key,
            model,
            base_url,
        })
    }
}

/// One JSON-mode exchange with a language model. Every agent goes through
/// this trait, so tests substitute a scripted exchange for the live client.
#[async_trait]
pub trait LlmExchange: Send + Sync {
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value>;
}

/// Live client against an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiExchange {
    client: reqwest::Client,
    cfg: LlmConfig,
}

impl OpenAiExchange {
    pub fn new(cfg: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cfg,
        }
    }
}

#[async_trait]
impl LlmExchange for OpenAiExchange {
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value> {
        let base = self
            .cfg
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".into());
        let url = format!("{}/v1/chat/completions", base.trim_end_matches('/'));

        // json_object response format keeps the model from wrapping its
        // answer in prose; extract_json below still tolerates fences.
        let body = serde_json::json!({
            "model": self.cfg.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "response_format": {"type": "json_object"}
        });

        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.cfg.api_key))
            .json(&body)
            .send()
            .await
            .with_context(|| "LLM request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            anyhow::bail!("LLM error ({status}): {txt}");
        }

        let v: Value = resp.json().await?;
        let content = v
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .context("LLM response carried no message content")?;
        extract_json(content)
    }
}

/// Parse a model reply as JSON, tolerating markdown fences and stray prose
/// around the object.
pub fn extract_json(raw: &str) -> Result<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(v);
    }
    // Models sometimes wrap JSON in fences or commentary; take the outermost object.
    let trimmed = raw.trim();
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(v);
            }
        }
    }
    let preview: String = raw.chars().take(200).collect();
    anyhow::bail!("Failed to parse model JSON (raw: {preview})")
}
