//! OpenAI-compatible adapter.
//!
//! Works with any endpoint following the OpenAI chat completions
//! contract (OpenAI, Ollama, vLLM, LM Studio, Together, ...).

use serde_json::Value;

use quarry_domain::config::ProviderConfig;
use quarry_domain::{Error, Result};

use crate::traits::{CompletionRequest, CompletionResponse, LlmProvider};

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn from_config(id: &str, cfg: &ProviderConfig) -> Result<Self> {
        if cfg.base_url.is_empty() {
            return Err(Error::Config(format!("provider '{id}': base_url is required")));
        }
        let api_key = match &cfg.api_key_env {
            Some(var) => std::env::var(var).ok(),
            None => None,
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            id: id.to_string(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: if cfg.model.is_empty() {
                "gpt-4o-mini".to_string()
            } else {
                cfg.model.clone()
            },
            client,
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": req.system },
                { "role": "user", "content": req.prompt },
            ],
        });
        if let Some(temperature) = req.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| Error::Provider {
            provider: self.id.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {status}: {detail}"),
            });
        }

        let payload: Value = response.json().await.map_err(|e| Error::Provider {
            provider: self.id.clone(),
            message: format!("invalid response body: {e}"),
        })?;

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let model = payload["model"].as_str().unwrap_or(&self.model).to_string();

        tracing::debug!(provider = %self.id, model = %model, chars = text.len(), "completion received");
        Ok(CompletionResponse { text, model })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
