//! Ollama completion backend (`POST {url}/api/generate`, non-streaming).

use async_trait::async_trait;

use super::{strip_reasoning, GenerationParams, LanguageModel, Prompt};
use crate::config::GenerationConfig;
use crate::error::{Error, Result};

/// Fixed sampling seed used for greedy requests.
const GREEDY_SEED: u64 = 42;

pub struct OllamaModel {
    model: String,
    url: String,
    keep_alive: String,
    client: reqwest::Client,
}

impl OllamaModel {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        // The generator enforces the overall deadline; this only bounds a hung socket.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.saturating_add(5)))
            .build()
            .map_err(|e| Error::model(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            keep_alive: config.keep_alive.clone(),
            client,
        })
    }

    fn request_body(&self, prompt: &Prompt, params: &GenerationParams) -> serde_json::Value {
        let mut options = serde_json::json!({
            "temperature": params.temperature,
            "top_p": params.top_p,
            "top_k": 40,
            "num_predict": params.max_tokens,
        });
        if params.is_greedy() {
            options["seed"] = serde_json::json!(GREEDY_SEED);
        }
        serde_json::json!({
            "model": self.model,
            "prompt": prompt.render(),
            "stream": false,
            "keep_alive": self.keep_alive,
            "options": options,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt, params: &GenerationParams) -> Result<String> {
        let body = self.request_body(prompt, params);
        tracing::debug!(model = %self.model, url = %self.url, "ollama generate");

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::model(format!("Ollama API error {}: {}", status, body_text)));
        }

        let json: serde_json::Value = response.json().await?;
        parse_generate_response(&json)
    }
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        return Err(Error::model(format!("Ollama error: {}", err)));
    }
    json.get("response")
        .and_then(|r| r.as_str())
        .map(strip_reasoning)
        .ok_or_else(|| Error::model("invalid Ollama response: missing response field"))
}
