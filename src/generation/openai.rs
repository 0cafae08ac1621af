//! OpenAI-compatible chat completion backend.
//!
//! Talks to `POST {url}/v1/chat/completions`, which OpenAI, vLLM,
//! llama.cpp's server and LM Studio all expose. `OPENAI_API_KEY` is sent
//! as a bearer token when set; local servers usually ignore it.

use async_trait::async_trait;

use super::{strip_reasoning, GenerationParams, LanguageModel, Prompt};
use crate::config::GenerationConfig;
use crate::error::{Error, Result};

const GREEDY_SEED: u64 = 42;

pub struct OpenAICompatibleModel {
    model: String,
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAICompatibleModel {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.saturating_add(5)))
            .build()
            .map_err(|e| Error::model(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            client,
        })
    }

    fn request_body(&self, prompt: &Prompt, params: &GenerationParams) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.body() },
            ],
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "stream": false,
        });
        if params.is_greedy() {
            body["seed"] = serde_json::json!(GREEDY_SEED);
        }
        body
    }
}

#[async_trait]
impl LanguageModel for OpenAICompatibleModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt, params: &GenerationParams) -> Result<String> {
        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .json(&self.request_body(prompt, params));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::model(format!("chat completion error {}: {}", status, body_text)));
        }

        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(strip_reasoning)
        .ok_or_else(|| Error::model("invalid chat completion response: missing choices[0].message.content"))
}
