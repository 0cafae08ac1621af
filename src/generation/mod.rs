//! Answer generation: prompt assembly and language-model backends.
//!
//! [`ResponseGenerator`] turns a question, the retrieved chunks and the
//! session history into a [`Prompt`], calls the configured
//! [`LanguageModel`] under a timeout, and returns an [`Answer`] citing
//! every retrieved chunk.
//!
//! # Backends
//!
//! | `generation.provider` | Backend |
//! |-----------------------|---------|
//! | `"ollama"` | [`OllamaModel`], `POST /api/generate` |
//! | `"openai"` | [`OpenAICompatibleModel`], `POST /v1/chat/completions` |
//! | `"extractive"` | [`ExtractiveModel`], in-process sentence selection |
//!
//! # Failure handling
//!
//! - A call exceeding `generation.timeout_secs` is abandoned and reported
//!   as [`Error::ModelUnavailable`].
//! - A connection failure is retried once before giving up.
//! - An empty completion is an [`Error::Model`], never an empty answer.

mod extractive;
mod ollama;
mod openai;

pub use extractive::ExtractiveModel;
pub use ollama::OllamaModel;
pub use openai::OpenAICompatibleModel;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::history::ConversationHistory;
use crate::models::{Answer, Citation, ConversationTurn, RetrievalResult, Role};

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    /// `0.0` means greedy decoding.
    pub temperature: f32,
    pub top_p: f32,
}

impl GenerationParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::config("max_tokens must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::config("temperature must be in [0.0, 2.0]"));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(Error::config("top_p must be in (0.0, 1.0]"));
        }
        Ok(())
    }

    pub fn is_greedy(&self) -> bool {
        self.temperature == 0.0
    }

    pub fn with_overrides(mut self, overrides: &GenerationOverrides) -> Self {
        if let Some(t) = overrides.temperature {
            self.temperature = t;
        }
        if let Some(m) = overrides.max_tokens {
            self.max_tokens = m;
        }
        if let Some(p) = overrides.top_p {
            self.top_p = p;
        }
        self
    }
}

/// Per-request replacements for the configured sampling parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationOverrides {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

impl GenerationConfig {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

// ============ Prompt ============

/// One retrieved chunk as it appears in the prompt.
#[derive(Debug, Clone)]
pub struct Passage {
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub passages: Vec<Passage>,
    pub history: Vec<ConversationTurn>,
    pub question: String,
}

impl Prompt {
    pub fn new(
        system: &str,
        question: &str,
        retrieved: &[RetrievalResult],
        history: Option<&ConversationHistory>,
    ) -> Self {
        Self {
            system: system.to_string(),
            passages: retrieved
                .iter()
                .map(|r| Passage {
                    source: r.chunk.source.clone(),
                    text: r.chunk.text.clone(),
                })
                .collect(),
            history: history
                .map(|h| h.turns().cloned().collect())
                .unwrap_or_default(),
            question: question.trim().to_string(),
        }
    }

    /// Everything after the instructions: context, history, question.
    pub fn body(&self) -> String {
        let mut out = String::from("Context:\n");
        if self.passages.is_empty() {
            out.push_str("(no relevant documents found)\n");
        }
        for (i, p) in self.passages.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("[{}] (source: {})\n{}\n", i + 1, p.source, p.text.trim()));
        }

        if !self.history.is_empty() {
            out.push_str("\nConversation history:\n");
            for turn in &self.history {
                let speaker = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                out.push_str(&format!("{}: {}\n", speaker, turn.text.trim()));
            }
        }

        out.push_str(&format!("\nQuestion: {}\nAnswer:", self.question));
        out
    }

    /// Single-string form for completion-style backends.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.system.trim(), self.body())
    }
}

// ============ Backend trait ============

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &Prompt, params: &GenerationParams) -> Result<String>;
}

/// Create the configured [`LanguageModel`].
pub fn create_language_model(config: &GenerationConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaModel::new(config)?)),
        "openai" => Ok(Arc::new(OpenAICompatibleModel::new(config)?)),
        "extractive" => Ok(Arc::new(ExtractiveModel::new())),
        other => Err(Error::config(format!("unknown generation provider: {}", other))),
    }
}

/// Drop `<think>...</think>` reasoning blocks some chat models emit.
pub(crate) fn strip_reasoning(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

// ============ Generator ============

pub struct ResponseGenerator {
    model: Arc<dyn LanguageModel>,
    system_prompt: String,
    timeout: Duration,
}

impl ResponseGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, system_prompt: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            timeout,
        }
    }

    pub fn from_config(model: Arc<dyn LanguageModel>, config: &GenerationConfig) -> Self {
        Self::new(
            model,
            config.system_prompt.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Answer `query` from `retrieved`, optionally conditioned on `history`.
    ///
    /// Citations list every retrieved chunk in rank order.
    pub async fn generate(
        &self,
        query: &str,
        retrieved: &[RetrievalResult],
        history: Option<&ConversationHistory>,
        params: &GenerationParams,
    ) -> Result<Answer> {
        params.validate()?;
        let prompt = Prompt::new(&self.system_prompt, query, retrieved, history);

        let text = self.complete_with_retry(&prompt, params).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::model(format!(
                "{} returned an empty completion",
                self.model.name()
            )));
        }

        Ok(Answer {
            text: text.to_string(),
            citations: retrieved.iter().map(Citation::from).collect(),
        })
    }

    async fn complete_with_retry(&self, prompt: &Prompt, params: &GenerationParams) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let call = self.model.complete(prompt, params);
            match tokio::time::timeout(self.timeout, call).await {
                Err(_) => {
                    return Err(Error::unavailable(format!(
                        "{} did not respond within {}s",
                        self.model.name(),
                        self.timeout.as_secs()
                    )))
                }
                Ok(Err(Error::ModelUnavailable(msg))) if attempt == 1 => {
                    tracing::warn!(model = self.model.name(), error = %msg, "model unreachable, retrying once");
                }
                Ok(result) => return result,
            }
        }
    }
}
