//! TOML configuration with environment overrides.
//!
//! Configuration is resolved in three layers, later layers winning:
//!
//! 1. Built-in defaults (every section and key is optional).
//! 2. The TOML file passed via `--config`.
//! 3. `DOCQA_*` environment variables (a `.env` file in the working
//!    directory is loaded first by the binary).
//!
//! The merged result is validated once by [`Config::validate`]; every
//! failure is an [`Error::Configuration`].
//!
//! # Example
//!
//! ```toml
//! [documents]
//! path = "./data/documents"
//!
//! [chunking]
//! chunk_size = 800
//! overlap = 100
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [generation]
//! provider = "ollama"
//! model = "qwen3:8b"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Prefix for every environment override.
pub const ENV_PREFIX: &str = "DOCQA_";

pub const DEFAULT_SYSTEM_PROMPT: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            device: default_device(),
            documents: DocumentsConfig::default(),
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            conversation: ConversationConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

fn default_device() -> String {
    "cpu".to_string()
}

// ============ [documents] ============

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_path")]
    pub path: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Collapse whitespace runs before chunking.
    #[serde(default)]
    pub normalize_whitespace: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            path: default_documents_path(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            normalize_whitespace: false,
        }
    }
}

fn default_documents_path() -> PathBuf {
    PathBuf::from("./data/documents")
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
    ]
}

// ============ [index] ============

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/vector_store")
}

// ============ [chunking] ============

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_overlap() -> usize {
    100
}

// ============ [embedding] ============

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

// ============ [generation] ============

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_generation_timeout_secs(),
            keep_alive: default_keep_alive(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_generation_provider() -> String {
    "ollama".to_string()
}
fn default_generation_model() -> String {
    "qwen3:8b".to_string()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.3
}
fn default_top_p() -> f32 {
    0.9
}
fn default_generation_timeout_secs() -> u64 {
    120
}
fn default_keep_alive() -> String {
    "5m".to_string()
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

// ============ [retrieval] / [conversation] / [server] ============

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    #[serde(default = "default_true")]
    pub use_history: bool,
    /// Turns kept per session; a question and its answer are two turns.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            use_history: true,
            max_turns: default_max_turns(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_turns() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Most conversations kept in memory; the least recently used is dropped.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    7860
}
fn default_max_sessions() -> usize {
    1000
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============ Loading ============

/// Read, override and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    let mut config = Config::from_toml_str(&content)?;
    config.apply_env_overrides(std::env::vars())?;
    config.validate()?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the built-in defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        return load_config(path);
    }
    tracing::debug!(path = %path.display(), "config file not found, using defaults");
    let mut config = Config::default();
    config.apply_env_overrides(std::env::vars())?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Parse TOML without applying environment overrides or validating.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse config file: {}", e)))
    }

    /// Apply `DOCQA_*` overrides from an iterator of `(key, value)` pairs.
    ///
    /// Unknown `DOCQA_` keys are ignored; unparseable values are errors.
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "MODEL_PROVIDER" => self.generation.provider = value,
                "MODEL_NAME" => self.generation.model = value,
                "MODEL_URL" => self.generation.url = Some(value),
                "EMBEDDING_PROVIDER" => self.embedding.provider = value,
                "EMBEDDING_MODEL" => self.embedding.model = Some(value),
                "CHUNK_SIZE" => self.chunking.chunk_size = parse_env(&key, &value)?,
                "CHUNK_OVERLAP" => self.chunking.overlap = parse_env(&key, &value)?,
                "RETRIEVAL_K" => self.retrieval.k = parse_env(&key, &value)?,
                "MAX_NEW_TOKENS" => self.generation.max_tokens = parse_env(&key, &value)?,
                "TEMPERATURE" => self.generation.temperature = parse_env(&key, &value)?,
                "TOP_P" => self.generation.top_p = parse_env(&key, &value)?,
                "DEVICE" => self.device = value,
                "HOST" => self.server.host = value,
                "PORT" => self.server.port = parse_env(&key, &value)?,
                "MAX_SESSIONS" => self.server.max_sessions = parse_env(&key, &value)?,
                "DEBUG" => self.debug = parse_bool(&key, &value)?,
                "DOCUMENTS_PATH" => self.documents.path = PathBuf::from(value),
                "VECTOR_STORE_PATH" => self.index.path = PathBuf::from(value),
                "USE_HISTORY" => self.conversation.use_history = parse_bool(&key, &value)?,
                "MAX_HISTORY_TURNS" => self.conversation.max_turns = parse_env(&key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::config("chunking.chunk_size must be > 0"));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(Error::config(format!(
                "chunking.overlap ({}) must be < chunking.chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }

        if self.retrieval.k < 1 {
            return Err(Error::config("retrieval.k must be >= 1"));
        }

        self.generation.params().validate()?;
        if self.generation.timeout_secs == 0 {
            return Err(Error::config("generation.timeout_secs must be > 0"));
        }
        match self.generation.provider.as_str() {
            "ollama" | "openai" | "extractive" => {}
            other => {
                return Err(Error::config(format!(
                    "unknown generation provider: '{}'. Must be ollama, openai, or extractive.",
                    other
                )))
            }
        }

        if self.server.max_sessions == 0 {
            return Err(Error::config("server.max_sessions must be > 0"));
        }

        if self.embedding.batch_size == 0 {
            return Err(Error::config("embedding.batch_size must be > 0"));
        }
        if self.embedding.dims == Some(0) {
            return Err(Error::config("embedding.dims must be > 0"));
        }
        match self.embedding.provider.as_str() {
            "local" | "hashing" | "disabled" => {}
            "ollama" | "openai" => {
                if self.embedding.model.is_none() || self.embedding.dims.is_none() {
                    return Err(Error::config(format!(
                        "embedding.model and embedding.dims must be set when provider is '{}'",
                        self.embedding.provider
                    )));
                }
            }
            other => {
                return Err(Error::config(format!(
                    "unknown embedding provider: '{}'. Must be local, ollama, openai, hashing, or disabled.",
                    other
                )))
            }
        }

        match self.device.as_str() {
            "cpu" | "cuda" | "auto" => {}
            other => {
                return Err(Error::config(format!(
                    "unknown device: '{}'. Must be cpu, cuda, or auto.",
                    other
                )))
            }
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("invalid value for {}: '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::config(format!(
            "invalid boolean for {}: '{}'",
            key, value
        ))),
    }
}
