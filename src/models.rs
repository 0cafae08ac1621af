//! Core data models used throughout the assistant.
//!
//! These types represent the documents, chunks, retrieval hits and
//! conversation turns that flow through the indexing and answering
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source format, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Text,
    Markdown,
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Some(DocumentFormat::Text),
            "md" | "markdown" => Some(DocumentFormat::Markdown),
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            _ => None,
        }
    }
}

/// A loaded document. Transient: discarded once chunked.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Path relative to the documents root, `/`-separated.
    pub source: String,
    pub path: std::path::PathBuf,
    pub text: String,
    pub format: DocumentFormat,
    pub modified_at: DateTime<Utc>,
}

/// A contiguous span of a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub source: String,
    pub chunk_index: usize,
    /// Character offsets into the document text, `end` exclusive.
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub hash: String,
}

/// A chunk returned by the retriever with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
    /// 1-based.
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Attribution for one retrieved chunk in an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub source: String,
    pub chunk_id: String,
    pub chunk_index: usize,
    pub score: f32,
    pub rank: usize,
}

impl From<&RetrievalResult> for Citation {
    fn from(r: &RetrievalResult) -> Self {
        Citation {
            source: r.chunk.source.clone(),
            chunk_id: r.chunk.id.clone(),
            chunk_index: r.chunk.chunk_index,
            score: r.score,
            rank: r.rank,
        }
    }
}

/// Generated answer plus the chunks it was conditioned on, in rank order.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl Answer {
    /// Distinct sources in first-cited order.
    pub fn unique_sources(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for c in &self.citations {
            if !seen.contains(&c.source.as_str()) {
                seen.push(c.source.as_str());
            }
        }
        seen
    }
}
