//! Document loader.
//!
//! Walks the configured documents directory, filters paths through include
//! and exclude globs, and reads each match into a [`Document`]. Plain text
//! and markdown are read as UTF-8; PDF and DOCX go through [`crate::extract`].
//!
//! Unreadable or empty files are skipped with a warning. A missing root is
//! fatal. Output is sorted by relative path so index builds are
//! deterministic.

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::error::{Error, Result};
use crate::extract;
use crate::models::{Document, DocumentFormat};

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

pub fn load_documents(config: &DocumentsConfig) -> Result<Vec<Document>> {
    let root = &config.path;
    if !root.is_dir() {
        return Err(Error::storage(format!(
            "documents directory does not exist: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry.map_err(|e| Error::storage(format!("walking {}: {}", root.display(), e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let Some(format) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(DocumentFormat::from_extension)
        else {
            tracing::debug!(source = %rel_str, "skipping file with unsupported extension");
            continue;
        };

        match read_document(path, &rel_str, format, config.normalize_whitespace) {
            Ok(Some(doc)) => documents.push(doc),
            Ok(None) => tracing::debug!(source = %rel_str, "skipping empty document"),
            Err(e) => tracing::warn!(source = %rel_str, error = %e, "skipping unreadable document"),
        }
    }

    documents.sort_by(|a, b| a.source.cmp(&b.source));
    tracing::info!(count = documents.len(), root = %root.display(), "loaded documents");

    Ok(documents)
}

fn read_document(
    path: &Path,
    relative_path: &str,
    format: DocumentFormat,
    normalize: bool,
) -> Result<Option<Document>> {
    let metadata = std::fs::metadata(path)?;
    let modified_at: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let text = match format {
        DocumentFormat::Text | DocumentFormat::Markdown => std::fs::read_to_string(path)?,
        DocumentFormat::Pdf => {
            let bytes = std::fs::read(path)?;
            extract::extract_pdf(&bytes).map_err(|e| Error::storage(e.to_string()))?
        }
        DocumentFormat::Docx => {
            let bytes = std::fs::read(path)?;
            extract::extract_docx(&bytes).map_err(|e| Error::storage(e.to_string()))?
        }
    };

    let text = if normalize {
        normalize_whitespace(&text)
    } else {
        text
    };
    if text.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(Document {
        id: document_id(relative_path),
        source: relative_path.to_string(),
        path: path.to_path_buf(),
        text,
        format,
        modified_at,
    }))
}

/// Stable id for a relative path, so chunk ids survive a rebuild.
pub fn document_id(relative_path: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, relative_path.as_bytes()).to_string()
}

/// Collapse every whitespace run into a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("invalid glob set: {}", e)))
}
