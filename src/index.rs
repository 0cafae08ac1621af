//! Exact nearest-neighbour vector index with on-disk persistence.
//!
//! The index is a flat list of `(chunk, vector)` entries scanned with
//! cosine similarity on every query. The corpus is small, so a brute-force
//! scan is exact and fast enough.
//!
//! # On-disk layout
//!
//! ```text
//! <index dir>/
//!   manifest.json   format version, model, dims, fingerprint, chunk metadata
//!   vectors.bin     entry vectors, concatenated little-endian f32
//! ```
//!
//! Both files are written to temporaries and renamed into place, so a
//! crashed write leaves the previous store readable.
//!
//! # Swapping
//!
//! [`IndexHandle`] holds the live index behind an `Arc`. Readers take a
//! [`snapshot`](IndexHandle::snapshot); a rebuild constructs a complete new
//! index and publishes it with [`swap`](IndexHandle::swap). A search never
//! observes a partially built index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::chunk::sha256_hex;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{Chunk, Document};

const FORMAT_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_FILE: &str = "vectors.bin";

#[derive(Debug, Clone)]
struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    fingerprint: String,
    entries: Vec<Entry>,
    by_id: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    pub entries: usize,
    pub documents: usize,
    pub dims: usize,
    pub model: String,
    pub fingerprint: String,
}

#[derive(Serialize, Deserialize)]
struct Manifest {
    version: u32,
    model: String,
    dims: usize,
    fingerprint: String,
    chunks: Vec<Chunk>,
}

impl VectorIndex {
    /// An empty index for vectors produced by `model`.
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
            ..Self::default()
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Insert one chunk and its vector.
    ///
    /// The first vector fixes the dimension when the index was created with
    /// `dims == 0`.
    pub fn add(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<()> {
        if self.by_id.contains_key(&chunk.id) {
            return Err(Error::storage(format!("duplicate chunk id: {}", chunk.id)));
        }
        if self.dims == 0 {
            self.dims = vector.len();
        }
        if vector.len() != self.dims {
            return Err(Error::model(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dims
            )));
        }
        self.by_id.insert(chunk.id.clone(), self.entries.len());
        self.entries.push(Entry { chunk, vector });
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.by_id.get(id).map(|&i| &self.entries[i].chunk)
    }

    /// Top-`k` chunk ids by descending cosine similarity.
    ///
    /// Ties keep insertion order. An empty index returns no results.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(Error::model(format!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dims
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();
        // Stable sort, so equal scores stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| (self.entries[i].chunk.id.clone(), score))
            .collect())
    }

    pub fn stats(&self) -> IndexStats {
        let mut documents: Vec<&str> = self
            .entries
            .iter()
            .map(|e| e.chunk.document_id.as_str())
            .collect();
        documents.sort_unstable();
        documents.dedup();

        IndexStats {
            entries: self.entries.len(),
            documents: documents.len(),
            dims: self.dims,
            model: self.model.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }

    // ============ Persistence ============

    pub fn persist(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::storage(format!("creating {}: {}", dir.display(), e)))?;

        let manifest = Manifest {
            version: FORMAT_VERSION,
            model: self.model.clone(),
            dims: self.dims,
            fingerprint: self.fingerprint.clone(),
            chunks: self.entries.iter().map(|e| e.chunk.clone()).collect(),
        };
        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| Error::storage(format!("serializing manifest: {}", e)))?;

        let mut blob = Vec::with_capacity(self.entries.len() * self.dims * 4);
        for e in &self.entries {
            blob.extend_from_slice(&vec_to_blob(&e.vector));
        }

        // Vectors first: a manifest is only ever published next to its blob.
        write_atomic(&dir.join(VECTORS_FILE), &blob)?;
        write_atomic(&dir.join(MANIFEST_FILE), &manifest_json)?;

        tracing::info!(entries = self.entries.len(), dir = %dir.display(), "persisted index");
        Ok(())
    }

    /// Load a store written by [`persist`](Self::persist).
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when the store is missing, unreadable, from another
    /// format version, or internally inconsistent.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_bytes = std::fs::read(&manifest_path)
            .map_err(|e| Error::storage(format!("reading {}: {}", manifest_path.display(), e)))?;
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| Error::storage(format!("corrupt manifest {}: {}", manifest_path.display(), e)))?;

        if manifest.version != FORMAT_VERSION {
            return Err(Error::storage(format!(
                "unsupported index format version {} (expected {})",
                manifest.version, FORMAT_VERSION
            )));
        }

        let vectors_path = dir.join(VECTORS_FILE);
        let blob = std::fs::read(&vectors_path)
            .map_err(|e| Error::storage(format!("reading {}: {}", vectors_path.display(), e)))?;
        let stride = manifest
            .dims
            .checked_mul(4)
            .ok_or_else(|| Error::storage(format!("corrupt manifest: dims {} too large", manifest.dims)))?;
        let expected = manifest.chunks.len().checked_mul(stride).ok_or_else(|| {
            Error::storage(format!(
                "corrupt manifest: {} chunks of {} dims overflow",
                manifest.chunks.len(),
                manifest.dims
            ))
        })?;
        if blob.len() != expected {
            return Err(Error::storage(format!(
                "corrupt vector file: {} bytes, expected {}",
                blob.len(),
                expected
            )));
        }

        let mut index = VectorIndex::new(manifest.model, manifest.dims)
            .with_fingerprint(manifest.fingerprint);
        for (i, chunk) in manifest.chunks.into_iter().enumerate() {
            let vector = blob_to_vec(&blob[i * stride..(i + 1) * stride]);
            index
                .add(chunk, vector)
                .map_err(|e| Error::storage(format!("corrupt index: {}", e)))?;
        }

        tracing::info!(entries = index.len(), dir = %dir.display(), "loaded index");
        Ok(index)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)
        .map_err(|e| Error::storage(format!("writing {}: {}", tmp.display(), e)))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| Error::storage(format!("renaming to {}: {}", path.display(), e)))?;
    Ok(())
}

/// Hash identifying the inputs an index was built from.
///
/// Covers every document's source and text, the chunking parameters and the
/// embedding model and dimension, so any change to these forces a full rebuild.
pub fn corpus_fingerprint(
    documents: &[Document],
    chunk_size: usize,
    overlap: usize,
    model: &str,
    dims: usize,
) -> String {
    let mut material = format!(
        "v{}\nmodel={}\ndims={}\nchunk={}/{}\n",
        FORMAT_VERSION, model, dims, chunk_size, overlap
    );
    for doc in documents {
        material.push_str(&doc.source);
        material.push('\0');
        material.push_str(&sha256_hex(doc.text.as_bytes()));
        material.push('\n');
    }
    sha256_hex(material.as_bytes())
}

// ============ Handle ============

/// Shared owner of the live index.
#[derive(Clone, Default)]
pub struct IndexHandle {
    current: Arc<RwLock<Arc<VectorIndex>>>,
}

impl IndexHandle {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    /// The index as of now. Later swaps do not affect the returned value.
    pub fn snapshot(&self) -> Arc<VectorIndex> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Publish a fully built index.
    pub fn swap(&self, index: VectorIndex) {
        self.swap_shared(Arc::new(index));
    }

    /// Publish an index that is already shared, e.g. with a background writer.
    pub fn swap_shared(&self, next: Arc<VectorIndex>) {
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}
