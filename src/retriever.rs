//! Query-time retrieval: embed the query, search a snapshot of the index,
//! and map hits back to full chunks.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::IndexHandle;
use crate::models::RetrievalResult;

#[derive(Clone)]
pub struct Retriever {
    index: IndexHandle,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: IndexHandle, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    /// Up to `k` chunks most similar to `query`, ranked from 1.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] for `k == 0` or a blank query.
    /// - [`Error::Model`] when the embedder fails or returns the wrong shape.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if k < 1 {
            return Err(Error::config("k must be >= 1"));
        }
        if query.trim().is_empty() {
            return Err(Error::config("query must not be empty"));
        }

        let index = self.index.snapshot();
        if index.is_empty() {
            tracing::debug!("retrieval against empty index");
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await?;
        let hits = index.search(&vector, k)?;

        let results: Vec<RetrievalResult> = hits
            .into_iter()
            .filter_map(|(id, score)| index.get(&id).map(|chunk| (chunk.clone(), score)))
            .enumerate()
            .map(|(i, (chunk, score))| RetrievalResult {
                chunk,
                score,
                rank: i + 1,
            })
            .collect();

        tracing::debug!(k, hits = results.len(), "retrieved chunks");
        Ok(results)
    }
}
