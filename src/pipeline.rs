//! End-to-end pipeline: build or load the index, then answer questions.
//!
//! [`Assistant`] owns the live [`IndexHandle`] and the configured backends.
//! It is cheap to clone and shared between the CLI and every HTTP handler.
//!
//! # Index lifecycle
//!
//! ```text
//! open ──▶ load documents ──▶ fingerprint ──▶ stored index matches? ──yes──▶ use it
//!                                                   │ no / missing / corrupt
//!                                                   ▼
//!                               chunk ─▶ embed (batched) ─▶ persist ─▶ swap in
//! ```
//!
//! Rebuilds are serialized by an async mutex and never block searches:
//! readers keep the snapshot they started with until the new index is
//! swapped in.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::generation::{GenerationOverrides, LanguageModel, ResponseGenerator};
use crate::history::ConversationHistory;
use crate::index::{corpus_fingerprint, IndexHandle, IndexStats, VectorIndex};
use crate::loader::load_documents;
use crate::models::{Answer, RetrievalResult};
use crate::retriever::Retriever;

#[derive(Clone)]
pub struct Assistant {
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    index: IndexHandle,
    retriever: Retriever,
    generator: Arc<ResponseGenerator>,
    rebuild_lock: Arc<Mutex<()>>,
}

impl Assistant {
    /// Assemble an assistant around an existing index without touching disk.
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        index: VectorIndex,
    ) -> Self {
        let index = IndexHandle::new(index);
        let generator = ResponseGenerator::from_config(model, &config.generation);
        Self {
            retriever: Retriever::new(index.clone(), Arc::clone(&embedder)),
            config: Arc::new(config),
            embedder,
            index,
            generator: Arc::new(generator),
            rebuild_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load the persisted index if it matches the current corpus, otherwise
    /// rebuild it from the documents directory.
    pub async fn open(
        config: Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let assistant = Self::new(config, embedder, model, VectorIndex::default());
        assistant.load_or_rebuild(false).await?;
        Ok(assistant)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> IndexStats {
        self.index.snapshot().stats()
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// Bring the index up to date. With `force`, always re-embed.
    ///
    /// Returns whether a rebuild happened.
    pub async fn load_or_rebuild(&self, force: bool) -> Result<bool> {
        let _guard = self.rebuild_lock.lock().await;

        let config = Arc::clone(&self.config);
        let documents = blocking(move || load_documents(&config.documents)).await?;
        let chunking = &self.config.chunking;
        let dims = self.embedder.dims();
        let fingerprint = corpus_fingerprint(
            &documents,
            chunking.chunk_size,
            chunking.overlap,
            self.embedder.model_name(),
            dims,
        );

        if !force {
            let config = Arc::clone(&self.config);
            match blocking(move || VectorIndex::load(&config.index.path)).await {
                Ok(stored) if stored.fingerprint() == fingerprint && stored.dims() == dims => {
                    tracing::info!(entries = stored.len(), "stored index is current");
                    self.index.swap(stored);
                    return Ok(false);
                }
                Ok(stored) => tracing::info!(
                    stored_dims = stored.dims(),
                    dims,
                    "documents or settings changed, rebuilding index"
                ),
                Err(e) => tracing::warn!(error = %e, "no usable stored index, rebuilding"),
            }
        }

        let mut chunks = Vec::new();
        for doc in &documents {
            chunks.extend(chunk_document(doc, chunking.chunk_size, chunking.overlap)?);
        }
        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            model = self.embedder.model_name(),
            "building index"
        );

        let mut index = VectorIndex::new(self.embedder.model_name(), self.embedder.dims())
            .with_fingerprint(fingerprint);
        if !chunks.is_empty() {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors =
                embed_in_batches(self.embedder.as_ref(), &texts, self.config.embedding.batch_size).await?;
            for (chunk, vector) in chunks.into_iter().zip(vectors) {
                index.add(chunk, vector)?;
            }
        } else {
            tracing::warn!("no documents to index; answers will have no context");
        }

        let index = Arc::new(index);
        let (config, to_write) = (Arc::clone(&self.config), Arc::clone(&index));
        if let Err(e) = blocking(move || to_write.persist(&config.index.path)).await {
            tracing::error!(error = %e, "failed to persist index; continuing with in-memory copy");
        }
        self.index.swap_shared(index);
        Ok(true)
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        self.retriever.retrieve(query, k).await
    }

    /// Retrieve `retrieval.k` chunks and generate an answer.
    ///
    /// `history` is only consulted when `conversation.use_history` is on.
    pub async fn ask(
        &self,
        question: &str,
        history: Option<&ConversationHistory>,
        overrides: &GenerationOverrides,
    ) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(Error::config("question must not be empty"));
        }
        let params = self.config.generation.params().with_overrides(overrides);
        params.validate()?;

        let retrieved = self.retriever.retrieve(question, self.config.retrieval.k).await?;
        let history = history.filter(|_| self.config.conversation.use_history);

        let answer = self
            .generator
            .generate(question, &retrieved, history, &params)
            .await?;
        tracing::info!(
            retrieved = retrieved.len(),
            sources = answer.unique_sources().len(),
            "answered question"
        );
        Ok(answer)
    }

    /// A fresh history sized from `conversation.max_turns`.
    pub fn new_history(&self) -> ConversationHistory {
        ConversationHistory::new(self.config.conversation.max_turns)
    }
}

/// Run filesystem work (directory walks, PDF extraction, index files) off the
/// async worker threads.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::storage(format!("filesystem task failed: {}", e)))?
}

