//! End-to-end pipeline tests using the offline `hashing` embedder and the
//! `extractive` generator, so no model server is needed.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use doc_qa::chunk::chunk_text;
use doc_qa::config::Config;
use doc_qa::embedding::{create_embedder, Embedder, HashingEmbedder};
use doc_qa::generation::{
    create_language_model, ExtractiveModel, GenerationOverrides, GenerationParams, ResponseGenerator,
};
use doc_qa::index::{IndexHandle, VectorIndex};
use doc_qa::pipeline::Assistant;
use doc_qa::retriever::Retriever;
use doc_qa::Error;

fn offline_config(root: &Path) -> Config {
    let toml = format!(
        r#"
[documents]
path = "{root}/docs"

[index]
path = "{root}/store"

[chunking]
chunk_size = 200
overlap = 40

[embedding]
provider = "hashing"
dims = 256

[generation]
provider = "extractive"
temperature = 0.0

[retrieval]
k = 3
"#,
        root = root.display()
    );
    let config = Config::from_toml_str(&toml).unwrap();
    config.validate().unwrap();
    config
}

fn write_corpus(root: &Path) {
    let docs = root.join("docs");
    fs::create_dir_all(docs.join("guides")).unwrap();
    fs::write(
        docs.join("vaccination_schedule.md"),
        "# Vaccination schedule\n\nYour baby gets vaccines at birth, at 2 months, 4 months and 6 months. \
         The measles vaccine is given at 12 months.",
    )
    .unwrap();
    fs::write(
        docs.join("guides/kitchen.txt"),
        "Keep kitchen knives stored out of reach. Lock cleaning products away.",
    )
    .unwrap();
    fs::write(
        docs.join("guides/sleep.txt"),
        "Place infants on their back for every nap. Keep the crib free of pillows and toys.",
    )
    .unwrap();
}

async fn open(config: Config) -> Assistant {
    let embedder = create_embedder(&config.embedding).unwrap();
    let model = create_language_model(&config.generation).unwrap();
    Assistant::open(config, embedder, model).await.unwrap()
}

#[tokio::test]
async fn test_single_short_document_chunks() {
    let text = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWX";
    let chunks = chunk_text("d", "d.txt", text, 20, 5).unwrap();
    assert_eq!(chunks.len(), 3);
    for c in &chunks {
        assert!(c.text.chars().count() <= 20);
    }
    for pair in chunks.windows(2) {
        let suffix: String = pair[0].text.chars().skip(15).collect();
        let prefix: String = pair[1].text.chars().take(5).collect();
        assert_eq!(suffix, prefix);
    }

    // Same result through the full index build.
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("docs")).unwrap();
    fs::write(tmp.path().join("docs/only.txt"), text).unwrap();
    let mut config = offline_config(tmp.path());
    config.chunking.chunk_size = 20;
    config.chunking.overlap = 5;
    let assistant = open(config).await;
    assert_eq!(assistant.stats().entries, 3);
    assert_eq!(assistant.stats().documents, 1);
}

#[tokio::test]
async fn test_vaccination_question_ranks_vaccination_document_first() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let assistant = open(offline_config(tmp.path())).await;

    let results = assistant
        .search("when should my baby get vaccines", 3)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].chunk.source, "vaccination_schedule.md");
    assert_eq!(results[0].rank, 1);
}

#[tokio::test]
async fn test_greedy_generation_is_repeatable() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let assistant = open(offline_config(tmp.path())).await;
    let overrides = GenerationOverrides {
        temperature: Some(0.0),
        ..Default::default()
    };

    let mut history = assistant.new_history();
    history.record_exchange("Hi", "Hello, how can I help?");

    let a = assistant
        .ask("When is the measles vaccine given?", Some(&history), &overrides)
        .await
        .unwrap();
    let b = assistant
        .ask("When is the measles vaccine given?", Some(&history), &overrides)
        .await
        .unwrap();
    assert_eq!(a.text, b.text);
    assert!(a.text.contains("12 months"), "answer was: {}", a.text);
    assert_eq!(a.citations, b.citations);
    assert_eq!(a.citations[0].source, "vaccination_schedule.md");
}

#[tokio::test]
async fn test_generator_direct_repeatability() {
    let embedder = Arc::new(HashingEmbedder::new(64));
    let retriever = Retriever::new(IndexHandle::default(), embedder);
    let retrieved = retriever.retrieve("anything", 4).await.unwrap();

    let generator = ResponseGenerator::new(
        Arc::new(ExtractiveModel::new()),
        "Answer from context.",
        std::time::Duration::from_secs(5),
    );
    let params = GenerationParams {
        max_tokens: 64,
        temperature: 0.0,
        top_p: 1.0,
    };
    let a = generator.generate("q", &retrieved, None, &params).await.unwrap();
    let b = generator.generate("q", &retrieved, None, &params).await.unwrap();
    assert_eq!(a.text, b.text);
    assert!(a.citations.is_empty());
}

#[tokio::test]
async fn test_empty_corpus_retrieval_is_empty_not_error() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("docs")).unwrap();
    let assistant = open(offline_config(tmp.path())).await;

    assert_eq!(assistant.stats().entries, 0);
    let results = assistant.search("fever", 4).await.unwrap();
    assert!(results.is_empty());

    let answer = assistant
        .ask("What is a fever?", None, &GenerationOverrides::default())
        .await
        .unwrap();
    assert!(answer.citations.is_empty());
    assert!(answer.text.starts_with("I don't know"));
}

#[tokio::test]
async fn test_k_larger_than_index_returns_everything() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let assistant = open(offline_config(tmp.path())).await;
    let total = assistant.stats().entries;
    let results = assistant.search("baby", total + 10).await.unwrap();
    assert_eq!(results.len(), total);
    assert!(matches!(assistant.search("baby", 0).await, Err(Error::Configuration(_))));
}

#[tokio::test]
async fn test_persisted_index_is_reused_then_rebuilt_on_change() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let config = offline_config(tmp.path());

    let first = open(config.clone()).await;
    let before = first.search("crib pillows", 3).await.unwrap();
    assert!(tmp.path().join("store/manifest.json").exists());
    assert!(tmp.path().join("store/vectors.bin").exists());

    // Unchanged corpus: the stored index is loaded as-is.
    let second = open(config.clone()).await;
    assert!(!second.load_or_rebuild(false).await.unwrap());
    let after = second.search("crib pillows", 3).await.unwrap();
    let ids = |r: &[doc_qa::models::RetrievalResult]| r.iter().map(|x| x.chunk.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&before), ids(&after));

    // Edited corpus: the fingerprint no longer matches.
    fs::write(
        tmp.path().join("docs/guides/fever.txt"),
        "A fever in a baby under 3 months always needs a doctor.",
    )
    .unwrap();
    assert!(second.load_or_rebuild(false).await.unwrap());
    assert_eq!(second.stats().documents, 4);
}

#[tokio::test]
async fn test_corrupt_store_falls_back_to_rebuild() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let config = offline_config(tmp.path());
    open(config.clone()).await;

    fs::write(tmp.path().join("store/manifest.json"), b"garbage").unwrap();
    let reopened = open(config).await;
    assert_eq!(reopened.stats().documents, 3);
}

#[tokio::test]
async fn test_missing_documents_dir_is_storage_error() {
    let tmp = TempDir::new().unwrap();
    let config = offline_config(tmp.path());
    let embedder = create_embedder(&config.embedding).unwrap();
    let model = create_language_model(&config.generation).unwrap();
    let err = Assistant::open(config, embedder, model).await.err().unwrap();
    assert!(matches!(err, Error::Storage(_)));
}

#[tokio::test]
async fn test_forced_rebuild_on_current_index() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let config = offline_config(tmp.path());
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(256));
    let assistant = Assistant::new(config, embedder, Arc::new(ExtractiveModel::new()), VectorIndex::default());

    assert!(assistant.load_or_rebuild(false).await.unwrap());
    assert!(!assistant.load_or_rebuild(false).await.unwrap());
    assert!(assistant.load_or_rebuild(true).await.unwrap());
    assert_eq!(assistant.stats().documents, 3);
}

#[tokio::test]
async fn test_dimension_change_rebuilds_stored_index() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let config = offline_config(tmp.path());

    let wide = Assistant::new(
        config.clone(),
        Arc::new(HashingEmbedder::new(256)),
        Arc::new(ExtractiveModel::new()),
        VectorIndex::default(),
    );
    assert!(wide.load_or_rebuild(false).await.unwrap());
    assert_eq!(wide.stats().dims, 256);

    // Same model name, narrower vectors: the stored index must not be reused.
    let narrow = Assistant::new(
        config,
        Arc::new(HashingEmbedder::new(128)),
        Arc::new(ExtractiveModel::new()),
        VectorIndex::default(),
    );
    assert!(narrow.load_or_rebuild(false).await.unwrap());
    assert_eq!(narrow.stats().dims, 128);
    let results = narrow.search("crib pillows", 1).await.unwrap();
    assert_eq!(results[0].chunk.source, "guides/sleep.txt");

    assert!(!narrow.load_or_rebuild(false).await.unwrap());
}
