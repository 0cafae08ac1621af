//! # Document QA
//!
//! A retrieval-augmented question-answering assistant over a local corpus of
//! pediatric-care documents.
//!
//! Documents are split into overlapping character windows, embedded, and
//! held in an exact cosine-similarity index. A question is embedded the same
//! way, the closest chunks are retrieved, and a language model answers from
//! them with the sources cited.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌─────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedder │──▶│ VectorIndex │
//! │ txt/md/… │   └─────────┘   └──────────┘   └──────┬──────┘
//! └──────────┘                                       │
//!                 question ──▶ Retriever ◀───────────┘
//!                                  │
//!                                  ▼
//!                        ResponseGenerator ──▶ answer + sources
//!                                  │
//!                     ┌────────────┴────────────┐
//!                     ▼                         ▼
//!                ┌─────────┐              ┌──────────┐
//!                │   CLI   │              │   HTTP   │
//!                │ (docqa) │              │ + web UI │
//!                └─────────┘              └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa index                        # build or refresh the index
//! docqa search "fever in newborns"   # top-k chunks
//! docqa ask "When should I call a doctor about a fever?"
//! docqa chat                         # interactive session with history
//! docqa serve                        # web UI on http://0.0.0.0:7860
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and `DOCQA_*` overrides |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`loader`] | Document discovery and reading |
//! | [`extract`] | PDF and DOCX text extraction |
//! | [`chunk`] | Sliding-window chunking |
//! | [`embedding`] | Embedding backends |
//! | [`index`] | Vector index and persistence |
//! | [`retriever`] | Query-time retrieval |
//! | [`history`] | Bounded conversation history |
//! | [`generation`] | Prompt assembly and language-model backends |
//! | [`pipeline`] | Index lifecycle and question answering |
//! | [`server`] | HTTP API and web UI |
//! | [`commands`] | CLI command output |
//! | [`logging`] | Tracing subscriber setup |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod history;
pub mod index;
pub mod loader;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod server;

pub use error::{Error, Result};
