//! Persistent vector memory with scoped exact search and two-stage retrieval.
//!
//! Embeddings are kept in a durable, append-only column store addressed by a
//! content hash of `(metadata, page)`. Every search runs over an explicit
//! scope, so a query only ever sees the documents selected for it.
//!
//! # Main types
//!
//! - [`PersistentVectorStore`] — File-backed hash-addressed column store.
//! - [`StagingBatch`] — Rows awaiting a flush.
//! - [`ScopedHandle`] — The search universe of one logical query.
//! - [`ScopedRetriever`] — Embeds free text and searches the current scope.
//! - [`TwoStageRetriever`] — Lexical tag filtering followed by vector re-ranking.
//! - [`LocalEmbedding`] — Deterministic hashed bag-of-words embedding provider.

/// Staging batch and vector records.
pub mod batch;
/// Embedding provider trait and local implementation.
pub mod embedding;
/// Content hash used as the upsert key.
pub mod hash;
/// Retriever adapter over a scoped store.
pub mod retriever;
/// Scope handles, documents and the transient flat index.
pub mod scope;
/// Persistent vector store.
pub mod store;
/// Lexical + vector two-stage retrieval.
pub mod two_stage;

pub use batch::{StagingBatch, VectorRecord};
pub use embedding::{EmbeddingProvider, LocalEmbedding};
pub use hash::ContentHash;
pub use retriever::ScopedRetriever;
pub use scope::{Document, DocumentMetadata, RankedDocument, ScopedHandle, SearchOutcome, Selector};
pub use store::{FlushReport, PersistentVectorStore};
pub use two_stage::{
    AvailabilityMask, Candidate, DocumentKey, LexicalFilterConfig, LexicalQuery, TagTable,
    TaggedDocument, TwoStageOutcome, TwoStageRetriever,
};
