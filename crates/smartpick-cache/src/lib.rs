//! Keyword-indexed semantic cache for recommendation results.
//!
//! Incoming questions are reduced to weighted keywords and matched against
//! previously answered questions. When exactly one stored question matches
//! confidently, its result payload is reused.
//!
//! # Main types
//!
//! - [`SemanticCache`] — Store and look up cached results.
//! - [`QueryMatcher`] — Weighted overlap scoring with calibrated thresholds.
//! - [`IndexStorage`] — Persisted inverted index and query records.
//! - [`KeywordExtractor`] — Tokenization, synonyms, categories and tiers.
//! - [`VocabularyConfig`] — The injected vocabulary tables.

/// Persisted inverted index and forward query store.
pub mod index;
/// Keyword extraction and weighting.
pub mod keywords;
/// Query matching over the index.
pub mod matcher;
/// Payload blob store.
pub mod payload;
mod persist;
/// The cache facade.
pub mod semantic;
/// Vocabulary tables.
pub mod vocabulary;

pub use index::{IndexStorage, QueryRecord};
pub use keywords::{KeywordExtractor, Tier, TierMatch};
pub use matcher::{MatchInput, QueryMatch, QueryMatcher, CLEAR_MARGIN, HIGH_CONFIDENCE, MIN_CONFIDENCE};
pub use payload::PayloadStore;
pub use semantic::{default_query_id, CacheHit, CacheLookup, CacheSettings, SemanticCache};
pub use vocabulary::{CategoryVocabulary, TierVocabulary, VocabularyConfig, WeightConfig};
