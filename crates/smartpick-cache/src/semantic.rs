use crate::index::{IndexStorage, QueryRecord};
use crate::keywords::KeywordExtractor;
use crate::matcher::{MatchInput, QueryMatcher};
use crate::payload::PayloadStore;
use crate::vocabulary::VocabularyConfig;
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use smartpick_core::{SmartpickConfig, SmartpickResult};
use std::path::PathBuf;
use tracing::{debug, info};

/// A reusable cached result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    /// Id of the stored query that matched.
    pub query_id: String,
    /// Matcher score of that query.
    pub score: f64,
    /// The cached result.
    pub payload: Value,
}

/// Outcome of a cache lookup. A miss is a normal result, never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Exactly one stored query matched confidently.
    Hit(CacheHit),
    /// No match, an ambiguous match, or a missing payload.
    Miss,
}

impl CacheLookup {
    /// Whether a payload was found.
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// Where the cache keeps its files and how it matches.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Keyword index document.
    pub index_path: PathBuf,
    /// Payload document.
    pub payload_path: PathBuf,
    /// Matches scoring below this are ignored.
    pub min_score: f64,
    /// Upper bound on matches considered per lookup.
    pub max_results: usize,
}

/// Keyword-matched result cache.
///
/// Stores each query's payload keyed by query id and indexes the query's
/// keywords. A later query that the matcher resolves to exactly one stored
/// query reuses that query's payload.
pub struct SemanticCache {
    extractor: KeywordExtractor,
    index: IndexStorage,
    payloads: PayloadStore,
    min_score: f64,
    max_results: usize,
}

impl SemanticCache {
    /// Open the index and payload files named by `settings`.
    pub fn open(settings: CacheSettings, extractor: KeywordExtractor) -> SmartpickResult<Self> {
        Ok(Self {
            index: IndexStorage::open(settings.index_path)?,
            payloads: PayloadStore::open(settings.payload_path)?,
            extractor,
            min_score: settings.min_score,
            max_results: settings.max_results,
        })
    }

    /// Open the cache described by `config`, using its vocabulary file if set.
    pub fn from_config(config: &SmartpickConfig) -> SmartpickResult<Self> {
        let vocabulary = match &config.cache.vocabulary {
            Some(path) => VocabularyConfig::load(&config.resolve(path))?,
            None => VocabularyConfig::tablet_defaults(),
        };
        let settings = CacheSettings {
            index_path: config.resolve(&config.cache.index_file),
            payload_path: config.resolve(&config.cache.payload_file),
            min_score: config.cache.min_score,
            max_results: config.cache.max_results,
        };
        Self::open(settings, KeywordExtractor::new(&vocabulary)?)
    }

    /// Store `payload` for `text` and index it; returns the query id.
    ///
    /// Without an explicit id the id is derived from the text (see
    /// [`default_query_id`]). Reusing an id replaces the stored query.
    pub fn add_query(
        &mut self,
        text: &str,
        payload: Value,
        query_id: Option<&str>,
    ) -> SmartpickResult<String> {
        let query_id = query_id.map_or_else(|| default_query_id(text), str::to_string);
        let keywords = self.extractor.extract(text);
        let record = QueryRecord {
            query_text: text.to_string(),
            category: self.extractor.categorize(&keywords),
            tier: self.extractor.tiers(&keywords),
            keywords,
            recorded_at: Utc::now(),
        };

        // Payload first: an index entry must never point at a missing payload.
        self.payloads.put(&query_id, payload)?;
        self.index.add_query(&query_id, record)?;
        info!(query_id = %query_id, "cached query result");
        Ok(query_id)
    }

    /// Look up a reusable payload for `text`.
    pub fn lookup(&self, text: &str) -> SmartpickResult<CacheLookup> {
        let matcher = QueryMatcher::new(&self.extractor, &self.index);
        let mut matches = matcher.find_matching(MatchInput::Text(text), self.min_score, self.max_results)?;

        if matches.len() != 1 {
            info!(candidates = matches.len(), "cache miss");
            return Ok(CacheLookup::Miss);
        }
        let best = matches.remove(0);
        match self.payloads.get(&best.query_id)? {
            Some(payload) => {
                info!(query_id = %best.query_id, score = best.score, "cache hit");
                Ok(CacheLookup::Hit(CacheHit {
                    query_id: best.query_id,
                    score: best.score,
                    payload: payload.clone(),
                }))
            }
            None => {
                debug!(query_id = %best.query_id, "matched query has no payload");
                Ok(CacheLookup::Miss)
            }
        }
    }

    /// Pipeline name for [`lookup`](Self::lookup).
    pub fn cache_lookup(&self, text: &str) -> SmartpickResult<CacheLookup> {
        self.lookup(text)
    }

    /// Pipeline name for [`add_query`](Self::add_query) with a derived id.
    pub fn cache_store(&mut self, text: &str, payload: Value) -> SmartpickResult<String> {
        self.add_query(text, payload, None)
    }

    /// Close the index and the payload store.
    pub fn close(&mut self) {
        self.index.close();
        self.payloads.close();
    }

    /// Reopen both backing files.
    pub fn reopen(&mut self) -> SmartpickResult<()> {
        self.index.reopen()?;
        self.payloads.reopen()
    }

    /// The keyword index.
    pub fn index(&self) -> &IndexStorage {
        &self.index
    }

    /// The payload store.
    pub fn payloads(&self) -> &PayloadStore {
        &self.payloads
    }

    /// The keyword extractor in use.
    pub fn extractor(&self) -> &KeywordExtractor {
        &self.extractor
    }
}

/// First 12 hex digits of SHA-256 over `text` with all whitespace removed.
pub fn default_query_id(text: &str) -> String {
    let normalized: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let digest = Sha256::digest(normalized.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(12);
    id
}
