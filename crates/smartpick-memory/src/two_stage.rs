//! Two-stage retrieval: lexical coarse recall over a tag table, then exact
//! vector re-ranking restricted to the surviving documents.

use crate::embedding::EmbeddingProvider;
use crate::scope::{RankedDocument, SearchOutcome, Selector};
use crate::store::PersistentVectorStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use smartpick_core::{RetrievalConfig, SmartpickError, SmartpickResult};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// `(metadata, page)` identity of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    /// Source identifier.
    pub metadata: String,
    /// Page or chunk number within the source.
    pub page: i64,
}

impl DocumentKey {
    /// Key of `(metadata, page)`.
    pub fn new(metadata: impl Into<String>, page: i64) -> Self {
        Self {
            metadata: metadata.into(),
            page,
        }
    }
}

/// A document's keyword tags plus its publication time, if known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedDocument {
    /// Which stored document this is.
    #[serde(flatten)]
    pub key: DocumentKey,
    /// Keyword tags matched by stage 1.
    pub tags: BTreeSet<String>,
    /// Publication time; undated documents never go stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl TaggedDocument {
    /// Undated document with `tags`.
    pub fn new<I, S>(metadata: impl Into<String>, page: i64, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: DocumentKey::new(metadata, page),
            tags: tags.into_iter().map(Into::into).collect(),
            published_at: None,
        }
    }

    /// Set the publication time.
    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}

/// Ordered table of tagged documents. Table order breaks score ties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagTable {
    documents: Vec<TaggedDocument>,
}

impl TagTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document.
    pub fn push(&mut self, document: TaggedDocument) {
        self.documents.push(document);
    }

    /// Replace the entry with the same key in place, or append.
    pub fn upsert(&mut self, document: TaggedDocument) {
        match self.documents.iter_mut().find(|d| d.key == document.key) {
            Some(existing) => *existing = document,
            None => self.documents.push(document),
        }
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents in table order.
    pub fn iter(&self) -> impl Iterator<Item = &TaggedDocument> {
        self.documents.iter()
    }

    /// Read a table saved with [`save`](Self::save).
    ///
    /// A file that does not parse is a configuration error.
    pub fn load(path: &Path) -> SmartpickResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let table: Self = serde_json::from_str(&raw).map_err(|e| {
            SmartpickError::Config(format!("Corrupt tag table '{}': {e}", path.display()))
        })?;
        debug!(path = %path.display(), documents = table.len(), "tag table loaded");
        Ok(table)
    }

    /// Write the table as pretty JSON, replacing the file atomically.
    pub fn save(&self, path: &Path) -> SmartpickResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Stage-1 coarse recall.
    ///
    /// Scores every available document by the summed weight of the positive
    /// keywords among its tags. Documents sharing any tag with the negative
    /// set are excluded, as are documents scoring zero. The top
    /// `candidate_limit` survive, highest score first.
    pub fn coarse_filter(
        &self,
        mask: &AvailabilityMask,
        query: &LexicalQuery,
        config: &LexicalFilterConfig,
    ) -> SmartpickResult<Vec<Candidate>> {
        if mask.len() != self.len() {
            return Err(SmartpickError::Precondition(format!(
                "Availability mask covers {} documents, tag table has {}",
                mask.len(),
                self.len()
            )));
        }

        let mut candidates: Vec<Candidate> = self
            .documents
            .iter()
            .zip(mask.iter())
            .filter(|(_, available)| *available)
            .filter(|(doc, _)| query.negative.is_disjoint(&doc.tags))
            .filter_map(|(doc, _)| {
                let score: f32 = query
                    .positive
                    .iter()
                    .filter(|k| doc.tags.contains(*k))
                    .map(|k| config.weight(k))
                    .sum();
                (score > 0.0).then(|| Candidate {
                    key: doc.key.clone(),
                    score,
                })
            })
            .collect();

        // Stable sort keeps table order among equal scores.
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(config.candidate_limit);
        Ok(candidates)
    }
}

/// Which rows of a [`TagTable`] pass the freshness cutoff.
///
/// Computed once per table and reused for every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityMask {
    available: Vec<bool>,
}

impl AvailabilityMask {
    /// Documents published within `max_age` of `now` are available, as are
    /// documents with no publication time.
    pub fn compute(table: &TagTable, now: DateTime<Utc>, max_age: Duration) -> Self {
        let cutoff = now - max_age;
        let available = table
            .iter()
            .map(|doc| doc.published_at.map_or(true, |at| at >= cutoff))
            .collect();
        Self { available }
    }

    /// Number of documents covered.
    pub fn len(&self) -> usize {
        self.available.len()
    }

    /// Whether the mask covers no document.
    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    /// Number of available documents.
    pub fn available_count(&self) -> usize {
        self.available.iter().filter(|a| **a).count()
    }

    fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.available.iter().copied()
    }
}

/// Positive and negative keyword sets for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexicalQuery {
    /// Keywords that raise a document's score.
    pub positive: BTreeSet<String>,
    /// Supplied by the external keyword-expansion step.
    pub negative: BTreeSet<String>,
}

impl LexicalQuery {
    /// Query from positive and negative keyword lists.
    pub fn new<P, N, S, T>(positive: P, negative: N) -> Self
    where
        P: IntoIterator<Item = S>,
        N: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            positive: positive.into_iter().map(Into::into).collect(),
            negative: negative.into_iter().map(Into::into).collect(),
        }
    }
}

/// Stage-1 scoring parameters.
#[derive(Debug, Clone)]
pub struct LexicalFilterConfig {
    /// Per-keyword weights; keywords not listed weigh `1.0`.
    pub keyword_weights: HashMap<String, f32>,
    /// Keywords boosted by `must_have_boost`.
    pub must_have: HashSet<String>,
    /// Multiplier for must-have keywords.
    pub must_have_boost: f32,
    /// Maximum survivors handed to the vector stage.
    pub candidate_limit: usize,
    /// Freshness cutoff in days.
    pub max_age_days: i64,
}

impl LexicalFilterConfig {
    /// Weight of `keyword`, with the must-have boost applied.
    pub fn weight(&self, keyword: &str) -> f32 {
        let base = self.keyword_weights.get(keyword).copied().unwrap_or(1.0);
        if self.must_have.contains(keyword) {
            base * self.must_have_boost
        } else {
            base
        }
    }

    /// Freshness cutoff.
    pub fn max_age(&self) -> Duration {
        Duration::days(self.max_age_days)
    }
}

impl Default for LexicalFilterConfig {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for LexicalFilterConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            keyword_weights: HashMap::new(),
            must_have: config.must_have.iter().cloned().collect(),
            must_have_boost: config.must_have_boost,
            candidate_limit: config.candidate_limit,
            max_age_days: config.max_age_days,
        }
    }
}

/// A stage-1 survivor.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Surviving document.
    pub key: DocumentKey,
    /// Summed keyword weight.
    pub score: f32,
}

/// Result of a two-stage retrieval.
#[derive(Debug, Clone, PartialEq)]
pub enum TwoStageOutcome {
    /// Re-ranked documents, closest first.
    Ranked(Vec<RankedDocument>),
    /// Stage 1 kept nothing, or nothing it kept is in the vector store.
    NoEligibleDocuments,
}

impl TwoStageOutcome {
    /// Ranked documents, or an empty list when nothing was eligible.
    pub fn into_documents(self) -> Vec<RankedDocument> {
        match self {
            TwoStageOutcome::Ranked(docs) => docs,
            TwoStageOutcome::NoEligibleDocuments => Vec::new(),
        }
    }
}

/// Lexical coarse recall followed by scoped vector re-ranking.
///
/// The vector stage only ever searches the stage-1 survivors; there is no
/// unscoped fallback.
pub struct TwoStageRetriever<'a> {
    store: &'a PersistentVectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    table: TagTable,
    mask: AvailabilityMask,
    config: LexicalFilterConfig,
}

impl<'a> TwoStageRetriever<'a> {
    /// Build a retriever, computing availability against the current time.
    pub fn new(
        store: &'a PersistentVectorStore,
        embedder: Arc<dyn EmbeddingProvider>,
        table: TagTable,
        config: LexicalFilterConfig,
    ) -> Self {
        let mask = AvailabilityMask::compute(&table, Utc::now(), config.max_age());
        Self {
            store,
            embedder,
            table,
            mask,
            config,
        }
    }

    /// Recompute availability as of `now`.
    pub fn refresh_availability(&mut self, now: DateTime<Utc>) {
        self.mask = AvailabilityMask::compute(&self.table, now, self.config.max_age());
    }

    /// The tag table stage 1 runs over.
    pub fn table(&self) -> &TagTable {
        &self.table
    }

    /// Stage 1 only.
    pub fn candidates(&self, query: &LexicalQuery) -> SmartpickResult<Vec<Candidate>> {
        self.table.coarse_filter(&self.mask, query, &self.config)
    }

    /// Run both stages for `query_text`, returning at most `k` documents.
    pub async fn retrieve(
        &self,
        query_text: &str,
        query: &LexicalQuery,
        k: usize,
    ) -> SmartpickResult<TwoStageOutcome> {
        let candidates = self.candidates(query)?;
        if candidates.is_empty() {
            info!(
                available = self.mask.available_count(),
                "no documents passed lexical filtering"
            );
            return Ok(TwoStageOutcome::NoEligibleDocuments);
        }

        let (metadata, pages): (Vec<String>, Vec<i64>) = candidates
            .into_iter()
            .map(|c| (c.key.metadata, c.key.page))
            .unzip();
        let handle = self.store.scope(Selector::Pairs {
            metadata: &metadata,
            pages: &pages,
        })?;
        if handle.is_empty() {
            info!(
                candidates = metadata.len(),
                "lexical candidates have no stored vectors"
            );
            return Ok(TwoStageOutcome::NoEligibleDocuments);
        }

        let vector = self.embedder.embed(query_text).await?;
        match self.store.search(&handle, &vector, k)? {
            SearchOutcome::Ranked(docs) => {
                debug!(
                    candidates = metadata.len(),
                    scoped = handle.len(),
                    returned = docs.len(),
                    "two-stage retrieval complete"
                );
                Ok(TwoStageOutcome::Ranked(docs))
            }
            SearchOutcome::NoCandidates => Ok(TwoStageOutcome::NoEligibleDocuments),
        }
    }
}
