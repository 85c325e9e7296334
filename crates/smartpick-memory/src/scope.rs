use crate::batch::StagingBatch;
use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use smartpick_core::{SmartpickError, SmartpickResult};
use uuid::Uuid;

/// Selects rows of the persistent store by `(metadata, page)`.
#[derive(Debug, Clone, Copy)]
pub enum Selector<'a> {
    /// Every `(metadata, page)` pair staged in the batch.
    Batch(&'a StagingBatch),
    /// Explicit parallel lists; both must have the same length.
    Pairs {
        /// Source identifiers.
        metadata: &'a [String],
        /// Pages, parallel to `metadata`.
        pages: &'a [i64],
    },
}

impl Selector<'_> {
    /// Content hashes of the selected pairs.
    pub fn hashes(&self) -> SmartpickResult<Vec<ContentHash>> {
        match self {
            Selector::Batch(batch) => Ok(batch.hashes()),
            Selector::Pairs { metadata, pages } => {
                if metadata.len() != pages.len() {
                    return Err(SmartpickError::InvalidRecord(format!(
                        "Selector length mismatch: metadata={}, page={}",
                        metadata.len(),
                        pages.len()
                    )));
                }
                Ok(metadata
                    .iter()
                    .zip(pages.iter())
                    .map(|(m, &p)| ContentHash::of(m, p))
                    .collect())
            }
        }
    }
}

/// The active search universe for one logical query.
///
/// Returned by [`PersistentVectorStore::scope`](crate::PersistentVectorStore::scope)
/// and passed by value into search and retrieval. The handle remembers which
/// store issued it; presenting it to another store is a precondition error.
/// An empty handle is valid and means "no candidates".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedHandle {
    store_id: Uuid,
    rows: Vec<usize>,
}

impl ScopedHandle {
    pub(crate) fn new(store_id: Uuid, rows: Vec<usize>) -> Self {
        Self { store_id, rows }
    }

    /// Store row indices in the scope, ascending.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Whether store row `row` is in the scope.
    pub fn contains(&self, row: usize) -> bool {
        self.rows.binary_search(&row).is_ok()
    }

    /// Number of rows in the scope.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the scope selects nothing.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn store_id(&self) -> Uuid {
        self.store_id
    }
}

/// Document metadata as exchanged with the chain layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Source identifier (the store's `metadata` column).
    pub index: String,
    /// Page or chunk number within the source.
    pub page: i64,
    /// Stored vector, carried so the document converts back without re-embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectors: Option<Vec<f32>>,
}

/// A retrieved text chunk plus the metadata needed to rebuild its row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Chunk text.
    pub page_content: String,
    /// Source identity and vector.
    pub metadata: DocumentMetadata,
}

/// A document returned by scoped search.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument {
    /// The stored row as a document.
    pub document: Document,
    /// Squared L2 distance to the query vector (lower is closer).
    pub distance: f32,
    /// Row index in the persistent store.
    pub row: usize,
}

/// Result of a scoped vector search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Nearest documents, closest first.
    Ranked(Vec<RankedDocument>),
    /// The scope was empty; there was nothing to search.
    NoCandidates,
}

impl SearchOutcome {
    /// Ranked documents, or an empty list for [`SearchOutcome::NoCandidates`].
    pub fn into_documents(self) -> Vec<RankedDocument> {
        match self {
            SearchOutcome::Ranked(docs) => docs,
            SearchOutcome::NoCandidates => Vec::new(),
        }
    }

    /// Whether no document was returned.
    pub fn is_empty(&self) -> bool {
        match self {
            SearchOutcome::Ranked(docs) => docs.is_empty(),
            SearchOutcome::NoCandidates => true,
        }
    }
}

/// Transient exact index over a subset of store rows.
///
/// Vectors are copied into one contiguous buffer, so building costs
/// O(|rows|·d) and a query scans every row once.
pub(crate) struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
    rows: Vec<usize>,
}

impl FlatL2Index {
    pub(crate) fn with_capacity(dimension: usize, capacity: usize) -> Self {
        Self {
            dimension,
            data: Vec::with_capacity(dimension * capacity),
            rows: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn add(&mut self, row: usize, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dimension);
        self.data.extend_from_slice(vector);
        self.rows.push(row);
    }

    /// Top-`k` `(row, squared distance)` pairs, closest first; ties keep row order.
    pub(crate) fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .zip(self.rows.iter().copied())
            .map(|(v, row)| (row, squared_l2(query, v)))
            .collect();

        scored.sort_by(|a, b| {
            a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
