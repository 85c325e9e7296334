use crate::embedding::EmbeddingProvider;
use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use smartpick_core::{SmartpickError, SmartpickResult};

/// One row destined for (or loaded from) the persistent store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Embedding, one float per dimension.
    pub vector: Vec<f32>,
    /// Source identifier, e.g. a video or review id.
    pub metadata: String,
    /// Page or chunk number within the source.
    pub page: i64,
    /// Chunk text.
    pub text: String,
}

impl VectorRecord {
    /// Build a record.
    pub fn new(
        vector: Vec<f32>,
        metadata: impl Into<String>,
        page: i64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            vector,
            metadata: metadata.into(),
            page,
            text: text.into(),
        }
    }

    /// Upsert key of this record.
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of(&self.metadata, self.page)
    }
}

/// In-memory, not-yet-persisted bundle of rows awaiting a flush.
///
/// Columns are kept parallel: index `i` of `vectors`, `metadata`, `pages`
/// and `texts` all describe the same row. Every vector has the batch
/// dimension, which must equal the store's when flushed.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingBatch {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<String>,
    pages: Vec<i64>,
    texts: Vec<String>,
}

impl StagingBatch {
    /// Create an empty batch for vectors of `dimension` floats.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            metadata: Vec::new(),
            pages: Vec::new(),
            texts: Vec::new(),
        }
    }

    /// Stage parallel columns.
    ///
    /// All four columns must have the same length, and every vector must have
    /// the batch dimension with only finite components. Nothing is staged
    /// when validation fails.
    pub fn stage(
        &mut self,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<String>,
        pages: Vec<i64>,
        texts: Vec<String>,
    ) -> SmartpickResult<()> {
        let n = vectors.len();
        if metadata.len() != n || pages.len() != n || texts.len() != n {
            return Err(SmartpickError::InvalidRecord(format!(
                "Column length mismatch: vectors={}, metadata={}, page={}, text={}",
                n,
                metadata.len(),
                pages.len(),
                texts.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(SmartpickError::Config(format!(
                "Vector dimension mismatch: batch expects {}, got {}",
                self.dimension,
                bad.len()
            )));
        }
        if let Some(row) = vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
            return Err(SmartpickError::InvalidRecord(format!(
                "Vector for '{}' page {} has a non-finite component",
                metadata[row], pages[row]
            )));
        }

        self.vectors.extend(vectors);
        self.metadata.extend(metadata);
        self.pages.extend(pages);
        self.texts.extend(texts);
        Ok(())
    }

    /// Stage a single record.
    pub fn push(&mut self, record: VectorRecord) -> SmartpickResult<()> {
        self.stage(
            vec![record.vector],
            vec![record.metadata],
            vec![record.page],
            vec![record.text],
        )
    }

    /// Stage many records.
    pub fn extend(&mut self, records: impl IntoIterator<Item = VectorRecord>) -> SmartpickResult<()> {
        for record in records {
            self.push(record)?;
        }
        Ok(())
    }

    /// Embed `text` with `embedder` and stage it as one row.
    pub async fn stage_text(
        &mut self,
        embedder: &dyn EmbeddingProvider,
        metadata: impl Into<String>,
        page: i64,
        text: &str,
    ) -> SmartpickResult<()> {
        let vector = embedder.embed(text).await?;
        self.push(VectorRecord::new(vector, metadata, page, text))
    }

    /// Dimension every staged vector has.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of staged rows.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// `(metadata, page)` pairs in staging order.
    pub fn keys(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.metadata
            .iter()
            .map(String::as_str)
            .zip(self.pages.iter().copied())
    }

    /// Content hashes of every staged row, in staging order.
    pub fn hashes(&self) -> Vec<ContentHash> {
        self.keys()
            .map(|(metadata, page)| ContentHash::of(metadata, page))
            .collect()
    }

    /// Borrow row `i`.
    pub fn get(&self, i: usize) -> Option<(&[f32], &str, i64, &str)> {
        Some((
            self.vectors.get(i)?.as_slice(),
            self.metadata.get(i)?.as_str(),
            *self.pages.get(i)?,
            self.texts.get(i)?.as_str(),
        ))
    }

    /// Consume the batch into records, in staging order.
    pub fn into_records(self) -> Vec<VectorRecord> {
        self.vectors
            .into_iter()
            .zip(self.metadata)
            .zip(self.pages)
            .zip(self.texts)
            .map(|(((vector, metadata), page), text)| VectorRecord {
                vector,
                metadata,
                page,
                text,
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::embedding::LocalEmbedding;

    #[test]
    fn test_stage_columns() {
        let mut batch = StagingBatch::new(2);
        batch
            .stage(
                vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                vec!["a".into(), "b".into()],
                vec![0, 1],
                vec!["first".into(), "second".into()],
            )
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(1), Some((&[0.0f32, 1.0][..], "b", 1, "second")));
    }

    #[test]
    fn test_stage_length_mismatch_rejected() {
        let mut batch = StagingBatch::new(2);
        let err = batch
            .stage(
                vec![vec![1.0, 0.0]],
                vec!["a".into(), "b".into()],
                vec![0],
                vec!["t".into()],
            )
            .unwrap_err();
        assert!(matches!(err, SmartpickError::InvalidRecord(_)));
        assert!(batch.is_empty(), "failed stage must not leave partial rows");
    }

    #[test]
    fn test_stage_dimension_mismatch_rejected() {
        let mut batch = StagingBatch::new(3);
        let err = batch
            .push(VectorRecord::new(vec![1.0, 0.0], "a", 0, "t"))
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_non_finite_component_rejected() {
        let mut batch = StagingBatch::new(2);
        batch.push(VectorRecord::new(vec![0.5, 0.5], "ok", 0, "t")).unwrap();

        let err = batch
            .push(VectorRecord::new(vec![f32::NAN, 1.0], "a", 0, "t"))
            .unwrap_err();
        assert!(matches!(err, SmartpickError::InvalidRecord(_)));

        let err = batch
            .extend([
                VectorRecord::new(vec![1.0, 1.0], "b", 0, "t"),
                VectorRecord::new(vec![f32::INFINITY, 0.0], "c", 0, "t"),
            ])
            .unwrap_err();
        assert!(matches!(err, SmartpickError::InvalidRecord(_)));
        assert!(err.to_string().contains("'c'"));

        // Rows staged before the bad one stay; the bad one never lands.
        assert_eq!(batch.len(), 2);
        assert!(batch.into_records().iter().all(|r| r.vector.iter().all(|x| x.is_finite())));
    }

    #[test]
    fn test_hashes_follow_keys() {
        let mut batch = StagingBatch::new(1);
        batch.push(VectorRecord::new(vec![1.0], "x", 4, "t")).unwrap();
        assert_eq!(batch.hashes(), vec![ContentHash::of("x", 4)]);
        assert_eq!(batch.keys().collect::<Vec<_>>(), vec![("x", 4)]);
    }

    #[test]
    fn test_into_records_preserves_order() {
        let mut batch = StagingBatch::new(1);
        batch.push(VectorRecord::new(vec![1.0], "x", 0, "one")).unwrap();
        batch.push(VectorRecord::new(vec![2.0], "y", 1, "two")).unwrap();
        let records = batch.into_records();
        assert_eq!(records[0].text, "one");
        assert_eq!(records[1].metadata, "y");
    }

    #[tokio::test]
    async fn test_stage_text_embeds() {
        let embedder = LocalEmbedding::new(8);
        let mut batch = StagingBatch::new(8);
        batch
            .stage_text(&embedder, "video-1", 0, "갤럭시탭 S펜 필기감 리뷰")
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        let (vector, metadata, _, text) = batch.get(0).unwrap();
        assert_eq!(vector.len(), 8);
        assert_eq!(metadata, "video-1");
        assert_eq!(text, "갤럭시탭 S펜 필기감 리뷰");
    }
}
