use crate::embedding::EmbeddingProvider;
use crate::scope::{ScopedHandle, SearchOutcome};
use crate::store::PersistentVectorStore;
use smartpick_core::{SmartpickError, SmartpickResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Retriever adapter: embeds free text and searches the current scope.
///
/// A scope is valid for exactly one retrieval. [`retrieve`](Self::retrieve)
/// takes the handle out of the adapter, so a second query without a fresh
/// [`set_scope`](Self::set_scope) fails instead of silently searching the
/// previous query's universe.
pub struct ScopedRetriever<'a> {
    store: &'a PersistentVectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    k: usize,
    scope: Option<ScopedHandle>,
}

impl<'a> ScopedRetriever<'a> {
    /// Retriever returning up to `k` documents per query, with no scope set.
    pub fn new(store: &'a PersistentVectorStore, embedder: Arc<dyn EmbeddingProvider>, k: usize) -> Self {
        Self {
            store,
            embedder,
            k,
            scope: None,
        }
    }

    /// Install the scope for the next retrieval, replacing any unused one.
    pub fn set_scope(&mut self, handle: ScopedHandle) {
        if self.scope.replace(handle).is_some() {
            debug!("replaced unused scope");
        }
    }

    /// Whether a scope is installed for the next retrieval.
    pub fn has_scope(&self) -> bool {
        self.scope.is_some()
    }

    /// Documents returned per retrieval.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Embed `query` and return the `k` nearest rows of the current scope.
    ///
    /// Fails with a precondition error when no scope was set for this query.
    pub async fn retrieve(&mut self, query: &str) -> SmartpickResult<SearchOutcome> {
        let handle = self.scope.take().ok_or_else(|| {
            SmartpickError::Precondition(
                "No scope set for this query; call scope() and set_scope() first".to_string(),
            )
        })?;

        if handle.is_empty() {
            info!("retrieval skipped: scope has no candidates");
            return Ok(SearchOutcome::NoCandidates);
        }

        let vector = self.embedder.embed(query).await?;
        let outcome = self.store.search(&handle, &vector, self.k)?;
        debug!(
            scoped = handle.len(),
            returned = outcome_len(&outcome),
            "scoped retrieval complete"
        );
        Ok(outcome)
    }
}

fn outcome_len(outcome: &SearchOutcome) -> usize {
    match outcome {
        SearchOutcome::Ranked(docs) => docs.len(),
        SearchOutcome::NoCandidates => 0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::batch::StagingBatch;
    use crate::embedding::LocalEmbedding;
    use crate::scope::Selector;

    async fn seeded_store(dir: &std::path::Path) -> PersistentVectorStore {
        let embedder = LocalEmbedding::new(32);
        let mut store = PersistentVectorStore::open(dir.join("v.jsonl"), 32).unwrap();
        let mut batch = StagingBatch::new(32);
        batch
            .stage_text(&embedder, "v1", 0, "아이패드 드로잉 필기 후기")
            .await
            .unwrap();
        batch
            .stage_text(&embedder, "v2", 0, "갤럭시탭 배터리 수명 테스트")
            .await
            .unwrap();
        store.flush(batch).unwrap();
        store
    }

    #[tokio::test]
    async fn test_retrieve_without_scope_is_precondition() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path()).await;
        let mut retriever = ScopedRetriever::new(&store, Arc::new(LocalEmbedding::new(32)), 2);
        let err = retriever.retrieve("드로잉").await.unwrap_err();
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn test_scope_is_consumed_per_query() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path()).await;
        let keys = vec!["v1".to_string()];
        let pages = vec![0];
        let handle = store
            .scope(Selector::Pairs { metadata: &keys, pages: &pages })
            .unwrap();

        let mut retriever = ScopedRetriever::new(&store, Arc::new(LocalEmbedding::new(32)), 5);
        retriever.set_scope(handle);
        let docs = retriever.retrieve("배터리").await.unwrap().into_documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document.metadata.index, "v1");

        assert!(!retriever.has_scope());
        assert!(retriever.retrieve("배터리").await.unwrap_err().is_precondition());
    }

    #[tokio::test]
    async fn test_empty_scope_yields_no_candidates() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path()).await;
        let keys = vec!["missing".to_string()];
        let pages = vec![0];
        let handle = store
            .scope(Selector::Pairs { metadata: &keys, pages: &pages })
            .unwrap();

        let mut retriever = ScopedRetriever::new(&store, Arc::new(LocalEmbedding::new(32)), 5);
        retriever.set_scope(handle);
        assert_eq!(
            retriever.retrieve("아무거나").await.unwrap(),
            SearchOutcome::NoCandidates
        );
    }

    #[tokio::test]
    async fn test_embedder_dimension_mismatch_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path()).await;
        let keys = vec!["v1".to_string()];
        let pages = vec![0];
        let handle = store
            .scope(Selector::Pairs { metadata: &keys, pages: &pages })
            .unwrap();

        let mut retriever = ScopedRetriever::new(&store, Arc::new(LocalEmbedding::new(16)), 5);
        retriever.set_scope(handle);
        assert!(retriever.retrieve("드로잉 필기").await.unwrap_err().is_config());
    }
}
