use crate::keywords::TierMatch;
use crate::persist;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartpick_core::{SmartpickError, SmartpickResult};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Forward-index entry for one stored query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    /// The question as asked.
    pub query_text: String,
    /// Extracted, canonical keywords.
    pub keywords: BTreeSet<String>,
    /// Keywords grouped by vocabulary category.
    pub category: BTreeMap<String, Vec<String>>,
    /// Keywords grouped by popularity tier.
    pub tier: TierMatch,
    /// When the query was stored.
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Postings {
    keyword: String,
    query_ids: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDocument {
    #[serde(default)]
    queries: BTreeMap<String, QueryRecord>,
    /// Keyed by the hex encoding of the keyword's UTF-8 bytes.
    #[serde(default)]
    keywords: BTreeMap<String, Postings>,
}

/// Persisted inverted index `keyword → [query id]` plus forward store
/// `query id → QueryRecord`.
///
/// Backed by one JSON document, rewritten atomically after every mutation.
/// Single writer only.
pub struct IndexStorage {
    path: PathBuf,
    doc: IndexDocument,
    open: bool,
}

impl IndexStorage {
    /// Open the index at `path`, creating an empty one if absent.
    pub fn open(path: impl Into<PathBuf>) -> SmartpickResult<Self> {
        let path = path.into();
        let doc: IndexDocument = persist::load_or_create(&path, "keyword index")?;
        info!(
            path = %path.display(),
            queries = doc.queries.len(),
            keywords = doc.keywords.len(),
            "keyword index opened"
        );
        Ok(Self {
            path,
            doc,
            open: true,
        })
    }

    /// Mark the index closed. Every later access except [`reopen`](Self::reopen) fails.
    pub fn close(&mut self) {
        if self.open {
            self.open = false;
            debug!(path = %self.path.display(), "keyword index closed");
        }
    }

    /// Re-read the index from disk. No-op when already open.
    pub fn reopen(&mut self) -> SmartpickResult<()> {
        if !self.open {
            self.doc = persist::load_or_create(&self.path, "keyword index")?;
            self.open = true;
        }
        Ok(())
    }

    /// Whether the index accepts access.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store `record` under `query_id` and index its keywords.
    ///
    /// An existing record with the same id is replaced, not merged, and its
    /// keywords no longer point at the id.
    pub fn add_query(&mut self, query_id: &str, record: QueryRecord) -> SmartpickResult<()> {
        self.ensure_open()?;

        if let Some(previous) = self.doc.queries.remove(query_id) {
            for keyword in previous.keywords.difference(&record.keywords) {
                self.unlink(keyword, query_id);
            }
            debug!(query_id, "replaced existing query record");
        }
        for keyword in &record.keywords {
            self.link(keyword, query_id);
        }
        self.doc.queries.insert(query_id.to_string(), record);
        self.persist()
    }

    /// Point `keyword` at `query_id`. Empty keywords are ignored.
    pub fn add_keyword(&mut self, keyword: &str, query_id: &str) -> SmartpickResult<bool> {
        self.ensure_open()?;
        if keyword.is_empty() {
            return Ok(false);
        }
        self.link(keyword, query_id);
        self.persist()?;
        Ok(true)
    }

    /// Query ids indexed under `keyword`, in insertion order.
    pub fn queries_by_keyword(&self, keyword: &str) -> SmartpickResult<&[String]> {
        self.ensure_open()?;
        Ok(self
            .doc
            .keywords
            .get(&encode_keyword(keyword))
            .map(|p| p.query_ids.as_slice())
            .unwrap_or(&[]))
    }

    /// Forward record stored under `query_id`.
    pub fn query_info(&self, query_id: &str) -> SmartpickResult<Option<&QueryRecord>> {
        self.ensure_open()?;
        Ok(self.doc.queries.get(query_id))
    }

    /// Every stored query id, sorted.
    pub fn all_query_ids(&self) -> SmartpickResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.doc.queries.keys().cloned().collect())
    }

    /// Every indexed keyword.
    pub fn all_keywords(&self) -> SmartpickResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self
            .doc
            .keywords
            .values()
            .map(|p| p.keyword.clone())
            .collect())
    }

    /// Number of stored queries.
    pub fn len(&self) -> usize {
        self.doc.queries.len()
    }

    /// Whether no query is stored.
    pub fn is_empty(&self) -> bool {
        self.doc.queries.is_empty()
    }

    fn link(&mut self, keyword: &str, query_id: &str) {
        let postings = self
            .doc
            .keywords
            .entry(encode_keyword(keyword))
            .or_insert_with(|| Postings {
                keyword: keyword.to_string(),
                query_ids: Vec::new(),
            });
        if !postings.query_ids.iter().any(|id| id == query_id) {
            postings.query_ids.push(query_id.to_string());
        }
    }

    fn unlink(&mut self, keyword: &str, query_id: &str) {
        let key = encode_keyword(keyword);
        if let Some(postings) = self.doc.keywords.get_mut(&key) {
            postings.query_ids.retain(|id| id != query_id);
            if postings.query_ids.is_empty() {
                self.doc.keywords.remove(&key);
            }
        }
    }

    fn persist(&self) -> SmartpickResult<()> {
        persist::write_atomic(&self.path, &self.doc)
    }

    fn ensure_open(&self) -> SmartpickResult<()> {
        if !self.open {
            return Err(SmartpickError::Precondition(format!(
                "Keyword index '{}' is closed; call reopen() first",
                self.path.display()
            )));
        }
        Ok(())
    }
}

fn encode_keyword(keyword: &str) -> String {
    hex::encode(keyword.as_bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(text: &str, keywords: &[&str]) -> QueryRecord {
        QueryRecord {
            query_text: text.to_string(),
            keywords: keywords.iter().map(|s| (*s).to_string()).collect(),
            category: BTreeMap::new(),
            tier: TierMatch::default(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = IndexStorage::open(tmp.path().join("index.json")).unwrap();
        index.add_query("q1", record("배터리 성능", &["배터리", "성능"])).unwrap();
        index.add_query("q2", record("배터리 가격", &["배터리", "가격"])).unwrap();

        assert_eq!(index.queries_by_keyword("배터리").unwrap(), &["q1", "q2"]);
        assert_eq!(index.queries_by_keyword("성능").unwrap(), &["q1"]);
        assert!(index.queries_by_keyword("게임").unwrap().is_empty());
        assert_eq!(index.all_query_ids().unwrap(), vec!["q1", "q2"]);
        assert_eq!(
            index.query_info("q2").unwrap().unwrap().query_text,
            "배터리 가격"
        );
    }

    #[test]
    fn test_overwrite_drops_stale_postings() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = IndexStorage::open(tmp.path().join("index.json")).unwrap();
        index.add_query("q1", record("old", &["배터리", "게임"])).unwrap();
        index.add_query("q1", record("new", &["배터리", "화면"])).unwrap();

        assert!(index.queries_by_keyword("게임").unwrap().is_empty());
        assert_eq!(index.queries_by_keyword("화면").unwrap(), &["q1"]);
        assert_eq!(index.queries_by_keyword("배터리").unwrap(), &["q1"]);
        assert_eq!(index.len(), 1);
        assert!(!index.all_keywords().unwrap().contains(&"게임".to_string()));
    }

    #[test]
    fn test_add_keyword_dedupes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = IndexStorage::open(tmp.path().join("index.json")).unwrap();
        assert!(index.add_keyword("필기", "q1").unwrap());
        assert!(index.add_keyword("필기", "q1").unwrap());
        assert!(!index.add_keyword("", "q1").unwrap());
        assert_eq!(index.queries_by_keyword("필기").unwrap(), &["q1"]);
    }

    #[test]
    fn test_persists_across_open() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.json");
        {
            let mut index = IndexStorage::open(&path).unwrap();
            index.add_query("q1", record("t", &["s펜"])).unwrap();
        }
        let index = IndexStorage::open(&path).unwrap();
        assert_eq!(index.all_keywords().unwrap(), vec!["s펜"]);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains(&hex::encode("s펜")));
    }

    #[test]
    fn test_closed_index_rejects_access() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = IndexStorage::open(tmp.path().join("index.json")).unwrap();
        index.close();
        assert!(index.queries_by_keyword("x").unwrap_err().is_precondition());
        index.reopen().unwrap();
        assert!(index.queries_by_keyword("x").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_index_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(IndexStorage::open(&path).err().unwrap().is_config());
    }
}
