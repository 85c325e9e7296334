use crate::persist;
use serde_json::Value;
use smartpick_core::{SmartpickError, SmartpickResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result payloads keyed by query id, in one JSON document.
pub struct PayloadStore {
    path: PathBuf,
    payloads: BTreeMap<String, Value>,
    open: bool,
}

impl PayloadStore {
    /// Open the store at `path`, creating an empty one if absent.
    pub fn open(path: impl Into<PathBuf>) -> SmartpickResult<Self> {
        let path = path.into();
        let payloads: BTreeMap<String, Value> = persist::load_or_create(&path, "payload store")?;
        debug!(path = %path.display(), payloads = payloads.len(), "payload store opened");
        Ok(Self {
            path,
            payloads,
            open: true,
        })
    }

    /// Mark the store closed.
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Re-read payloads from disk. No-op when already open.
    pub fn reopen(&mut self) -> SmartpickResult<()> {
        if !self.open {
            self.payloads = persist::load_or_create(&self.path, "payload store")?;
            self.open = true;
        }
        Ok(())
    }

    /// Whether the store accepts access.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store `payload` under `query_id`, replacing any previous one.
    pub fn put(&mut self, query_id: &str, payload: Value) -> SmartpickResult<()> {
        self.ensure_open()?;
        self.payloads.insert(query_id.to_string(), payload);
        persist::write_atomic(&self.path, &self.payloads)
    }

    /// Payload stored under `query_id`.
    pub fn get(&self, query_id: &str) -> SmartpickResult<Option<&Value>> {
        self.ensure_open()?;
        Ok(self.payloads.get(query_id))
    }

    /// Number of stored payloads.
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Whether no payload is stored.
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    fn ensure_open(&self) -> SmartpickResult<()> {
        if !self.open {
            return Err(SmartpickError::Precondition(format!(
                "Payload store '{}' is closed; call reopen() first",
                self.path.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_get_persist() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("payloads.json");
        {
            let mut store = PayloadStore::open(&path).unwrap();
            store.put("q1", json!({"answer": "갤럭시탭 S9"})).unwrap();
            store.put("q1", json!({"answer": "아이패드 에어"})).unwrap();
        }
        let store = PayloadStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("q1").unwrap(), Some(&json!({"answer": "아이패드 에어"})));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_closed_store() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = PayloadStore::open(tmp.path().join("p.json")).unwrap();
        store.close();
        assert!(store.get("q").unwrap_err().is_precondition());
        store.reopen().unwrap();
        assert!(store.is_open());
    }
}
