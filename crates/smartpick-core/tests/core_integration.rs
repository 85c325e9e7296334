#![allow(clippy::unwrap_used, clippy::expect_used)]

use smartpick_core::*;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// 1. Config file round trip through disk
// ---------------------------------------------------------------------------

#[test]
fn config_load_from_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("smartpick.toml");
    std::fs::write(
        &path,
        r#"
        data_dir = "store"

        [store]
        file = "yt_vectors.jsonl"
        dimension = 1536

        [cache]
        index_file = "yt_keywords.json"
        max_results = 3

        [retrieval]
        must_have = ["태블릿", "아이패드"]
        max_age_days = 365
        "#,
    )
    .unwrap();

    let config = SmartpickConfig::load(&path).unwrap();
    assert_eq!(config.store.dimension, 1536);
    assert_eq!(config.cache.max_results, 3);
    assert_eq!(config.retrieval.must_have.len(), 2);
    assert_eq!(config.retrieval.max_age_days, 365);
    assert_eq!(
        config.resolve(&config.cache.index_file),
        PathBuf::from("store/yt_keywords.json")
    );
    // Untouched fields keep their defaults.
    assert_eq!(config.cache.payload_file, PathBuf::from("payloads.json"));
    assert_eq!(config.retrieval.k, 5);
}

// ---------------------------------------------------------------------------
// 2. Error classification and display
// ---------------------------------------------------------------------------

#[test]
fn error_classification() {
    let config = SmartpickError::Config("dimension mismatch: store 4, query 3".into());
    assert!(config.is_config());
    assert!(!config.is_precondition());
    assert_eq!(
        config.to_string(),
        "Config error: dimension mismatch: store 4, query 3"
    );

    let pre = SmartpickError::Precondition("no scope".into());
    assert!(pre.is_precondition());
    assert_eq!(pre.to_string(), "Precondition failed: no scope");
}

#[test]
fn error_from_io_and_json() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: SmartpickError = io.into();
    assert!(matches!(err, SmartpickError::Io(_)));

    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err: SmartpickError = json_err.into();
    assert!(matches!(err, SmartpickError::Json(_)));
    assert!(err.to_string().starts_with("JSON error:"));
}
