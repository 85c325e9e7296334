use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use smartpick_memory::{EmbeddingProvider, StagingBatch, TaggedDocument, VectorRecord};
use std::path::Path;

/// One line of an ingest file.
///
/// `vector` is optional; missing vectors are computed with the configured
/// embedding provider. `tags` feed the stage-1 tag table.
#[derive(Debug, Deserialize)]
pub struct IngestRecord {
    pub metadata: String,
    #[serde(default)]
    pub page: i64,
    pub text: String,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// Parse a JSON-lines ingest file, skipping blank lines.
pub fn read_records(path: &Path) -> anyhow::Result<Vec<IngestRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ingest file '{}'", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid ingest record", path.display(), idx + 1))
        })
        .collect()
}

/// Stage records for a flush and collect their tag entries.
pub async fn stage_records(
    records: Vec<IngestRecord>,
    embedder: &dyn EmbeddingProvider,
    dimension: usize,
) -> anyhow::Result<(StagingBatch, Vec<TaggedDocument>)> {
    let mut batch = StagingBatch::new(dimension);
    let mut tagged = Vec::new();

    for record in records {
        if !record.tags.is_empty() {
            let mut doc = TaggedDocument::new(record.metadata.clone(), record.page, record.tags);
            doc.published_at = record.published_at;
            tagged.push(doc);
        }
        let vector = match record.vector {
            Some(vector) => vector,
            None => embedder
                .embed(&record.text)
                .await
                .with_context(|| format!("Failed to embed '{}' page {}", record.metadata, record.page))?,
        };
        batch.push(VectorRecord::new(vector, record.metadata, record.page, record.text))?;
    }
    Ok((batch, tagged))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use smartpick_memory::LocalEmbedding;

    #[test]
    fn test_read_records_skips_blank_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("in.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"metadata":"v1","text":"아이패드 드로잉 후기","tags":["태블릿","드로잉"]}"#,
                "\n\n",
                r#"{"metadata":"v2","page":3,"text":"t","vector":[0.0,1.0]}"#,
                "\n"
            ),
        )
        .unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].page, 0);
        assert_eq!(records[1].page, 3);
        assert_eq!(records[1].vector.as_deref(), Some(&[0.0, 1.0][..]));
    }

    #[test]
    fn test_read_records_reports_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.jsonl");
        std::fs::write(&path, "{\"metadata\":\"v1\",\"text\":\"ok\"}\n{oops}\n").unwrap();
        let err = read_records(&path).unwrap_err();
        assert!(format!("{err}").contains(":2:"));
    }

    #[tokio::test]
    async fn test_stage_records_embeds_missing_vectors() {
        let embedder = LocalEmbedding::new(8);
        let records = vec![
            IngestRecord {
                metadata: "v1".into(),
                page: 0,
                text: "갤럭시탭 배터리 리뷰".into(),
                vector: None,
                tags: vec!["태블릿".into()],
                published_at: None,
            },
            IngestRecord {
                metadata: "v2".into(),
                page: 0,
                text: "given".into(),
                vector: Some(vec![0.5; 8]),
                tags: Vec::new(),
                published_at: None,
            },
        ];

        let (batch, tagged) = stage_records(records, &embedder, 8).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(1).unwrap().0, &[0.5; 8][..]);
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].key.metadata, "v1");
    }

    #[tokio::test]
    async fn test_stage_records_rejects_wrong_dimension() {
        let embedder = LocalEmbedding::new(8);
        let records = vec![IngestRecord {
            metadata: "v".into(),
            page: 0,
            text: "t".into(),
            vector: Some(vec![1.0; 3]),
            tags: Vec::new(),
            published_at: None,
        }];
        assert!(stage_records(records, &embedder, 8).await.is_err());
    }
}
