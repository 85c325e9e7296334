use async_trait::async_trait;
use smartpick_core::{SmartpickError, SmartpickResult};
use std::collections::HashMap;

/// Trait for computing text embeddings (vector representations).
///
/// Implementations wrap a hosted or local model. The store never calls this
/// directly; the retriever adapter and two-stage retrieval do, and any
/// dimension disagreement with the store surfaces at search time.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute embedding vector for a single text.
    async fn embed(&self, text: &str) -> SmartpickResult<Vec<f32>>;

    /// Compute embeddings for a batch of texts.
    async fn embed_batch(&self, texts: &[&str]) -> SmartpickResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimension of the embedding vectors produced by this provider.
    fn dimension(&self) -> usize;
}

/// Local hashed bag-of-words embedding (no external API needed).
///
/// Deterministic, so it doubles as the provider for tests and for offline
/// ingestion from the CLI. Replace with a hosted model in production.
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    /// Provider producing `dimension`-float vectors.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> SmartpickResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(SmartpickError::Embedding(
                "Cannot embed empty text".to_string(),
            ));
        }
        if self.dimension == 0 {
            return Err(SmartpickError::Config(
                "Embedding dimension must be greater than zero".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        // Hangul syllables are single chars, so count chars rather than bytes.
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 1)
            .collect();

        let mut freq: HashMap<&str, f32> = HashMap::new();
        for word in &words {
            *freq.entry(word).or_insert(0.0) += 1.0;
        }

        let total = words.len() as f32;
        if total == 0.0 {
            return Ok(vector);
        }

        for (word, count) in &freq {
            let tf = count / total;
            let hash1 = fnv1a(word.as_bytes()) as usize;
            let hash2 = fnv1a(&[word.as_bytes(), &[1u8]].concat()) as usize;
            let hash3 = fnv1a(&[word.as_bytes(), &[2u8]].concat()) as usize;

            vector[hash1 % self.dimension] += tf;
            vector[hash2 % self.dimension] += tf * 0.7;
            vector[hash3 % self.dimension] += tf * 0.5;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// FNV-1a, 32-bit.
fn fnv1a(data: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_embedding_dimension() {
        let emb = LocalEmbedding::new(128);
        assert_eq!(emb.dimension(), 128);
        let vec = emb.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), 128);
    }

    #[tokio::test]
    async fn test_local_embedding_normalized() {
        let emb = LocalEmbedding::default();
        let vec = emb.embed("배터리 오래가는 태블릿 추천").await.unwrap();
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_local_embedding_similar_texts() {
        let emb = LocalEmbedding::default();
        let v1 = emb.embed("아이패드 드로잉 필기 추천").await.unwrap();
        let v2 = emb.embed("아이패드 드로잉 태블릿").await.unwrap();
        let v3 = emb.embed("노트북 배터리 성능 비교").await.unwrap();

        let sim_12 = dot(&v1, &v2);
        let sim_13 = dot(&v1, &v3);
        assert!(
            sim_12 > sim_13,
            "sim(drawing-drawing)={sim_12} should be > sim(drawing-laptop)={sim_13}"
        );
    }

    #[tokio::test]
    async fn test_local_embedding_empty() {
        let emb = LocalEmbedding::default();
        assert!(matches!(
            emb.embed("   ").await,
            Err(SmartpickError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_local_embedding_deterministic() {
        let emb = LocalEmbedding::default();
        let v1 = emb.embed("test input").await.unwrap();
        let v2 = emb.embed("test input").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let emb = LocalEmbedding::new(16);
        let vecs = emb.embed_batch(&["hello there", "world peace"]).await.unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[0].len(), 16);
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }
}
