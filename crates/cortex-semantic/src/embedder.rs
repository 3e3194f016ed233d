//! The `Embedder` collaborator interface (spec §6.1): text to fixed-dimension
//! vector, batched, with a declared dimension that every collection must
//! honour for its lifetime (spec §3.2 invariant).

use async_trait::async_trait;
use cortex_core::error::{CortexError, Result};
use sha2::{Digest, Sha256};

use crate::types::Vector;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Declared dimension. Stable for the lifetime of the embedder instance.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vector>;

    /// Default batch impl calls `embed` sequentially; backends with a real
    /// batch endpoint (the remote embedder) override this.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// `embedding.mode=local`: a hash-based embedder with no external
/// dependency, used for tests and for deployments without a model service.
/// Deterministic (same text always yields the same vector) and
/// dimension-stable, which is all the spec requires of an embedder — it
/// makes no claim about the quality of local-mode embeddings.
pub struct DeterministicEmbedder {
    dimension: usize,
}

impl DeterministicEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for DeterministicEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vector> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut counter: u32 = 0;
        let mut offset = 0usize;
        while offset < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks(4) {
                if offset >= self.dimension {
                    break;
                }
                let mut buf = [0u8; 4];
                buf[..chunk.len()].copy_from_slice(chunk);
                let as_u32 = u32::from_le_bytes(buf);
                vector[offset] = (as_u32 as f32 / u32::MAX as f32) * 2.0 - 1.0;
                offset += 1;
            }
            counter += 1;
        }
        Ok(vector)
    }
}

/// `embedding.mode=remote`: an HTTP embedding service, called with at most
/// `batch_size` items per request (spec §4.3.4 step 3 / §5 semaphore).
pub struct RemoteEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    dimension: usize,
    batch_size: usize,
}

impl RemoteEmbedder {
    pub fn new(url: String, api_key: Option<String>, dimension: usize, batch_size: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            dimension,
            batch_size: batch_size.max(1),
        }
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "input": texts }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CortexError::unavailable(format!("embedder request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(CortexError::unavailable(format!(
                "embedder returned status {}",
                response.status()
            )));
        }
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CortexError::unavailable(format!("embedder response decode failed: {e}")))?;
        Ok(body.embeddings)
    }
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vector>,
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vector> {
        let mut vectors = self.request(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| CortexError::unavailable("embedder returned no vectors"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.request(batch).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_embedder_is_stable_and_dimension_correct() {
        let embedder = DeterministicEmbedder::new(64);
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn deterministic_embedder_differs_across_inputs() {
        let embedder = DeterministicEmbedder::new(32);
        let a = embedder.embed("alpha").await.unwrap();
        let b = embedder.embed("beta").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn default_batch_impl_embeds_each_text() {
        let embedder = DeterministicEmbedder::new(16);
        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("a").await.unwrap());
    }
}
