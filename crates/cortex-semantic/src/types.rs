//! Shared vector-math helpers and the wire shapes for vector-store results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A dense embedding. Cortex never quantises or sparsifies vectors; the
/// spec only requires fixed-dimension dense retrieval.
pub type Vector = Vec<f32>;

/// One hit from `VectorStore::search`, joined by the caller against
/// DocStore records by `id` (spec §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    /// Cosine similarity in `[0, 1]`.
    pub score: f32,
    pub metadata: HashMap<String, Value>,
}

/// Cosine similarity, rescaled from `[-1, 1]` to `[0, 1]` as the spec
/// requires VectorStore scores to land in `[0, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cos = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    (cos + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_half() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors_score_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }
}
