//! Deterministic local embedder.
//!
//! Hashes character trigrams into a fixed-dimension L2-normalized vector.
//! No model weights, no network: selection keeps working offline, and texts
//! sharing vocabulary still land near each other. This is the default
//! embedder for the CLI and the degraded-mode story in tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use examforge_core::traits::EmbeddingProvider;

/// Default vector dimension.
pub const DEFAULT_DIMENSION: usize = 256;

/// Trigram-hashing embedding provider.
pub struct LocalEmbeddingProvider {
    dimension: usize,
}

impl LocalEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }
}

impl Default for LocalEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];

        let normalized: Vec<char> = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        for window in normalized.windows(3) {
            if window.iter().all(|c| *c == ' ') {
                continue;
            }
            let trigram: String = window.iter().collect();
            vector[bucket(&trigram, self.dimension)] += 1.0;
        }

        // Very short texts have no trigram; fall back to single characters.
        if vector.iter().all(|v| *v == 0.0) {
            for c in normalized.iter().filter(|c| **c != ' ') {
                vector[bucket(&c.to_string(), self.dimension)] += 1.0;
            }
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn bucket(gram: &str, dimension: usize) -> usize {
    let digest = Sha256::digest(gram.as_bytes());
    let raw = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    raw as usize % dimension
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
