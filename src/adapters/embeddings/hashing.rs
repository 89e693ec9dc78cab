//! Feature-hashing encoder.
//!
//! Deterministic dense vectors built by hashing terms into fixed buckets and
//! weighting by term frequency. Needs no network, so it is the default for
//! the dense stage and the encoder used by tests.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::errors::BackendError;
use crate::domain::models::similarity::tokenize;
use crate::domain::ports::EmbeddingProvider;

/// Local encoder hashing terms into `dimension` buckets.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Encoder producing `dimension`-long vectors (at least 1).
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// FNV-1a bucket for a term.
    fn bucket(term: &str, dimension: usize) -> usize {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in term.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % dimension as u64) as usize
    }

    /// L2-normalised vector; all zeros for text without terms.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vector = vec![0.0f32; self.dimension];
        if tokens.is_empty() {
            return vector;
        }

        let mut counts: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        for (term, count) in counts {
            // longer terms are rarer; a cheap stand-in for idf
            let weight = 1.0 + (term.len() as f32).ln();
            vector[Self::bucket(term, self.dimension)] += count / total * weight;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &'static str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}
