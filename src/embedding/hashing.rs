//! Deterministic feature-hashing embedder.
//!
//! Each lowercased alphanumeric token contributes itself and its padded
//! character trigrams to a fixed number of signed buckets; the result is
//! L2-normalized. Texts sharing vocabulary land close together under cosine
//! similarity, which is enough for offline use and tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::Result;

pub const DEFAULT_DIMS: usize = 384;

pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];

        for token in tokens(text) {
            self.add_feature(&mut v, &token, 2.0);
            let padded: Vec<char> = format!("#{}#", token).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.add_feature(&mut v, &gram, 1.0);
            }
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(first) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-trigram"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[tokio::test]
    async fn test_deterministic_and_sized() {
        let e = HashingEmbedder::new(128);
        let a = e.embed("Fever in newborns").await.unwrap();
        let b = e.embed("Fever in newborns").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let e = HashingEmbedder::new(DEFAULT_DIMS);
        let query = e.embed_one("vaccination schedule for infants");
        let related = e.embed_one("The infant vaccination schedule starts at birth.");
        let unrelated = e.embed_one("Bicycle maintenance and chain lubrication tips.");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_case_insensitive_and_empty() {
        let e = HashingEmbedder::new(32);
        assert_eq!(e.embed_one("Rash"), e.embed_one("rash"));
        assert!(e.embed_one("  ...  ").iter().all(|x| *x == 0.0));
    }
}
