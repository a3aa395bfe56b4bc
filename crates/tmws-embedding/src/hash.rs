use async_trait::async_trait;

use crate::provider::EmbeddingProvider;
use tmws_core::Result;

/// Deterministic feature-hashing embedder.
///
/// Each lowercased token is hashed with blake3 into a bucket of the
/// output vector, and the vector is L2-normalised. Texts sharing tokens
/// get positive cosine similarity, which is enough for development and
/// for exercising the retrieval path without a model server.
pub struct HashEmbedding {
    dims: usize,
}

impl HashEmbedding {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let bucket = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"))
                as usize
                % self.dims;
            // Second hash byte decides the sign so buckets don't only
            // accumulate positive mass.
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign;
        }
        l2_normalize(&mut vec);
        vec
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "feature-hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[test]
    fn deterministic() {
        let h = HashEmbedding::new(64);
        assert_eq!(h.embed_one("hello world"), h.embed_one("hello world"));
    }

    #[test]
    fn normalised() {
        let h = HashEmbedding::new(64);
        let v = h.embed_one("some text with several tokens");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_tokens_score_higher() {
        let h = HashEmbedding::new(384);
        let a = h.embed_one("Project Apollo kickoff");
        let b = h.embed_one("apollo launch");
        let c = h.embed_one("grocery shopping list");
        let sim_ab = cosine_similarity(&a, &b);
        let sim_ac = cosine_similarity(&a, &c);
        assert!(sim_ab > 0.2, "shared token should give similarity > 0.2, got {sim_ab}");
        assert!(sim_ab > sim_ac);
    }

    #[test]
    fn case_insensitive_tokens() {
        let h = HashEmbedding::new(128);
        assert_eq!(h.embed_one("APOLLO"), h.embed_one("apollo"));
    }
}
