//! Embedding vectors and the embedding capability contract.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{MemoryError, MemoryResult};

/// Wrapper type around an immutable floating-point embedding.
#[derive(Clone, PartialEq)]
pub struct EmbeddingVector {
    values: Arc<[f32]>,
}

impl EmbeddingVector {
    /// Creates a new embedding from owned values.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRecord`] when the supplied vector is empty
    /// or contains non-finite values.
    pub fn new(values: Vec<f32>) -> MemoryResult<Self> {
        if values.is_empty() {
            return Err(MemoryError::InvalidRecord(
                "embedding vector must not be empty",
            ));
        }
        if !values.iter().all(|value| value.is_finite()) {
            return Err(MemoryError::InvalidRecord(
                "embedding vector contains non-finite values",
            ));
        }
        Ok(Self {
            values: Arc::<[f32]>::from(values.into_boxed_slice()),
        })
    }

    /// Returns an immutable view of the embedding data.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Returns the dimensionality of the embedding.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`; [`EmbeddingVector::new`] rejects empty inputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cosine similarity in `[-1, 1]`; `0.0` when either vector has zero norm.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        let denominator = self.magnitude() * other.magnitude();
        if denominator == 0.0 {
            0.0
        } else {
            self.dot(other) / denominator
        }
    }

    fn dot(&self, other: &Self) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    fn magnitude(&self) -> f32 {
        self.values
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt()
    }
}

impl std::fmt::Debug for EmbeddingVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingVector")
            .field("dimensions", &self.len())
            .finish()
    }
}

impl Serialize for EmbeddingVector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.values.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EmbeddingVector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<f32>::deserialize(deserializer)?;
        Self::new(values).map_err(serde::de::Error::custom)
    }
}

/// Capability that turns text into a fixed-length vector.
///
/// Implementations report failures (provider down, rate limited, timed out)
/// as [`MemoryError::EmbeddingUnavailable`].
#[async_trait]
pub trait EmbeddingCapability: Send + Sync {
    /// Dimensionality of every vector this capability returns.
    fn dimensions(&self) -> usize;

    /// Embeds the supplied text.
    async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector>;
}

/// Local bag-of-words embedder using feature hashing.
///
/// Each lowercase alphanumeric token is hashed with FNV-1a into one of
/// `dimensions` buckets and the resulting count vector is L2-normalised. The
/// output depends only on the input text, so identical content always has
/// cosine similarity `1.0` with itself.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: NonZeroUsize,
}

impl HashingEmbedder {
    /// Creates an embedder producing vectors of the given dimensionality.
    #[must_use]
    pub const fn new(dimensions: NonZeroUsize) -> Self {
        Self { dimensions }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let buckets = self.dimensions.get();
        let mut values = vec![0.0_f32; buckets];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            // Modulo keeps the bucket below `buckets`, which is a usize.
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hash % buckets as u64) as usize;
            values[bucket] += 1.0;
        }

        let norm = values.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut values {
                *value /= norm;
            }
        }
        values
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(256).expect("non-zero"))
    }
}

#[async_trait]
impl EmbeddingCapability for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.get()
    }

    async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector> {
        EmbeddingVector::new(self.vectorize(text))
    }
}

fn fnv1a(token: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    token.bytes().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_vectors() {
        let err = EmbeddingVector::new(vec![]).expect_err("empty vector should error");
        assert!(matches!(err, MemoryError::InvalidRecord(_)));
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = EmbeddingVector::new(vec![1.0, f32::NAN]).expect_err("nan not allowed");
        assert!(matches!(err, MemoryError::InvalidRecord(_)));
    }

    #[test]
    fn cosine_of_orthogonal_and_zero_vectors() {
        let x = EmbeddingVector::new(vec![1.0, 0.0]).unwrap();
        let y = EmbeddingVector::new(vec![0.0, 1.0]).unwrap();
        let zero = EmbeddingVector::new(vec![0.0, 0.0]).unwrap();
        assert!(x.cosine_similarity(&y).abs() < f32::EPSILON);
        assert!(x.cosine_similarity(&zero).abs() < f32::EPSILON);
        assert!((x.cosine_similarity(&x) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(NonZeroUsize::new(64).unwrap());
        let a = embedder.embed("I love hiking in the mountains").await.unwrap();
        let b = embedder.embed("i LOVE hiking, in the mountains!").await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn related_text_scores_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed("my cat is called Miso").await.unwrap();
        let related = embedder.embed("tell me about my cat Miso").await.unwrap();
        let unrelated = embedder.embed("quarterly revenue forecast").await.unwrap();
        assert!(query.cosine_similarity(&related) > query.cosine_similarity(&unrelated));
    }
}
