//! Unit-normalised embedding vectors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default dimensionality of screen and label embeddings.
pub const EMBEDDING_DIM: usize = 512;

/// Errors building or comparing embeddings.
#[derive(Debug, Error, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding is empty")]
    Empty,
    #[error("embedding contains non-finite values")]
    NonFinite,
    #[error("embedding has zero norm")]
    ZeroNorm,
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding blob length {0} is not a multiple of 4")]
    BadBlob(usize),
}

/// A vector normalised to unit length at construction.
///
/// Every embedding that reaches the change detector or classifier goes
/// through [`Embedding::normalized`], so similarity is a plain dot product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Normalise `values` to unit length.
    pub fn normalized(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite);
        }

        let norm = values
            .iter()
            .map(|&v| (v as f64) * (v as f64))
            .sum::<f64>()
            .sqrt();
        if norm <= f64::EPSILON {
            return Err(EmbeddingError::ZeroNorm);
        }

        Ok(Self(
            values.into_iter().map(|v| (v as f64 / norm) as f32).collect(),
        ))
    }

    /// Normalise and check the dimension in one step.
    pub fn with_dim(values: Vec<f32>, dim: usize) -> Result<Self, EmbeddingError> {
        if values.len() != dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dim,
                actual: values.len(),
            });
        }
        Self::normalized(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Dot product, which is cosine similarity for unit vectors.
    pub fn dot(&self, other: &Embedding) -> Result<f32, EmbeddingError> {
        self.check_dim(other)?;
        let sum: f64 = self
            .0
            .iter()
            .zip(&other.0)
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        Ok(sum as f32)
    }

    /// Euclidean distance.
    ///
    /// Summed from per-component differences rather than `2 - 2·dot`, which
    /// cancels badly when the vectors are nearly identical.
    pub fn distance(&self, other: &Embedding) -> Result<f32, EmbeddingError> {
        self.check_dim(other)?;
        let sum: f64 = self
            .0
            .iter()
            .zip(&other.0)
            .map(|(&a, &b)| {
                let d = a as f64 - b as f64;
                d * d
            })
            .sum();
        Ok(sum.sqrt() as f32)
    }

    /// Little-endian `f32` blob for storage.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() * std::mem::size_of::<f32>());
        for value in &self.0 {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Decode a stored blob. The values are re-normalised.
    pub fn from_blob(blob: &[u8]) -> Result<Self, EmbeddingError> {
        if blob.len() % 4 != 0 {
            return Err(EmbeddingError::BadBlob(blob.len()));
        }
        let values = blob
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::normalized(values)
    }

    fn check_dim(&self, other: &Embedding) -> Result<(), EmbeddingError> {
        if self.0.len() != other.0.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.0.len(),
                actual: other.0.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = EmbeddingError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::normalized(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let e = Embedding::normalized(vec![3.0, 4.0]).unwrap();
        assert!((e.as_slice()[0] - 0.6).abs() < 1e-6);
        assert!((e.as_slice()[1] - 0.8).abs() < 1e-6);
        assert!((e.dot(&e).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_degenerate_vectors() {
        assert_eq!(Embedding::normalized(vec![]), Err(EmbeddingError::Empty));
        assert_eq!(
            Embedding::normalized(vec![0.0, 0.0]),
            Err(EmbeddingError::ZeroNorm)
        );
        assert_eq!(
            Embedding::normalized(vec![f32::NAN, 1.0]),
            Err(EmbeddingError::NonFinite)
        );
        assert_eq!(
            Embedding::with_dim(vec![1.0, 0.0], 3),
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_distance_extremes() {
        let a = Embedding::normalized(vec![1.0, 0.0, 0.0]).unwrap();
        let b = Embedding::normalized(vec![0.0, 1.0, 0.0]).unwrap();
        assert_eq!(a.distance(&a).unwrap(), 0.0);
        assert!((a.distance(&b).unwrap() - std::f32::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_dimensions() {
        let a = Embedding::normalized(vec![1.0, 0.0]).unwrap();
        let b = Embedding::normalized(vec![1.0, 0.0, 0.0]).unwrap();
        assert!(a.dot(&b).is_err());
        assert!(a.distance(&b).is_err());
    }

    #[test]
    fn test_blob_round_trip() {
        let e = Embedding::normalized(vec![0.25, -0.5, 1.0, 2.0]).unwrap();
        let decoded = Embedding::from_blob(&e.to_blob()).unwrap();
        assert!(e.distance(&decoded).unwrap() < 1e-6);
        assert_eq!(Embedding::from_blob(&[0, 1, 2]), Err(EmbeddingError::BadBlob(3)));
    }
}
