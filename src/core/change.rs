//! Visual change detection between consecutive captures.

use crate::core::embedding::{Embedding, EmbeddingError};

/// Distance below which two captures count as the same screen state.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.01;

/// Compares two capture embeddings against a fixed distance threshold.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    threshold: f32,
}

impl ChangeDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// True when the distance reaches the threshold (inclusive).
    pub fn is_changed(&self, prev: &Embedding, curr: &Embedding) -> Result<bool, EmbeddingError> {
        Ok(self.distance(prev, curr)? >= self.threshold)
    }

    pub fn distance(&self, prev: &Embedding, curr: &Embedding) -> Result<f32, EmbeddingError> {
        prev.distance(curr)
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DISTANCE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(values: &[f32]) -> Embedding {
        Embedding::normalized(values.to_vec()).unwrap()
    }

    #[test]
    fn test_identical_is_unchanged() {
        let detector = ChangeDetector::default();
        let a = unit(&[0.3, 0.4, 0.5, 0.6]);
        assert!(!detector.is_changed(&a, &a.clone()).unwrap());
    }

    #[test]
    fn test_orthogonal_is_changed() {
        let detector = ChangeDetector::new(1.0);
        let a = unit(&[1.0, 0.0]);
        let b = unit(&[0.0, 1.0]);
        assert!(detector.is_changed(&a, &b).unwrap());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let a = unit(&[1.0, 0.0]);
        let b = unit(&[0.0, 1.0]);
        let exact = a.distance(&b).unwrap();

        assert!(ChangeDetector::new(exact).is_changed(&a, &b).unwrap());
        assert!(!ChangeDetector::new(exact + 1e-4).is_changed(&a, &b).unwrap());
    }

    #[test]
    fn test_tiny_perturbation_below_default_threshold() {
        let detector = ChangeDetector::default();
        let a = unit(&[1.0, 0.0, 0.0]);
        let b = unit(&[1.0, 0.001, 0.0]);
        let d = detector.distance(&a, &b).unwrap();
        assert!(d > 0.0 && d < DEFAULT_DISTANCE_THRESHOLD);
        assert!(!detector.is_changed(&a, &b).unwrap());
    }
}
