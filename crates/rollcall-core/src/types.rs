use serde::{Deserialize, Serialize};

/// Added to the norm product in [`Embedding::similarity`] so an all-zero
/// vector scores 0 instead of dividing by zero.
pub const SIMILARITY_EPSILON: f32 = 1e-10;

/// Face embedding vector (128-dimensional for FaceNet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "facenet128").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    /// Number of components.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean (L2) norm.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// True when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|x| x.is_finite())
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. The epsilon guard
    /// keeps degenerate vectors finite: a zero vector scores 0 against anything.
    /// Both embeddings are expected to share a dimension; extra trailing
    /// components of the longer one are ignored.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        dot / (norm_a.sqrt() * norm_b.sqrt() + SIMILARITY_EPSILON)
    }

    /// Return an L2-normalized copy. A zero vector stays zero.
    pub fn normalized(&self) -> Embedding {
        let norm = self.norm() + SIMILARITY_EPSILON;
        Embedding {
            values: self.values.iter().map(|x| x / norm).collect(),
            model_version: self.model_version.clone(),
        }
    }

    /// Component-wise arithmetic mean.
    ///
    /// Returns `None` for an empty slice or when dimensions disagree. The
    /// model version survives only if every input carries the same one.
    pub fn mean(embeddings: &[Embedding]) -> Option<Embedding> {
        let first = embeddings.first()?;
        let dim = first.dim();
        if embeddings.iter().any(|e| e.dim() != dim) {
            return None;
        }

        // Accumulate in f64 so the result does not depend much on input order.
        let mut sums = vec![0.0f64; dim];
        for e in embeddings {
            for (sum, v) in sums.iter_mut().zip(e.values.iter()) {
                *sum += f64::from(*v);
            }
        }
        let n = embeddings.len() as f64;

        let model_version = if embeddings
            .iter()
            .all(|e| e.model_version == first.model_version)
        {
            first.model_version.clone()
        } else {
            None
        };

        Some(Embedding {
            values: sums.into_iter().map(|s| (s / n) as f32).collect(),
            model_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_self_is_one() {
        let a = Embedding::new(vec![0.3, -1.7, 4.2, 0.05]);
        assert!((a.similarity(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_similarity_symmetric() {
        let a = Embedding::new(vec![0.9, 0.1, -0.4]);
        let b = Embedding::new(vec![-0.2, 0.8, 0.5]);
        assert_eq!(a.similarity(&b), b.similarity(&a));
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        let sim = a.similarity(&b);
        assert!(sim.is_finite());
        assert_eq!(sim, 0.0);
        assert_eq!(a.similarity(&a), 0.0);
    }

    #[test]
    fn test_normalized_has_unit_norm() {
        let a = Embedding::new(vec![3.0, 4.0]).with_model_version("m1");
        let n = a.normalized();
        assert!((n.norm() - 1.0).abs() < 1e-6);
        assert!((n.values[0] - 0.6).abs() < 1e-6);
        assert_eq!(n.model_version.as_deref(), Some("m1"));
    }

    #[test]
    fn test_normalized_zero_stays_zero() {
        let n = Embedding::new(vec![0.0, 0.0]).normalized();
        assert_eq!(n.values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_mean_component_wise() {
        let m = Embedding::mean(&[
            Embedding::new(vec![1.0, 0.0, 2.0]),
            Embedding::new(vec![0.0, 1.0, 4.0]),
        ])
        .unwrap();
        assert_eq!(m.values, vec![0.5, 0.5, 3.0]);
    }

    #[test]
    fn test_mean_rejects_empty_and_mismatched() {
        assert!(Embedding::mean(&[]).is_none());
        assert!(Embedding::mean(&[
            Embedding::new(vec![1.0, 0.0]),
            Embedding::new(vec![1.0, 0.0, 0.0]),
        ])
        .is_none());
    }

    #[test]
    fn test_mean_model_version() {
        let same = Embedding::mean(&[
            Embedding::new(vec![1.0]).with_model_version("a"),
            Embedding::new(vec![3.0]).with_model_version("a"),
        ])
        .unwrap();
        assert_eq!(same.model_version.as_deref(), Some("a"));

        let mixed = Embedding::mean(&[
            Embedding::new(vec![1.0]).with_model_version("a"),
            Embedding::new(vec![3.0]).with_model_version("b"),
        ])
        .unwrap();
        assert!(mixed.model_version.is_none());
    }

    #[test]
    fn test_serde_omits_missing_model_version() {
        let json = serde_json::to_string(&Embedding::new(vec![1.0, 2.0])).unwrap();
        assert_eq!(json, r#"{"values":[1.0,2.0]}"#);
        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Embedding::new(vec![1.0, 2.0]));
    }
}
