//! Eigenface recognizer: nearest-neighbour classification in eigenspace with
//! an open-set distance threshold.
//!
//! A [`RecognizerModel`] is built once from a full training set and is
//! immutable afterwards. Retraining means building a new model and swapping
//! it in (see [`crate::shared::SharedModel`]).

use crate::eigenspace::{Eigenspace, TrainingError, TrainingParams, DEFAULT_EPSILON};
use crate::linalg::GrayBuffer;
use crate::projector;
use crate::types::{
    CoefficientVector, DimensionMismatch, Dimensions, Enrollment, EuclideanMatcher, Match,
    Matcher, Recognition, TrainingImage,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejection distance suited to 100×100 8-bit crops.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 3000.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognizerError {
    #[error("invalid training set: {0}")]
    Training(#[from] TrainingError),
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(#[from] DimensionMismatch),
    #[error("model has no training vectors")]
    EmptyModel,
}

/// Training-time configuration of a recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Basis size cap; `0` uses one component per training image.
    pub max_components: usize,
    /// Relative eigenvalue cutoff for basis construction.
    pub epsilon: f64,
    /// Queries at or beyond this distance are unknown; `<= 0` never rejects.
    pub distance_threshold: f64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            max_components: 0,
            epsilon: DEFAULT_EPSILON,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

impl RecognizerConfig {
    pub fn training_params(&self) -> TrainingParams {
        TrainingParams {
            max_components: self.max_components,
            epsilon: self.epsilon,
        }
    }
}

/// A trained eigenface model.
///
/// Holds the eigenspace, one projection per training image paired with its
/// label (training order), and the rejection threshold.
#[derive(Debug, Clone)]
pub struct RecognizerModel {
    eigenspace: Eigenspace,
    gallery: Vec<Enrollment>,
    threshold: f64,
}

impl RecognizerModel {
    /// Train on `images` with the parallel `labels`.
    pub fn train<S: AsRef<str>>(
        images: &[GrayBuffer],
        labels: &[S],
        config: &RecognizerConfig,
    ) -> Result<Self, RecognizerError> {
        if images.len() != labels.len() {
            return Err(TrainingError::LabelCountMismatch {
                images: images.len(),
                labels: labels.len(),
            }
            .into());
        }

        let eigenspace = Eigenspace::build(images, &config.training_params())?;

        let gallery = images
            .iter()
            .zip(labels)
            .map(|(image, label)| -> Result<Enrollment, DimensionMismatch> {
                let label: &str = label.as_ref();
                Ok(Enrollment {
                    coefficients: projector::decompose(image, &eigenspace)?,
                    label: label.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            images = images.len(),
            dimensions = %eigenspace.dimensions(),
            components = eigenspace.len(),
            significant = eigenspace.significant_components(),
            threshold = config.distance_threshold,
            "recognizer trained"
        );

        Ok(Self {
            eigenspace,
            gallery,
            threshold: config.distance_threshold,
        })
    }

    /// Train on labelled samples.
    pub fn train_samples(
        samples: &[TrainingImage],
        config: &RecognizerConfig,
    ) -> Result<Self, RecognizerError> {
        let images: Vec<GrayBuffer> = samples.iter().map(|s| s.image.clone()).collect();
        let labels: Vec<&str> = samples.iter().map(|s| s.label.as_str()).collect();
        Self::train(&images, &labels, config)
    }

    /// Train without labels; sample `i` is labelled with its index, `"i"`.
    pub fn train_unlabeled(
        images: &[GrayBuffer],
        config: &RecognizerConfig,
    ) -> Result<Self, RecognizerError> {
        let labels: Vec<String> = (0..images.len()).map(|i| i.to_string()).collect();
        Self::train(images, &labels, config)
    }

    pub fn eigenspace(&self) -> &Eigenspace {
        &self.eigenspace
    }

    pub fn gallery(&self) -> &[Enrollment] {
        &self.gallery
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.gallery.iter().map(|e| e.label.as_str())
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn dimensions(&self) -> Dimensions {
        self.eigenspace.dimensions()
    }

    /// Number of stored training projections.
    pub fn len(&self) -> usize {
        self.gallery.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gallery.is_empty()
    }

    /// Project `query` into the model's eigenspace.
    pub fn project(&self, query: &GrayBuffer) -> Result<CoefficientVector, RecognizerError> {
        Ok(projector::decompose(query, &self.eigenspace)?)
    }

    /// Eigenspace distance from `query` to every training image, in training order.
    pub fn distances_to(&self, query: &GrayBuffer) -> Result<Vec<f64>, RecognizerError> {
        self.ensure_trained()?;
        let probe = self.project(query)?;
        Ok(self
            .gallery
            .iter()
            .map(|e| probe.euclidean_distance(&e.coefficients))
            .collect())
    }

    /// Closest training image to `query`; ties go to the earliest one.
    pub fn nearest(&self, query: &GrayBuffer) -> Result<Match, RecognizerError> {
        self.ensure_trained()?;
        let probe = self.project(query)?;
        EuclideanMatcher
            .nearest(&probe, &self.gallery)
            .ok_or(RecognizerError::EmptyModel)
    }

    /// Label of the closest training image, or [`Recognition::Unknown`] when
    /// it is at or beyond the threshold.
    pub fn recognize(&self, query: &GrayBuffer) -> Result<Recognition, RecognizerError> {
        let best = self.nearest(query)?;
        let accepted = best.is_accepted(self.threshold);

        tracing::debug!(
            index = best.index,
            distance = best.distance,
            label = %best.label,
            threshold = self.threshold,
            accepted,
            "recognize"
        );

        Ok(best.into_recognition(self.threshold))
    }

    fn ensure_trained(&self) -> Result<(), RecognizerError> {
        if self.gallery.is_empty() {
            Err(RecognizerError::EmptyModel)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SIZE: u32 = 10;

    /// Black 10×10 image with a white 2×2 block at (`x`, `y`).
    fn block_image(x: u32, y: u32) -> GrayBuffer {
        let mut pixels = vec![0u8; (SIZE * SIZE) as usize];
        for dy in 0..2 {
            for dx in 0..2 {
                pixels[((y + dy) * SIZE + x + dx) as usize] = 255;
            }
        }
        GrayBuffer::from_luma(SIZE, SIZE, &pixels).unwrap()
    }

    fn quadrant_set() -> Vec<GrayBuffer> {
        vec![block_image(1, 1), block_image(7, 1), block_image(1, 7)]
    }

    fn config(distance_threshold: f64) -> RecognizerConfig {
        RecognizerConfig {
            distance_threshold,
            ..RecognizerConfig::default()
        }
    }

    fn noisy(image: &GrayBuffer, seed: u64) -> GrayBuffer {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = image
            .data()
            .iter()
            .map(|&v| (v + rng.gen_range(-120.0..120.0)).clamp(0.0, 255.0))
            .collect();
        GrayBuffer::new(image.width(), image.height(), data).unwrap()
    }

    #[test]
    fn test_exact_copy_is_recognized() {
        let model = RecognizerModel::train(&quadrant_set(), &["A", "B", "C"], &config(1000.0)).unwrap();
        let result = model.recognize(&block_image(7, 1)).unwrap();
        assert_eq!(result, Recognition::Known("B".into()));
    }

    #[test]
    fn test_noisy_query_rejected_by_tight_threshold() {
        let model = RecognizerModel::train(&quadrant_set(), &["A", "B", "C"], &config(0.01)).unwrap();
        let query = noisy(&block_image(7, 1), 7);
        let result = model.recognize(&query).unwrap();
        assert_eq!(result, Recognition::Unknown);
        assert_eq!(result.as_label(), "");
    }

    #[test]
    fn test_single_image_model() {
        let image = block_image(4, 4);
        let config = RecognizerConfig {
            max_components: 5,
            ..RecognizerConfig::default()
        };
        let model = RecognizerModel::train(&[image.clone()], &["only"], &config).unwrap();
        assert_eq!(model.eigenspace().len(), 1);

        let coeffs = model.project(&image).unwrap();
        let rebuilt = projector::reconstruct(&coeffs, model.eigenspace()).unwrap();
        assert_eq!(rebuilt, image);
        assert_eq!(model.recognize(&image).unwrap(), Recognition::Known("only".into()));
    }

    #[test]
    fn test_duplicate_labels_resolve_to_shared_label() {
        let images = vec![block_image(0, 0), block_image(8, 8), block_image(0, 8)];
        let model = RecognizerModel::train(&images, &["X", "Y", "X"], &config(0.0)).unwrap();

        // Closest to the second "X" sample, bottom-left.
        let mut query = block_image(0, 8).data().to_vec();
        query[0] = 40.0;
        let query = GrayBuffer::new(SIZE, SIZE, query).unwrap();

        let best = model.nearest(&query).unwrap();
        assert_eq!(best.index, 2);
        assert_eq!(model.recognize(&query).unwrap(), Recognition::Known("X".into()));
    }

    #[test]
    fn test_training_vectors_match_stored_coefficients() {
        let images = quadrant_set();
        let model = RecognizerModel::train_unlabeled(&images, &RecognizerConfig::default()).unwrap();
        for (i, image) in images.iter().enumerate() {
            let distances = model.distances_to(image).unwrap();
            assert_eq!(distances.len(), images.len());
            assert_eq!(distances[i], 0.0, "training image {i} should sit on its own vector");
        }
    }

    #[test]
    fn test_coefficient_vectors_have_k_entries() {
        let config = RecognizerConfig {
            max_components: 2,
            ..RecognizerConfig::default()
        };
        let model = RecognizerModel::train_unlabeled(&quadrant_set(), &config).unwrap();
        assert_eq!(model.len(), 3);
        for entry in model.gallery() {
            assert_eq!(entry.coefficients.len(), 2);
        }
        assert_eq!(model.labels().collect::<Vec<_>>(), vec!["0", "1", "2"]);
    }

    #[test]
    fn test_disabled_threshold_always_returns_nearest() {
        let images = quadrant_set();
        let model = RecognizerModel::train(&images, &["A", "B", "C"], &config(0.0)).unwrap();

        for seed in 0..20 {
            let query = noisy(&images[(seed % 3) as usize], seed);
            let best = model.nearest(&query).unwrap();
            let result = model.recognize(&query).unwrap();
            assert_eq!(result, Recognition::Known(best.label));
        }

        let negative = RecognizerModel::train(&images, &["A", "B", "C"], &config(-5.0)).unwrap();
        let far = GrayBuffer::new(SIZE, SIZE, vec![255.0; (SIZE * SIZE) as usize]).unwrap();
        assert!(negative.recognize(&far).unwrap().is_known());
    }

    #[test]
    fn test_threshold_boundary_rejects() {
        let images = quadrant_set();
        let probe = block_image(4, 4);
        let open = RecognizerModel::train(&images, &["A", "B", "C"], &config(0.0)).unwrap();
        let best = open.nearest(&probe).unwrap();
        assert!(best.distance > 0.0);

        let at = RecognizerModel::train(&images, &["A", "B", "C"], &config(best.distance)).unwrap();
        assert_eq!(at.recognize(&probe).unwrap(), Recognition::Unknown);

        let above =
            RecognizerModel::train(&images, &["A", "B", "C"], &config(best.distance * 1.01)).unwrap();
        assert_eq!(above.recognize(&probe).unwrap(), Recognition::Known(best.label));
    }

    #[test]
    fn test_nearest_matches_distances() {
        let images = quadrant_set();
        let model = RecognizerModel::train(&images, &["A", "B", "C"], &config(0.0)).unwrap();
        let query = noisy(&images[2], 99);

        let distances = model.distances_to(&query).unwrap();
        let best = model.nearest(&query).unwrap();
        let min = distances.iter().copied().fold(f64::INFINITY, f64::min);
        assert_eq!(best.distance, min);
        assert_eq!(distances[best.index], min);
    }

    #[test]
    fn test_zero_epsilon_matches_tiny_epsilon() {
        let mut rng = StdRng::seed_from_u64(11);
        let images: Vec<GrayBuffer> = (0..4)
            .map(|_| {
                let data = (0..SIZE * SIZE).map(|_| rng.gen_range(0..=255u8) as f64).collect();
                GrayBuffer::new(SIZE, SIZE, data).unwrap()
            })
            .collect();
        let labels = ["a", "b", "c", "d"];
        let with_epsilon = |epsilon| RecognizerConfig {
            epsilon,
            ..config(0.0)
        };

        let zero = RecognizerModel::train(&images, &labels, &with_epsilon(0.0)).unwrap();
        let tiny = RecognizerModel::train(&images, &labels, &with_epsilon(1e-9)).unwrap();
        assert_eq!(zero.eigenspace().significant_components(), 3);

        let query = noisy(&images[1], 5);
        let expected = tiny.distances_to(&query).unwrap();
        let actual = zero.distances_to(&query).unwrap();
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-6 * e.max(1.0), "{actual:?} vs {expected:?}");
        }
        assert_eq!(zero.nearest(&query).unwrap().index, tiny.nearest(&query).unwrap().index);
    }

    #[test]
    fn test_label_count_mismatch() {
        let err = RecognizerModel::train(&quadrant_set(), &["A", "B"], &config(0.0)).unwrap_err();
        assert_eq!(
            err,
            RecognizerError::Training(TrainingError::LabelCountMismatch { images: 3, labels: 2 })
        );
    }

    #[test]
    fn test_empty_training_set() {
        let labels: [&str; 0] = [];
        let err = RecognizerModel::train(&[], &labels, &config(0.0)).unwrap_err();
        assert_eq!(err, RecognizerError::Training(TrainingError::EmptyTrainingSet));
    }

    #[test]
    fn test_mismatched_training_dimensions() {
        let images = vec![block_image(0, 0), GrayBuffer::zeros(Dimensions::new(5, 5))];
        let err = RecognizerModel::train(&images, &["a", "b"], &config(0.0)).unwrap_err();
        assert!(matches!(
            err,
            RecognizerError::Training(TrainingError::InconsistentDimensions { index: 1, .. })
        ));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let model = RecognizerModel::train_unlabeled(&quadrant_set(), &config(0.0)).unwrap();
        let query = GrayBuffer::zeros(Dimensions::new(8, 8));
        for err in [
            model.recognize(&query).unwrap_err(),
            model.nearest(&query).unwrap_err(),
            model.distances_to(&query).unwrap_err(),
        ] {
            assert_eq!(
                err,
                RecognizerError::DimensionMismatch(DimensionMismatch {
                    expected: Dimensions::new(SIZE, SIZE),
                    actual: Dimensions::new(8, 8),
                })
            );
        }
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: RecognizerConfig = serde_json::from_str(r#"{"distance_threshold": 1500.0}"#).unwrap();
        assert_eq!(config.distance_threshold, 1500.0);
        assert_eq!(config.max_components, 0);
        assert_eq!(config.epsilon, DEFAULT_EPSILON);
    }

    #[test]
    fn test_model_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RecognizerModel>();
    }
}
