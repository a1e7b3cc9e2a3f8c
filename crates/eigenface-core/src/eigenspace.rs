//! PCA eigenspace construction.
//!
//! Builds the mean image and an ordered basis of eigen-images from a training
//! set. Image dimensionality (W·H) is usually far larger than the number of
//! training images N, so the decomposition runs on the N×N Gram matrix of the
//! mean-centred images and lifts its eigenvectors back into image space.

use crate::linalg::{self, GrayBuffer};
use crate::types::Dimensions;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default relative eigenvalue cutoff.
pub const DEFAULT_EPSILON: f64 = 0.001;

/// Invalid training input. Nothing is built when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrainingError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("training image {index} is {actual}, expected {expected} like the first image")]
    InconsistentDimensions {
        index: usize,
        expected: Dimensions,
        actual: Dimensions,
    },
    #[error("{images} training images but {labels} labels")]
    LabelCountMismatch { images: usize, labels: usize },
}

/// Stopping rule for eigenspace construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Upper bound on basis images; `0` means one per training image.
    pub max_components: usize,
    /// Components whose eigenvalue falls to `epsilon · λ₀` or below are dropped.
    pub epsilon: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            max_components: 0,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl TrainingParams {
    /// Basis size for a training set of `n` images.
    ///
    /// `max_components` outside `1..=n` selects all `n`.
    pub fn effective_components(&self, n: usize) -> usize {
        if (1..=n).contains(&self.max_components) {
            self.max_components
        } else {
            n
        }
    }
}

/// Stages reported while an eigenspace is being built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuildProgress {
    MeanComputed { images: usize },
    GramComputed { size: usize },
    Decomposed { sweeps: usize },
    ComponentLifted { index: usize, eigenvalue: f64 },
}

/// Mean image plus an ordered basis of K eigen-images, all the same size.
///
/// Immutable once built. Slots past the epsilon cutoff hold all-zero images
/// so that the basis length always equals the requested component count.
#[derive(Debug, Clone)]
pub struct Eigenspace {
    mean: GrayBuffer,
    basis: Vec<GrayBuffer>,
    eigenvalues: Vec<f64>,
    significant: usize,
}

impl Eigenspace {
    /// Build an eigenspace from `images`.
    pub fn build(images: &[GrayBuffer], params: &TrainingParams) -> Result<Self, TrainingError> {
        Self::build_with_progress(images, params, |_| {})
    }

    /// Build an eigenspace, reporting each stage to `progress`.
    pub fn build_with_progress<F>(
        images: &[GrayBuffer],
        params: &TrainingParams,
        mut progress: F,
    ) -> Result<Self, TrainingError>
    where
        F: FnMut(BuildProgress),
    {
        let dimensions = check_training_set(images)?;
        let n = images.len();
        let k = params.effective_components(n);
        let area = dimensions.area();

        let mut mean = Array1::<f64>::zeros(area);
        for image in images {
            mean += image.data();
        }
        mean /= n as f64;
        progress(BuildProgress::MeanComputed { images: n });

        // Rows are the mean-centred training images.
        let mut centered = Array2::<f64>::zeros((n, area));
        for (mut row, image) in centered.rows_mut().into_iter().zip(images) {
            row.assign(&(image.data() - &mean));
        }

        let gram = centered.dot(&centered.t());
        progress(BuildProgress::GramComputed { size: n });

        let eig = linalg::symmetric_eigen(&gram);
        progress(BuildProgress::Decomposed { sweeps: eig.sweeps });

        let leading = eig.eigenvalues.first().copied().unwrap_or(0.0);
        let floor = noise_floor(images);
        let mut basis = Vec::with_capacity(k);
        let mut eigenvalues = Vec::with_capacity(k);
        let mut significant = 0;

        for i in 0..k {
            let lambda = eig.eigenvalues[i];
            let kept = significant == i && lambda > floor && lambda / leading > params.epsilon;

            let lifted = if kept {
                let u = centered.t().dot(&eig.eigenvectors.column(i));
                let norm = u.dot(&u).sqrt();
                (norm > 0.0).then(|| u / norm)
            } else {
                None
            };

            match lifted {
                Some(u) => {
                    significant += 1;
                    basis.push(GrayBuffer::from_array(dimensions, u));
                    eigenvalues.push(lambda);
                    tracing::trace!(index = i, eigenvalue = lambda, "lifted eigen-image");
                    progress(BuildProgress::ComponentLifted {
                        index: i,
                        eigenvalue: lambda,
                    });
                }
                None => {
                    basis.push(GrayBuffer::zeros(dimensions));
                    eigenvalues.push(0.0);
                }
            }
        }

        tracing::debug!(
            images = n,
            %dimensions,
            components = k,
            significant,
            sweeps = eig.sweeps,
            "eigenspace built"
        );

        Ok(Self {
            mean: GrayBuffer::from_array(dimensions, mean),
            basis,
            eigenvalues,
            significant,
        })
    }

    pub fn mean(&self) -> &GrayBuffer {
        &self.mean
    }

    /// Eigen-images in descending eigenvalue order.
    pub fn basis(&self) -> &[GrayBuffer] {
        &self.basis
    }

    /// Gram-matrix eigenvalue behind each basis slot (0 for dropped slots).
    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// Number of non-zero basis images.
    pub fn significant_components(&self) -> usize {
        self.significant
    }

    pub fn dimensions(&self) -> Dimensions {
        self.mean.dimensions()
    }

    /// Basis size K; every coefficient vector has this length.
    pub fn len(&self) -> usize {
        self.basis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.basis.is_empty()
    }
}

/// Largest Gram eigenvalue that is indistinguishable from round-off.
///
/// Centring N images leaves at most N−1 directions with variance, so the Gram
/// matrix always has a null eigenvalue that Jacobi returns as tiny noise of
/// either sign. The floor scales with the raw image energy, which bounds the
/// rounding error of the centred data and the Gram products.
fn noise_floor(images: &[GrayBuffer]) -> f64 {
    let energy: f64 = images.iter().map(|image| image.data().dot(image.data())).sum();
    energy * images.len() as f64 * f64::EPSILON * 1e3
}

/// Validate a training set and return its common dimensions.
fn check_training_set(images: &[GrayBuffer]) -> Result<Dimensions, TrainingError> {
    let first = images.first().ok_or(TrainingError::EmptyTrainingSet)?;
    let expected = first.dimensions();
    for (index, image) in images.iter().enumerate().skip(1) {
        if image.dimensions() != expected {
            return Err(TrainingError::InconsistentDimensions {
                index,
                expected,
                actual: image.dimensions(),
            });
        }
    }
    Ok(expected)
}
