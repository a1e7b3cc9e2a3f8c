use crate::linalg::GrayBuffer;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Width and height of a grayscale buffer, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of samples in a buffer of this size.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An image whose size differs from the one the operation was built for.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("image is {actual}, expected {expected}")]
pub struct DimensionMismatch {
    pub expected: Dimensions,
    pub actual: Dimensions,
}

impl DimensionMismatch {
    /// `Ok(())` when both sizes agree.
    pub fn check(expected: Dimensions, actual: Dimensions) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self { expected, actual })
        }
    }
}

/// A grayscale training image paired with its label.
///
/// Labels need not be unique; several samples of the same subject share one.
#[derive(Debug, Clone)]
pub struct TrainingImage {
    pub image: GrayBuffer,
    pub label: String,
}

impl TrainingImage {
    pub fn new(image: GrayBuffer, label: impl Into<String>) -> Self {
        Self {
            image,
            label: label.into(),
        }
    }
}

/// Projection of one image onto an eigenspace: one coefficient per basis image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientVector {
    pub values: Vec<f64>,
}

impl CoefficientVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn zeros(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean (L2) distance between two coefficient vectors.
    pub fn euclidean_distance(&self, other: &CoefficientVector) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

/// A stored training projection with the label it was enrolled under.
#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    pub coefficients: CoefficientVector,
    pub label: String,
}

/// Nearest stored projection for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    /// Position of the matched sample in training order.
    pub index: usize,
    /// L2 distance in eigenspace coordinates.
    pub distance: f64,
    pub label: String,
}

impl Match {
    /// Whether the match passes the open-set threshold.
    ///
    /// A threshold `<= 0` disables rejection entirely.
    pub fn is_accepted(&self, threshold: f64) -> bool {
        threshold <= 0.0 || self.distance < threshold
    }

    /// Apply the open-set threshold, keeping the label only when accepted.
    pub fn into_recognition(self, threshold: f64) -> Recognition {
        if self.is_accepted(threshold) {
            Recognition::Known(self.label)
        } else {
            Recognition::Unknown
        }
    }
}

/// Outcome of classifying a query image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "label", rename_all = "lowercase")]
pub enum Recognition {
    Known(String),
    Unknown,
}

impl Recognition {
    pub fn is_known(&self) -> bool {
        matches!(self, Recognition::Known(_))
    }

    /// The recognised label, or `""` when the query was rejected.
    pub fn as_label(&self) -> &str {
        match self {
            Recognition::Known(label) => label,
            Recognition::Unknown => "",
        }
    }
}

impl fmt::Display for Recognition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recognition::Known(label) => f.write_str(label),
            Recognition::Unknown => f.write_str("unknown"),
        }
    }
}

/// Strategy for finding the closest enrolled projection to a probe.
pub trait Matcher {
    fn nearest(&self, probe: &CoefficientVector, gallery: &[Enrollment]) -> Option<Match>;
}

/// Euclidean nearest-neighbour matcher.
///
/// Scans every gallery entry and keeps the first minimum in training order:
/// a later entry only wins with a strictly smaller distance.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn nearest(&self, probe: &CoefficientVector, gallery: &[Enrollment]) -> Option<Match> {
        let mut best: Option<(usize, f64)> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let distance = probe.euclidean_distance(&entry.coefficients);
            let is_better = match best {
                None => true,
                Some((_, best_distance)) => distance < best_distance,
            };
            if is_better {
                best = Some((i, distance));
            }
        }

        best.map(|(index, distance)| Match {
            index,
            distance,
            label: gallery[index].label.clone(),
        })
    }
}
