//! eigenface-core — Eigen-image recognition engine.
//!
//! Builds a PCA eigenspace from labelled grayscale training images, projects
//! queries into it and classifies them by nearest-neighbour distance with an
//! open-set rejection threshold.

pub mod eigenspace;
pub mod linalg;
pub mod preprocess;
pub mod projector;
pub mod recognizer;
pub mod shared;
pub mod types;

pub use eigenspace::{Eigenspace, TrainingError, TrainingParams};
pub use linalg::{BufferError, GrayBuffer};
pub use preprocess::PreprocessOptions;
pub use projector::{decompose, reconstruct, reconstruction_error, ProjectionError};
pub use recognizer::{RecognizerConfig, RecognizerError, RecognizerModel};
pub use shared::SharedModel;
pub use types::{
    CoefficientVector, DimensionMismatch, Dimensions, Enrollment, EuclideanMatcher, Match, Matcher,
    Recognition, TrainingImage,
};
