//! Projection of images into and out of an eigenspace.

use crate::eigenspace::Eigenspace;
use crate::linalg::GrayBuffer;
use crate::types::{CoefficientVector, DimensionMismatch};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("coefficient vector has {actual} entries, eigenspace has {expected} components")]
    ComponentCountMismatch { expected: usize, actual: usize },
}

/// Coefficients of `image` along each basis image.
///
/// `coeff[i] = <image - mean, basis[i]>`.
pub fn decompose(
    image: &GrayBuffer,
    eigenspace: &Eigenspace,
) -> Result<CoefficientVector, DimensionMismatch> {
    DimensionMismatch::check(eigenspace.dimensions(), image.dimensions())?;
    let centered = image.sub(eigenspace.mean())?;
    let values = eigenspace
        .basis()
        .iter()
        .map(|u| centered.dot(u))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CoefficientVector::new(values))
}

/// Image approximated by `coeffs`: `mean + Σ coeffs[i] · basis[i]`.
pub fn reconstruct(
    coeffs: &CoefficientVector,
    eigenspace: &Eigenspace,
) -> Result<GrayBuffer, ProjectionError> {
    if coeffs.len() != eigenspace.len() {
        return Err(ProjectionError::ComponentCountMismatch {
            expected: eigenspace.len(),
            actual: coeffs.len(),
        });
    }

    Ok(combine(&coeffs.values, eigenspace))
}

fn combine(coeffs: &[f64], eigenspace: &Eigenspace) -> GrayBuffer {
    let mut image = eigenspace.mean().clone();
    // Basis images share the mean's dimensions by construction.
    for (&c, u) in coeffs.iter().zip(eigenspace.basis()) {
        image.data_mut().scaled_add(c, u.data());
    }
    image
}

/// L2 distance between `image` and its reconstruction from the eigenspace.
///
/// Small values mean the image is well described by the training set.
pub fn reconstruction_error(
    image: &GrayBuffer,
    eigenspace: &Eigenspace,
) -> Result<f64, DimensionMismatch> {
    let coeffs = decompose(image, eigenspace)?;
    let approx = combine(&coeffs.values, eigenspace);
    Ok(image.sub(&approx)?.norm())
}
