//! Dense grayscale buffers and the small amount of linear algebra the
//! eigenspace needs: elementwise arithmetic, inner products and a symmetric
//! eigensolver.

use crate::types::{DimensionMismatch, Dimensions};
use ndarray::{Array1, Array2};
use thiserror::Error;

/// Upper bound on Jacobi sweeps; symmetric inputs converge in well under 20.
const JACOBI_MAX_SWEEPS: usize = 100;
/// Off-diagonal mass, relative to the total, below which the matrix is diagonal.
const JACOBI_TOLERANCE: f64 = 1e-24;
/// Eigenvector components smaller than this are ignored when fixing the sign.
const SIGN_EPSILON: f64 = 1e-12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer holds {actual} samples but {dimensions} needs {expected}")]
    LengthMismatch {
        dimensions: Dimensions,
        expected: usize,
        actual: usize,
    },
}

/// Row-major W×H grayscale buffer of `f64` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayBuffer {
    dimensions: Dimensions,
    data: Array1<f64>,
}

impl GrayBuffer {
    /// Wrap `data` as a `width`×`height` buffer.
    pub fn new(width: u32, height: u32, data: Vec<f64>) -> Result<Self, BufferError> {
        let dimensions = Dimensions::new(width, height);
        let expected = dimensions.area();
        if data.len() != expected {
            return Err(BufferError::LengthMismatch {
                dimensions,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            dimensions,
            data: Array1::from(data),
        })
    }

    /// Convert 8-bit grayscale pixels.
    pub fn from_luma(width: u32, height: u32, pixels: &[u8]) -> Result<Self, BufferError> {
        Self::new(width, height, pixels.iter().map(|&p| p as f64).collect())
    }

    pub fn zeros(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            data: Array1::zeros(dimensions.area()),
        }
    }

    pub(crate) fn from_array(dimensions: Dimensions, data: Array1<f64>) -> Self {
        debug_assert_eq!(data.len(), dimensions.area());
        Self { dimensions, data }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &Array1<f64> {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut Array1<f64> {
        &mut self.data
    }

    /// Sample at column `x`, row `y`.
    pub fn get(&self, x: u32, y: u32) -> Option<f64> {
        if x >= self.dimensions.width || y >= self.dimensions.height {
            return None;
        }
        self.data
            .get(y as usize * self.dimensions.width as usize + x as usize)
            .copied()
    }

    fn check(&self, other: &GrayBuffer) -> Result<(), DimensionMismatch> {
        DimensionMismatch::check(self.dimensions, other.dimensions)
    }

    /// Elementwise `self + other`.
    pub fn add(&self, other: &GrayBuffer) -> Result<GrayBuffer, DimensionMismatch> {
        self.check(other)?;
        Ok(Self::from_array(self.dimensions, &self.data + &other.data))
    }

    /// Elementwise `self - other`.
    pub fn sub(&self, other: &GrayBuffer) -> Result<GrayBuffer, DimensionMismatch> {
        self.check(other)?;
        Ok(Self::from_array(self.dimensions, &self.data - &other.data))
    }

    /// Every sample multiplied by `factor`.
    pub fn scale(&self, factor: f64) -> GrayBuffer {
        Self::from_array(self.dimensions, &self.data * factor)
    }

    /// In-place `self += alpha * other`.
    pub fn scaled_add(&mut self, alpha: f64, other: &GrayBuffer) -> Result<(), DimensionMismatch> {
        self.check(other)?;
        self.data.scaled_add(alpha, &other.data);
        Ok(())
    }

    /// Inner product over all samples.
    pub fn dot(&self, other: &GrayBuffer) -> Result<f64, DimensionMismatch> {
        self.check(other)?;
        Ok(self.data.dot(&other.data))
    }

    /// Euclidean norm of the buffer viewed as a vector.
    pub fn norm(&self) -> f64 {
        self.data.dot(&self.data).sqrt()
    }

    /// Round and saturate to 8-bit pixels.
    pub fn to_luma(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|&v| v.round().clamp(0.0, 255.0) as u8)
            .collect()
    }

    /// Stretch the sample range linearly onto 0..=255.
    ///
    /// Basis images have signed, tiny values; this makes them viewable.
    /// A constant buffer maps to all zeros.
    pub fn to_luma_normalized(&self) -> Vec<u8> {
        let min = self.data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if !range.is_finite() || range <= 0.0 {
            return vec![0u8; self.data.len()];
        }
        self.data
            .iter()
            .map(|&v| ((v - min) / range * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect()
    }
}

/// Eigenvalues in descending order with their unit eigenvectors as columns.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    pub eigenvalues: Vec<f64>,
    pub eigenvectors: Array2<f64>,
    /// Number of Jacobi sweeps performed.
    pub sweeps: usize,
}

/// Eigen-decompose a real symmetric matrix with the cyclic Jacobi method.
///
/// Eigenpairs are sorted by descending eigenvalue with a stable sort, so equal
/// eigenvalues keep the order of their original rows. Each eigenvector is
/// flipped so that its first non-negligible component is positive.
pub fn symmetric_eigen(matrix: &Array2<f64>) -> SymmetricEigen {
    let n = matrix.nrows();
    debug_assert_eq!(n, matrix.ncols(), "matrix must be square");

    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);
    let total: f64 = a.iter().map(|x| x * x).sum();
    let mut sweeps = 0;

    while sweeps < JACOBI_MAX_SWEEPS {
        let off = off_diagonal_mass(&a);
        if off == 0.0 || off <= JACOBI_TOLERANCE * total {
            break;
        }
        sweeps += 1;

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                // A <- A·J, then A <- Jᵀ·A, accumulating V <- V·J.
                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    if sweeps == JACOBI_MAX_SWEEPS {
        tracing::warn!(
            sweeps,
            off_diagonal = off_diagonal_mass(&a),
            "Jacobi eigensolver hit the sweep limit"
        );
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));

    let eigenvalues = order.iter().map(|&i| a[[i, i]]).collect();
    let mut eigenvectors = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        let mut column = v.column(src).to_owned();
        let leading = column.iter().copied().find(|x| x.abs() > SIGN_EPSILON);
        if leading.is_some_and(|x| x < 0.0) {
            column.mapv_inplace(|x| -x);
        }
        eigenvectors.column_mut(dst).assign(&column);
    }

    SymmetricEigen {
        eigenvalues,
        eigenvectors,
        sweeps,
    }
}

fn off_diagonal_mass(a: &Array2<f64>) -> f64 {
    let n = a.nrows();
    let mut sum = 0.0;
    for i in 0..n {
        for j in 0..n {
            if i != j {
                sum += a[[i, j]] * a[[i, j]];
            }
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = GrayBuffer::new(3, 2, vec![0.0; 5]).unwrap_err();
        assert_eq!(
            err,
            BufferError::LengthMismatch {
                dimensions: Dimensions::new(3, 2),
                expected: 6,
                actual: 5,
            }
        );
    }

    #[test]
    fn test_elementwise_ops() {
        let a = GrayBuffer::new(2, 1, vec![1.0, 2.0]).unwrap();
        let b = GrayBuffer::new(2, 1, vec![10.0, 20.0]).unwrap();

        assert_eq!(a.add(&b).unwrap().data().to_vec(), vec![11.0, 22.0]);
        assert_eq!(b.sub(&a).unwrap().data().to_vec(), vec![9.0, 18.0]);
        assert_eq!(a.scale(3.0).data().to_vec(), vec![3.0, 6.0]);
        assert_eq!(a.dot(&b).unwrap(), 50.0);

        let mut c = a.clone();
        c.scaled_add(0.5, &b).unwrap();
        assert_eq!(c.data().to_vec(), vec![6.0, 12.0]);
    }

    #[test]
    fn test_ops_reject_mismatched_dimensions() {
        let a = GrayBuffer::zeros(Dimensions::new(2, 2));
        let b = GrayBuffer::zeros(Dimensions::new(4, 1));
        assert!(a.add(&b).is_err());
        assert!(a.sub(&b).is_err());
        assert!(a.dot(&b).is_err());
        let mut c = a.clone();
        assert!(c.scaled_add(1.0, &b).is_err());
    }

    #[test]
    fn test_get_row_major() {
        let buf = GrayBuffer::from_luma(3, 2, &[0, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(buf.get(0, 1), Some(3.0));
        assert_eq!(buf.get(2, 0), Some(2.0));
        assert_eq!(buf.get(3, 0), None);
    }

    #[test]
    fn test_to_luma_saturates() {
        let buf = GrayBuffer::new(4, 1, vec![-5.0, 12.4, 12.6, 300.0]).unwrap();
        assert_eq!(buf.to_luma(), vec![0, 12, 13, 255]);
    }

    #[test]
    fn test_to_luma_normalized_stretches() {
        let buf = GrayBuffer::new(3, 1, vec![-0.5, 0.0, 0.5]).unwrap();
        assert_eq!(buf.to_luma_normalized(), vec![0, 128, 255]);

        let flat = GrayBuffer::new(2, 1, vec![7.0, 7.0]).unwrap();
        assert_eq!(flat.to_luma_normalized(), vec![0, 0]);
    }

    #[test]
    fn test_eigen_diagonal_sorted_descending() {
        let m = array![[1.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]];
        let eig = symmetric_eigen(&m);
        assert_eq!(eig.eigenvalues, vec![5.0, 3.0, 1.0]);
        assert_eq!(eig.sweeps, 0);
        assert_eq!(eig.eigenvectors.column(0).to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(eig.eigenvectors.column(1).to_vec(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_eigen_two_by_two() {
        // Eigenvalues 3 and 1, eigenvectors (1, 1)/√2 and (1, -1)/√2.
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let eig = symmetric_eigen(&m);
        assert!((eig.eigenvalues[0] - 3.0).abs() < 1e-10);
        assert!((eig.eigenvalues[1] - 1.0).abs() < 1e-10);

        let h = std::f64::consts::FRAC_1_SQRT_2;
        let v0 = eig.eigenvectors.column(0);
        let v1 = eig.eigenvectors.column(1);
        assert!((v0[0] - h).abs() < 1e-10 && (v0[1] - h).abs() < 1e-10, "v0 = {v0}");
        assert!((v1[0] - h).abs() < 1e-10 && (v1[1] + h).abs() < 1e-10, "v1 = {v1}");
    }

    #[test]
    fn test_eigen_reconstructs_matrix() {
        let m = array![
            [4.0, 1.0, -2.0, 2.0],
            [1.0, 2.0, 0.0, 1.0],
            [-2.0, 0.0, 3.0, -2.0],
            [2.0, 1.0, -2.0, -1.0]
        ];
        let eig = symmetric_eigen(&m);

        // V·diag(λ)·Vᵀ == M
        let lambda = Array2::from_diag(&Array1::from(eig.eigenvalues.clone()));
        let rebuilt = eig.eigenvectors.dot(&lambda).dot(&eig.eigenvectors.t());
        for (x, y) in rebuilt.iter().zip(m.iter()) {
            assert!((x - y).abs() < 1e-9, "rebuilt {x} vs {y}");
        }

        // Columns are orthonormal.
        let gram = eig.eigenvectors.t().dot(&eig.eigenvectors);
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < 1e-9);
            }
        }

        for pair in eig.eigenvalues.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn test_eigen_sign_convention() {
        let m = array![[2.0, -1.0], [-1.0, 2.0]];
        let eig = symmetric_eigen(&m);
        for col in eig.eigenvectors.columns() {
            let leading = col.iter().copied().find(|x| x.abs() > SIGN_EPSILON).unwrap();
            assert!(leading > 0.0, "column {col} has negative leading component");
        }
    }

    #[test]
    fn test_eigen_ties_keep_original_order() {
        let m = Array2::<f64>::eye(3) * 2.0;
        let eig = symmetric_eigen(&m);
        assert_eq!(eig.eigenvalues, vec![2.0, 2.0, 2.0]);
        assert_eq!(eig.eigenvectors, Array2::<f64>::eye(3));
    }
}
