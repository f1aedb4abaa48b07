// src/linalg_backends.rs

//! Dense SVD kernels. The static SVD treats the kernel as a black box behind
//! [`BackendSVD`]; the concrete backend is picked by Cargo feature.

use crate::error::ThreadSafeStdError;
use ndarray::{Array1, Array2};
use std::marker::PhantomData;

/// Output of a thin singular value decomposition `A = U * diag(s) * Vt` of an
/// `m x n` matrix, with `r = min(m, n)`.
#[derive(Debug)]
pub struct SVDOutput<F: 'static> {
    /// Left singular vectors, `m x r`.
    pub u: Array2<F>,
    /// Singular values, length `r`, non-negative and non-increasing.
    pub s: Array1<F>,
    /// Transposed right singular vectors, `r x n`.
    pub vt: Array2<F>,
}

/// Trait for Singular Value Decomposition.
pub trait BackendSVD<F: 'static + Copy + Send + Sync> {
    fn svd_thin(&self, matrix: Array2<F>) -> Result<SVDOutput<F>, ThreadSafeStdError>;
}

// --- NdarrayLinAlgBackend Implementation ---
use ndarray_linalg::{JobSvd, SVDDCInto};

#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

impl BackendSVD<f64> for NdarrayLinAlgBackend {
    fn svd_thin(&self, matrix: Array2<f64>) -> Result<SVDOutput<f64>, ThreadSafeStdError> {
        // Divide and conquer with economy factors: U is m x r, Vt is r x n.
        let (u, s, vt) = matrix
            .svddc_into(JobSvd::Some)
            .map_err(|e| Box::new(e) as ThreadSafeStdError)?;
        let u = u.ok_or("LAPACK SVD returned no left singular vectors")?;
        let vt = vt.ok_or("LAPACK SVD returned no right singular vectors")?;
        Ok(SVDOutput { u, s, vt })
    }
}

// --- FaerLinAlgBackend Implementation ---
#[cfg(feature = "backend_faer")]
mod faer_specific_code {
    use super::{BackendSVD, SVDOutput};
    use crate::error::ThreadSafeStdError;
    use faer::linalg::solvers::Svd as FaerSolverSvd;
    use faer::MatRef;
    use ndarray::{Array1, Array2, ShapeBuilder};

    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    fn faer_mat_to_ndarray(faer_mat: MatRef<'_, f64>) -> Array2<f64> {
        let (nrows, ncols) = (faer_mat.nrows(), faer_mat.ncols());
        Array2::from_shape_fn((nrows, ncols).f(), |(i, j)| faer_mat[(i, j)])
    }

    impl BackendSVD<f64> for FaerLinAlgBackend {
        fn svd_thin(&self, matrix: Array2<f64>) -> Result<SVDOutput<f64>, ThreadSafeStdError> {
            let (nrows, ncols) = matrix.dim();
            // Sample matrices are built row-major; copy into standard layout otherwise.
            let matrix = matrix.as_standard_layout().into_owned();
            let slice = matrix
                .as_slice()
                .ok_or_else(|| format!("cannot view {}x{} matrix as a contiguous slice", nrows, ncols))?;
            let faer_mat_ref = MatRef::from_row_major_slice(slice, nrows, ncols);

            let svd = FaerSolverSvd::new_thin(faer_mat_ref)
                .map_err(|e| format!("Faer SVD computation failed: {:?}", e))?;

            let s_diag = svd.S().column_vector();
            let s = Array1::from_shape_fn(s_diag.nrows(), |i| s_diag[i]);
            let u = faer_mat_to_ndarray(svd.U());
            let vt = faer_mat_to_ndarray(svd.V()).t().into_owned();
            Ok(SVDOutput { u, s, vt })
        }
    }
}

/// A provider struct that dispatches to the selected linear algebra backend
/// based on compile-time feature flags.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

impl BackendSVD<f64> for LinAlgBackendProvider<f64> {
    fn svd_thin(&self, matrix: Array2<f64>) -> Result<SVDOutput<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.svd_thin(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.svd_thin(matrix)
        }
    }
}
