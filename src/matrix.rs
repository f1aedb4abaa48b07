// src/matrix.rs

//! Row-distributed and replicated dense matrices.
//!
//! Which operand combinations are legal is encoded in the types: a product against a
//! distributed right-hand side simply has no method. [`AnyMatrix`] is the
//! layout-erased form for callers that only know the layout at run time; it checks
//! legality once, at its own boundary, and then dispatches to the typed operations.

use crate::comm::{Communicator, RowPartition};
use crate::layout::{Distributed, Layout, Replicated};
use crate::vector::{DistributedVector, ReplicatedVector};
use ndarray::{s, Array1, Array2, ArrayView2};
use std::marker::PhantomData;

/// Dense row-major matrix of `f64` with layout `L`.
///
/// For a distributed matrix `num_rows()` is the number of rows owned by this process;
/// the global row count is the sum over the group. `num_columns()` is always global.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<L: Layout> {
    data: Array2<f64>,
    _layout: PhantomData<L>,
}

/// Matrix whose rows are partitioned across the process group.
pub type DistributedMatrix = Matrix<Distributed>;

/// Matrix held in full, identically, by every process.
pub type ReplicatedMatrix = Matrix<Replicated>;

impl<L: Layout> Matrix<L> {
    /// Creates a zero-filled `num_rows x num_cols` matrix.
    ///
    /// # Panics
    /// If either dimension is zero.
    pub fn zeros(num_rows: usize, num_cols: usize) -> Self {
        Self::from_array(Array2::zeros((num_rows, num_cols)))
    }

    /// Copies a row-major buffer of `num_rows * num_cols` values into a new matrix.
    pub fn from_row_major(values: &[f64], num_rows: usize, num_cols: usize) -> Self {
        assert_eq!(
            values.len(),
            num_rows * num_cols,
            "buffer of {} values cannot fill a {}x{} matrix",
            values.len(),
            num_rows,
            num_cols
        );
        Self::from_array(Array2::from_shape_fn((num_rows, num_cols), |(r, c)| values[r * num_cols + c]))
    }

    /// Takes ownership of an existing array as this process's storage.
    ///
    /// # Panics
    /// If either dimension is zero.
    pub fn from_array(data: Array2<f64>) -> Self {
        assert_positive_shape(data.nrows(), data.ncols());
        Self {
            data,
            _layout: PhantomData,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_columns(&self) -> usize {
        self.data.ncols()
    }

    pub fn distributed(&self) -> bool {
        L::DISTRIBUTED
    }

    /// Entry at local row `row` (never a global row index) and column `col`.
    pub fn item(&self, row: usize, col: usize) -> f64 {
        self.check_index(row, col);
        self.data[[row, col]]
    }

    pub fn item_mut(&mut self, row: usize, col: usize) -> &mut f64 {
        self.check_index(row, col);
        &mut self.data[[row, col]]
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn into_array(self) -> Array2<f64> {
        self.data
    }

    /// `self * other`. The result keeps the layout of `self`; no communication is
    /// needed because `other` is available in full on every process.
    pub fn multiply(&self, other: &ReplicatedMatrix) -> Matrix<L> {
        assert_eq!(
            self.num_columns(),
            other.num_rows(),
            "cannot multiply a matrix with {} columns by one with {} rows",
            self.num_columns(),
            other.num_rows()
        );
        Matrix::from_array(self.data.dot(&other.data))
    }

    fn check_index(&self, row: usize, col: usize) {
        assert!(
            row < self.num_rows() && col < self.num_columns(),
            "index ({}, {}) out of range for a {}x{} local block",
            row,
            col,
            self.num_rows(),
            self.num_columns()
        );
    }
}

impl DistributedMatrix {
    /// `self * v` for a replicated `v`; each process multiplies its own rows.
    pub fn multiply_vector(&self, other: &ReplicatedVector) -> DistributedVector {
        assert_eq!(
            self.num_columns(),
            other.dim(),
            "cannot multiply a matrix with {} columns by a vector of length {}",
            self.num_columns(),
            other.dim()
        );
        DistributedVector::from_array(self.data.dot(&other.view()))
    }

    /// Collective: `selfᵗ * other`. Each process forms the product of its own row
    /// blocks and the partial products are summed over the group.
    pub fn transpose_multiply<C: Communicator + ?Sized>(&self, other: &DistributedMatrix, comm: &C) -> ReplicatedMatrix {
        assert_eq!(
            self.num_rows(),
            other.num_rows(),
            "transpose product needs matching local row counts ({} vs {})",
            self.num_rows(),
            other.num_rows()
        );
        let partial = self.data.t().dot(&other.data);
        ReplicatedMatrix::from_array(reduce_matrix(partial, comm))
    }

    /// Collective: `selfᵗ * v` for a distributed `v` partitioned like `self`.
    pub fn transpose_multiply_vector<C: Communicator + ?Sized>(&self, other: &DistributedVector, comm: &C) -> ReplicatedVector {
        assert_eq!(
            self.num_rows(),
            other.dim(),
            "transpose product needs matching local lengths ({} vs {})",
            self.num_rows(),
            other.dim()
        );
        let mut buffer: Vec<f64> = self.data.t().dot(&other.view()).to_vec();
        comm.all_reduce_sum(&mut buffer);
        ReplicatedVector::from_array(Array1::from(buffer))
    }

    /// Collective: assembles the full matrix, rows in rank order, on every process.
    pub fn gather<C: Communicator + ?Sized>(&self, comm: &C) -> ReplicatedMatrix {
        let local: Vec<f64> = self.data.iter().copied().collect();
        let global: Vec<f64> = comm.all_gather_v(&local).into_iter().flatten().collect();
        let num_cols = self.num_columns();
        assert_eq!(
            global.len() % num_cols,
            0,
            "ranks disagree on the column count of a distributed matrix"
        );
        let num_rows = global.len() / num_cols;
        ReplicatedMatrix::from_row_major(&global, num_rows, num_cols)
    }
}

impl ReplicatedMatrix {
    /// `selfᵗ * other`, computed locally.
    pub fn transpose_multiply(&self, other: &ReplicatedMatrix) -> ReplicatedMatrix {
        assert_eq!(
            self.num_rows(),
            other.num_rows(),
            "transpose product needs matching row counts ({} vs {})",
            self.num_rows(),
            other.num_rows()
        );
        ReplicatedMatrix::from_array(self.data.t().dot(&other.data))
    }

    pub fn transpose(&self) -> ReplicatedMatrix {
        ReplicatedMatrix::from_array(self.data.t().to_owned())
    }

    /// Square matrix with `values` on the diagonal and zeros elsewhere.
    pub fn from_diagonal(values: &[f64]) -> ReplicatedMatrix {
        let mut data = Array2::zeros((values.len(), values.len()));
        data.diag_mut().assign(&Array1::from(values.to_vec()));
        ReplicatedMatrix::from_array(data)
    }

    /// Keeps only the rows `partition` assigns to `rank`. Purely local.
    pub fn distribute_rows(&self, partition: &RowPartition, rank: usize) -> DistributedMatrix {
        assert_eq!(
            partition.total_rows(),
            self.num_rows(),
            "partition covers {} rows but the matrix has {}",
            partition.total_rows(),
            self.num_rows()
        );
        let start = partition.offset(rank);
        let end = start + partition.local_rows(rank);
        DistributedMatrix::from_array(self.data.slice(s![start..end, ..]).to_owned())
    }
}

/// Layout-erased matrix, for code that carries the distribution as a run-time flag.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyMatrix {
    Distributed(DistributedMatrix),
    Replicated(ReplicatedMatrix),
}

impl AnyMatrix {
    pub fn distributed(&self) -> bool {
        matches!(self, AnyMatrix::Distributed(_))
    }

    pub fn num_rows(&self) -> usize {
        match self {
            AnyMatrix::Distributed(m) => m.num_rows(),
            AnyMatrix::Replicated(m) => m.num_rows(),
        }
    }

    pub fn num_columns(&self) -> usize {
        match self {
            AnyMatrix::Distributed(m) => m.num_columns(),
            AnyMatrix::Replicated(m) => m.num_columns(),
        }
    }

    pub fn item(&self, row: usize, col: usize) -> f64 {
        match self {
            AnyMatrix::Distributed(m) => m.item(row, col),
            AnyMatrix::Replicated(m) => m.item(row, col),
        }
    }

    /// `self * other`.
    ///
    /// # Panics
    /// If `other` is distributed or the inner dimensions differ.
    pub fn multiply(&self, other: &AnyMatrix) -> AnyMatrix {
        let rhs = match other {
            AnyMatrix::Replicated(m) => m,
            AnyMatrix::Distributed(_) => panic!("the right operand of multiply must be replicated"),
        };
        match self {
            AnyMatrix::Distributed(m) => AnyMatrix::Distributed(m.multiply(rhs)),
            AnyMatrix::Replicated(m) => AnyMatrix::Replicated(m.multiply(rhs)),
        }
    }

    /// `selfᵗ * other`; collective when both operands are distributed.
    ///
    /// # Panics
    /// If the operands have different layouts or row counts.
    pub fn transpose_multiply<C: Communicator + ?Sized>(&self, other: &AnyMatrix, comm: &C) -> ReplicatedMatrix {
        match (self, other) {
            (AnyMatrix::Distributed(a), AnyMatrix::Distributed(b)) => a.transpose_multiply(b, comm),
            (AnyMatrix::Replicated(a), AnyMatrix::Replicated(b)) => a.transpose_multiply(b),
            _ => panic!("operands of transpose_multiply must share the same distribution"),
        }
    }
}

impl From<DistributedMatrix> for AnyMatrix {
    fn from(m: DistributedMatrix) -> Self {
        AnyMatrix::Distributed(m)
    }
}

impl From<ReplicatedMatrix> for AnyMatrix {
    fn from(m: ReplicatedMatrix) -> Self {
        AnyMatrix::Replicated(m)
    }
}

fn assert_positive_shape(num_rows: usize, num_cols: usize) {
    assert!(
        num_rows > 0 && num_cols > 0,
        "matrix dimensions must be positive, got {}x{}",
        num_rows,
        num_cols
    );
}

/// Sums a partial product over the group; every rank gets the same result.
fn reduce_matrix<C: Communicator + ?Sized>(partial: Array2<f64>, comm: &C) -> Array2<f64> {
    let shape = partial.dim();
    let mut buffer: Vec<f64> = partial.iter().copied().collect();
    comm.all_reduce_sum(&mut buffer);
    Array2::from_shape_vec(shape, buffer).expect("reduced buffer keeps the partial product's shape")
}
