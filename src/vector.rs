// src/vector.rs

use crate::comm::Communicator;
use crate::layout::{Distributed, Layout, Replicated};
use ndarray::{Array1, ArrayView1};
use std::marker::PhantomData;

/// Dense vector of `f64`, either row-partitioned or replicated according to `L`.
///
/// For a distributed vector `dim()` is the length of this process's partition; for a
/// replicated vector it is the full length.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector<L: Layout> {
    data: Array1<f64>,
    _layout: PhantomData<L>,
}

/// A vector whose entries are partitioned across the process group.
pub type DistributedVector = Vector<Distributed>;

/// A vector held in full by every process.
pub type ReplicatedVector = Vector<Replicated>;

impl<L: Layout> Vector<L> {
    /// Creates a zero-filled vector.
    ///
    /// # Panics
    /// If `dim == 0`.
    pub fn zeros(dim: usize) -> Self {
        Self::from_array(Array1::zeros(dim))
    }

    /// Copies `values` into a new vector; the caller keeps ownership of its buffer.
    pub fn from_slice(values: &[f64]) -> Self {
        Self::from_array(Array1::from(values.to_vec()))
    }

    /// # Panics
    /// If `data` is empty.
    pub fn from_array(data: Array1<f64>) -> Self {
        assert!(!data.is_empty(), "vector dimension must be positive");
        Self {
            data,
            _layout: PhantomData,
        }
    }

    pub fn dim(&self) -> usize {
        self.data.len()
    }

    pub fn distributed(&self) -> bool {
        L::DISTRIBUTED
    }

    /// Entry `i` of this process's storage.
    pub fn item(&self, i: usize) -> f64 {
        assert!(i < self.dim(), "vector index {} out of range 0..{}", i, self.dim());
        self.data[i]
    }

    pub fn item_mut(&mut self, i: usize) -> &mut f64 {
        assert!(i < self.dim(), "vector index {} out of range 0..{}", i, self.dim());
        &mut self.data[i]
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.data.view()
    }

    pub fn into_array(self) -> Array1<f64> {
        self.data
    }
}

impl DistributedVector {
    /// Collective: dot product over the global vector.
    pub fn inner_product<C: Communicator + ?Sized>(&self, other: &DistributedVector, comm: &C) -> f64 {
        assert_eq!(
            self.dim(),
            other.dim(),
            "inner product of distributed vectors with different local lengths"
        );
        let mut partial = [self.data.dot(&other.data)];
        comm.all_reduce_sum(&mut partial);
        partial[0]
    }

    /// Collective: Euclidean norm of the global vector.
    pub fn norm<C: Communicator + ?Sized>(&self, comm: &C) -> f64 {
        self.inner_product(self, comm).sqrt()
    }

    /// Collective: length of the global vector.
    pub fn global_dim<C: Communicator + ?Sized>(&self, comm: &C) -> usize {
        comm.all_gather_count(self.dim()).iter().sum()
    }
}

impl ReplicatedVector {
    pub fn inner_product(&self, other: &ReplicatedVector) -> f64 {
        assert_eq!(self.dim(), other.dim(), "inner product of vectors with different lengths");
        self.data.dot(&other.data)
    }

    pub fn norm(&self) -> f64 {
        self.inner_product(self).sqrt()
    }
}
