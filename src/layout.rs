// src/layout.rs

//! Type-level markers for how a matrix or vector is spread over the process group.

use std::fmt::Debug;

/// Storage layout of a distributed-algebra object.
///
/// Implemented only by [`Distributed`] and [`Replicated`].
pub trait Layout: Copy + Default + Debug + Send + Sync + sealed::Sealed + 'static {
    /// True when each process holds only its own block of rows.
    const DISTRIBUTED: bool;
}

/// Rows are partitioned across processes; partitions may differ in size.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Distributed;

/// Every process holds an identical, complete copy.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Replicated;

impl Layout for Distributed {
    const DISTRIBUTED: bool = true;
}

impl Layout for Replicated {
    const DISTRIBUTED: bool = false;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Distributed {}
    impl Sealed for super::Replicated {}
}
