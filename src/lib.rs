// Static singular value decomposition of distributed snapshot matrices

#![doc = include_str!("../README.md")]

pub mod comm;
pub mod config;
pub mod error;
pub mod factorizer;
pub mod layout;
pub mod linalg_backends;
pub mod matrix;
pub mod sampling;
pub mod static_svd;
pub mod vector;

pub use comm::{Communicator, RowPartition, SelfCommunicator, ThreadCommunicator, ThreadGroup};
pub use config::{RankPolicy, RankRetention, StaticSvdConfig};
pub use error::{SampleError, SvdError, ThreadSafeStdError};
pub use factorizer::{BasisTriple, SvdFactorizer};
pub use layout::{Distributed, Layout, Replicated};
pub use matrix::{AnyMatrix, DistributedMatrix, Matrix, ReplicatedMatrix};
pub use sampling::SampleCollector;
pub use static_svd::{BasisState, StaticSvd};
pub use vector::{DistributedVector, ReplicatedVector, Vector};

#[cfg(test)]
mod static_svd_tests;
