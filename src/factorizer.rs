// src/factorizer.rs

use crate::comm::{Communicator, RowPartition};
use crate::config::RankPolicy;
use crate::error::SvdError;
use crate::linalg_backends::BackendSVD;
use crate::matrix::{DistributedMatrix, ReplicatedMatrix};
use crate::sampling::SampleCollector;
use log::{debug, info, trace};
use ndarray::s;
use std::time::Instant;

/// The three results of one factorization pass, always replaced together.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisTriple {
    /// Left singular vectors restricted to this process's rows, `dim x k`.
    pub spatial_basis: DistributedMatrix,
    /// Right singular vectors, `num_samples x k`, identical on every process.
    pub temporal_basis: ReplicatedMatrix,
    /// `k x k` diagonal matrix of the retained singular values, largest first.
    pub singular_values: ReplicatedMatrix,
}

impl BasisTriple {
    /// Number of retained singular triplets.
    pub fn rank(&self) -> usize {
        self.singular_values.num_rows()
    }
}

/// Gathers the distributed sample matrix onto every process, factors it with the
/// dense kernel `K` and hands each process its share of the result.
pub struct SvdFactorizer<K> {
    kernel: K,
    policy: Box<dyn RankPolicy>,
    debug_algorithm: bool,
}

impl<K: BackendSVD<f64>> SvdFactorizer<K> {
    pub fn new(kernel: K, policy: Box<dyn RankPolicy>, debug_algorithm: bool) -> Self {
        Self {
            kernel,
            policy,
            debug_algorithm,
        }
    }

    /// Collective: one full gather + factorize + redistribute pass over the samples
    /// held by `collector`. Every process must hold the same number of samples.
    pub fn factorize<C: Communicator + ?Sized>(
        &self,
        collector: &SampleCollector,
        comm: &C,
    ) -> Result<BasisTriple, SvdError> {
        let pass_start_time = Instant::now();
        let num_samples = collector.num_samples();

        let sample_counts = comm.all_gather_count(num_samples);
        assert!(
            sample_counts.iter().all(|&count| count == num_samples),
            "processes hold different numbers of samples: {:?}",
            sample_counts
        );
        let partition = RowPartition::gather(comm, collector.dim());
        debug!(
            "Rank {}: gathering sample matrix, row counts per rank {:?}, {} samples.",
            comm.rank(),
            partition.counts(),
            num_samples
        );

        let sample_matrix = collector.local_block().gather(comm);
        let (total_dim, num_cols) = (sample_matrix.num_rows(), sample_matrix.num_columns());
        info!(
            "Computing static SVD of {}x{} sample matrix on rank {} of {}.",
            total_dim,
            num_cols,
            comm.rank(),
            comm.size()
        );

        let svd = self
            .kernel
            .svd_thin(sample_matrix.into_array())
            .map_err(|source| SvdError::Numerical {
                rows: total_dim,
                cols: num_cols,
                source,
            })?;
        let full_rank = svd.s.len();
        trace!("Dense SVD returned {} singular values: {:?}", full_rank, svd.s);

        let policy_rank = self.policy.retained_rank(svd.s.view()).clamp(1, full_rank);
        let retained_rank = policy_rank.min(collector.rank_growth().max(1));
        debug!(
            "Retaining {} of {} singular values (policy allowed {}, rank growth {}).",
            retained_rank,
            full_rank,
            policy_rank,
            collector.rank_growth()
        );

        let global_u = ReplicatedMatrix::from_array(svd.u.slice(s![.., ..retained_rank]).to_owned());
        let spatial_basis = global_u.distribute_rows(&partition, comm.rank());
        let temporal_basis = ReplicatedMatrix::from_array(svd.vt.slice(s![..retained_rank, ..]).t().to_owned());
        let retained_values: Vec<f64> = svd.s.iter().take(retained_rank).copied().collect();
        let singular_values = ReplicatedMatrix::from_diagonal(&retained_values);

        let basis = BasisTriple {
            spatial_basis,
            temporal_basis,
            singular_values,
        };
        if self.debug_algorithm {
            debug!("Rank {}: spatial basis (local rows)\n{:?}", comm.rank(), basis.spatial_basis.view());
            debug!("Rank {}: temporal basis\n{:?}", comm.rank(), basis.temporal_basis.view());
            debug!("Rank {}: singular values\n{:?}", comm.rank(), basis.singular_values.view());
        }
        info!(
            "Static SVD pass finished in {:?}: rank {} basis over {} samples.",
            pass_start_time.elapsed(),
            retained_rank,
            num_cols
        );
        Ok(basis)
    }
}
