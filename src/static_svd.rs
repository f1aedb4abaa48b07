// src/static_svd.rs

use crate::comm::Communicator;
use crate::config::{RankPolicy, StaticSvdConfig};
use crate::error::{SampleError, SvdError};
use crate::factorizer::{BasisTriple, SvdFactorizer};
use crate::linalg_backends::{BackendSVD, LinAlgBackendProvider};
use crate::matrix::{DistributedMatrix, ReplicatedMatrix};
use crate::sampling::SampleCollector;
use log::{debug, info, warn};

/// Where a [`StaticSvd`] stands within the current time interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasisState {
    /// No sample in the current interval.
    Empty,
    /// Samples present, cached basis missing or stale.
    Accumulating,
    /// The cached basis reflects every sample taken so far.
    Current,
}

/// The static SVD: collects samples over a time interval and, on demand, gathers
/// them onto every process and factors the assembled matrix with a dense SVD.
///
/// The algorithm does not scale with the number of samples or processes; it is the
/// straightforward reference against which streaming variants are checked.
///
/// `take_sample` and any basis query that finds the basis stale are collectives:
/// every process of the group must make the same sequence of these calls.
pub struct StaticSvd<C: Communicator, K: BackendSVD<f64> = LinAlgBackendProvider<f64>> {
    comm: C,
    collector: SampleCollector,
    factorizer: SvdFactorizer<K>,
    basis: Option<BasisTriple>,
    state: BasisState,
    num_factorizations: usize,
}

impl<C: Communicator> StaticSvd<C> {
    /// Creates a static SVD for a state of which this process owns `dim` rows, using
    /// the rank policy of `config` and the default dense SVD backend.
    ///
    /// # Panics
    /// If `dim == 0` or `config.samples_per_time_interval == 0`.
    pub fn new(comm: C, dim: usize, config: StaticSvdConfig) -> Self {
        let policy = Box::new(config.rank_retention);
        Self::with_policy(comm, dim, config, policy, LinAlgBackendProvider::new())
    }
}

impl<C: Communicator, K: BackendSVD<f64>> StaticSvd<C, K> {
    /// Like [`StaticSvd::new`] but with an injected rank policy and dense kernel.
    /// `config.rank_retention` is ignored in favour of `policy`.
    pub fn with_policy(
        comm: C,
        dim: usize,
        config: StaticSvdConfig,
        policy: Box<dyn RankPolicy>,
        kernel: K,
    ) -> Self {
        Self {
            comm,
            collector: SampleCollector::new(dim, config.samples_per_time_interval),
            factorizer: SvdFactorizer::new(kernel, policy, config.debug_algorithm),
            basis: None,
            state: BasisState::Empty,
            num_factorizations: 0,
        }
    }

    /// Collective: offers `sample` (this process's rows of the state at `time`).
    ///
    /// With `add_without_increase` the caller's acceptance policy has judged the
    /// sample linearly dependent on the ones already taken: it is stored, but it
    /// does not raise the number of singular triplets the next pass may keep.
    /// The group must agree on the flag; if any process passes `false` the sample
    /// counts as independent everywhere.
    ///
    /// On rejection no state changes on any process.
    pub fn take_sample(&mut self, sample: &[f64], time: f64, add_without_increase: bool) -> Result<(), SampleError> {
        let local_error = self.validate_sample(sample, time);
        let local_norm_squared: f64 = match local_error {
            None => sample.iter().map(|x| x * x).sum(),
            Some(_) => 0.0,
        };
        // [global norm², processes that rejected, processes that judged it dependent]
        let mut verdict = [
            local_norm_squared,
            if local_error.is_some() { 1.0 } else { 0.0 },
            if add_without_increase { 1.0 } else { 0.0 },
        ];
        self.comm.all_reduce_sum(&mut verdict);

        if let Some(error) = local_error {
            warn!("Rank {}: rejecting sample at time {}: {}", self.comm.rank(), time, error);
            return Err(error);
        }
        if verdict[1] > 0.0 {
            warn!("Rank {}: sample at time {} rejected by {} peer(s).", self.comm.rank(), time, verdict[1]);
            return Err(SampleError::RejectedByPeer);
        }
        if verdict[0] == 0.0 {
            warn!("Rank {}: rejecting all-zero sample at time {}.", self.comm.rank(), time);
            return Err(SampleError::ZeroNorm);
        }

        if self.collector.is_new_time_interval() {
            self.collector.start_time_interval(time);
            info!(
                "Starting time interval {} at time {}.",
                self.collector.num_time_intervals() - 1,
                time
            );
        }
        let linearly_dependent = verdict[2] as usize == self.comm.size();
        self.collector.push(sample, time, linearly_dependent);
        self.basis = None;
        self.state = BasisState::Accumulating;
        debug!(
            "Rank {}: took sample {} of interval at time {} (dependent: {}).",
            self.comm.rank(),
            self.collector.num_samples(),
            time,
            linearly_dependent
        );
        Ok(())
    }

    /// This process's rows of the left singular vectors, `dim x k`.
    ///
    /// Factorizes first (collectively) if a sample arrived since the last pass.
    pub fn spatial_basis(&mut self) -> Result<&DistributedMatrix, SvdError> {
        Ok(&self.basis()?.spatial_basis)
    }

    /// The right singular vectors, `num_samples x k`, replicated.
    pub fn temporal_basis(&mut self) -> Result<&ReplicatedMatrix, SvdError> {
        Ok(&self.basis()?.temporal_basis)
    }

    /// The retained singular values as a `k x k` diagonal matrix, replicated.
    pub fn singular_values(&mut self) -> Result<&ReplicatedMatrix, SvdError> {
        Ok(&self.basis()?.singular_values)
    }

    /// The whole basis triple of the current interval.
    ///
    /// # Panics
    /// If no sample has been taken in the current time interval.
    pub fn basis(&mut self) -> Result<&BasisTriple, SvdError> {
        assert!(
            self.state != BasisState::Empty,
            "a basis was requested before any sample was taken"
        );
        let basis = match self.basis.take() {
            Some(basis) => basis,
            None => {
                let basis = self.factorizer.factorize(&self.collector, &self.comm)?;
                self.num_factorizations += 1;
                basis
            }
        };
        self.state = BasisState::Current;
        Ok(self.basis.insert(basis))
    }

    /// Number of rows of the state owned by this process.
    pub fn dim(&self) -> usize {
        self.collector.dim()
    }

    pub fn num_samples(&self) -> usize {
        self.collector.num_samples()
    }

    /// Simulation times of the samples of the current interval, in arrival order.
    pub fn sample_times(&self) -> &[f64] {
        self.collector.sample_times()
    }

    pub fn state(&self) -> BasisState {
        self.state
    }

    pub fn is_basis_current(&self) -> bool {
        self.state == BasisState::Current
    }

    /// True when the next accepted sample will open a new time interval.
    pub fn is_new_time_interval(&self) -> bool {
        self.collector.is_new_time_interval()
    }

    pub fn num_basis_time_intervals(&self) -> usize {
        self.collector.num_time_intervals()
    }

    pub fn basis_interval_start_time(&self, interval: usize) -> f64 {
        self.collector.interval_start_time(interval)
    }

    /// How many factorization passes this instance has run.
    pub fn num_factorizations(&self) -> usize {
        self.num_factorizations
    }

    pub fn communicator(&self) -> &C {
        &self.comm
    }

    fn validate_sample(&self, sample: &[f64], time: f64) -> Option<SampleError> {
        if sample.len() != self.collector.dim() {
            Some(SampleError::DimensionMismatch {
                expected: self.collector.dim(),
                actual: sample.len(),
            })
        } else if !time.is_finite() {
            Some(SampleError::NonFiniteTime)
        } else if time < 0.0 {
            Some(SampleError::NegativeTime(time))
        } else if sample.iter().any(|x| !x.is_finite()) {
            Some(SampleError::NonFinite)
        } else {
            None
        }
    }
}
