// src/comm.rs

//! Process-group primitives used by the distributed algebra and the static SVD.
//!
//! Every method of [`Communicator`] other than `rank`/`size` is a collective: all
//! members of the group must call it, in the same order, with compatible shapes.
//! A member that skips a collective hangs the group; nothing here detects that.

use log::trace;
use rayon::{ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::{Arc, Barrier, Mutex, PoisonError};

/// Rank/size queries plus the collectives the core needs.
pub trait Communicator: Sync {
    /// Rank of the calling process, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Gathers a variable-length contribution from every rank.
    /// The result is indexed by rank and identical on every process.
    fn all_gather_v(&self, local: &[f64]) -> Vec<Vec<f64>>;

    /// Gathers one count per rank, indexed by rank.
    fn all_gather_count(&self, local: usize) -> Vec<usize>;

    /// Element-wise sum of `buffer` over all ranks, written back in place.
    /// Every rank must pass a buffer of the same length.
    fn all_reduce_sum(&self, buffer: &mut [f64]);

    /// Blocks until every rank has reached the barrier.
    fn barrier(&self);
}

impl<C: Communicator + ?Sized> Communicator for &C {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn all_gather_v(&self, local: &[f64]) -> Vec<Vec<f64>> {
        (**self).all_gather_v(local)
    }

    fn all_gather_count(&self, local: usize) -> Vec<usize> {
        (**self).all_gather_count(local)
    }

    fn all_reduce_sum(&self, buffer: &mut [f64]) {
        (**self).all_reduce_sum(buffer)
    }

    fn barrier(&self) {
        (**self).barrier()
    }
}

/// The trivial group of one process. Every collective is a local no-op.
#[derive(Debug, Default, Copy, Clone)]
pub struct SelfCommunicator;

impl Communicator for SelfCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather_v(&self, local: &[f64]) -> Vec<Vec<f64>> {
        vec![local.to_vec()]
    }

    fn all_gather_count(&self, local: usize) -> Vec<usize> {
        vec![local]
    }

    fn all_reduce_sum(&self, _buffer: &mut [f64]) {}

    fn barrier(&self) {}
}

/// Exchange area shared by the members of a [`ThreadGroup`].
#[derive(Debug)]
struct ExchangeSlots {
    barrier: Barrier,
    values: Mutex<Vec<Vec<f64>>>,
    counts: Mutex<Vec<usize>>,
}

/// A process group whose members are threads of one rayon pool, one thread per rank.
///
/// Useful for running the distributed algorithms inside a single OS process, e.g. in
/// tests or on a shared-memory node.
#[derive(Debug, Copy, Clone)]
pub struct ThreadGroup {
    size: usize,
}

impl ThreadGroup {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "a process group needs at least one member");
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `op` once per rank, each on its own pool thread, and returns the results
    /// in rank order. `op` must issue the same sequence of collectives on every rank.
    pub fn run<T, OP>(&self, op: OP) -> Result<Vec<T>, ThreadPoolBuildError>
    where
        T: Send,
        OP: Fn(&ThreadCommunicator) -> T + Sync,
    {
        let shared = Arc::new(ExchangeSlots {
            barrier: Barrier::new(self.size),
            values: Mutex::new(vec![Vec::new(); self.size]),
            counts: Mutex::new(vec![0; self.size]),
        });
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.size)
            .thread_name(|index| format!("rank-{}", index))
            .build()?;
        let size = self.size;
        Ok(pool.broadcast(|ctx| {
            let comm = ThreadCommunicator {
                rank: ctx.index(),
                size,
                shared: Arc::clone(&shared),
            };
            op(&comm)
        }))
    }
}

/// Handle given to each rank of a [`ThreadGroup`].
#[derive(Debug)]
pub struct ThreadCommunicator {
    rank: usize,
    size: usize,
    shared: Arc<ExchangeSlots>,
}

impl ThreadCommunicator {
    /// Publishes `local` in this rank's slot, waits for every rank, and returns all
    /// contributions by rank.
    fn exchange<T: Clone>(&self, slots: &Mutex<Vec<T>>, local: T) -> Vec<T> {
        slots.lock().unwrap_or_else(PoisonError::into_inner)[self.rank] = local;
        self.shared.barrier.wait();
        let gathered = slots.lock().unwrap_or_else(PoisonError::into_inner).clone();
        // No rank may overwrite its slot for the next collective until all have read.
        self.shared.barrier.wait();
        gathered
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather_v(&self, local: &[f64]) -> Vec<Vec<f64>> {
        trace!("rank {}: all_gather_v contributing {} values", self.rank, local.len());
        self.exchange(&self.shared.values, local.to_vec())
    }

    fn all_gather_count(&self, local: usize) -> Vec<usize> {
        self.exchange(&self.shared.counts, local)
    }

    fn all_reduce_sum(&self, buffer: &mut [f64]) {
        let contributions = self.exchange(&self.shared.values, buffer.to_vec());
        // Summing in rank order keeps the result bit-identical on every rank.
        buffer.fill(0.0);
        for contribution in &contributions {
            assert_eq!(
                contribution.len(),
                buffer.len(),
                "all_reduce_sum called with buffers of different lengths"
            );
            for (acc, value) in buffer.iter_mut().zip(contribution) {
                *acc += *value;
            }
        }
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}

/// Row layout of a distributed object: how many rows each rank owns and where its
/// block starts in the global row numbering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowPartition {
    counts: Vec<usize>,
    offsets: Vec<usize>,
}

impl RowPartition {
    /// Builds the layout from the per-rank row counts.
    pub fn from_counts(counts: Vec<usize>) -> Self {
        let mut offsets = Vec::with_capacity(counts.len());
        let mut running = 0;
        for &count in &counts {
            offsets.push(running);
            running += count;
        }
        Self { counts, offsets }
    }

    /// Collective: every rank contributes its local row count.
    pub fn gather<C: Communicator + ?Sized>(comm: &C, local_rows: usize) -> Self {
        Self::from_counts(comm.all_gather_count(local_rows))
    }

    pub fn num_ranks(&self) -> usize {
        self.counts.len()
    }

    pub fn local_rows(&self, rank: usize) -> usize {
        self.counts[rank]
    }

    /// First global row owned by `rank`.
    pub fn offset(&self, rank: usize) -> usize {
        self.offsets[rank]
    }

    pub fn total_rows(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }
}
