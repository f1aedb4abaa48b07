// src/sampling.rs

use crate::matrix::DistributedMatrix;
use ndarray::{Array1, Array2};

/// Per-process store of the samples of the current time interval.
///
/// Holds this process's rows of every accepted sample together with its simulation
/// time, and the bookkeeping of how many samples were allowed to grow the rank of
/// the basis. A time interval holds at most `samples_per_time_interval` samples.
#[derive(Debug, Clone)]
pub struct SampleCollector {
    dim: usize,
    samples_per_time_interval: usize,
    samples: Vec<Array1<f64>>,
    sample_times: Vec<f64>,
    rank_growth: usize,
    interval_start_times: Vec<f64>,
}

impl SampleCollector {
    /// # Panics
    /// If `dim` or `samples_per_time_interval` is zero.
    pub fn new(dim: usize, samples_per_time_interval: usize) -> Self {
        assert!(dim > 0, "the state dimension owned by a process must be positive");
        assert!(samples_per_time_interval > 0, "samples_per_time_interval must be positive");
        Self {
            dim,
            samples_per_time_interval,
            samples: Vec::with_capacity(samples_per_time_interval.min(64)),
            sample_times: Vec::new(),
            rank_growth: 0,
            interval_start_times: Vec::new(),
        }
    }

    /// Number of rows of each sample owned by this process.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn sample_times(&self) -> &[f64] {
        &self.sample_times
    }

    /// Number of samples in this interval that were allowed to grow the rank.
    pub fn rank_growth(&self) -> usize {
        self.rank_growth
    }

    /// True when the next sample has to open a new time interval.
    pub fn is_new_time_interval(&self) -> bool {
        self.interval_start_times.is_empty() || self.samples.len() >= self.samples_per_time_interval
    }

    pub fn num_time_intervals(&self) -> usize {
        self.interval_start_times.len()
    }

    /// # Panics
    /// If `interval` has not been started.
    pub fn interval_start_time(&self, interval: usize) -> f64 {
        assert!(
            interval < self.interval_start_times.len(),
            "time interval {} has not started (only {} so far)",
            interval,
            self.interval_start_times.len()
        );
        self.interval_start_times[interval]
    }

    /// Discards the samples of the current interval and opens a new one at `time`.
    pub fn start_time_interval(&mut self, time: f64) {
        self.samples.clear();
        self.sample_times.clear();
        self.rank_growth = 0;
        self.interval_start_times.push(time);
    }

    /// Appends a validated sample. A sample flagged `linearly_dependent` is stored
    /// but does not count towards rank growth, except for the first sample of an
    /// interval, which always does.
    pub fn push(&mut self, sample: &[f64], time: f64, linearly_dependent: bool) {
        assert_eq!(sample.len(), self.dim, "sample length must match the owned dimension");
        if self.samples.is_empty() || !linearly_dependent {
            self.rank_growth += 1;
        }
        self.samples.push(Array1::from(sample.to_vec()));
        self.sample_times.push(time);
    }

    /// This process's block of the sample matrix: `dim` rows, one column per sample.
    ///
    /// # Panics
    /// If no sample has been taken in this interval.
    pub fn local_block(&self) -> DistributedMatrix {
        assert!(!self.samples.is_empty(), "no samples in the current time interval");
        let block = Array2::from_shape_fn((self.dim, self.samples.len()), |(row, col)| self.samples[col][row]);
        DistributedMatrix::from_array(block)
    }
}
