// src/config.rs

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Decides how many of the computed singular triplets a factorization pass keeps.
///
/// `singular_values` are non-negative and sorted in non-increasing order. The
/// returned count is clamped to `1..=singular_values.len()` by the caller.
pub trait RankPolicy: Send + Sync {
    fn retained_rank(&self, singular_values: ArrayView1<f64>) -> usize;
}

/// Built-in rank retention rules.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub enum RankRetention {
    /// Keep every singular value, `k = r`.
    #[default]
    All,
    /// Keep at most this many.
    Fixed(usize),
    /// Keep singular values strictly greater than this fraction of the largest one.
    RelativeTolerance(f64),
}

impl RankPolicy for RankRetention {
    fn retained_rank(&self, singular_values: ArrayView1<f64>) -> usize {
        match *self {
            RankRetention::All => singular_values.len(),
            RankRetention::Fixed(k) => k.min(singular_values.len()),
            RankRetention::RelativeTolerance(tol) => {
                let largest = singular_values.iter().next().copied().unwrap_or(0.0);
                let threshold = largest * tol.max(0.0).min(1.0);
                singular_values.iter().take_while(|&&sv| sv > threshold).count()
            }
        }
    }
}

/// Configuration of a [`crate::StaticSvd`].
///
/// The per-process state dimension is not part of the configuration because it
/// generally differs between processes; it is passed to the constructor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StaticSvdConfig {
    /// Maximum number of samples collected in one time interval. The sample after
    /// the last one that fits starts a new interval. Must be greater than 0.
    pub samples_per_time_interval: usize,

    /// Emit the full basis triple at `debug!` level after every factorization pass.
    pub debug_algorithm: bool,

    /// How many singular triplets a factorization pass keeps.
    pub rank_retention: RankRetention,
}

impl Default for StaticSvdConfig {
    fn default() -> Self {
        StaticSvdConfig {
            samples_per_time_interval: 1000,
            debug_algorithm: false,
            rank_retention: RankRetention::All,
        }
    }
}
