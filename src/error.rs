use std::error::Error;
use thiserror::Error;

/// A thread-safe wrapper for standard dynamic errors,
/// so they implement `Send` and `Sync`.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

/// Fatal failures of a factorization pass.
///
/// Contract violations (mismatched shapes, illegal layout combinations) are not
/// represented here; they panic at the call site.
#[derive(Debug, Error)]
pub enum SvdError {
    /// The dense SVD kernel could not factor the assembled sample matrix.
    #[error("dense SVD of the {rows}x{cols} sample matrix failed: {source}")]
    Numerical {
        rows: usize,
        cols: usize,
        #[source]
        source: ThreadSafeStdError,
    },
}

/// Reasons a sample is refused by `take_sample`.
///
/// Every process of the group reaches the same verdict for a given sample, so a
/// rejection never leaves the group out of step.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("sample has {actual} entries but this process owns {expected} rows")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("sample time {0} is negative")]
    NegativeTime(f64),

    #[error("sample time is NaN or infinite")]
    NonFiniteTime,

    #[error("sample contains NaN or infinite entries")]
    NonFinite,

    #[error("sample is identically zero across the process group")]
    ZeroNorm,

    #[error("sample was rejected by another process of the group")]
    RejectedByPeer,
}
