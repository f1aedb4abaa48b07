// src/static_svd_tests.rs
#![cfg(test)]
use crate::comm::{Communicator, SelfCommunicator, ThreadGroup};
use crate::config::{RankRetention, StaticSvdConfig};
use crate::error::{SampleError, SvdError, ThreadSafeStdError};
use crate::linalg_backends::{BackendSVD, LinAlgBackendProvider, SVDOutput};
use crate::matrix::ReplicatedMatrix;
use crate::static_svd::{BasisState, StaticSvd};
use approx::assert_abs_diff_eq;
use ndarray::{s, Array2, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const TOLERANCE: f64 = 1e-10;

fn random_samples(total_dim: usize, num_samples: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((total_dim, num_samples), |_| rng.gen_range(-1.0..1.0))
}

fn assert_close(actual: ArrayView2<f64>, expected: ArrayView2<f64>, tolerance: f64, context: &str) {
    assert_eq!(actual.dim(), expected.dim(), "shape mismatch for {}", context);
    for ((r, c), value) in expected.indexed_iter() {
        assert!(
            (actual[[r, c]] - value).abs() < tolerance,
            "Mismatch at ({}, {}) for {}: {} vs {}",
            r,
            c,
            context,
            actual[[r, c]],
            value
        );
    }
}

// Compares column by column, accepting a global sign flip of each column.
fn assert_close_up_to_column_sign(actual: ArrayView2<f64>, expected: ArrayView2<f64>, tolerance: f64, context: &str) {
    assert_eq!(actual.dim(), expected.dim(), "shape mismatch for {}", context);
    for c in 0..expected.ncols() {
        let direct = actual.column(c).iter().zip(expected.column(c)).all(|(a, e)| (a - e).abs() < tolerance);
        let flipped = actual.column(c).iter().zip(expected.column(c)).all(|(a, e)| (a + e).abs() < tolerance);
        assert!(direct || flipped, "column {} of {} differs beyond sign", c, context);
    }
}

fn assert_orthonormal_columns(m: ArrayView2<f64>, context: &str) {
    let gram = m.t().dot(&m);
    assert_close(gram.view(), Array2::eye(m.ncols()).view(), 1e-10, context);
}

/// Feeds the rows `row_range` of every column of `global` to a fresh static SVD and
/// returns (global spatial basis, temporal basis, singular values, local spatial rows).
fn run_partitioned<C: Communicator>(
    comm: C,
    global: &Array2<f64>,
    row_start: usize,
    row_end: usize,
    config: StaticSvdConfig,
) -> (Array2<f64>, Array2<f64>, Array2<f64>, Array2<f64>) {
    let mut svd = StaticSvd::new(comm, row_end - row_start, config);
    for (i, column) in global.columns().into_iter().enumerate() {
        let local: Vec<f64> = column.slice(s![row_start..row_end]).to_vec();
        svd.take_sample(&local, i as f64, false).unwrap();
    }
    let local_spatial = svd.spatial_basis().unwrap().clone();
    let global_spatial = local_spatial.gather(svd.communicator()).into_array();
    let temporal = svd.temporal_basis().unwrap().view().to_owned();
    let sigma = svd.singular_values().unwrap().view().to_owned();
    (global_spatial, temporal, sigma, local_spatial.into_array())
}

struct FailingKernel;

impl BackendSVD<f64> for FailingKernel {
    fn svd_thin(&self, _matrix: Array2<f64>) -> Result<SVDOutput<f64>, ThreadSafeStdError> {
        Err("kernel did not converge".into())
    }
}

#[test]
fn identity_samples_give_unit_singular_values() {
    let mut svd = StaticSvd::new(SelfCommunicator, 3, StaticSvdConfig::default());
    svd.take_sample(&[1.0, 0.0, 0.0], 0.0, false).unwrap();
    svd.take_sample(&[0.0, 1.0, 0.0], 1.0, false).unwrap();
    svd.take_sample(&[0.0, 0.0, 1.0], 2.0, false).unwrap();

    let basis = svd.basis().unwrap().clone();
    assert_eq!(basis.rank(), 3);
    for i in 0..3 {
        assert_abs_diff_eq!(basis.singular_values.item(i, i), 1.0, epsilon = TOLERANCE);
    }
    let u = basis.spatial_basis.view();
    let v = basis.temporal_basis.view();
    assert_eq!(u.dim(), (3, 3));
    assert_eq!(v.dim(), (3, 3));
    assert_orthonormal_columns(u, "spatial basis");
    assert_orthonormal_columns(v, "temporal basis");
    let reconstructed = basis
        .spatial_basis
        .multiply(&basis.singular_values)
        .multiply(&basis.temporal_basis.transpose());
    assert_close(reconstructed.view(), Array2::eye(3).view(), TOLERANCE, "identity reconstruction");
    assert_eq!(svd.sample_times(), &[0.0, 1.0, 2.0]);
}

#[test]
fn random_samples_reconstruct_and_are_ordered() {
    let global = random_samples(7, 4, 11);
    let (u, v, sigma, _) = run_partitioned(SelfCommunicator, &global, 0, 7, StaticSvdConfig::default());

    assert_eq!(u.dim(), (7, 4));
    assert_eq!(v.dim(), (4, 4));
    assert_orthonormal_columns(u.view(), "spatial basis");
    assert_orthonormal_columns(v.view(), "temporal basis");
    for i in 0..sigma.nrows() {
        assert!(sigma[[i, i]] >= 0.0);
        if i > 0 {
            assert!(sigma[[i - 1, i - 1]] >= sigma[[i, i]]);
        }
        for j in 0..sigma.ncols() {
            if i != j {
                assert_eq!(sigma[[i, j]], 0.0);
            }
        }
    }
    let reconstructed = u.dot(&sigma).dot(&v.t());
    assert_close(reconstructed.view(), global.view(), TOLERANCE, "random reconstruction");
}

#[test]
fn wide_sample_matrix_keeps_min_dimension() {
    let global = random_samples(2, 5, 3);
    let (u, v, sigma, _) = run_partitioned(SelfCommunicator, &global, 0, 2, StaticSvdConfig::default());
    assert_eq!(u.dim(), (2, 2));
    assert_eq!(v.dim(), (5, 2));
    assert_eq!(sigma.dim(), (2, 2));
    assert_close(u.dot(&sigma).dot(&v.t()).view(), global.view(), TOLERANCE, "wide reconstruction");
}

#[test]
fn repeated_basis_query_does_not_refactor() {
    let mut svd = StaticSvd::new(SelfCommunicator, 2, StaticSvdConfig::default());
    svd.take_sample(&[1.0, 2.0], 0.0, false).unwrap();
    svd.take_sample(&[3.0, -1.0], 0.1, false).unwrap();
    assert_eq!(svd.state(), BasisState::Accumulating);

    let first = svd.spatial_basis().unwrap().clone();
    assert!(svd.is_basis_current());
    let second = svd.spatial_basis().unwrap().clone();
    svd.temporal_basis().unwrap();
    svd.singular_values().unwrap();
    assert_eq!(first, second);
    assert_eq!(svd.num_factorizations(), 1);

    svd.take_sample(&[0.0, 1.0], 0.2, false).unwrap();
    assert_eq!(svd.state(), BasisState::Accumulating);
    assert_eq!(svd.temporal_basis().unwrap().num_rows(), 3);
    assert_eq!(svd.num_factorizations(), 2);
}

#[test]
fn two_processes_match_single_process_result() {
    let global = ndarray::array![[1.0], [2.0], [3.0], [4.0]];
    let (serial_u, serial_v, serial_sigma, _) =
        run_partitioned(SelfCommunicator, &global, 0, 4, StaticSvdConfig::default());

    let results = ThreadGroup::new(2)
        .run(|comm| {
            let (start, end) = if comm.rank() == 0 { (0, 2) } else { (2, 4) };
            run_partitioned(comm, &global, start, end, StaticSvdConfig::default())
        })
        .unwrap();

    assert_abs_diff_eq!(serial_sigma[[0, 0]], 30f64.sqrt(), epsilon = TOLERANCE);
    for (rank, (u, v, sigma, local_u)) in results.iter().enumerate() {
        assert_close(sigma.view(), serial_sigma.view(), TOLERANCE, "singular values");
        assert_close_up_to_column_sign(u.view(), serial_u.view(), TOLERANCE, "gathered spatial basis");
        assert_close_up_to_column_sign(v.view(), serial_v.view(), TOLERANCE, "temporal basis");
        let expected_rows = serial_u.slice(s![2 * rank..2 * rank + 2, ..]);
        assert_close_up_to_column_sign(local_u.view(), expected_rows, TOLERANCE, "local spatial rows");
    }
}

#[test]
fn uneven_partitions_give_the_same_basis() {
    let global = random_samples(9, 5, 42);
    let (serial_u, serial_v, serial_sigma, _) =
        run_partitioned(SelfCommunicator, &global, 0, 9, StaticSvdConfig::default());

    let boundaries = [0, 1, 5, 9];
    let results = ThreadGroup::new(3)
        .run(|comm| {
            let rank = comm.rank();
            run_partitioned(comm, &global, boundaries[rank], boundaries[rank + 1], StaticSvdConfig::default())
        })
        .unwrap();

    for (u, v, sigma, _) in &results {
        assert_close(sigma.view(), serial_sigma.view(), TOLERANCE, "singular values");
        assert_close_up_to_column_sign(u.view(), serial_u.view(), TOLERANCE, "spatial basis");
        assert_close_up_to_column_sign(v.view(), serial_v.view(), TOLERANCE, "temporal basis");
        assert_orthonormal_columns(u.view(), "gathered spatial basis");
    }
    // Replicated results are bit-identical across ranks.
    assert_eq!(results[0].1, results[2].1);
    assert_eq!(results[0].2, results[1].2);
}

#[test]
fn zero_sample_is_rejected_without_state_change() {
    let mut svd = StaticSvd::new(SelfCommunicator, 2, StaticSvdConfig::default());
    assert_eq!(svd.take_sample(&[0.0, 0.0], 0.0, false), Err(SampleError::ZeroNorm));
    assert_eq!(svd.state(), BasisState::Empty);
    assert_eq!(svd.num_samples(), 0);
    assert_eq!(svd.num_basis_time_intervals(), 0);
}

#[test]
fn malformed_samples_are_rejected() {
    let mut svd = StaticSvd::new(SelfCommunicator, 2, StaticSvdConfig::default());
    assert_eq!(
        svd.take_sample(&[1.0], 0.0, false),
        Err(SampleError::DimensionMismatch { expected: 2, actual: 1 })
    );
    assert_eq!(svd.take_sample(&[1.0, 1.0], -1.0, false), Err(SampleError::NegativeTime(-1.0)));
    assert_eq!(svd.take_sample(&[f64::NAN, 1.0], 0.0, false), Err(SampleError::NonFinite));
    assert_eq!(svd.take_sample(&[1.0, 1.0], f64::NAN, false), Err(SampleError::NonFiniteTime));
    assert_eq!(svd.take_sample(&[1.0, 1.0], f64::INFINITY, false), Err(SampleError::NonFiniteTime));
    assert_eq!(svd.num_samples(), 0);
}

#[test]
fn rejection_on_one_rank_is_seen_by_all() {
    let outcomes = ThreadGroup::new(2)
        .run(|comm| {
            let mut svd = StaticSvd::new(comm, 2, StaticSvdConfig::default());
            let sample: &[f64] = if comm.rank() == 0 { &[1.0, 2.0] } else { &[1.0, 2.0, 3.0] };
            let outcome = svd.take_sample(sample, 0.0, false);
            // A zero local block is fine as long as the global sample is non-zero.
            let local: &[f64] = if comm.rank() == 0 { &[0.0, 0.0] } else { &[5.0, 0.0] };
            svd.take_sample(local, 1.0, false).unwrap();
            (outcome, svd.num_samples())
        })
        .unwrap();
    assert_eq!(outcomes[0].0, Err(SampleError::RejectedByPeer));
    assert_eq!(
        outcomes[1].0,
        Err(SampleError::DimensionMismatch { expected: 2, actual: 3 })
    );
    assert_eq!(outcomes[0].1, 1);
    assert_eq!(outcomes[1].1, 1);
}

#[test]
fn full_interval_starts_a_new_one() {
    let config = StaticSvdConfig {
        samples_per_time_interval: 2,
        ..StaticSvdConfig::default()
    };
    let mut svd = StaticSvd::new(SelfCommunicator, 2, config);
    assert!(svd.is_new_time_interval());
    svd.take_sample(&[1.0, 0.0], 0.5, false).unwrap();
    svd.take_sample(&[0.0, 1.0], 1.0, false).unwrap();
    assert_eq!(svd.temporal_basis().unwrap().num_rows(), 2);
    assert!(svd.is_new_time_interval());

    svd.take_sample(&[1.0, 1.0], 1.5, false).unwrap();
    assert_eq!(svd.num_basis_time_intervals(), 2);
    assert_eq!(svd.basis_interval_start_time(0), 0.5);
    assert_eq!(svd.basis_interval_start_time(1), 1.5);
    assert_eq!(svd.num_samples(), 1);
    assert_eq!(svd.sample_times(), &[1.5]);
    let sigma = svd.singular_values().unwrap();
    assert_eq!(sigma.num_rows(), 1);
    assert_abs_diff_eq!(sigma.item(0, 0), 2f64.sqrt(), epsilon = TOLERANCE);
}

#[test]
fn dependent_samples_do_not_raise_rank() {
    let mut svd = StaticSvd::new(SelfCommunicator, 3, StaticSvdConfig::default());
    svd.take_sample(&[1.0, 2.0, 0.0], 0.0, false).unwrap();
    svd.take_sample(&[2.0, 4.0, 0.0], 1.0, true).unwrap();
    svd.take_sample(&[-1.0, -2.0, 0.0], 2.0, true).unwrap();

    let basis = svd.basis().unwrap().clone();
    assert_eq!(basis.rank(), 1);
    assert_eq!(basis.temporal_basis.num_rows(), 3);
    // The samples really are rank one, so the truncated triple still reconstructs them.
    let reconstructed = basis
        .spatial_basis
        .multiply(&basis.singular_values)
        .multiply(&basis.temporal_basis.transpose());
    let expected = ndarray::array![[1.0, 2.0, -1.0], [2.0, 4.0, -2.0], [0.0, 0.0, 0.0]];
    assert_close(reconstructed.view(), expected.view(), TOLERANCE, "rank-one reconstruction");
}

#[test]
fn dependence_needs_agreement_of_every_rank() {
    let ranks = ThreadGroup::new(2)
        .run(|comm| {
            let mut svd = StaticSvd::new(comm, 1, StaticSvdConfig::default());
            svd.take_sample(&[1.0], 0.0, false).unwrap();
            svd.take_sample(&[(comm.rank() + 2) as f64], 1.0, comm.rank() == 0).unwrap();
            svd.basis().unwrap().rank()
        })
        .unwrap();
    assert_eq!(ranks, vec![2, 2]);
}

#[test]
fn relative_tolerance_truncates_basis() {
    let config = StaticSvdConfig {
        rank_retention: RankRetention::RelativeTolerance(0.1),
        ..StaticSvdConfig::default()
    };
    let mut svd = StaticSvd::new(SelfCommunicator, 3, config);
    svd.take_sample(&[10.0, 0.0, 0.0], 0.0, false).unwrap();
    svd.take_sample(&[0.0, 0.001, 0.0], 1.0, false).unwrap();
    let basis = svd.basis().unwrap();
    assert_eq!(basis.rank(), 1);
    assert_eq!(basis.spatial_basis.num_columns(), 1);
    assert_eq!(basis.temporal_basis.num_columns(), 1);
    assert_abs_diff_eq!(basis.singular_values.item(0, 0), 10.0, epsilon = TOLERANCE);
}

#[test]
fn injected_rank_policy_is_used() {
    struct KeepOne;
    impl crate::config::RankPolicy for KeepOne {
        fn retained_rank(&self, _singular_values: ndarray::ArrayView1<f64>) -> usize {
            1
        }
    }
    let mut svd = StaticSvd::with_policy(
        SelfCommunicator,
        2,
        StaticSvdConfig::default(),
        Box::new(KeepOne),
        LinAlgBackendProvider::<f64>::new(),
    );
    svd.take_sample(&[1.0, 0.0], 0.0, false).unwrap();
    svd.take_sample(&[0.0, 1.0], 1.0, false).unwrap();
    assert_eq!(svd.singular_values().unwrap().num_rows(), 1);
}

#[test]
fn kernel_failure_is_fatal_and_leaves_basis_stale() {
    let mut svd = StaticSvd::with_policy(
        SelfCommunicator,
        2,
        StaticSvdConfig::default(),
        Box::new(RankRetention::All),
        FailingKernel,
    );
    svd.take_sample(&[1.0, 0.0], 0.0, false).unwrap();
    match svd.spatial_basis() {
        Err(SvdError::Numerical { rows, cols, .. }) => assert_eq!((rows, cols), (2, 1)),
        other => panic!("expected a numerical failure, got {:?}", other.map(|m| m.view().to_owned())),
    }
    assert_eq!(svd.state(), BasisState::Accumulating);
    assert_eq!(svd.num_factorizations(), 0);
}

#[test]
#[should_panic(expected = "before any sample")]
fn basis_before_any_sample_is_a_contract_violation() {
    let mut svd = StaticSvd::new(SelfCommunicator, 2, StaticSvdConfig::default());
    let _ = svd.spatial_basis();
}

#[test]
#[should_panic(expected = "must be positive")]
fn zero_dimension_is_a_contract_violation() {
    StaticSvd::new(SelfCommunicator, 0, StaticSvdConfig::default());
}

#[test]
fn singular_values_matrix_is_replicated_diagonal() {
    let mut svd = StaticSvd::new(SelfCommunicator, 2, StaticSvdConfig::default());
    svd.take_sample(&[3.0, 0.0], 0.0, false).unwrap();
    svd.take_sample(&[0.0, 4.0], 1.0, false).unwrap();
    let sigma: ReplicatedMatrix = svd.singular_values().unwrap().clone();
    assert!(!sigma.distributed());
    assert_close(
        sigma.view(),
        ndarray::array![[4.0, 0.0], [0.0, 3.0]].view(),
        TOLERANCE,
        "diagonal singular values",
    );
    assert!(svd.spatial_basis().unwrap().distributed());
}
