use env_logger::Env;
use static_svd::{Communicator, StaticSvd, StaticSvdConfig, ThreadGroup};

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Four global rows split over two ranks; one snapshot per time step.
    let snapshots = [[1.0, 2.0, 3.0, 4.0], [0.5, 0.0, -0.5, 1.0], [2.0, 1.0, 0.0, -1.0]];
    let config = StaticSvdConfig {
        debug_algorithm: true,
        ..StaticSvdConfig::default()
    };

    let per_rank = ThreadGroup::new(2)
        .run(|comm| {
            let rows = if comm.rank() == 0 { 0..2 } else { 2..4 };
            let mut svd = StaticSvd::new(comm, rows.len(), config.clone());
            for (step, snapshot) in snapshots.iter().enumerate() {
                svd.take_sample(&snapshot[rows.clone()], step as f64, false)
                    .expect("snapshot rejected");
            }
            let basis = svd.basis().expect("static SVD failed");
            (basis.spatial_basis.view().to_owned(), basis.singular_values.view().diag().to_owned())
        })
        .expect("failed to start the rank threads");

    for (rank, (local_rows, singular_values)) in per_rank.iter().enumerate() {
        println!("rank {} spatial basis rows:\n{:.4}", rank, local_rows);
        println!("rank {} singular values: {:.4}", rank, singular_values);
    }
}
