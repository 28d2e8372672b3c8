#![allow(dead_code)]
use mesh_bp::algs::communicator::LocalComm;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

/// Per-process scratch file under the system temp dir.
pub fn scratch(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mesh_bp_it_{}_{name}.bp", std::process::id()))
}

/// Run `f` once per rank of a fresh in-process world and collect the
/// results in rank order.
pub fn run_ranks<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(LocalComm) -> T + Send + Sync,
{
    let comms = LocalComm::world(size);
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let f = &f;
                s.spawn(move || f(comm))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Deterministic pseudo-random payload.
pub fn payload(seed: u64, n: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}
