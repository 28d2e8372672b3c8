use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use mesh_bp::prelude::*;

// One step with `n` arrays of 4096 doubles each.
fn build_container(n: usize) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("mesh_bp_bench_{}_{n}.bp", std::process::id()));
    let mut rng = SmallRng::seed_from_u64(42);
    let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
    for i in 0..n {
        w.define_array::<f64>(&format!("/fields/f{i}"), &[Dim::from(4096usize)], Transform::None)
            .unwrap();
    }
    w.open(&path, false).unwrap();
    for i in 0..n {
        let values: Vec<f64> = (0..4096).map(|_| rng.gen_range(0.0..1.0)).collect();
        w.write_array(&format!("/fields/f{i}"), &values).unwrap();
    }
    w.close().unwrap();
    path
}

fn bench_read_batching(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_batching");
    for &n in &[4usize, 32, 128] {
        let path = build_container(n);
        let mut reader = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
        reader.open_file(&path).unwrap();
        let names: Vec<String> = (0..n).map(|i| format!("/fields/f{i}")).collect();

        group.bench_with_input(BenchmarkId::new("batched", n), &names, |b, names| {
            b.iter(|| {
                let handles: Vec<ArrayHandle<f64>> = names
                    .iter()
                    .map(|name| reader.schedule_read_array(name, 0, None).unwrap())
                    .collect();
                reader.wait_for_reads().unwrap();
                handles.len()
            })
        });

        group.bench_with_input(BenchmarkId::new("one_by_one", n), &names, |b, names| {
            b.iter(|| {
                for name in names {
                    let _h: ArrayHandle<f64> = reader.schedule_read_array(name, 0, None).unwrap();
                    reader.wait_for_reads().unwrap();
                }
            })
        });

        reader.close();
        std::fs::remove_file(&path).ok();
    }
    group.finish();
}

criterion_group!(benches, bench_read_batching);
criterion_main!(benches);
