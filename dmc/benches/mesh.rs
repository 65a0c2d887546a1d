use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dmc::{Feature, MarchingCubes, Position, ThreadPool};
use std::hint::black_box;

/// Samples a slightly wobbly sphere on an `n³` grid
fn sphere(n: usize) -> (Vec<f32>, Vec<Feature>) {
    let center = Position::repeat((n - 1) as f32 / 2.0);
    let radius = n as f32 * 0.35;
    let mut sdfs = Vec::with_capacity(n * n * n);
    let mut feats = Vec::with_capacity(n * n * n);
    for x in 0..n {
        for y in 0..n {
            for z in 0..n {
                let p = Position::new(x as f32, y as f32, z as f32);
                let wobble = (p.x * 0.7).sin() * (p.y * 0.5).cos();
                sdfs.push((p - center).norm() - radius + wobble);
                feats.push(Feature::splat(p.z));
            }
        }
    }
    (sdfs, feats)
}

fn pools() -> Vec<(usize, Option<ThreadPool>)> {
    let mut out = vec![(1, None)];
    for threads in [2, 4, 8] {
        out.push((threads, Some(ThreadPool::new(threads).unwrap())));
    }
    out
}

pub fn forward_thread_sweep(c: &mut Criterion) {
    let n = 128;
    let (sdfs, feats) = sphere(n);
    let mut group = c.benchmark_group("forward vs threads (sphere, 128³)");
    for (threads, pool) in pools() {
        let mut mc = MarchingCubes::new(n, n, n).unwrap();
        group.bench_function(BenchmarkId::new("forward", threads), |b| {
            b.iter(|| {
                mc.forward(&sdfs, &feats, [n, n, n], 0.0, pool.as_ref())
                    .unwrap();
                black_box(mc.n_tris())
            })
        });
    }
}

pub fn backward_thread_sweep(c: &mut Criterion) {
    let n = 128;
    let (sdfs, feats) = sphere(n);
    let mut group = c.benchmark_group("backward vs threads (sphere, 128³)");
    for (threads, pool) in pools() {
        let mut mc = MarchingCubes::new(n, n, n).unwrap();
        mc.forward(&sdfs, &feats, [n, n, n], 0.0, pool.as_ref())
            .unwrap();
        let adj_verts = vec![Position::new(0.0, 0.0, 1.0); mc.n_verts()];
        let adj_feats = vec![Feature::splat(1.0); mc.n_verts()];
        let mut adj_sdfs = vec![0.0; sdfs.len()];
        let mut adj_grid = vec![Feature::zeros(); sdfs.len()];
        group.bench_function(BenchmarkId::new("backward", threads), |b| {
            b.iter(|| {
                mc.backward(
                    &sdfs,
                    &feats,
                    &adj_verts,
                    &adj_feats,
                    &mut adj_sdfs,
                    &mut adj_grid,
                    0.0,
                    pool.as_ref(),
                )
                .unwrap();
                black_box(adj_sdfs[0])
            })
        });
    }
}

pub fn forward_resolution_sweep(c: &mut Criterion) {
    let pool = ThreadPool::Global;
    let mut group = c.benchmark_group("forward vs resolution (sphere)");
    let mut mc = MarchingCubes::new(1, 1, 1).unwrap();
    for n in [32, 64, 128, 192] {
        let (sdfs, feats) = sphere(n);
        mc.resize(n, n, n).unwrap();
        group.bench_function(BenchmarkId::new("forward", n), |b| {
            b.iter(|| {
                mc.forward(&sdfs, &feats, [n, n, n], 0.0, Some(&pool))
                    .unwrap();
                black_box(mc.n_tris())
            })
        });
    }
}

criterion_group!(
    benches,
    forward_thread_sweep,
    backward_thread_sweep,
    forward_resolution_sweep
);
criterion_main!(benches);
