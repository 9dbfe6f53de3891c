//! Benchmarks for the generation-checked pool.
//!
//! Run with: cargo bench --bench pool

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gfxalloc::Pool;

#[derive(Clone, Copy)]
#[allow(dead_code)]
struct Texture {
    width: u32,
    height: u32,
    format: u32,
    view: u64,
}

const TEXTURE: Texture = Texture { width: 1024, height: 1024, format: 37, view: 0 };

fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool");

    group.bench_function("add_remove", |b| {
        let mut pool = Pool::with_capacity(64);
        b.iter(|| {
            let handle = pool.add(black_box(TEXTURE));
            black_box(pool.remove(handle).unwrap());
        })
    });

    group.bench_function("get_1000x", |b| {
        let mut pool = Pool::new();
        let handles: Vec<_> = (0..1000u64)
            .map(|view| pool.add(Texture { view, ..TEXTURE }))
            .collect();
        b.iter(|| {
            for &handle in &handles {
                black_box(pool.get(handle));
            }
        })
    });

    group.bench_function("iterate_live_1000", |b| {
        let mut pool = Pool::new();
        let handles: Vec<_> = (0..2000u64)
            .map(|view| pool.add(Texture { view, ..TEXTURE }))
            .collect();
        for &handle in handles.iter().step_by(2) {
            pool.remove(handle).unwrap();
        }
        b.iter(|| black_box(pool.iter().map(|(_, t)| t.view).sum::<u64>()))
    });

    group.bench_function("vec_index_baseline_1000x", |b| {
        let textures = vec![TEXTURE; 1000];
        b.iter(|| {
            for i in 0..1000 {
                black_box(&textures[black_box(i)]);
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_pool);
criterion_main!(benches);
