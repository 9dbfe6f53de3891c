//! Scratch arena vs bumpalo vs Vec.
//!
//! Run with: cargo bench --bench scratch

use bumpalo::Bump;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gfxalloc::ScratchArena;

const REGIONS: [u64; 16] = [0; 16];

fn bench_staging(c: &mut Criterion) {
    let mut group = c.benchmark_group("staging_100_slices");

    group.bench_function("scratch_arena", |b| {
        let mut arena = ScratchArena::new(64 * 1024);
        b.iter(|| {
            for _ in 0..100 {
                black_box(arena.alloc_slice_copy(&REGIONS).unwrap());
            }
            arena.reset();
        })
    });

    group.bench_function("bumpalo", |b| {
        let mut bump = Bump::with_capacity(64 * 1024);
        b.iter(|| {
            for _ in 0..100 {
                black_box(bump.alloc_slice_copy(&REGIONS));
            }
            bump.reset();
        })
    });

    group.bench_function("vec", |b| {
        b.iter(|| {
            for _ in 0..100 {
                black_box(REGIONS.to_vec());
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_staging);
criterion_main!(benches);
