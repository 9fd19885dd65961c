//! Benchmarks for the solver kernels
//!
//! Measures the Jacobi interior sweep (serial and threaded) and the
//! face pack/unpack kernels across mesh sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use furnace::backend::{Backend, Serial, Threaded};
use furnace::chunk::{Chunk, Face};
use furnace::decompose::Extent;
use furnace::pack;
use furnace::settings::{Coefficient, Field, FieldMask, Settings};

/// Square mesh edge lengths to test (cells, excluding halo)
const MESH_SIZES: &[usize] = &[64, 256, 512];

fn build_chunk(cells: usize, seed: u64) -> (Settings, Chunk) {
    let mut settings = Settings {
        grid_x_cells: cells,
        grid_y_cells: cells,
        grid_x_max: cells as f64,
        grid_y_max: cells as f64,
        ..Settings::default()
    };
    settings.finalise().expect("valid settings");

    let extent = Extent { left: 0, right: cells, bottom: 0, top: cells };
    let mut chunk = Chunk::new(&settings, extent);

    let mut rng = StdRng::seed_from_u64(seed);
    for index in 0..chunk.x * chunk.y {
        chunk.density[index] = rng.gen_range(0.5..2.0);
        chunk.energy[index] = rng.gen_range(0.1..10.0);
    }
    Serial.jacobi_init(&mut chunk, settings.halo_depth, Coefficient::Conductivity, 0.04, 0.04);
    (settings, chunk)
}

fn bench_jacobi_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("jacobi_iterate");

    for &cells in MESH_SIZES {
        let (settings, chunk) = build_chunk(cells, 42);
        let interior_bytes = (cells * cells * std::mem::size_of::<f64>()) as u64;
        group.throughput(Throughput::Bytes(interior_bytes));

        group.bench_with_input(BenchmarkId::new("serial", cells), &chunk, |b, chunk| {
            let mut working = chunk.clone();
            b.iter(|| black_box(Serial.jacobi_iterate(&mut working, settings.halo_depth)));
        });
        group.bench_with_input(BenchmarkId::new("threaded", cells), &chunk, |b, chunk| {
            let mut working = chunk.clone();
            b.iter(|| black_box(Threaded.jacobi_iterate(&mut working, settings.halo_depth)));
        });
    }

    group.finish();
}

fn bench_pack_unpack(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack");

    let mask = FieldMask::of(&[Field::U]);
    for &cells in MESH_SIZES {
        let (settings, chunk) = build_chunk(cells, 7);
        let depth = settings.halo_depth;
        let len = pack::buffer_len(Face::Left, depth, chunk.x, chunk.y, &mask);
        group.throughput(Throughput::Bytes((len * std::mem::size_of::<f64>()) as u64));

        group.bench_with_input(BenchmarkId::new("pack_left", cells), &chunk, |b, chunk| {
            let mut buffer = vec![0.0; len];
            b.iter(|| {
                black_box(pack::pack(chunk, Face::Left, depth, depth, &mask, &mut buffer))
            });
        });
        group.bench_with_input(BenchmarkId::new("unpack_left", cells), &chunk, |b, chunk| {
            let mut working = chunk.clone();
            let mut buffer = vec![0.0; len];
            pack::pack(&working, Face::Left, depth, depth, &mask, &mut buffer);
            b.iter(|| {
                pack::unpack(&mut working, Face::Left, depth, depth, &mask, &buffer);
                black_box(&working);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_jacobi_iterate, bench_pack_unpack);
criterion_main!(benches);
