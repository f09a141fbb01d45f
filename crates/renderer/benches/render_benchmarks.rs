//! Benchmarks for tile coloring and PNG encoding.
//!
//! Run with: cargo bench --package renderer --bench render_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use renderer::raster::put_pixel;
use renderer::{arrow_geometry, draw_vector, Color, ColorScheme, Colorer, Raster};

/// CAPE-like field in J/kg with noise.
fn generate_cape_values(size: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..size * size)
        .map(|i| {
            let (x, y) = ((i % size) as f32, (i / size) as f32);
            let blob = (-((x - 128.0).powi(2) + (y - 128.0).powi(2)) / 4000.0).exp();
            (blob * 3000.0 + rng.gen_range(0.0..150.0)).max(0.0)
        })
        .collect()
}

fn color_tile(colorer: &Colorer, values: &[f32], size: usize) -> Raster {
    let mut raster = Raster::new(size, size);
    raster.fill_rows(|y, row| {
        for x in 0..size {
            let color = colorer.render(values[y * size + x], 2500.0, ColorScheme::Jet, None);
            put_pixel(row, x, color);
        }
    });
    raster
}

fn bench_color_tile(c: &mut Criterion) {
    let colorer = Colorer::new();
    let mut group = c.benchmark_group("color_tile");

    for size in [128usize, 256, 512] {
        let values = generate_cape_values(size);
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &values, |b, values| {
            b.iter(|| color_tile(&colorer, black_box(values), size))
        });
    }
    group.finish();
}

fn bench_encode_png(c: &mut Criterion) {
    let colorer = Colorer::new();
    let values = generate_cape_values(256);
    let raster = color_tile(&colorer, &values, 256);

    let mut flat = Raster::new(256, 256);
    flat.fill_rows(|_, row| {
        for x in 0..256 {
            put_pixel(row, x, colorer.render(1200.0, 2500.0, ColorScheme::Jet, Some(0.7)));
        }
    });

    c.bench_function("encode_png_noisy_256", |b| {
        b.iter(|| black_box(&raster).encode_png())
    });
    c.bench_function("encode_png_flat_256", |b| {
        b.iter(|| black_box(&flat).encode_png())
    });
}

fn bench_arrows(c: &mut Criterion) {
    c.bench_function("draw_64_arrows", |b| {
        b.iter(|| {
            let mut raster = Raster::new(256, 256);
            for block in 0..64 {
                let cx = (block % 8) as f32 * 32.0 + 16.0;
                let cy = (block / 8) as f32 * 32.0 + 16.0;
                let (head, a, b) = arrow_geometry((cx, cy), 10.0, -6.0);
                draw_vector(
                    &mut raster,
                    (cx as i32, cy as i32),
                    head,
                    a,
                    b,
                    Color::rgb(255, 255, 255),
                );
            }
            raster
        })
    });
}

criterion_group!(benches, bench_color_tile, bench_encode_png, bench_arrows);
criterion_main!(benches);
