//! Criterion benchmarks for the export hot paths.
//!
//! Run with: `cargo bench --bench encode_bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use psd_export::processing::rle;
use psd_export::{encode_document, BlendMode, Color, Document, Layer, Rect};

const SIZE: u32 = 512;

/// Smooth gradient with flat bands, roughly what a render pass looks like
fn gradient(width: u32, height: u32, tint: Color) -> Vec<Color> {
    (0..height)
        .flat_map(|y| {
            (0..width).map(move |x| {
                let band = ((x / 16) as f32 / (width / 16) as f32).min(1.0);
                let v = y as f32 / height as f32;
                Color::new(tint.r * band, tint.g * v, tint.b, 1.0)
            })
        })
        .collect()
}

fn make_document(mode: BlendMode) -> Document {
    let mut doc = Document::new();
    doc.push_layer(Layer::new("base", Rect::at(0, 0, SIZE, SIZE), gradient(SIZE, SIZE, Color::rgb(1.0, 0.5, 0.2))));
    doc.push_layer(
        Layer::new("overlay", Rect::at(64, 64, SIZE / 2, SIZE / 2), gradient(SIZE / 2, SIZE / 2, Color::rgb(0.2, 0.8, 1.0)))
            .with_blend_mode(mode),
    );
    doc
}

fn bench_rle(c: &mut Criterion) {
    let mut group = c.benchmark_group("rle");
    let flat = vec![0x7Fu8; 4096];
    let noisy: Vec<u8> = (0..4096u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8).collect();
    group.throughput(Throughput::Bytes(4096));
    group.bench_function("flat_4k", |b| b.iter(|| rle::compress(black_box(&flat))));
    group.bench_function("noisy_4k", |b| b.iter(|| rle::compress(black_box(&noisy))));
    group.finish();
}

fn bench_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");
    group.throughput(Throughput::Elements(SIZE as u64 * SIZE as u64));
    for mode in [BlendMode::Normal, BlendMode::SoftLight, BlendMode::Hue] {
        let mut doc = make_document(mode);
        group.bench_function(mode.name(), |b| b.iter(|| doc.build_colors().unwrap()));
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut doc = make_document(BlendMode::Screen);
    doc.build_colors().unwrap();
    c.bench_function("encode_512", |b| b.iter(|| encode_document(black_box(&doc)).unwrap()));
}

criterion_group!(benches, bench_rle, bench_composite, bench_encode);
criterion_main!(benches);
