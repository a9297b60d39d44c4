//! Benchmarks for the compression and encryption stages
//!
//! Run with: cargo bench --package autodag-core --bench transform

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use autodag_core::{
    bytes_source, collect_bytes, transform::reverse, ByteSourceExt, CompressionConfig,
    EncryptionConfig, EncryptionKey, TransformOptions,
};

fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn bench_forward(c: &mut Criterion) {
    let key = EncryptionKey::generate();
    let data = generate_data(4 * 1024 * 1024);

    let mut group = c.benchmark_group("transform_forward_4MB");
    group.throughput(Throughput::Bytes(data.len() as u64));

    let cases = [
        (
            "compress",
            TransformOptions::default().with_compression(CompressionConfig::default()),
        ),
        (
            "encrypt",
            TransformOptions::default().with_encryption(EncryptionConfig::new(key.clone())),
        ),
        (
            "compress_encrypt",
            TransformOptions::default()
                .with_compression(CompressionConfig::default())
                .with_encryption(EncryptionConfig::new(key.clone())),
        ),
    ];

    for (name, options) in cases {
        group.bench_with_input(BenchmarkId::new("stages", name), &options, |b, options| {
            b.iter(|| {
                collect_bytes(
                    bytes_source(data.clone(), 64 * 1024).through(options.forward().unwrap()),
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let key = EncryptionKey::generate();
    let data = generate_data(4 * 1024 * 1024);
    let options = TransformOptions::default()
        .with_compression(CompressionConfig::default())
        .with_encryption(EncryptionConfig::new(key.clone()));
    let upload = options.to_upload_options().unwrap().unwrap();

    let mut group = c.benchmark_group("transform_roundtrip_4MB");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("compress_encrypt", |b| {
        b.iter(|| {
            let stored = collect_bytes(
                bytes_source(black_box(data.clone()), 64 * 1024)
                    .through(options.forward().unwrap()),
            )
            .unwrap();
            collect_bytes(
                bytes_source(stored, 64 * 1024).through(reverse(&upload, Some(&key)).unwrap()),
            )
            .unwrap()
        })
    });

    group.finish();
}

/// Benchmark Argon2 key derivation
fn bench_key_derivation(c: &mut Criterion) {
    c.bench_function("argon2_derive", |b| {
        b.iter(|| EncryptionKey::derive_from_password(black_box(b"correct horse"), b"somesalt"))
    });
}

criterion_group!(benches, bench_forward, bench_roundtrip, bench_key_derivation);

criterion_main!(benches);
