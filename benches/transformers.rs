//! Criterion benchmarks for the block transformer implementations.
//!
//! Run with:
//!   cargo bench --bench transformers

use blockstream::{Aead, AeadKind, BlockTransformer, Checksum, Identity, Lz4Compressor};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn synthetic_block(block_size: usize) -> Vec<u8> {
    (0..block_size).map(|i| (i % 251) as u8).collect()
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");

    for &block_size in &[4096usize, 16384] {
        let block = synthetic_block(block_size);

        let transformers: Vec<(&str, Box<dyn BlockTransformer>)> = vec![
            ("identity", Box::new(Identity)),
            ("checksum", Box::new(Checksum::new())),
            ("lz4", Box::new(Lz4Compressor::new())),
            ("aead_chacha20poly1305", Box::new(Aead::new(AeadKind::ChaCha20Poly1305, b"benchmark passphrase"))),
            ("aead_aes256ctr_hmac", Box::new(Aead::new(AeadKind::Aes256CtrHmacSha256, b"benchmark passphrase"))),
        ];

        for (name, transformer) in &transformers {
            group.throughput(Throughput::Bytes(block_size as u64));
            group.bench_with_input(BenchmarkId::new(*name, block_size), &block, |b, block| {
                let mut out = Vec::new();
                b.iter(|| {
                    transformer.transform(block, &mut out).unwrap();
                })
            });
        }
    }

    group.finish();
}

fn bench_untransform(c: &mut Criterion) {
    let mut group = c.benchmark_group("untransform");

    for &block_size in &[4096usize, 16384] {
        let block = synthetic_block(block_size);

        let transformers: Vec<(&str, Box<dyn BlockTransformer>)> = vec![
            ("identity", Box::new(Identity)),
            ("checksum", Box::new(Checksum::new())),
            ("lz4", Box::new(Lz4Compressor::new())),
            ("aead_chacha20poly1305", Box::new(Aead::new(AeadKind::ChaCha20Poly1305, b"benchmark passphrase"))),
        ];

        for (name, transformer) in &transformers {
            let mut transformed = Vec::new();
            transformer.transform(&block, &mut transformed).unwrap();
            let mut scratch = vec![0u8; block_size.max(64) * 2 + 64];

            group.throughput(Throughput::Bytes(block_size as u64));
            group.bench_with_input(BenchmarkId::new(*name, block_size), &transformed, |b, transformed| {
                b.iter(|| {
                    transformer.untransform(transformed, &mut scratch).unwrap();
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_transform, bench_untransform);
criterion_main!(benches);
