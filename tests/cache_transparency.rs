//! Cache transparency (§8.8): an optional `BlockCache` must never change
//! what a random-access stream reads back, only how it gets there.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use blockstream::{BoundedBlockCache, ContainerOptions, Identity, RandomAccessStream};

const B: usize = 512;

const RANGES: &[(u64, usize)] = &[
    (0, 200),
    (3000, 500),
    (0, 200),
    (1800, 100),
    (3000, 500),
    (900, 700),
    (1800, 100),
];

fn scattered_read_sequence(data: &[u8], cache: Box<dyn blockstream::BlockCache>) -> Vec<Vec<u8>> {
    let mut s = RandomAccessStream::open(
        Cursor::new(Vec::new()),
        ContainerOptions::new().transformer(Box::new(Identity)).block_size(B).cache(cache),
    )
    .unwrap();
    s.write_all(data).unwrap();
    s.flush(false).unwrap();

    // Revisit the same handful of blocks out of order and more than once,
    // so a cache (if present) actually gets exercised on repeat hits.
    let mut reads = Vec::new();
    for &(pos, len) in RANGES {
        s.seek(SeekFrom::Start(pos)).unwrap();
        let mut out = vec![0u8; len];
        s.read_exact(&mut out).unwrap();
        reads.push(out);
    }
    reads
}

#[test]
fn bounded_cache_and_null_cache_read_back_identical_bytes() {
    let data: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();

    let with_cache = scattered_read_sequence(&data, Box::new(BoundedBlockCache::new(4)));
    let without_cache = scattered_read_sequence(&data, Box::new(blockstream::NullCache));

    assert_eq!(with_cache, without_cache);
    for (i, &(pos, len)) in RANGES.iter().enumerate() {
        assert_eq!(with_cache[i], data[pos as usize..pos as usize + len]);
    }
}
