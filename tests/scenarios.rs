//! Black-box end-to-end scenarios spanning the four container access modes.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use blockstream::{
    Aead, AeadKind, BlockTransformer, Checksum, ContainerOptions, Identity, Lz4Compressor,
    RandomAccessStream, ReadOnlyStream, SequentialReader, SequentialWriter, WriteOnceStream,
};

const B: usize = 16384;

fn opts(transformer: Box<dyn BlockTransformer>) -> ContainerOptions {
    ContainerOptions::new().transformer(transformer).block_size(B)
}

fn leading_integers_then_zeros() -> Vec<u8> {
    let mut data = Vec::with_capacity(4 * 100_000 + 4 * (1 << 20));
    for i in 0u32..100_000 {
        data.extend_from_slice(&i.to_le_bytes());
    }
    data.extend(std::iter::repeat(0u8).take(4 * (1 << 20)));
    data
}

#[test]
fn e1_identity_round_trip_and_short_read_at_end() {
    let data = leading_integers_then_zeros();
    let mut s = RandomAccessStream::open(Cursor::new(Vec::new()), opts(Box::new(Identity))).unwrap();
    s.write_all(&data).unwrap();
    s.flush(false).unwrap();
    assert_eq!(s.len(), data.len() as u64);

    s.seek(SeekFrom::Start(0)).unwrap();
    let mut out = vec![0u8; data.len()];
    s.read_exact(&mut out).unwrap();
    assert_eq!(out, data);

    s.seek(SeekFrom::Start(data.len() as u64 - 4)).unwrap();
    let mut tail = [0u8; 5];
    let n = s.read(&mut tail).unwrap();
    assert_eq!(n, 4);
    assert_eq!(s.seek(SeekFrom::Current(0)).unwrap(), data.len() as u64);
}

fn e2_for(transformer: Box<dyn BlockTransformer>) {
    let data = leading_integers_then_zeros();
    let mut s = RandomAccessStream::open(Cursor::new(Vec::new()), opts(transformer)).unwrap();
    s.write_all(&data).unwrap();
    s.flush(false).unwrap();

    s.seek(SeekFrom::Start(4)).unwrap();
    let overwrite = vec![0xFFu8; 4 * 10_000];
    let err = s.write_all(&overwrite).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::Other);
    assert_eq!(s.seek(SeekFrom::Current(0)).unwrap(), 4);

    s.seek(SeekFrom::Start(0)).unwrap();
    let mut out = vec![0u8; data.len()];
    s.read_exact(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn e2_illegal_overwrite_under_checksum() {
    e2_for(Box::new(Checksum::new()));
}

#[test]
fn e2_illegal_overwrite_under_lz4() {
    e2_for(Box::new(Lz4Compressor::new()));
}

#[test]
fn e2_illegal_overwrite_under_composite() {
    e2_for(Box::new(blockstream::Composite::new(vec![Box::new(Checksum::new()), Box::new(Lz4Compressor::new())])));
}

#[test]
fn e3_identity_overwrite_shifts_logical_length() {
    let data = leading_integers_then_zeros();
    let mut s = RandomAccessStream::open(Cursor::new(Vec::new()), opts(Box::new(Identity))).unwrap();
    s.write_all(&data).unwrap();
    s.flush(false).unwrap();

    let mut shifted = Vec::with_capacity(4 * 100_000);
    for i in 0u32..100_000 {
        shifted.extend_from_slice(&(i + 1).to_le_bytes());
    }
    s.seek(SeekFrom::Start(4)).unwrap();
    s.write_all(&shifted).unwrap();
    s.flush(false).unwrap();
    assert_eq!(s.len(), data.len() as u64 + 4);

    s.seek(SeekFrom::Start(0)).unwrap();
    let mut out = vec![0u8; 4 * 100_001];
    s.read_exact(&mut out).unwrap();
    let mut expected = Vec::new();
    expected.extend_from_slice(&0u32.to_le_bytes());
    for i in 0u32..100_000 {
        expected.extend_from_slice(&i.to_le_bytes());
    }
    assert_eq!(out, expected);
}

#[test]
fn e4_set_len_zero_on_fresh_container_round_trips_through_reopen() {
    let cursor;
    {
        let mut s = RandomAccessStream::open(Cursor::new(Vec::new()), opts(Box::new(Identity))).unwrap();
        s.set_len(0).unwrap();
        s.flush(false).unwrap();
        cursor = s.into_inner();
    }
    assert_eq!(cursor.get_ref().len(), 16);

    let reopened = RandomAccessStream::open(cursor, opts(Box::new(Identity))).unwrap();
    assert_eq!(reopened.len(), 0);
}

#[test]
fn e5_aead_write_once_then_read_only_round_trips_and_detects_corruption() {
    let transformer = || -> Box<dyn BlockTransformer> { Box::new(Aead::new(AeadKind::ChaCha20Poly1305, b"correct horse battery staple")) };
    let mut w = WriteOnceStream::create(
        Cursor::new(Vec::new()),
        ContainerOptions::new().transformer(transformer()).block_size(512),
    )
    .unwrap();
    w.write_all(&[0x01, 0xFF]).unwrap();
    let substrate = w.finish(false).unwrap();

    let mut r = ReadOnlyStream::open(
        substrate.clone(),
        ContainerOptions::new().transformer(transformer()).block_size(512),
    )
    .unwrap();
    let mut out = [0u8; 2];
    r.read_exact(&mut out).unwrap();
    assert_eq!(out, [0x01, 0xFF]);

    let mut corrupted = substrate;
    corrupted.get_mut()[0] ^= 0x01;
    let mut r2 = ReadOnlyStream::open(
        corrupted,
        ContainerOptions::new().transformer(transformer()).block_size(512),
    )
    .unwrap();
    let mut out2 = [0u8; 2];
    let err = r2.read_exact(&mut out2).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::Other);
}

#[test]
fn e6_sequential_lz4_round_trips_and_detects_truncation() {
    let mut w = SequentialWriter::create(
        Cursor::new(Vec::new()),
        ContainerOptions::new().transformer(Box::new(Lz4Compressor::new())).block_size(B),
    )
    .unwrap();
    let data = vec![0x03u8; 1 << 20];
    for chunk in data.chunks(4096) {
        w.write_all(chunk).unwrap();
    }
    let substrate = w.finish().unwrap();

    let mut r = SequentialReader::open(
        substrate.clone(),
        ContainerOptions::new().transformer(Box::new(Lz4Compressor::new())).block_size(B),
    )
    .unwrap();
    let mut collected = Vec::new();
    let mut buf = vec![0u8; B];
    loop {
        let n = r.read_frame(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
    }
    assert_eq!(collected, data);

    let mut truncated = substrate;
    let len = truncated.get_ref().len();
    truncated.get_mut().truncate(len - 1);
    let mut r2 = SequentialReader::open(
        truncated,
        ContainerOptions::new().transformer(Box::new(Lz4Compressor::new())).block_size(B),
    )
    .unwrap();
    let mut buf2 = vec![0u8; B];
    loop {
        match r2.read_frame(&mut buf2) {
            Ok(0) => panic!("expected corruption before clean end-of-stream"),
            Ok(_) => continue,
            Err(blockstream::Error::Corruption(_)) => break,
            Err(other) => panic!("expected corruption, got {other:?}"),
        }
    }
}

#[test]
fn container_identity_write_once_then_read_back_via_random_access() {
    let data: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
    let mut w = WriteOnceStream::create(
        Cursor::new(Vec::new()),
        ContainerOptions::new().transformer(Box::new(Checksum::new())).block_size(512),
    )
    .unwrap();
    w.write_all(&data).unwrap();
    let substrate = w.finish(false).unwrap();

    let mut r = RandomAccessStream::open(
        substrate,
        ContainerOptions::new().transformer(Box::new(Checksum::new())).block_size(512),
    )
    .unwrap();
    let mut out = vec![0u8; data.len()];
    r.read_exact(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn recovery_skips_injected_tombstone_and_stays_consistent() {
    let mut w = WriteOnceStream::create(
        Cursor::new(Vec::new()),
        ContainerOptions::new().transformer(Box::new(Identity)).block_size(512),
    )
    .unwrap();
    w.write_all(&vec![1u8; 512]).unwrap();
    let substrate = w.finish(false).unwrap();

    let mut s = RandomAccessStream::open(substrate, opts(Box::new(Identity))).unwrap();
    assert_eq!(s.len(), 512);
    s.seek(SeekFrom::End(0)).unwrap();
    s.write_all(&vec![2u8; 512]).unwrap();
    s.flush(false).unwrap();
    assert_eq!(s.len(), 1024);
}
