// Block Format Tests
// These tests pin the exact byte layout of blocks and the writer lifecycle

use bytes::Bytes;
use tablet::tablet::blob::decode_uint;
use tablet::{Block, BlockBuilder, Error, TabletWriterOptions};

fn options() -> TabletWriterOptions {
    TabletWriterOptions::new()
        .block_size(4096)
        .key_restart_interval(10)
        .use_compression(false)
}

/// Test the exact bytes of a one-entry block
#[test]
fn test_block_writer_literal_bytes() {
    let opts = options();
    let mut writer = BlockBuilder::with_comparator(opts.key_restart_interval, opts.comparator);
    writer.append(b"foo", b"bar").unwrap();

    let out = writer.finish().unwrap();

    assert_eq!(writer.first_key().unwrap(), b"foo");
    assert_eq!(
        &out[..],
        &[
            0x00, 0xA3, 0x66, 0x6F, 0x6F, 0xA3, 0x62, 0x61, 0x72, // "foo" -> "bar"
            0x00, 0x00, 0x00, 0x00, // one restart @ 0x00000000
            0x00, 0x00, 0x00, 0x01,
        ]
    );
}

/// Test that every restart entry stores its key in full
#[test]
fn test_restart_entries_have_no_shared_prefix() {
    for interval in [1, 2, 5, 10, 64] {
        let mut builder = BlockBuilder::new(interval);
        for i in 0..200 {
            builder.append(format!("user:{:05}", i).as_bytes(), b"x").unwrap();
        }
        let block = Block::new(builder.finish().unwrap()).unwrap();

        for index in 0..block.num_restarts() {
            let mut entry = &block.data()[block.restart_point(index)..];
            assert_eq!(decode_uint(&mut entry).unwrap(), 0, "interval {}", interval);
        }
        assert_eq!(block.num_restarts(), 200usize.div_ceil(interval));
    }
}

/// Test that a rejected key leaves the emitted bytes untouched
#[test]
fn test_ordering_enforcement_keeps_bytes() {
    let mut reference = BlockBuilder::new(4);
    let mut builder = BlockBuilder::new(4);
    for key in ["a", "b", "c"] {
        reference.append(key.as_bytes(), b"v").unwrap();
        builder.append(key.as_bytes(), b"v").unwrap();
    }

    assert!(matches!(builder.append(b"b", b"v"), Err(Error::OutOfOrderKey)));
    assert!(matches!(builder.append(b"c", b"v"), Err(Error::OutOfOrderKey)));
    assert!(matches!(builder.append(b"", b"v"), Err(Error::OutOfOrderKey)));

    assert_eq!(builder.finish().unwrap(), reference.finish().unwrap());
}

/// Test that finish is single-use and its output is stable
#[test]
fn test_finish_is_single_use() {
    let mut builder = BlockBuilder::new(10);
    builder.append(b"foo", b"bar").unwrap();

    let first = builder.finish().unwrap();
    let snapshot = first.to_vec();

    assert!(matches!(builder.finish(), Err(Error::WriterFinished)));
    assert!(matches!(builder.append(b"zzz", b"1"), Err(Error::WriterFinished)));
    assert_eq!(&first[..], &snapshot[..]);
}

/// Test lookups for present and absent keys
#[test]
fn test_block_seek_present_and_absent() {
    let mut builder = BlockBuilder::new(3);
    let keys: Vec<String> = (0..60).map(|i| format!("{:03}", i * 5)).collect();
    for key in &keys {
        builder.append(key.as_bytes(), format!("v{}", key).as_bytes()).unwrap();
    }
    let block = Block::new(builder.finish().unwrap()).unwrap();

    for i in 0..300 {
        let candidate = format!("{:03}", i);
        let found = block.get(candidate.as_bytes()).unwrap();
        if i % 5 == 0 {
            assert_eq!(found, Some(Bytes::from(format!("v{}", candidate))));
        } else {
            assert_eq!(found, None, "{} should be absent", candidate);
        }
    }
}

/// Test that a block decodes from a copy made elsewhere
#[test]
fn test_block_from_foreign_buffer() {
    let raw: Vec<u8> = vec![
        0x00, 0xA3, b'f', b'o', b'o', 0xA3, b'b', b'a', b'r', 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x01,
    ];
    let block = Block::new(Bytes::from(raw)).unwrap();

    let mut iter = block.iter();
    iter.seek_to_first().unwrap();
    assert_eq!(iter.key(), b"foo");
    assert_eq!(iter.value(), b"bar");
    assert!(!iter.advance().unwrap());
}

/// Test that decoding stops at the trailer instead of reading into it
#[test]
fn test_entry_running_into_trailer_is_corrupt() {
    // The value blob claims 4 bytes; only 1 precedes the trailer
    let raw: Vec<u8> = vec![0x00, 0xA1, b'k', 0xA4, b'v', 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01];
    let block = Block::new(Bytes::from(raw)).unwrap();

    let mut iter = block.iter();
    assert!(matches!(iter.seek_to_first(), Err(Error::CorruptBlock(_))));
}
