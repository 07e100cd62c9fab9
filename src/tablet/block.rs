//! Block format implementation for tablets.
//!
//! A block contains multiple key-value entries and uses restart points
//! for efficient binary search and prefix compression.

use crate::error::{Error, Result};
use crate::tablet::blob::{
    decode_bytes, decode_uint, encode_bytes, encode_uint, encoded_bytes_len, encoded_uint_len,
    BLOB_MAX_LEN,
};
use crate::tablet::comparator::{BytewiseComparator, Comparator};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::cmp::Ordering;
use std::ops::Range;
use std::sync::Arc;

/// Size of one restart offset and of the restart count in the trailer.
const RESTART_ENTRY_SIZE: usize = 4;

/// Block stores key-value pairs with prefix compression.
///
/// Format (all fixed-width integers big-endian):
/// ```text
/// [Entry 1]
/// [Entry 2]
/// ...
/// [Entry N]
/// [Restart Point 1: u32]
/// [Restart Point 2: u32]
/// ...
/// [Restart Point M: u32]
/// [Num Restarts: u32]
/// ```
///
/// Each entry format:
/// ```text
/// [shared_key_len: varint]  // Length of prefix shared with the previous key
/// [key_suffix: blob]        // Key bytes after the shared prefix
/// [value: blob]             // Value data
/// ```
///
/// The entry at every restart point has `shared_key_len == 0`.
#[derive(Debug, Clone)]
pub struct Block {
    data: Bytes,
    restart_offset: usize,
    num_restarts: usize,
    comparator: Arc<dyn Comparator>,
}

/// One entry as it sits in the block, before key reconstruction.
struct RawEntry<'a> {
    shared: usize,
    suffix: &'a [u8],
    value: Range<usize>,
    next: usize,
}

impl Block {
    /// Create a new Block from raw data, ordered bytewise
    pub fn new(data: Bytes) -> Result<Self> {
        Self::with_comparator(data, Arc::new(BytewiseComparator))
    }

    /// Create a new Block from raw data written with `comparator`
    pub fn with_comparator(data: Bytes, comparator: Arc<dyn Comparator>) -> Result<Self> {
        if data.len() < RESTART_ENTRY_SIZE {
            return Err(Error::corrupt_block("Block too small"));
        }

        let mut tail = &data[data.len() - RESTART_ENTRY_SIZE..];
        let num_restarts = tail.get_u32() as usize;

        // restart_offset = data_len - 4 (num_restarts) - 4 * num_restarts (restart points)
        let trailer_len = num_restarts
            .checked_mul(RESTART_ENTRY_SIZE)
            .and_then(|len| len.checked_add(RESTART_ENTRY_SIZE))
            .filter(|len| *len <= data.len())
            .ok_or_else(|| {
                Error::corrupt_block(format!(
                    "{} restart points do not fit in a {} byte block",
                    num_restarts,
                    data.len()
                ))
            })?;
        let restart_offset = data.len() - trailer_len;

        let block = Self { data, restart_offset, num_restarts, comparator };
        block.validate_restarts()?;
        Ok(block)
    }

    /// Restart offsets must start at 0, strictly increase and stay in the body.
    fn validate_restarts(&self) -> Result<()> {
        if self.num_restarts == 0 {
            if self.restart_offset != 0 {
                return Err(Error::corrupt_block("Entries present but no restart points"));
            }
            return Ok(());
        }

        let mut previous = None;
        for index in 0..self.num_restarts {
            let point = self.restart_point(index);
            let in_order = match previous {
                None => point == 0,
                Some(prev) => point > prev,
            };
            if !in_order || point >= self.restart_offset {
                return Err(Error::corrupt_block(format!(
                    "Invalid restart point {} at index {}",
                    point, index
                )));
            }
            previous = Some(point);
        }
        Ok(())
    }

    /// Get the number of restart points
    pub fn num_restarts(&self) -> usize {
        self.num_restarts
    }

    /// Get a restart point by index
    pub fn restart_point(&self, index: usize) -> usize {
        let offset = self.restart_offset + index * RESTART_ENTRY_SIZE;
        let mut raw = &self.data[offset..offset + RESTART_ENTRY_SIZE];
        raw.get_u32() as usize
    }

    /// Full key stored at a restart point.
    pub fn restart_key(&self, index: usize) -> Result<&[u8]> {
        let entry = self.decode_entry(self.restart_point(index))?;
        if entry.shared != 0 {
            return Err(Error::corrupt_block(format!(
                "Restart point {} has a shared prefix of {}",
                index, entry.shared
            )));
        }
        Ok(entry.suffix)
    }

    /// Decode the entry starting at `offset` without touching the trailer.
    fn decode_entry(&self, offset: usize) -> Result<RawEntry<'_>> {
        let body = &self.data[..self.restart_offset];
        let mut input = body
            .get(offset..)
            .ok_or_else(|| Error::corrupt_block(format!("Entry offset {} past block body", offset)))?;

        let corrupt = |e: Error| Error::corrupt_block(format!("Entry at offset {}: {}", offset, e));
        let shared = decode_uint(&mut input).map_err(corrupt)?;
        let suffix = decode_bytes(&mut input).map_err(corrupt)?;
        let value = decode_bytes(&mut input).map_err(corrupt)?;

        let next = self.restart_offset - input.len();
        let shared = usize::try_from(shared)
            .map_err(|_| Error::corrupt_block(format!("Shared prefix {} too large", shared)))?;

        Ok(RawEntry { shared, suffix, value: next - value.len()..next, next })
    }

    /// Index of the last restart point whose key is <= `target`, or 0 when
    /// every restart key is greater.
    fn find_restart(&self, target: &[u8]) -> Result<usize> {
        let mut left = 0;
        let mut right = self.num_restarts;

        while left < right {
            let mid = left + (right - left) / 2;
            if self.comparator.compare(self.restart_key(mid)?, target) == Ordering::Greater {
                right = mid;
            } else {
                left = mid + 1;
            }
        }

        Ok(left.saturating_sub(1))
    }

    /// Look up the value stored under exactly `key`.
    ///
    /// Returns `Ok(None)` when the key is not in this block.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let mut iter = self.iter();
        iter.seek(key)?;

        if iter.valid() && self.comparator.compare(iter.key(), key) == Ordering::Equal {
            return Ok(Some(iter.value_bytes()));
        }
        Ok(None)
    }

    /// Create an iterator over the block
    pub fn iter(&self) -> BlockIterator {
        BlockIterator::new(self.clone())
    }

    /// Check whether the block holds no entries
    pub fn is_empty(&self) -> bool {
        self.num_restarts == 0
    }

    /// Encoded size of the block, trailer included
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get the raw data
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// BlockBuilder builds a block with prefix compression.
pub struct BlockBuilder {
    buffer: BytesMut,
    restarts: Vec<u32>,
    counter: usize,
    num_entries: usize,
    first_key: Option<Vec<u8>>,
    last_key: Vec<u8>,
    block_restart_interval: usize,
    comparator: Arc<dyn Comparator>,
    finished: bool,
}

impl BlockBuilder {
    /// Create a new BlockBuilder with bytewise key ordering
    pub fn new(block_restart_interval: usize) -> Self {
        Self::with_comparator(block_restart_interval, Arc::new(BytewiseComparator))
    }

    /// Create a new BlockBuilder ordering keys with `comparator`
    pub fn with_comparator(block_restart_interval: usize, comparator: Arc<dyn Comparator>) -> Self {
        Self {
            buffer: BytesMut::new(),
            restarts: Vec::new(),
            counter: 0,
            num_entries: 0,
            first_key: None,
            last_key: Vec::new(),
            block_restart_interval: block_restart_interval.max(1),
            comparator,
            finished: false,
        }
    }

    /// Add a key-value pair to the block.
    ///
    /// Keys must be strictly increasing. On error nothing is written.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::WriterFinished);
        }

        if self.num_entries > 0
            && self.comparator.compare(key, &self.last_key) != Ordering::Greater
        {
            return Err(Error::OutOfOrderKey);
        }

        let restart = self.num_entries == 0 || self.counter >= self.block_restart_interval;
        let shared = if restart { 0 } else { shared_prefix_len(&self.last_key, key) };
        let unshared = key.len() - shared;

        if unshared > BLOB_MAX_LEN || value.len() > BLOB_MAX_LEN {
            return Err(Error::encoding_overflow(format!(
                "entry with {} byte key and {} byte value exceeds blob limits",
                key.len(),
                value.len()
            )));
        }

        // Every restart offset must stay addressable by a u32.
        let entry_len = encoded_uint_len(shared as u64)
            + encoded_bytes_len(unshared)
            + encoded_bytes_len(value.len());
        let restart_offset = u32::try_from(self.buffer.len()).ok();
        let end_fits = self
            .buffer
            .len()
            .checked_add(entry_len)
            .is_some_and(|end| u32::try_from(end).is_ok());
        let restart_offset = match restart_offset {
            Some(offset) if end_fits => offset,
            _ => {
                return Err(Error::encoding_overflow(format!(
                    "block of {} bytes cannot take a {} byte entry",
                    self.buffer.len(),
                    entry_len
                )))
            }
        };

        if restart {
            self.restarts.push(restart_offset);
            self.counter = 0;
        }

        // Write entry: shared | key_suffix | value
        encode_uint(&mut self.buffer, shared as u64);
        encode_bytes(&mut self.buffer, &key[shared..])?;
        encode_bytes(&mut self.buffer, value)?;

        // Update state
        if self.first_key.is_none() {
            self.first_key = Some(key.to_vec());
        }
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
        self.num_entries += 1;

        Ok(())
    }

    /// Finish building and return the block data.
    ///
    /// A builder with no entries yields a block with zero restart points.
    pub fn finish(&mut self) -> Result<Bytes> {
        if self.finished {
            return Err(Error::WriterFinished);
        }

        // Write restart points
        for restart in &self.restarts {
            self.buffer.put_u32(*restart);
        }

        // Write number of restarts
        self.buffer.put_u32(self.restarts.len() as u32);

        self.finished = true;
        Ok(std::mem::take(&mut self.buffer).freeze())
    }

    /// Key of the first appended entry
    pub fn first_key(&self) -> Result<&[u8]> {
        self.first_key.as_deref().ok_or(Error::EmptyBlock)
    }

    /// Get the current size of the block, as `finish` would emit it
    pub fn current_size(&self) -> usize {
        self.buffer.len() + self.restarts.len() * RESTART_ENTRY_SIZE + RESTART_ENTRY_SIZE
    }

    /// Check if the block is empty
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Number of entries appended so far
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }
}

/// Calculate the length of the shared prefix
fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Cursor over the entries of a block.
///
/// The cursor is positioned by `seek_to_first` or `seek` and moved with
/// `advance`; it can be re-positioned any number of times.
pub struct BlockIterator {
    block: Block,
    next_offset: usize,
    key: Vec<u8>,
    value: Range<usize>,
    valid: bool,
}

impl BlockIterator {
    fn new(block: Block) -> Self {
        Self { block, next_offset: 0, key: Vec::new(), value: 0..0, valid: false }
    }

    /// Position on the first entry.
    pub fn seek_to_first(&mut self) -> Result<()> {
        if self.block.is_empty() {
            self.valid = false;
            return Ok(());
        }
        self.seek_to_restart_point(0);
        self.parse_next_entry()
    }

    /// Position on the first entry whose key is >= `target`.
    ///
    /// Leaves the iterator invalid when every key is smaller.
    pub fn seek(&mut self, target: &[u8]) -> Result<()> {
        if self.block.is_empty() {
            self.valid = false;
            return Ok(());
        }

        let restart = self.block.find_restart(target)?;
        self.seek_to_restart_point(restart);

        loop {
            self.parse_next_entry()?;
            if !self.valid
                || self.block.comparator.compare(&self.key, target) != Ordering::Less
            {
                return Ok(());
            }
        }
    }

    fn seek_to_restart_point(&mut self, index: usize) {
        self.key.clear();
        self.next_offset = self.block.restart_point(index);
        self.valid = false;
    }

    /// Move to the next entry, returning whether one exists.
    pub fn advance(&mut self) -> Result<bool> {
        if !self.valid {
            return Ok(false);
        }
        self.parse_next_entry()?;
        Ok(self.valid)
    }

    fn parse_next_entry(&mut self) -> Result<()> {
        self.valid = false;
        if self.next_offset >= self.block.restart_offset {
            return Ok(());
        }

        let entry = self.block.decode_entry(self.next_offset)?;
        if entry.shared > self.key.len() {
            return Err(Error::corrupt_block(format!(
                "Shared prefix {} longer than previous key of {} bytes",
                entry.shared,
                self.key.len()
            )));
        }

        // Reconstruct key
        self.key.truncate(entry.shared);
        self.key.extend_from_slice(entry.suffix);

        self.value = entry.value;
        self.next_offset = entry.next;
        self.valid = true;
        Ok(())
    }

    /// Check if the iterator is valid
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Get the current key
    pub fn key(&self) -> &[u8] {
        assert!(self.valid, "Iterator not valid");
        &self.key
    }

    /// Get the current value
    pub fn value(&self) -> &[u8] {
        assert!(self.valid, "Iterator not valid");
        &self.block.data[self.value.clone()]
    }

    /// Get the current value as a shared slice of the block
    pub fn value_bytes(&self) -> Bytes {
        assert!(self.valid, "Iterator not valid");
        self.block.data.slice(self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build<K: AsRef<[u8]>, V: AsRef<[u8]>>(interval: usize, entries: &[(K, V)]) -> Block {
        let mut builder = BlockBuilder::new(interval);
        for (key, value) in entries {
            builder.append(key.as_ref(), value.as_ref()).unwrap();
        }
        Block::new(builder.finish().unwrap()).unwrap()
    }

    fn collect(block: &Block) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut iter = block.iter();
        iter.seek_to_first().unwrap();
        let mut out = Vec::new();
        while iter.valid() {
            out.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.advance().unwrap();
        }
        out
    }

    #[test]
    fn test_block_builder_empty() {
        let mut builder = BlockBuilder::new(16);
        assert!(builder.is_empty());
        assert!(matches!(builder.first_key(), Err(Error::EmptyBlock)));

        let data = builder.finish().unwrap();
        assert_eq!(&data[..], &[0, 0, 0, 0]);

        let block = Block::new(data).unwrap();
        assert!(block.is_empty());
        assert_eq!(block.get(b"anything").unwrap(), None);
    }

    #[test]
    fn test_block_builder_single_entry() {
        let mut builder = BlockBuilder::new(10);
        builder.append(b"foo", b"bar").unwrap();
        let data = builder.finish().unwrap();

        assert_eq!(
            &data[..],
            &[
                0x00, 0xa3, b'f', b'o', b'o', 0xa3, b'b', b'a', b'r', // "foo" -> "bar"
                0, 0, 0, 0, // one restart @ 0x00000000
                0, 0, 0, 1,
            ]
        );
        assert_eq!(builder.first_key().unwrap(), b"foo");
    }

    #[test]
    fn test_block_builder_multiple_entries() {
        let block = build(2, &[("key1", "value1"), ("key2", "value2"), ("key3", "value3")]);

        // Should have 2 restart points (at entry 0 and entry 2)
        assert_eq!(block.num_restarts(), 2);
        assert_eq!(block.restart_point(0), 0);
        // 13 bytes for the full first entry, 10 for the prefix-compressed second
        assert_eq!(block.restart_point(1), 23);
    }

    #[test]
    fn test_block_iterator() {
        let block = build(16, &[("apple", "red"), ("banana", "yellow"), ("cherry", "red")]);

        let mut iter = block.iter();
        iter.seek_to_first().unwrap();

        assert!(iter.valid());
        assert_eq!(iter.key(), b"apple");
        assert_eq!(iter.value(), b"red");

        assert!(iter.advance().unwrap());
        assert_eq!(iter.key(), b"banana");
        assert_eq!(iter.value(), b"yellow");

        assert!(iter.advance().unwrap());
        assert_eq!(iter.key(), b"cherry");
        assert_eq!(iter.value(), b"red");

        // No more entries
        assert!(!iter.advance().unwrap());
        assert!(!iter.valid());

        // Restartable
        iter.seek_to_first().unwrap();
        assert_eq!(iter.key(), b"apple");
    }

    #[test]
    fn test_prefix_compression() {
        let mut builder = BlockBuilder::new(16);
        builder.append(b"apple_a", b"1").unwrap();
        builder.append(b"apple_b", b"2").unwrap();
        builder.append(b"apple_c", b"3").unwrap();

        // 11 bytes for the first entry, 5 for each follower, 8 of trailer
        assert_eq!(builder.current_size(), 29);

        let mut uncompressed = BlockBuilder::new(1);
        uncompressed.append(b"apple_a", b"1").unwrap();
        uncompressed.append(b"apple_b", b"2").unwrap();
        uncompressed.append(b"apple_c", b"3").unwrap();
        assert_eq!(uncompressed.current_size(), 3 * 11 + 3 * 4 + 4);
    }

    #[test]
    fn test_round_trip_across_intervals() {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..100)
            .map(|i| (format!("key{:04}", i).into_bytes(), format!("v{}", i * 7).into_bytes()))
            .collect();

        for interval in [1, 2, 3, 10, 16, 1000] {
            let mut builder = BlockBuilder::new(interval);
            for (key, value) in &entries {
                builder.append(key, value).unwrap();
            }
            let block = Block::new(builder.finish().unwrap()).unwrap();
            assert_eq!(block.num_restarts(), entries.len().div_ceil(interval));
            assert_eq!(collect(&block), entries);
        }
    }

    #[test]
    fn test_restart_keys_are_full() {
        let entries: Vec<Vec<u8>> = (0..50).map(|i| format!("prefix/{:03}", i).into_bytes()).collect();
        let mut builder = BlockBuilder::new(7);
        for key in &entries {
            builder.append(key, b"v").unwrap();
        }
        let block = Block::new(builder.finish().unwrap()).unwrap();

        for index in 0..block.num_restarts() {
            assert_eq!(block.restart_key(index).unwrap(), &entries[index * 7][..]);
        }
    }

    #[test]
    fn test_block_get() {
        let keys: Vec<Vec<u8>> = (0..40).map(|i| format!("k{:03}", i * 2).into_bytes()).collect();
        let mut builder = BlockBuilder::new(4);
        for key in &keys {
            builder.append(key, &[key.as_slice(), b"!"].concat()).unwrap();
        }
        let block = Block::new(builder.finish().unwrap()).unwrap();

        for key in &keys {
            let value = block.get(key).unwrap().unwrap();
            assert_eq!(&value[..], &[key.as_slice(), b"!"].concat()[..]);
        }

        // Odd numbers, before the first and after the last are absent
        assert_eq!(block.get(b"k001").unwrap(), None);
        assert_eq!(block.get(b"k039").unwrap(), None);
        assert_eq!(block.get(b"a").unwrap(), None);
        assert_eq!(block.get(b"z").unwrap(), None);
        assert_eq!(block.get(b"").unwrap(), None);
    }

    #[test]
    fn test_block_iterator_seek() {
        let block = build(2, &[("b", "1"), ("d", "2"), ("f", "3"), ("h", "4")]);
        let mut iter = block.iter();

        iter.seek(b"d").unwrap();
        assert_eq!(iter.key(), b"d");

        iter.seek(b"e").unwrap();
        assert_eq!(iter.key(), b"f");
        assert!(iter.advance().unwrap());
        assert_eq!(iter.key(), b"h");

        iter.seek(b"a").unwrap();
        assert_eq!(iter.key(), b"b");

        iter.seek(b"i").unwrap();
        assert!(!iter.valid());
    }

    #[test]
    fn test_empty_key_and_value() {
        let block = build(3, &[("", ""), ("a", ""), ("ab", "x")]);
        assert_eq!(collect(&block)[0], (Vec::new(), Vec::new()));
        assert_eq!(block.get(b"").unwrap().unwrap(), Bytes::new());
        assert_eq!(block.get(b"ab").unwrap().unwrap(), Bytes::from_static(b"x"));
    }

    #[test]
    fn test_large_entries_use_extended_blobs() {
        let big_value = vec![b'v'; 5000];
        let big_key = vec![b'k'; 300];
        let block = build(16, &[(big_key.clone(), big_value), (b"l".to_vec(), b"small".to_vec())]);
        assert_eq!(block.get(&big_key).unwrap().unwrap().len(), 5000);
        assert_eq!(&block.get(b"l").unwrap().unwrap()[..], b"small");
    }

    #[test]
    fn test_block_builder_unsorted_keys() {
        let mut builder = BlockBuilder::new(16);
        builder.append(b"key2", b"value2").unwrap();
        let size_before = builder.current_size();

        assert!(matches!(builder.append(b"key1", b"value1"), Err(Error::OutOfOrderKey)));
        assert!(matches!(builder.append(b"key2", b"dup"), Err(Error::OutOfOrderKey)));
        assert_eq!(builder.current_size(), size_before);

        let mut expected = BlockBuilder::new(16);
        expected.append(b"key2", b"value2").unwrap();
        assert_eq!(builder.finish().unwrap(), expected.finish().unwrap());
    }

    #[test]
    fn test_finish_twice() {
        let mut builder = BlockBuilder::new(16);
        builder.append(b"a", b"1").unwrap();
        let first = builder.finish().unwrap();
        let copy = first.clone();

        assert!(matches!(builder.finish(), Err(Error::WriterFinished)));
        assert!(matches!(builder.append(b"b", b"2"), Err(Error::WriterFinished)));
        assert_eq!(first, copy);
        assert_eq!(builder.first_key().unwrap(), b"a");
    }

    #[test]
    fn test_corrupt_trailer() {
        assert!(matches!(Block::new(Bytes::from_static(&[0, 1])), Err(Error::CorruptBlock(_))));

        // Claims 1000 restarts in an 8 byte buffer
        let data = Bytes::from_static(&[0, 0, 0, 0, 0, 0, 0x03, 0xe8]);
        assert!(matches!(Block::new(data), Err(Error::CorruptBlock(_))));

        // Restart offset pointing into the trailer
        let data = Bytes::from_static(&[0x00, 0xa0, 0xa0, 0, 0, 0, 9, 0, 0, 0, 1]);
        assert!(matches!(Block::new(data), Err(Error::CorruptBlock(_))));
    }

    #[test]
    fn test_truncated_entry_is_corrupt() {
        // Value blob declares 5 bytes but the body ends after 2
        let data = Bytes::from_static(&[0x00, 0xa1, b'k', 0xa5, b'v', b'v', 0, 0, 0, 0, 0, 0, 0, 1]);
        let block = Block::new(data).unwrap();

        let mut iter = block.iter();
        assert!(matches!(iter.seek_to_first(), Err(Error::CorruptBlock(_))));
        assert!(!iter.valid());
    }

    #[test]
    fn test_restart_with_shared_prefix_is_corrupt() {
        let data = Bytes::from_static(&[0x02, 0xa1, b'k', 0xa0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let block = Block::new(data).unwrap();
        assert!(matches!(block.get(b"k"), Err(Error::CorruptBlock(_))));
    }
}
