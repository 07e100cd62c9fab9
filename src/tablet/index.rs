//! Index block implementation for tablets.
//!
//! The index block maps the first key of every data block to where that
//! block is stored, enabling lookups that touch a single data block.

use crate::config::CompressionType;
use crate::error::{Error, Result};
use crate::tablet::block::{Block, BlockBuilder};
use crate::tablet::comparator::Comparator;
use crate::tablet::footer::{BlockHandle, BLOCK_HANDLE_SIZE};
use bytes::{Buf, BufMut, Bytes};
use std::cmp::Ordering;
use std::sync::Arc;

/// Size of an encoded index entry value.
pub const INDEX_VALUE_SIZE: usize = BLOCK_HANDLE_SIZE + 1 + 4 + 4;

/// IndexEntry represents a single entry in the index block.
///
/// The value stored under `first_key` is fixed-width, big-endian:
/// ```text
/// [offset: u64][size: u64][compression: u8][uncompressed_len: u32][checksum: u32]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// The smallest key in the data block
    pub first_key: Vec<u8>,
    /// Handle to the stored data block
    pub handle: BlockHandle,
    /// Codec marker the block was stored with
    pub compression: CompressionType,
    /// Size of the block once decompressed
    pub uncompressed_len: u32,
    /// CRC32 of the stored payload (marker byte excluded)
    pub checksum: u32,
}

impl IndexEntry {
    /// Encode the entry value
    pub fn encode_value(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(INDEX_VALUE_SIZE);
        self.handle.encode_to(&mut buf);
        buf.put_u8(self.compression as u8);
        buf.put_u32(self.uncompressed_len);
        buf.put_u32(self.checksum);
        buf
    }

    /// Decode an entry from its key and encoded value
    pub fn decode(first_key: &[u8], value: &[u8]) -> Result<Self> {
        if value.len() != INDEX_VALUE_SIZE {
            return Err(Error::corrupt_block(format!(
                "Index value of {} bytes, expected {}",
                value.len(),
                INDEX_VALUE_SIZE
            )));
        }

        let mut input = value;
        let handle = BlockHandle::decode_from(&mut input)?;
        let marker = input.get_u8();
        let compression = CompressionType::from_u8(marker)
            .ok_or_else(|| Error::corrupt_block(format!("Invalid compression marker {}", marker)))?;
        let uncompressed_len = input.get_u32();
        let checksum = input.get_u32();

        Ok(Self { first_key: first_key.to_vec(), handle, compression, uncompressed_len, checksum })
    }
}

/// IndexBlock provides lookup of data blocks by key.
///
/// All entries are decoded when the index is loaded.
#[derive(Debug)]
pub struct IndexBlock {
    entries: Vec<IndexEntry>,
    comparator: Arc<dyn Comparator>,
}

impl IndexBlock {
    /// Decode an index block
    pub fn new(data: Bytes, comparator: Arc<dyn Comparator>) -> Result<Self> {
        let block = Block::with_comparator(data, comparator.clone())?;

        let mut entries: Vec<IndexEntry> = Vec::new();
        let mut iter = block.iter();
        iter.seek_to_first()?;
        while iter.valid() {
            let entry = IndexEntry::decode(iter.key(), iter.value())?;
            if let Some(prev) = entries.last() {
                if comparator.compare(&prev.first_key, &entry.first_key) != Ordering::Less {
                    return Err(Error::corrupt_block("Index keys out of order"));
                }
            }
            entries.push(entry);
            iter.advance()?;
        }

        Ok(Self { entries, comparator })
    }

    /// Find the data block that may contain `key`.
    ///
    /// Returns the position of the last block whose first key is <= `key`,
    /// or `None` if `key` sorts before every block.
    pub fn find_block(&self, key: &[u8]) -> Option<usize> {
        let count = self.entries.partition_point(|entry| {
            self.comparator.compare(&entry.first_key, key) != Ordering::Greater
        });
        count.checked_sub(1)
    }

    /// Get an entry by position
    pub fn get(&self, index: usize) -> Option<&IndexEntry> {
        self.entries.get(index)
    }

    /// All entries, in key order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Get the number of entries in the index
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// IndexBlockBuilder builds an index block.
pub struct IndexBlockBuilder {
    builder: BlockBuilder,
}

impl IndexBlockBuilder {
    /// Create a new IndexBlockBuilder
    pub fn new(comparator: Arc<dyn Comparator>) -> Self {
        // Every index entry is a restart point so lookups never scan
        Self { builder: BlockBuilder::with_comparator(1, comparator) }
    }

    /// Add an index entry
    pub fn add_entry(&mut self, entry: &IndexEntry) -> Result<()> {
        self.builder.append(&entry.first_key, &entry.encode_value())
    }

    /// Finish building and return the block data
    pub fn finish(&mut self) -> Result<Bytes> {
        self.builder.finish()
    }

    /// Check if the builder is empty
    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    /// Get the current size
    pub fn current_size(&self) -> usize {
        self.builder.current_size()
    }
}
