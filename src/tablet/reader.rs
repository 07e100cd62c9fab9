//! Tablet reader implementation.
//!
//! Opens a finished tablet, validates its footer and index, and serves
//! point lookups and ordered scans one data block at a time.

use crate::config::CompressionType;
use crate::error::{Error, Result};
use crate::tablet::block::{Block, BlockIterator};
use crate::tablet::comparator::{BytewiseComparator, Comparator};
use crate::tablet::compression::decompress_block;
use crate::tablet::footer::{BlockHandle, Footer};
use crate::tablet::index::{IndexBlock, IndexEntry};
use crate::tablet::FOOTER_SIZE;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// Positioned, read-only access to the bytes of a tablet.
pub trait BlockSource: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes>;

    /// Total size in bytes.
    fn size(&self) -> Result<u64>;
}

fn check_range(offset: u64, len: usize, size: u64) -> Result<()> {
    let in_range = offset.checked_add(len as u64).is_some_and(|end| end <= size);
    if !in_range {
        return Err(Error::corrupt_block(format!(
            "Read of {} bytes at offset {} past end of {} byte tablet",
            len, offset, size
        )));
    }
    Ok(())
}

impl BlockSource for Bytes {
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        check_range(offset, len, self.len() as u64)?;
        let start = offset as usize;
        Ok(self.slice(start..start + len))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}

/// A tablet file on disk.
#[derive(Debug)]
pub struct FileSource {
    file: Mutex<File>,
    size: u64,
}

impl FileSource {
    /// Open a file for positioned reads
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file: Mutex::new(file), size })
    }
}

impl BlockSource for FileSource {
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        // Lengths come from the file itself; bound them before allocating
        check_range(offset, len, self.size)?;

        let mut buffer = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buffer)?;
        Ok(Bytes::from(buffer))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

/// Tablet provides read access to a finished tablet.
///
/// Cloning is cheap; clones share the source and the decoded index.
///
/// Usage:
/// ```no_run
/// use tablet::Tablet;
///
/// let tablet = Tablet::open("data.tab").unwrap();
/// if let Some(value) = tablet.get(b"key1").unwrap() {
///     println!("Found: {:?}", value);
/// }
/// ```
#[derive(Clone)]
pub struct Tablet {
    source: Arc<dyn BlockSource>,
    index: Arc<IndexBlock>,
    footer: Footer,
    comparator: Arc<dyn Comparator>,
    file_size: u64,
}

impl Tablet {
    /// Open a tablet file written with bytewise key ordering
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(Arc::new(FileSource::open(path)?), Arc::new(BytewiseComparator))
    }

    /// Open an in-memory tablet written with bytewise key ordering
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        Self::new(Arc::new(data.into()), Arc::new(BytewiseComparator))
    }

    /// Open a tablet from any source, ordering keys with `comparator`
    pub fn new(source: Arc<dyn BlockSource>, comparator: Arc<dyn Comparator>) -> Result<Self> {
        let file_size = source.size()?;
        if file_size < FOOTER_SIZE as u64 {
            return Err(Error::corrupt_block("File too small to be a valid tablet"));
        }

        // Read footer from the end of the file
        let footer_offset = file_size - FOOTER_SIZE as u64;
        let footer = Footer::decode(&source.read_at(footer_offset, FOOTER_SIZE)?)?;
        let index_handle = footer.index_handle;
        if index_handle.size == 0 || index_handle.end_offset()? != footer_offset {
            return Err(Error::corrupt_block(format!(
                "Index block handle {:?} does not end at the footer",
                index_handle
            )));
        }

        // Read index block
        let (marker, payload) = read_stored_block(source.as_ref(), &index_handle)?;
        if marker != CompressionType::None as u8 {
            return Err(Error::corrupt_block(format!("Index block has codec marker {}", marker)));
        }
        verify_checksum(footer.index_checksum, &payload)?;
        let index = IndexBlock::new(payload, comparator.clone())?;

        // Data blocks must tile the file from 0 up to the index block
        let mut expected = 0u64;
        for entry in index.entries() {
            if entry.handle.offset != expected || entry.handle.size == 0 {
                return Err(Error::corrupt_block(format!(
                    "Data block handle {:?} does not start at {}",
                    entry.handle, expected
                )));
            }
            expected = entry.handle.end_offset()?;
        }
        if expected != index_handle.offset {
            return Err(Error::corrupt_block(format!(
                "Data blocks end at {}, index starts at {}",
                expected, index_handle.offset
            )));
        }

        log::info!("Opened tablet: {} blocks, {} bytes", index.len(), file_size);

        Ok(Self { source, index: Arc::new(index), footer, comparator, file_size })
    }

    /// Read, verify and decompress a data block by position in the index
    pub fn read_block(&self, block_index: usize) -> Result<Block> {
        let entry = self.index.get(block_index).ok_or_else(|| {
            Error::invalid_argument(format!(
                "Block {} out of range ({} blocks)",
                block_index,
                self.index.len()
            ))
        })?;

        let (marker, payload) = read_stored_block(self.source.as_ref(), &entry.handle)?;
        if marker != entry.compression as u8 {
            return Err(Error::corrupt_block(format!(
                "Block {} stored with marker {}, index says {:?}",
                block_index, marker, entry.compression
            )));
        }
        verify_checksum(entry.checksum, &payload)?;

        let data = restore_block(entry, marker, payload).inspect_err(|e| {
            log::warn!("Failed to restore block {} at offset {}: {}", block_index, entry.handle.offset, e);
        })?;
        Block::with_comparator(data, self.comparator.clone())
    }

    /// Get the value for a key
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        // Find the data block that may contain the key
        match self.index.find_block(key) {
            Some(block_index) => self.read_block(block_index)?.get(key),
            None => Ok(None),
        }
    }

    /// Iterate from the first key >= `start`, or from the beginning when
    /// `start` is `None`.
    pub fn find(&self, start: Option<&[u8]>) -> Result<TabletIterator> {
        let mut iter = TabletIterator::new(self.clone());
        match start {
            Some(key) => iter.seek(key)?,
            None => iter.seek_to_first()?,
        }
        Ok(iter)
    }

    /// Create an iterator over all key-value pairs
    pub fn iter(&self) -> Result<TabletIterator> {
        self.find(None)
    }

    /// The decoded index block
    pub fn index(&self) -> &IndexBlock {
        &self.index
    }

    /// The footer read when the tablet was opened
    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    /// Get the number of data blocks
    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    /// Get the smallest key in the tablet
    pub fn first_key(&self) -> Option<&[u8]> {
        self.index.get(0).map(|entry| entry.first_key.as_slice())
    }

    /// Get the file size
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

/// Read `[marker][payload]` for a handle.
fn read_stored_block(source: &dyn BlockSource, handle: &BlockHandle) -> Result<(u8, Bytes)> {
    let size = usize::try_from(handle.size)
        .map_err(|_| Error::corrupt_block(format!("Block size {} too large", handle.size)))?;
    if size == 0 {
        return Err(Error::corrupt_block("Block size too small"));
    }

    let stored = source.read_at(handle.offset, size)?;
    Ok((stored[0], stored.slice(1..)))
}

fn verify_checksum(expected: u32, payload: &[u8]) -> Result<()> {
    let actual = crc32fast::hash(payload);
    if actual != expected {
        log::warn!("Checksum mismatch: expected {:#x}, got {:#x}", expected, actual);
        return Err(Error::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

fn restore_block(entry: &IndexEntry, marker: u8, payload: Bytes) -> Result<Bytes> {
    let expected_len = entry.uncompressed_len as usize;
    if marker == CompressionType::None as u8 {
        if payload.len() != expected_len {
            return Err(Error::corrupt_block(format!(
                "Stored block of {} bytes, index says {}",
                payload.len(),
                expected_len
            )));
        }
        return Ok(payload);
    }
    Ok(Bytes::from(decompress_block(marker, &payload, expected_len)?))
}

/// Iterator over entries of a tablet, crossing block boundaries.
pub struct TabletIterator {
    tablet: Tablet,
    block_index: usize,
    block_iter: Option<BlockIterator>,
}

impl TabletIterator {
    fn new(tablet: Tablet) -> Self {
        Self { tablet, block_index: 0, block_iter: None }
    }

    /// Seek to the first entry
    pub fn seek_to_first(&mut self) -> Result<()> {
        self.load_block(0)?;
        if let Some(iter) = self.block_iter.as_mut() {
            iter.seek_to_first()?;
        }
        self.skip_exhausted_blocks()
    }

    /// Seek to the first entry whose key is >= `target`
    pub fn seek(&mut self, target: &[u8]) -> Result<()> {
        let block_index = self.tablet.index.find_block(target).unwrap_or(0);
        self.load_block(block_index)?;
        if let Some(iter) = self.block_iter.as_mut() {
            iter.seek(target)?;
        }
        // Every key in the next block is > target, so its first entry is the answer
        self.skip_exhausted_blocks()
    }

    /// Move to the next entry, returning whether one exists
    pub fn advance(&mut self) -> Result<bool> {
        match self.block_iter.as_mut() {
            Some(iter) => {
                iter.advance()?;
            }
            None => return Ok(false),
        }
        self.skip_exhausted_blocks()?;
        Ok(self.valid())
    }

    fn load_block(&mut self, block_index: usize) -> Result<()> {
        self.block_index = block_index;
        self.block_iter = None;
        if block_index < self.tablet.num_blocks() {
            self.block_iter = Some(self.tablet.read_block(block_index)?.iter());
        }
        Ok(())
    }

    fn skip_exhausted_blocks(&mut self) -> Result<()> {
        while self.block_iter.as_ref().is_some_and(|iter| !iter.valid()) {
            self.load_block(self.block_index + 1)?;
            if let Some(iter) = self.block_iter.as_mut() {
                iter.seek_to_first()?;
            }
        }
        Ok(())
    }

    /// Check if the iterator is valid
    pub fn valid(&self) -> bool {
        self.block_iter.as_ref().is_some_and(|iter| iter.valid())
    }

    /// Get the current key
    pub fn key(&self) -> &[u8] {
        match &self.block_iter {
            Some(iter) => iter.key(),
            None => panic!("Iterator not valid"),
        }
    }

    /// Get the current value
    pub fn value(&self) -> &[u8] {
        match &self.block_iter {
            Some(iter) => iter.value(),
            None => panic!("Iterator not valid"),
        }
    }

    /// Get the current value as a shared slice of its block
    pub fn value_bytes(&self) -> Bytes {
        match &self.block_iter {
            Some(iter) => iter.value_bytes(),
            None => panic!("Iterator not valid"),
        }
    }
}
