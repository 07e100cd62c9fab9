//! Tablet writer implementation.
//!
//! Builds a tablet from a sequence of sorted key-value pairs, streaming
//! sealed blocks to any [`Write`] sink.

use crate::config::{CompressionType, TabletWriterOptions};
use crate::error::{Error, Result};
use crate::tablet::block::BlockBuilder;
use crate::tablet::compression::compress_block;
use crate::tablet::footer::{BlockHandle, Footer};
use crate::tablet::index::{IndexBlockBuilder, IndexEntry};
use crate::tablet::FOOTER_SIZE;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// TabletWriter builds a tablet.
///
/// Usage:
/// ```
/// use tablet::{TabletWriter, TabletWriterOptions};
///
/// let mut writer = TabletWriter::new(Vec::new(), TabletWriterOptions::default()).unwrap();
/// writer.add(b"key1", b"value1").unwrap();
/// writer.add(b"key2", b"value2").unwrap();
/// let bytes: Vec<u8> = writer.finish().unwrap();
/// assert!(!bytes.is_empty());
/// ```
pub struct TabletWriter<W: Write> {
    writer: Option<W>,
    options: TabletWriterOptions,
    data_block_builder: BlockBuilder,
    index_block_builder: IndexBlockBuilder,
    last_key: Vec<u8>,
    offset: u64,
    num_entries: u64,
    num_blocks: u64,
    poisoned: bool,
}

impl<W: Write> TabletWriter<W> {
    /// Create a new TabletWriter writing to `writer`
    pub fn new(writer: W, options: TabletWriterOptions) -> Result<Self> {
        options.validate()?;

        let data_block_builder =
            BlockBuilder::with_comparator(options.key_restart_interval, options.comparator.clone());
        let index_block_builder = IndexBlockBuilder::new(options.comparator.clone());

        Ok(Self {
            writer: Some(writer),
            options,
            data_block_builder,
            index_block_builder,
            last_key: Vec::new(),
            offset: 0,
            num_entries: 0,
            num_blocks: 0,
            poisoned: false,
        })
    }

    /// Add a key-value pair to the tablet.
    ///
    /// Keys must be added in strictly increasing order.
    ///
    /// A failed write to the sink poisons the writer: the entries of the
    /// block being sealed are lost, so every later `add` and `finish` fails.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;

        // The block builder only sees its own block; ordering across blocks is checked here
        if self.num_entries > 0
            && self.options.comparator.compare(key, &self.last_key) != Ordering::Greater
        {
            return Err(Error::OutOfOrderKey);
        }

        self.data_block_builder.append(key, value)?;
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;

        // Flush block if it's large enough
        if self.data_block_builder.current_size() >= self.options.block_size {
            self.flush_data_block()?;
        }

        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::WriterPoisoned);
        }
        if self.writer.is_none() {
            return Err(Error::WriterFinished);
        }
        Ok(())
    }

    /// Seal the current data block and write it out, poisoning the writer
    /// if anything fails once the block has left the builder.
    fn flush_data_block(&mut self) -> Result<()> {
        let result = self.seal_data_block();
        if let Err(e) = &result {
            log::warn!("Tablet writer poisoned at offset {}: {}", self.offset, e);
            self.poisoned = true;
        }
        result
    }

    fn seal_data_block(&mut self) -> Result<()> {
        if self.data_block_builder.is_empty() {
            return Ok(());
        }

        let fresh = BlockBuilder::with_comparator(
            self.options.key_restart_interval,
            self.options.comparator.clone(),
        );
        let mut builder = std::mem::replace(&mut self.data_block_builder, fresh);
        let first_key = builder.first_key()?.to_vec();
        let block_data = builder.finish()?;

        let uncompressed_len = u32::try_from(block_data.len()).map_err(|_| {
            Error::encoding_overflow(format!("block of {} bytes", block_data.len()))
        })?;
        let (compression, payload) =
            compress_block(self.options.effective_compression(), &block_data)?;
        let checksum = crc32fast::hash(&payload);

        let writer = self.writer.as_mut().ok_or(Error::WriterFinished)?;
        let handle = write_stored_block(writer, &mut self.offset, compression, &payload)?;

        log::debug!(
            "Sealed block {} at offset {}: {} bytes raw, {} stored ({:?})",
            self.num_blocks,
            handle.offset,
            uncompressed_len,
            handle.size,
            compression
        );

        self.index_block_builder.add_entry(&IndexEntry {
            first_key,
            handle,
            compression,
            uncompressed_len,
            checksum,
        })?;
        self.num_blocks += 1;

        Ok(())
    }

    /// Finish building the tablet.
    ///
    /// Writes any pending data block, the index block and the footer, then
    /// flushes and returns the sink. With a `Vec<u8>` sink the result is the
    /// complete tablet.
    pub fn finish(&mut self) -> Result<W> {
        self.check_writable()?;

        // Flush any remaining data block
        self.flush_data_block()?;

        let mut writer = self.writer.take().ok_or(Error::WriterFinished)?;
        if let Err(e) = self.write_index_and_footer(&mut writer) {
            log::warn!("Tablet writer poisoned at offset {}: {}", self.offset, e);
            self.poisoned = true;
            return Err(e);
        }

        log::info!(
            "Finished tablet: {} entries in {} blocks, {} bytes",
            self.num_entries,
            self.num_blocks,
            self.offset
        );

        Ok(writer)
    }

    fn write_index_and_footer(&mut self, writer: &mut W) -> Result<()> {
        let index_data = self.index_block_builder.finish()?;
        let index_checksum = crc32fast::hash(&index_data);
        let index_handle =
            write_stored_block(writer, &mut self.offset, CompressionType::None, &index_data)?;

        let footer = Footer::new(index_handle, index_checksum);
        footer.write_to(writer)?;
        self.offset += FOOTER_SIZE as u64;

        writer.flush()?;
        Ok(())
    }

    /// Get the number of entries added
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Get the number of data blocks written so far
    pub fn num_blocks(&self) -> u64 {
        self.num_blocks
    }

    /// Bytes written to the sink so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get the current tablet size, counting the unsealed block
    pub fn current_size(&self) -> u64 {
        self.offset + self.data_block_builder.current_size() as u64
    }

    /// Options this writer was created with
    pub fn options(&self) -> &TabletWriterOptions {
        &self.options
    }
}

/// Write `[marker][payload]` and return its handle.
fn write_stored_block<W: Write>(
    writer: &mut W,
    offset: &mut u64,
    compression: CompressionType,
    payload: &[u8],
) -> Result<BlockHandle> {
    writer.write_all(&[compression as u8])?;
    writer.write_all(payload)?;

    let handle = BlockHandle::new(*offset, payload.len() as u64 + 1);
    *offset += handle.size;
    Ok(handle)
}

/// Write every pair from a sorted sequence into a new tablet file.
///
/// Returns the size of the file.
pub fn write_tablet<P, I, K, V>(path: P, entries: I, options: TabletWriterOptions) -> Result<u64>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let file = File::create(path.as_ref())?;
    let mut writer = TabletWriter::new(BufWriter::new(file), options)?;

    for (key, value) in entries {
        writer.add(key.as_ref(), value.as_ref())?;
    }

    let file = writer.finish()?.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(writer.offset())
}
