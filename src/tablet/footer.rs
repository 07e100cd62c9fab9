//! Tablet footer implementation.
//!
//! The footer is a fixed-size (32 bytes) structure at the end of a tablet
//! file that locates the index block.

use crate::error::{Error, Result};
use crate::tablet::{FOOTER_SIZE, FORMAT_VERSION, MAGIC_NUMBER};
use bytes::{Buf, BufMut};
use std::io::{Read, Write};

/// Size of an encoded [`BlockHandle`].
pub const BLOCK_HANDLE_SIZE: usize = 16;

/// BlockHandle represents a pointer to a stored block in the tablet file.
///
/// The size covers the one-byte codec marker plus the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    /// Offset of the block in the file
    pub offset: u64,
    /// Size of the block in bytes
    pub size: u64,
}

impl BlockHandle {
    /// Create a new BlockHandle
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Encode the BlockHandle (16 bytes: 8 for offset + 8 for size)
    pub fn encode_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64(self.offset);
        buf.put_u64(self.size);
    }

    /// Decode a BlockHandle and advance `input` past it
    pub fn decode_from(input: &mut &[u8]) -> Result<Self> {
        if input.len() < BLOCK_HANDLE_SIZE {
            return Err(Error::corrupt_block("BlockHandle too short"));
        }

        let offset = input.get_u64();
        let size = input.get_u64();
        Ok(Self { offset, size })
    }

    /// Get the end offset of this block.
    ///
    /// Handles decoded from a file are untrusted, so an end past `u64::MAX`
    /// is reported as corruption.
    pub fn end_offset(&self) -> Result<u64> {
        self.offset.checked_add(self.size).ok_or_else(|| {
            Error::corrupt_block(format!(
                "Block handle at offset {} with size {} overflows",
                self.offset, self.size
            ))
        })
    }
}

/// Footer is the last 32 bytes of a tablet file.
///
/// Format (big-endian):
/// ```text
/// [index_handle: 16 bytes]
/// [index_checksum: u32]     // CRC32 of the stored index payload
/// [format_version: u32]
/// [magic: u64]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    /// Handle to the index block
    pub index_handle: BlockHandle,
    /// CRC32 of the index block payload
    pub index_checksum: u32,
}

impl Footer {
    /// Create a new Footer
    pub fn new(index_handle: BlockHandle, index_checksum: u32) -> Self {
        Self { index_handle, index_checksum }
    }

    /// Encode the footer to bytes (32 bytes)
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FOOTER_SIZE);
        self.index_handle.encode_to(&mut buf);
        buf.put_u32(self.index_checksum);
        buf.put_u32(FORMAT_VERSION);
        buf.put_u64(MAGIC_NUMBER);
        debug_assert_eq!(buf.len(), FOOTER_SIZE);
        buf
    }

    /// Decode a footer from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(Error::corrupt_block(format!(
                "Footer size mismatch: expected {}, got {}",
                FOOTER_SIZE,
                data.len()
            )));
        }

        let mut input = data;
        let index_handle = BlockHandle::decode_from(&mut input)?;
        let index_checksum = input.get_u32();
        let version = input.get_u32();
        let magic = input.get_u64();

        // Verify magic number
        if magic != MAGIC_NUMBER {
            return Err(Error::corrupt_block(format!(
                "Invalid tablet magic number: expected {:#x}, got {:#x}",
                MAGIC_NUMBER, magic
            )));
        }
        if version != FORMAT_VERSION {
            return Err(Error::corrupt_block(format!(
                "Unsupported tablet format version {}",
                version
            )));
        }

        Ok(Self { index_handle, index_checksum })
    }

    /// Write the footer to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode())?;
        Ok(())
    }

    /// Read the footer from a reader
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; FOOTER_SIZE];
        reader.read_exact(&mut buf)?;
        Self::decode(&buf)
    }
}
