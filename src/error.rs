//! Error types for tablet encoding and decoding.

use std::io;
use thiserror::Error;

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for block and tablet operations.
///
/// None of these are transient: they report either caller misuse of a
/// writer or malformed/incompatible input on the read side.
#[derive(Debug, Error)]
pub enum Error {
    /// A key was not strictly greater than the previously appended key.
    #[error("Out of order key: keys must be appended in strictly increasing order")]
    OutOfOrderKey,

    /// The writer was already finished.
    #[error("Writer already finished")]
    WriterFinished,

    /// An earlier write to the sink failed; the output is incomplete.
    #[error("Writer poisoned by an earlier write error")]
    WriterPoisoned,

    /// The block has no entries.
    #[error("Block is empty")]
    EmptyBlock,

    /// A varint was truncated or does not fit in 64 bits.
    #[error("Malformed varint")]
    MalformedVarint,

    /// A blob declared more bytes than the input holds.
    #[error("Truncated blob: needed {needed} bytes, {available} available")]
    TruncatedBlob {
        /// Bytes declared by the blob header.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A block or tablet structure failed validation.
    #[error("Corrupt block: {0}")]
    CorruptBlock(String),

    /// A codec failed to compress a block.
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// A compressed payload could not be restored.
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// A length or offset exceeds what the format can represent.
    #[error("Encoding overflow: {0}")]
    EncodingOverflow(String),

    /// A stored checksum does not match the payload.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The expected checksum value.
        expected: u32,
        /// The actual checksum value.
        actual: u32,
    },

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Creates a new corrupt block error.
    pub fn corrupt_block(msg: impl Into<String>) -> Self {
        Error::CorruptBlock(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new encoding overflow error.
    pub fn encoding_overflow(msg: impl Into<String>) -> Self {
        Error::EncodingOverflow(msg.into())
    }

    /// Creates a new compression error.
    pub fn compression_failed(msg: impl Into<String>) -> Self {
        Error::CompressionFailed(msg.into())
    }

    /// Creates a new decompression error.
    pub fn decompression_failed(msg: impl Into<String>) -> Self {
        Error::DecompressionFailed(msg.into())
    }
}
