//! Configuration options for tablet writers.

use crate::tablet::comparator::{BytewiseComparator, Comparator};
use std::sync::Arc;

/// Default soft limit on the encoded size of a data block (4KB).
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default number of entries between restart points.
pub const DEFAULT_KEY_RESTART_INTERVAL: usize = 16;

/// Configuration held for the lifetime of one tablet writer.
#[derive(Debug, Clone)]
pub struct TabletWriterOptions {
    /// Soft maximum encoded block size before the block is sealed.
    /// The check runs after each append, so blocks may exceed it slightly.
    /// Default: 4KB
    pub block_size: usize,

    /// Number of entries between restart points. Must be at least 1.
    /// Default: 16
    pub key_restart_interval: usize,

    /// Run each sealed data block through the compression hook.
    /// Default: false
    pub use_compression: bool,

    /// Codec used when `use_compression` is set.
    /// Default: Snappy when the `snappy` feature is enabled.
    pub compression: CompressionType,

    /// Ordering applied to keys.
    /// Default: byte-lexicographic
    pub comparator: Arc<dyn Comparator>,
}

impl Default for TabletWriterOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            key_restart_interval: DEFAULT_KEY_RESTART_INTERVAL,
            use_compression: false,
            compression: CompressionType::default(),
            comparator: Arc::new(BytewiseComparator),
        }
    }
}

/// Compression codecs understood by the tablet format.
///
/// The discriminant is the one-byte marker stored before each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionType {
    /// Block stored as-is.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio).
    Snappy = 1,

    /// LZ4 compression (very fast, lower compression ratio).
    Lz4 = 2,
}

impl CompressionType {
    /// Convert from the on-disk marker byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }

    /// Whether support for this codec was compiled in.
    pub fn is_available(self) -> bool {
        match self {
            CompressionType::None => true,
            CompressionType::Snappy => cfg!(feature = "snappy"),
            CompressionType::Lz4 => cfg!(feature = "lz4-compression"),
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        if cfg!(feature = "snappy") {
            CompressionType::Snappy
        } else if cfg!(feature = "lz4-compression") {
            CompressionType::Lz4
        } else {
            CompressionType::None
        }
    }
}

impl TabletWriterOptions {
    /// Creates a new TabletWriterOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the number of entries between restart points.
    pub fn key_restart_interval(mut self, interval: usize) -> Self {
        self.key_restart_interval = interval;
        self
    }

    /// Enables or disables per-block compression.
    pub fn use_compression(mut self, value: bool) -> Self {
        self.use_compression = value;
        self
    }

    /// Sets the compression codec (only used when compression is enabled).
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the key comparator.
    pub fn comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// The codec actually applied to data blocks.
    pub fn effective_compression(&self) -> CompressionType {
        if self.use_compression {
            self.compression
        } else {
            CompressionType::None
        }
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size == 0 {
            return Err(crate::Error::invalid_argument("block_size must be > 0"));
        }
        if self.key_restart_interval == 0 {
            return Err(crate::Error::invalid_argument("key_restart_interval must be >= 1"));
        }
        let compression = self.effective_compression();
        if !compression.is_available() {
            return Err(crate::Error::invalid_argument(format!(
                "{:?} compression is not enabled in this build",
                compression
            )));
        }
        Ok(())
    }
}
