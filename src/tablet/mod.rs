//! Tablet (immutable sorted table) implementation.
//!
//! A tablet is an immutable, sorted file of key-value pairs designed for
//! sequential writes and random reads.
//!
//! ## File Format
//!
//! ```text
//! [Data Block 1]    // [marker: u8][payload]
//! [Data Block 2]
//! ...
//! [Data Block N]
//! [Index Block]     // [marker = 0][block]
//! [Footer: 32B]     // Points to the index block
//! ```
//!
//! ## Block Format
//!
//! Each block contains:
//! - Prefix-compressed key-value entries
//! - Restart points where keys are stored in full
//! - The restart point count
//!
//! ## Index Format
//!
//! The index block is itself a block. Each entry maps:
//! - Key: The first key in a data block
//! - Value: Location, size, codec, raw size and CRC32 of that block

pub mod blob;
pub mod block;
pub mod comparator;
pub mod compression;
pub mod footer;
pub mod index;
pub mod reader;
pub mod writer;

pub use block::{Block, BlockBuilder, BlockIterator};
pub use comparator::{BytewiseComparator, Comparator};
pub use compression::{compressor_for, Compressor};
pub use footer::{BlockHandle, Footer};
pub use index::{IndexBlock, IndexEntry};
pub use reader::{BlockSource, FileSource, Tablet, TabletIterator};
pub use writer::{write_tablet, TabletWriter};

// Re-export CompressionType from config
pub use crate::config::CompressionType;

/// Footer size in bytes (fixed)
pub const FOOTER_SIZE: usize = 32;

/// Version of the on-disk layout written into the footer
pub const FORMAT_VERSION: u32 = 1;

/// Magic number for tablet files
pub const MAGIC_NUMBER: u64 = 0x5441_424c_4554_3031; // "TABLET01" in hex
