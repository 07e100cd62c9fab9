//! # Tablet - Immutable Sorted Key-Value Files
//!
//! A tablet is the on-disk primitive beneath a key-value datastore: an
//! immutable file of sorted key-value pairs, split into independently
//! decodable blocks and located through a sparse index.
//!
//! ## Architecture
//!
//! - **Blob codec**: varints and tag-prefixed byte strings used by every layer
//! - **Block builder / reader**: prefix-compressed entries with restart
//!   points for binary search inside a block
//! - **Compression hook**: optional per-block codec, recorded in a marker byte
//! - **Tablet writer**: seals blocks at a size threshold and writes the
//!   index block and footer
//! - **Tablet reader**: point lookups and ordered scans over a finished tablet
//!
//! ## Example Usage
//!
//! ```rust
//! use tablet::{Tablet, TabletWriter, TabletWriterOptions};
//!
//! # fn main() -> Result<(), tablet::Error> {
//! let options = TabletWriterOptions::default().key_restart_interval(10);
//! let mut writer = TabletWriter::new(Vec::new(), options)?;
//!
//! // Keys must arrive in sorted order
//! writer.add(b"apple", b"red")?;
//! writer.add(b"banana", b"yellow")?;
//! let bytes = writer.finish()?;
//!
//! let tablet = Tablet::from_bytes(bytes)?;
//! assert_eq!(tablet.get(b"banana")?.as_deref(), Some(&b"yellow"[..]));
//! assert_eq!(tablet.get(b"cherry")?, None);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod error;
pub mod tablet;

// Re-exports
pub use config::{CompressionType, TabletWriterOptions};
pub use error::{Error, Result};
pub use tablet::{
    write_tablet, Block, BlockBuilder, BlockIterator, Tablet, TabletIterator, TabletWriter,
};
