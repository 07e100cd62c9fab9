//! Per-block compression hook.
//!
//! Each stored data block is preceded by a one-byte marker naming the codec
//! that produced its payload (`CompressionType as u8`). Codecs are looked up
//! by marker through [`compressor_for`], so adding a codec only touches this
//! module and [`CompressionType`].

use crate::config::CompressionType;
use crate::error::{Error, Result};

/// A block compression codec.
///
/// Implementations must treat every block independently: no state may be
/// carried from one block to the next.
pub trait Compressor: Send + Sync {
    /// Marker written before blocks produced by this codec.
    fn compression_type(&self) -> CompressionType;

    /// Compress one block.
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>>;

    /// Restore one block. The result must be exactly `expected_len` bytes.
    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>>;

    /// Upper bound on restored bytes per stored byte.
    fn max_expansion(&self) -> usize {
        1
    }
}

/// Headroom added to the expansion bound for codec headers on tiny blocks.
const EXPANSION_SLACK: usize = 16;

/// Identity codec (marker 0).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn compression_type(&self) -> CompressionType {
        CompressionType::None
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        check_len(data.to_vec(), expected_len)
    }
}

/// Snappy codec (marker 1).
#[cfg(feature = "snappy")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SnappyCompressor;

#[cfg(feature = "snappy")]
impl Compressor for SnappyCompressor {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Snappy
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        snap::raw::Encoder::new()
            .compress_vec(raw)
            .map_err(|e| Error::compression_failed(format!("Snappy: {}", e)))
    }

    fn max_expansion(&self) -> usize {
        // A 3-byte copy tag restores at most 64 bytes
        32
    }

    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        // Reject before allocating when the header disagrees with the index.
        let declared = snap::raw::decompress_len(data)
            .map_err(|e| Error::decompression_failed(format!("Snappy: {}", e)))?;
        if declared != expected_len {
            return Err(Error::decompression_failed(format!(
                "Snappy payload declares {} bytes, expected {}",
                declared, expected_len
            )));
        }

        let raw = snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| Error::decompression_failed(format!("Snappy: {}", e)))?;
        check_len(raw, expected_len)
    }
}

/// LZ4 block codec (marker 2).
#[cfg(feature = "lz4-compression")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Compressor;

#[cfg(feature = "lz4-compression")]
impl Compressor for Lz4Compressor {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Lz4
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(raw, None, false)
            .map_err(|e| Error::compression_failed(format!("LZ4: {}", e)))
    }

    fn max_expansion(&self) -> usize {
        // Each match-length extension byte adds at most 255
        256
    }

    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let size = i32::try_from(expected_len).map_err(|_| {
            Error::decompression_failed(format!("LZ4 block of {} bytes too large", expected_len))
        })?;
        let raw = lz4::block::decompress(data, Some(size))
            .map_err(|e| Error::decompression_failed(format!("LZ4: {}", e)))?;
        check_len(raw, expected_len)
    }
}

fn check_len(raw: Vec<u8>, expected_len: usize) -> Result<Vec<u8>> {
    if raw.len() != expected_len {
        return Err(Error::decompression_failed(format!(
            "Decompressed {} bytes, expected {}",
            raw.len(),
            expected_len
        )));
    }
    Ok(raw)
}

static NO_COMPRESSION: NoCompression = NoCompression;
#[cfg(feature = "snappy")]
static SNAPPY: SnappyCompressor = SnappyCompressor;
#[cfg(feature = "lz4-compression")]
static LZ4: Lz4Compressor = Lz4Compressor;

/// Look up the codec for a marker.
///
/// Fails when support for the codec was not compiled in.
pub fn compressor_for(compression: CompressionType) -> Result<&'static dyn Compressor> {
    match compression {
        CompressionType::None => Ok(&NO_COMPRESSION),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => Ok(&SNAPPY),
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => Ok(&LZ4),
        #[allow(unreachable_patterns)]
        other => Err(Error::decompression_failed(format!(
            "{:?} compression not enabled in this build",
            other
        ))),
    }
}

/// Compress a finished block, keeping the raw bytes when the codec does not
/// make it smaller. Returns the marker actually used with the payload.
pub fn compress_block(
    compression: CompressionType,
    raw: &[u8],
) -> Result<(CompressionType, Vec<u8>)> {
    if compression == CompressionType::None {
        return Ok((CompressionType::None, raw.to_vec()));
    }

    let compressed = compressor_for(compression)?.compress(raw)?;
    if compressed.len() >= raw.len() {
        return Ok((CompressionType::None, raw.to_vec()));
    }
    Ok((compression, compressed))
}

/// Undo [`compress_block`] for a payload stored under `marker`.
pub fn decompress_block(marker: u8, payload: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let compression = CompressionType::from_u8(marker)
        .ok_or_else(|| Error::corrupt_block(format!("Invalid compression marker {}", marker)))?;
    let codec = compressor_for(compression)?;

    // expected_len comes from the index; refuse to allocate out of proportion
    let limit =
        payload.len().saturating_mul(codec.max_expansion()).saturating_add(EXPANSION_SLACK);
    if expected_len > limit {
        return Err(Error::decompression_failed(format!(
            "{:?} payload of {} bytes cannot expand to {} bytes",
            compression,
            payload.len(),
            expected_len
        )));
    }
    codec.decompress(payload, expected_len)
}
