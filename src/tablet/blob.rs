//! Compact encodings for unsigned integers and byte strings.
//!
//! Every higher layer of the format (block entries, index keys) is built
//! from these two primitives:
//!
//! ```text
//! uint:  LEB128 varint, 7 data bits per byte, high bit = "more bytes follow"
//! blob:  [0xA0 | len] [bytes]              for len 0..=31
//!        [0xDA] [uint len] [bytes]         for len >= 32
//! ```
//!
//! Decoders work on a `&mut &[u8]` cursor and advance it past what they
//! consumed. They never allocate from a length read off the wire: blobs are
//! returned as slices of the input after the length is checked against the
//! bytes actually available.

use crate::error::{Error, Result};
use bytes::BufMut;

/// Tag base for the short blob form; the low five bits hold the length.
pub const BLOB_SHORT_TAG: u8 = 0xA0;

/// Tag for blobs whose length follows as a varint.
pub const BLOB_EXTENDED_TAG: u8 = 0xDA;

/// Longest blob that fits the short form.
pub const BLOB_SHORT_MAX_LEN: usize = 31;

/// Longest blob the format accepts.
pub const BLOB_MAX_LEN: usize = u32::MAX as usize;

/// A u64 never needs more than 10 varint bytes.
pub const MAX_VARINT_LEN: usize = 10;

const SHORT_TAG_MASK: u8 = 0xE0;
const SHORT_LEN_MASK: u8 = 0x1F;

/// Append `value` as a varint.
pub fn encode_uint<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Number of bytes `encode_uint` writes for `value`.
pub fn encoded_uint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Decode a varint and advance `input` past it.
pub fn decode_uint(input: &mut &[u8]) -> Result<u64> {
    let data: &[u8] = *input;
    let mut value = 0u64;
    for (i, &byte) in data.iter().enumerate().take(MAX_VARINT_LEN) {
        let bits = u64::from(byte & 0x7f);
        // The tenth byte may only carry bit 63.
        if i == MAX_VARINT_LEN - 1 && bits > 1 {
            return Err(Error::MalformedVarint);
        }
        value |= bits << (7 * i);
        if byte & 0x80 == 0 {
            *input = &data[i + 1..];
            return Ok(value);
        }
    }
    Err(Error::MalformedVarint)
}

/// Append `data` as a tagged blob.
pub fn encode_bytes<B: BufMut>(buf: &mut B, data: &[u8]) -> Result<()> {
    let len = data.len();
    if len > BLOB_MAX_LEN {
        return Err(Error::encoding_overflow(format!(
            "blob of {} bytes exceeds the {} byte limit",
            len, BLOB_MAX_LEN
        )));
    }

    if len <= BLOB_SHORT_MAX_LEN {
        buf.put_u8(BLOB_SHORT_TAG | len as u8);
    } else {
        buf.put_u8(BLOB_EXTENDED_TAG);
        encode_uint(buf, len as u64);
    }
    buf.put_slice(data);
    Ok(())
}

/// Number of bytes `encode_bytes` writes for a blob of `len` bytes.
pub fn encoded_bytes_len(len: usize) -> usize {
    if len <= BLOB_SHORT_MAX_LEN {
        1 + len
    } else {
        1 + encoded_uint_len(len as u64) + len
    }
}

/// Decode a tagged blob, returning a slice of `input`, and advance past it.
pub fn decode_bytes<'a>(input: &mut &'a [u8]) -> Result<&'a [u8]> {
    let data: &'a [u8] = *input;
    let (&tag, mut rest) = data
        .split_first()
        .ok_or(Error::TruncatedBlob { needed: 1, available: 0 })?;

    let len = if tag & SHORT_TAG_MASK == BLOB_SHORT_TAG {
        usize::from(tag & SHORT_LEN_MASK)
    } else if tag == BLOB_EXTENDED_TAG {
        let declared = decode_uint(&mut rest)?;
        usize::try_from(declared).unwrap_or(usize::MAX)
    } else {
        return Err(Error::corrupt_block(format!("unknown blob tag {:#04x}", tag)));
    };

    if len > rest.len() {
        return Err(Error::TruncatedBlob { needed: len, available: rest.len() });
    }

    let (blob, remaining) = rest.split_at(len);
    *input = remaining;
    Ok(blob)
}
