// VCDIFF variable-length integers (RFC 3284, Section 2).
//
// Base-128, big-endian: most-significant group first, bit 7 set on every
// byte except the last.  Same wire form as xdelta3's `xd3_emit_size` /
// `xd3_read_size`.

use std::io::{self, Read, Write};

/// Longest encoding of a 64-bit value (ceil(64/7) bytes).
pub const MAX_LEN: usize = 10;

/// Bits that must be clear in the accumulator before the next `<< 7`.
const OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    /// Input ended before the terminating byte.
    Truncated,
    /// Value does not fit the requested integer width.
    Overflow,
}

impl std::fmt::Display for VarintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarintError::Truncated => write!(f, "truncated varint"),
            VarintError::Overflow => write!(f, "varint overflow"),
        }
    }
}

impl std::error::Error for VarintError {}

impl From<VarintError> for io::Error {
    fn from(e: VarintError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `num` into `scratch`, filling from the end.
/// Returns the encoded bytes as a subslice of `scratch`.
#[inline]
pub fn encode<'a>(mut num: u64, scratch: &'a mut [u8; MAX_LEN]) -> &'a [u8] {
    let mut i = MAX_LEN;
    loop {
        i -= 1;
        scratch[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    scratch[MAX_LEN - 1] &= 0x7F;
    &scratch[i..]
}

/// Encode `num` and write it to a sink.
pub fn write<W: Write>(w: &mut W, num: u64) -> io::Result<()> {
    let mut scratch = [0u8; MAX_LEN];
    w.write_all(encode(num, &mut scratch))
}

/// Append `num` to a byte vector.
pub fn push(out: &mut Vec<u8>, num: u64) {
    let mut scratch = [0u8; MAX_LEN];
    out.extend_from_slice(encode(num, &mut scratch));
}

/// Encoded byte length of `num` without encoding it.
/// Matches xdelta3 `xd3_sizeof_uint64_t`.
#[inline]
pub fn encoded_len(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    (bits.max(1).div_ceil(7) as usize).min(MAX_LEN)
}

// ---------------------------------------------------------------------------
// Decoding from byte slices
// ---------------------------------------------------------------------------

/// Decode a `u64` from the front of `data`.
/// Returns `(value, bytes_consumed)`.
pub fn read(data: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if val & OVERFLOW_MASK != 0 {
            return Err(VarintError::Overflow);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarintError::Truncated)
}

/// Decode a `u32` from the front of `data`.
pub fn read_u32(data: &[u8]) -> Result<(u32, usize), VarintError> {
    let (val, len) = read(data)?;
    let val = u32::try_from(val).map_err(|_| VarintError::Overflow)?;
    Ok((val, len))
}

/// Decode a `usize` from the front of `data`.
pub fn read_usize(data: &[u8]) -> Result<(usize, usize), VarintError> {
    let (val, len) = read(data)?;
    let val = usize::try_from(val).map_err(|_| VarintError::Overflow)?;
    Ok((val, len))
}

// ---------------------------------------------------------------------------
// Decoding from `Read` (header fields)
// ---------------------------------------------------------------------------

/// Read a `u64` varint one byte at a time from a streaming source.
pub fn read_from<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut val: u64 = 0;
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte)?;
        if val & OVERFLOW_MASK != 0 {
            return Err(VarintError::Overflow.into());
        }
        val = (val << 7) | u64::from(byte[0] & 0x7F);
        if byte[0] & 0x80 == 0 {
            return Ok(val);
        }
    }
}

/// Read a `usize` varint from a streaming source.
pub fn read_usize_from<R: Read>(r: &mut R) -> io::Result<usize> {
    let val = read_from(r)?;
    usize::try_from(val).map_err(|_| VarintError::Overflow.into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
