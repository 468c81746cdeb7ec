//! Binary codec primitives shared by messages and transactions.
//!
//! Every length prefix on the wire is a compact-u16: 1 to 3 bytes, seven
//! value bits per byte, high bit set while more bytes follow. Keys, hashes
//! and signatures are fixed-width raw copies and never length-prefixed.
//!
//! Decoding goes through [`Cursor`], which checks every read against the
//! remaining buffer so hostile input fails with an error instead of a panic
//! or an oversized allocation.

use crate::error::LedgerError;

/// Longest compact-u16 encoding in bytes.
pub const MAX_COMPACT_U16_LEN: usize = 3;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(MAX_COMPACT_U16_LEN);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Append the compact-u16 form of a collection length to `buf`.
///
/// Fails with [`LedgerError::LengthOverflow`] when `len` does not fit in a
/// `u16`.
pub fn write_compact_len(buf: &mut Vec<u8>, len: usize) -> Result<(), LedgerError> {
    let value = u16::try_from(len).map_err(|_| LedgerError::LengthOverflow(len))?;
    buf.extend_from_slice(&encode_compact_u16(value));
    Ok(())
}

/// Decode a compact-u16 value from the front of `data`.
///
/// Returns `(value, bytes_consumed)`.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), LedgerError> {
    let mut cursor = Cursor::new(data);
    let value = cursor.read_compact_u16()?;
    Ok((value, cursor.position()))
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Sequential, bounds-checked reader over a byte slice.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<(), LedgerError> {
        if needed > self.remaining() {
            return Err(LedgerError::TruncatedInput {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    /// Look at the next `n` bytes without consuming them.
    pub fn peek(&self, n: usize) -> Result<&'a [u8], LedgerError> {
        self.ensure(n)?;
        Ok(&self.data[self.pos..self.pos + n])
    }

    /// Consume exactly `n` bytes.
    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8], LedgerError> {
        let out = self.peek(n)?;
        self.pos += n;
        Ok(out)
    }

    /// Consume a fixed-width field (key, hash, signature).
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], LedgerError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, LedgerError> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, LedgerError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, LedgerError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, LedgerError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Decode a compact-u16.
    ///
    /// Rejects encodings longer than three bytes, values above `u16::MAX`,
    /// and non-canonical forms with a trailing zero byte.
    pub fn read_compact_u16(&mut self) -> Result<u16, LedgerError> {
        let mut value: u32 = 0;

        for i in 0..MAX_COMPACT_U16_LEN {
            let byte = self.read_u8()?;
            if i > 0 && byte == 0 {
                return Err(LedgerError::MalformedLength);
            }
            value |= ((byte & 0x7f) as u32) << (i * 7);

            if byte & 0x80 == 0 {
                return u16::try_from(value).map_err(|_| LedgerError::MalformedLength);
            }
        }

        // Continuation bit still set on the third byte.
        Err(LedgerError::MalformedLength)
    }

    /// Read a compact-u16 element count and check that `count * elem_size`
    /// bytes are actually left before anyone allocates for them.
    pub fn read_count(&mut self, what: &'static str, elem_size: usize) -> Result<usize, LedgerError> {
        let count = self.read_compact_u16()? as usize;
        let remaining = self.remaining();
        if count.saturating_mul(elem_size) > remaining {
            return Err(LedgerError::CountOverflow {
                what,
                count,
                remaining,
            });
        }
        Ok(count)
    }
}
