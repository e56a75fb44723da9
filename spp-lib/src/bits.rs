//! Bit-granular reads over a byte buffer.
//!
//! All reads are big-endian at bit granularity: the first bit of the buffer
//! is the most significant bit of byte 0.

use crate::{Error, Result};

/// Signed integer interpretations for raw bit fields.
///
/// `Unsigned` is included so a single read path covers every XTCE integer
/// encoding attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntEncoding {
    Unsigned,
    TwosComplement,
    SignMagnitude,
    OnesComplement,
}

/// Positioned view over an immutable byte buffer.
///
/// Each cursor is owned by a single decoding call; there is no shared
/// mutation. Reading past the end fails with [`Error::OutOfData`].
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BitCursor<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        BitCursor { buf, pos: 0 }
    }

    /// Absolute bit position from the start of the buffer.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bits left before the end of the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() * 8 - self.pos
    }

    fn check(&self, nbits: usize) -> Result<()> {
        if nbits > self.remaining() {
            return Err(Error::OutOfData {
                needed: nbits,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    /// Advance the cursor without reading.
    pub fn skip(&mut self, nbits: usize) -> Result<()> {
        self.check(nbits)?;
        self.pos += nbits;
        Ok(())
    }

    /// Read `nbits` (1..=64) as a big-endian unsigned integer.
    pub fn read_uint(&mut self, nbits: usize) -> Result<u64> {
        let val = self.peek_uint(self.pos, nbits)?;
        self.pos += nbits;
        Ok(val)
    }

    /// Read `nbits` at an absolute bit offset without advancing.
    pub fn peek_uint(&self, bit_offset: usize, nbits: usize) -> Result<u64> {
        if nbits == 0 || nbits > 64 {
            return Err(Error::UnsupportedEncoding(format!(
                "integer reads must be 1..=64 bits, got {nbits}"
            )));
        }
        if bit_offset + nbits > self.buf.len() * 8 {
            return Err(Error::OutOfData {
                needed: nbits,
                remaining: (self.buf.len() * 8).saturating_sub(bit_offset),
            });
        }

        let mut val: u64 = 0;
        let mut taken = 0;
        let mut byte = bit_offset / 8;
        let mut bit = bit_offset % 8;
        while taken < nbits {
            let avail = 8 - bit;
            let take = avail.min(nbits - taken);
            let chunk = (self.buf[byte] >> (avail - take)) & ((1u16 << take) - 1) as u8;
            val = (val << take) | u64::from(chunk);
            taken += take;
            bit += take;
            if bit == 8 {
                bit = 0;
                byte += 1;
            }
        }
        Ok(val)
    }

    /// Read `nbits` and interpret them per `encoding`.
    pub fn read_int(&mut self, nbits: usize, encoding: IntEncoding) -> Result<i64> {
        let raw = self.read_uint(nbits)?;
        Ok(interpret_int(raw, nbits, encoding))
    }

    /// Read `nbits` as a byte-aligned buffer of `ceil(nbits / 8)` bytes.
    ///
    /// Bits are left-justified MSB-first; when `nbits` is not a multiple of
    /// eight the final byte is right-padded with zeros. Callers that care
    /// about the exact length keep `nbits` alongside the buffer.
    pub fn read_bytes(&mut self, nbits: usize) -> Result<Vec<u8>> {
        self.check(nbits)?;
        if self.pos % 8 == 0 && nbits % 8 == 0 {
            // Aligned fast path
            let start = self.pos / 8;
            let out = self.buf[start..start + nbits / 8].to_vec();
            self.pos += nbits;
            return Ok(out);
        }

        let mut out = Vec::with_capacity(nbits.div_ceil(8));
        let mut left = nbits;
        while left >= 8 {
            out.push(self.read_uint(8)? as u8);
            left -= 8;
        }
        if left > 0 {
            let tail = self.read_uint(left)? as u8;
            out.push(tail << (8 - left));
        }
        Ok(out)
    }
}

/// Interpret a raw big-endian bit field per the given signed encoding.
#[must_use]
pub fn interpret_int(raw: u64, nbits: usize, encoding: IntEncoding) -> i64 {
    if nbits == 64 {
        return match encoding {
            IntEncoding::Unsigned | IntEncoding::TwosComplement => raw as i64,
            IntEncoding::SignMagnitude => {
                let magnitude = (raw & !(1 << 63)) as i64;
                if raw >> 63 == 1 {
                    -magnitude
                } else {
                    magnitude
                }
            }
            IntEncoding::OnesComplement => {
                if raw >> 63 == 1 {
                    -(!raw as i64)
                } else {
                    raw as i64
                }
            }
        };
    }

    let sign = (raw >> (nbits - 1)) & 1 == 1;
    match encoding {
        IntEncoding::Unsigned => raw as i64,
        IntEncoding::TwosComplement => {
            if sign {
                (raw as i64).wrapping_sub(1i64.wrapping_shl(nbits as u32))
            } else {
                raw as i64
            }
        }
        IntEncoding::SignMagnitude => {
            let magnitude = (raw & ((1 << (nbits - 1)) - 1)) as i64;
            if sign {
                -magnitude
            } else {
                magnitude
            }
        }
        IntEncoding::OnesComplement => {
            if sign {
                -(((!raw) & ((1 << nbits) - 1)) as i64)
            } else {
                raw as i64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_across_byte_boundaries() {
        // 00110101 11001010
        let dat = [0b0011_0101, 0b1100_1010];
        let mut cur = BitCursor::new(&dat);

        cur.skip(2).unwrap();
        let val = cur.read_uint(9).unwrap();
        assert_eq!(val, 0b1_1010_1110);
        assert_eq!(cur.position(), 11);
        assert_eq!(cur.remaining(), 5);
    }

    #[test]
    fn out_of_data() {
        let dat = [0xff];
        let mut cur = BitCursor::new(&dat);
        cur.skip(4).unwrap();
        let err = cur.read_uint(5).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfData {
                needed: 5,
                remaining: 4
            }
        ));
    }

    #[test]
    fn peek_does_not_advance() {
        let dat = [0xde, 0xad];
        let cur = BitCursor::new(&dat);
        assert_eq!(cur.peek_uint(8, 8).unwrap(), 0xad);
        assert_eq!(cur.position(), 0);
    }

    #[test]
    fn signed_encodings() {
        assert_eq!(interpret_int(0b1111, 4, IntEncoding::Unsigned), 15);
        assert_eq!(interpret_int(0b1111, 4, IntEncoding::TwosComplement), -1);
        assert_eq!(interpret_int(0b1111, 4, IntEncoding::SignMagnitude), -7);
        assert_eq!(interpret_int(0b1111, 4, IntEncoding::OnesComplement), -0);
        assert_eq!(interpret_int(0b1110, 4, IntEncoding::OnesComplement), -1);
        assert_eq!(interpret_int(0b0111, 4, IntEncoding::TwosComplement), 7);
        assert_eq!(interpret_int(0b1000, 4, IntEncoding::SignMagnitude), 0);
    }

    #[test]
    fn unaligned_bytes_right_padded() {
        // 1010_1010 1100____
        let dat = [0b1010_1010, 0b1100_0000];
        let mut cur = BitCursor::new(&dat);
        cur.skip(1).unwrap();
        let bytes = cur.read_bytes(11).unwrap();
        // bits: 010_1010_1100 -> 0101 0101 1000 0000
        assert_eq!(bytes, vec![0b0101_0101, 0b1000_0000]);
        assert_eq!(cur.position(), 12);
    }

    #[test]
    fn aligned_bytes_fast_path() {
        let dat = [1, 2, 3, 4];
        let mut cur = BitCursor::new(&dat);
        cur.skip(8).unwrap();
        assert_eq!(cur.read_bytes(16).unwrap(), vec![2, 3]);
    }

    #[test]
    fn width_limits() {
        let dat = [0u8; 16];
        let mut cur = BitCursor::new(&dat);
        assert!(matches!(
            cur.read_uint(65),
            Err(Error::UnsupportedEncoding(_))
        ));
        assert_eq!(cur.read_uint(64).unwrap(), 0);
    }
}
