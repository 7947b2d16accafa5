//! Version-dispatched integer I/O.
//!
//! The legacy dialect puts multi-byte integers on the wire big-endian, the
//! IETF dialect little-endian. Both encode the ACK delay as a 16-bit
//! unsigned float: 5-bit exponent (bias 1), 11-bit mantissa (12 effective
//! bits with the hidden bit), no sign.

use std::io::{Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::WireError;
use crate::protocol::Version;

const UFLOAT16_EXPONENT_BITS: u32 = 5;
const UFLOAT16_MAX_EXPONENT: u32 = (1 << UFLOAT16_EXPONENT_BITS) - 2;
const UFLOAT16_MANTISSA_BITS: u32 = 16 - UFLOAT16_EXPONENT_BITS;
const UFLOAT16_MANTISSA_EFFECTIVE_BITS: u32 = UFLOAT16_MANTISSA_BITS + 1;

/// Largest value a ufloat16 can represent; larger values clamp to this.
pub const UFLOAT16_MAX_VALUE: u64 =
    ((1 << UFLOAT16_MANTISSA_EFFECTIVE_BITS) - 1) << UFLOAT16_MAX_EXPONENT;

/// Byte-order strategy selected by the wire dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

impl Version {
    /// The byte order this dialect puts multi-byte integers on the wire in.
    pub const fn endianness(self) -> Endianness {
        match self {
            Version::Legacy => Endianness::Big,
            Version::Ietf => Endianness::Little,
        }
    }
}

impl Endianness {
    pub fn read_u8<R: Read>(self, r: &mut R) -> Result<u8, WireError> {
        Ok(r.read_u8()?)
    }

    pub fn read_u16<R: Read>(self, r: &mut R) -> Result<u16, WireError> {
        Ok(match self {
            Endianness::Big => r.read_u16::<BigEndian>()?,
            Endianness::Little => r.read_u16::<LittleEndian>()?,
        })
    }

    pub fn read_u32<R: Read>(self, r: &mut R) -> Result<u32, WireError> {
        Ok(match self {
            Endianness::Big => r.read_u32::<BigEndian>()?,
            Endianness::Little => r.read_u32::<LittleEndian>()?,
        })
    }

    /// Read an unsigned integer of `len` bytes, `len` in `1..=8`.
    pub fn read_uint_n<R: Read>(self, r: &mut R, len: usize) -> Result<u64, WireError> {
        Ok(match self {
            Endianness::Big => r.read_uint::<BigEndian>(len)?,
            Endianness::Little => r.read_uint::<LittleEndian>(len)?,
        })
    }

    pub fn write_u8<W: Write>(self, w: &mut W, v: u8) -> Result<(), WireError> {
        Ok(w.write_u8(v)?)
    }

    pub fn write_u16<W: Write>(self, w: &mut W, v: u16) -> Result<(), WireError> {
        Ok(match self {
            Endianness::Big => w.write_u16::<BigEndian>(v)?,
            Endianness::Little => w.write_u16::<LittleEndian>(v)?,
        })
    }

    /// Write the low `len` bytes of `v`, `len` in `1..=8`.
    ///
    /// Covers the legacy dialect's 6-byte packet number fields.
    pub fn write_uint_n<W: Write>(self, w: &mut W, v: u64, len: usize) -> Result<(), WireError> {
        let v = if len == 8 { v } else { v & ((1u64 << (len * 8)) - 1) };
        Ok(match self {
            Endianness::Big => w.write_uint::<BigEndian>(v, len)?,
            Endianness::Little => w.write_uint::<LittleEndian>(v, len)?,
        })
    }

    /// Decode a ufloat16 into its integer value.
    pub fn read_ufloat16<R: Read>(self, r: &mut R) -> Result<u64, WireError> {
        let val = self.read_u16(r)?;
        let mut res = u64::from(val);
        if res >= 1 << UFLOAT16_MANTISSA_EFFECTIVE_BITS {
            // Normalized with a nonzero exponent offset: strip the exponent,
            // restore the hidden bit, shift back up.
            let exponent = u64::from(val >> UFLOAT16_MANTISSA_BITS) - 1;
            res -= exponent << UFLOAT16_MANTISSA_BITS;
            res <<= exponent;
        }
        Ok(res)
    }

    /// Encode `value` as a ufloat16, rounding down, clamping at
    /// [`UFLOAT16_MAX_VALUE`].
    pub fn write_ufloat16<W: Write>(self, w: &mut W, value: u64) -> Result<(), WireError> {
        let result: u16 = if value < 1 << UFLOAT16_MANTISSA_EFFECTIVE_BITS {
            // Denormalized, or normalized with exponent zero: the value is
            // its own representation.
            value as u16
        } else if value >= UFLOAT16_MAX_VALUE {
            u16::MAX
        } else {
            // Binary search for the exponent that brings the highest set bit
            // down to position 11, then add mantissa and exponent.
            let mut value = value;
            let mut exponent = 0u16;
            let mut offset = 16u16;
            while offset > 0 {
                if value >= 1 << (UFLOAT16_MANTISSA_BITS + u32::from(offset)) {
                    exponent += offset;
                    value >>= offset;
                }
                offset /= 2;
            }
            value as u16 + (exponent << UFLOAT16_MANTISSA_BITS)
        };
        self.write_u16(w, result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_ufloat16(e: Endianness, value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        e.write_ufloat16(&mut buf, value).unwrap();
        buf
    }

    fn decode_ufloat16(e: Endianness, bytes: &[u8]) -> u64 {
        e.read_ufloat16(&mut Cursor::new(bytes)).unwrap()
    }

    // -- Byte order ---------------------------------------------------------

    #[test]
    fn version_selects_endianness() {
        assert_eq!(Version::Legacy.endianness(), Endianness::Big);
        assert_eq!(Version::Ietf.endianness(), Endianness::Little);
    }

    #[test]
    fn read_uint_n_big_endian() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc];
        let mut r = Cursor::new(&data[..]);
        assert_eq!(
            Endianness::Big.read_uint_n(&mut r, 6).unwrap(),
            0x1234_5678_9abc
        );
    }

    #[test]
    fn read_uint_n_little_endian() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc];
        let mut r = Cursor::new(&data[..]);
        assert_eq!(
            Endianness::Little.read_uint_n(&mut r, 6).unwrap(),
            0xbc9a_7856_3412
        );
    }

    #[test]
    fn write_uint_n_roundtrip_all_lengths() {
        for e in [Endianness::Big, Endianness::Little] {
            for len in 1..=8usize {
                let mask = if len == 8 { u64::MAX } else { (1u64 << (len * 8)) - 1 };
                let v = 0x0123_4567_89ab_cdef_u64 & mask;
                let mut buf = Vec::new();
                e.write_uint_n(&mut buf, v, len).unwrap();
                assert_eq!(buf.len(), len);
                assert_eq!(e.read_uint_n(&mut Cursor::new(&buf), len).unwrap(), v);
            }
        }
    }

    #[test]
    fn write_uint_n_masks_excess_bytes() {
        let mut buf = Vec::new();
        Endianness::Big.write_uint_n(&mut buf, 0x1_0203, 2).unwrap();
        assert_eq!(buf, [0x02, 0x03]);
    }

    #[test]
    fn read_past_end_is_unexpected_eof() {
        let mut r = Cursor::new(&[0x01u8][..]);
        assert_eq!(
            Endianness::Big.read_u16(&mut r).unwrap_err(),
            WireError::UnexpectedEof
        );
    }

    // -- ufloat16 -----------------------------------------------------------

    #[test]
    fn ufloat16_small_values_are_verbatim() {
        for v in [0u64, 1, 2, 42, 4095] {
            for e in [Endianness::Big, Endianness::Little] {
                let bytes = encode_ufloat16(e, v);
                assert_eq!(decode_ufloat16(e, &bytes), v);
            }
        }
    }

    #[test]
    fn ufloat16_first_normalized_value() {
        // 4096 is the first value needing a nonzero exponent; it encodes as
        // 0x1000 and survives the round trip exactly.
        let bytes = encode_ufloat16(Endianness::Big, 4096);
        assert_eq!(bytes, [0x10, 0x00]);
        assert_eq!(decode_ufloat16(Endianness::Big, &bytes), 4096);
    }

    #[test]
    fn ufloat16_rounds_down() {
        // 4097 loses its low bit at exponent 1.
        let bytes = encode_ufloat16(Endianness::Big, 4097);
        assert_eq!(decode_ufloat16(Endianness::Big, &bytes), 4096);
    }

    #[test]
    fn ufloat16_max_encoding() {
        assert_eq!(UFLOAT16_MAX_VALUE, 0x3FF_C000_0000);
        assert_eq!(
            decode_ufloat16(Endianness::Big, &[0xff, 0xff]),
            UFLOAT16_MAX_VALUE
        );
        assert_eq!(encode_ufloat16(Endianness::Big, UFLOAT16_MAX_VALUE), [0xff, 0xff]);
    }

    #[test]
    fn ufloat16_clamps_above_max() {
        assert_eq!(encode_ufloat16(Endianness::Big, u64::MAX), [0xff, 0xff]);
        assert_eq!(
            encode_ufloat16(Endianness::Big, UFLOAT16_MAX_VALUE + 1),
            [0xff, 0xff]
        );
    }

    #[test]
    fn ufloat16_respects_byte_order() {
        assert_eq!(encode_ufloat16(Endianness::Big, 1000), [0x03, 0xe8]);
        assert_eq!(encode_ufloat16(Endianness::Little, 1000), [0xe8, 0x03]);
    }

    #[test]
    fn ufloat16_decode_encode_is_stable() {
        // Decoding then re-encoding any 16-bit pattern reproduces a pattern
        // that decodes to the same value.
        for raw in [0x0000u16, 0x0fff, 0x1000, 0x1800, 0x7abc, 0xfffe, 0xffff] {
            let bytes = raw.to_be_bytes();
            let value = decode_ufloat16(Endianness::Big, &bytes);
            let reencoded = encode_ufloat16(Endianness::Big, value);
            assert_eq!(decode_ufloat16(Endianness::Big, &reencoded), value);
        }
    }
}
