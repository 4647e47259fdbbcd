//! Bit and byte cursors over a shared buffer.
//!
//! A cursor owns one region of the buffer: a packed flag area of
//! `bit_count` bits at its base (rounded up to whole bytes), followed by the
//! byte stream for ordinary field bodies. Flag bits are consumed MSB-first
//! in declaration order; multi-byte primitives are big-endian so raw byte
//! comparison of encoded values matches numeric order.
//!
//! Nested self-delimited regions are opened with [`Writer::with_sub_writer`]
//! and [`Reader::with_sub_reader`].

use crate::error::Error;

/// Maximum encoded length of a 32-bit varint.
pub(crate) const MAX_VARINT_BYTES: usize = 5;

// =============================================================================
// WRITING
// =============================================================================

/// Writer for one region of a byte buffer.
///
/// Bit writes accumulate into a 32-bit word flushed big-endian into the flag
/// area; byte writes go to the byte cursor past the reserved flag bytes. A
/// writer must be finalized with [`Writer::finish`] before its region is
/// complete.
#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut [u8],
    offset: usize,
    bits: u32,
    /// Free bit slots remaining in the accumulator, counted down from 32.
    bit_index: u32,
    bit_offset: usize,
}

impl<'a> Writer<'a> {
    /// Creates a writer at `base`, reserving `ceil(bit_count / 8)` flag bytes.
    pub fn new(buf: &'a mut [u8], base: usize, bit_count: usize) -> Writer<'a> {
        Writer {
            offset: base + bit_count.div_ceil(8),
            bits: 0,
            bit_index: 32,
            bit_offset: base,
            buf,
        }
    }

    /// Current byte-cursor position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Flushes the partially filled trailing flag bytes.
    ///
    /// Must be called once all bits of the region have been written; the
    /// region is not complete before that.
    pub fn finish(&mut self) -> Result<(), Error> {
        let consumed = (32 - self.bit_index) as usize;
        if consumed > 0 {
            let word = self.bits.to_be_bytes();
            self.put_flags_slice(&word[..consumed.div_ceil(8)])?;
        }
        self.bits = 0;
        self.bit_index = 32;
        Ok(())
    }

    /// Writes a single flag bit.
    #[inline]
    pub fn write_bit(&mut self, value: bool) -> Result<(), Error> {
        if self.bit_index == 0 {
            self.flush_word()?;
        }
        self.bit_index -= 1;
        if value {
            self.bits |= 1 << self.bit_index;
        }
        Ok(())
    }

    /// Writes the low `count` bits of `value`, MSB-first, `count <= 32`.
    pub fn write_bits(&mut self, value: u32, count: u32) -> Result<(), Error> {
        debug_assert!(count <= 32);
        if count == 0 {
            return Ok(());
        }
        let mut n = count;
        let mut v = if count < 32 {
            value & ((1u32 << count) - 1)
        } else {
            value
        };
        if n > self.bit_index {
            let spill = n - self.bit_index;
            if self.bit_index > 0 {
                self.bits |= v >> spill;
            }
            if spill < 32 {
                v &= (1u32 << spill) - 1;
            }
            n = spill;
            self.flush_word()?;
        }
        self.bit_index -= n;
        self.bits |= v << self.bit_index;
        Ok(())
    }

    #[inline]
    pub fn write_i8(&mut self, value: i8) -> Result<(), Error> {
        self.put(&value.to_be_bytes())
    }

    #[inline]
    pub fn write_i16(&mut self, value: i16) -> Result<(), Error> {
        self.put(&value.to_be_bytes())
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        self.put(&value.to_be_bytes())
    }

    #[inline]
    pub fn write_i64(&mut self, value: i64) -> Result<(), Error> {
        self.put(&value.to_be_bytes())
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) -> Result<(), Error> {
        self.put(&value.to_be_bytes())
    }

    #[inline]
    pub fn write_f64(&mut self, value: f64) -> Result<(), Error> {
        self.put(&value.to_be_bytes())
    }

    /// Writes an unsigned varint: 7 bits per byte, continuation in the top
    /// bit, most-significant group first, 1-5 bytes.
    pub fn write_var_u32(&mut self, value: u32) -> Result<(), Error> {
        let len = var_u32_len(value);
        let mut tmp = [0u8; MAX_VARINT_BYTES];
        for (i, slot) in tmp[..len].iter_mut().enumerate() {
            let shift = 7 * (len - 1 - i) as u32;
            let mut byte = ((value >> shift) & 0x7F) as u8;
            if i < len - 1 {
                byte |= 0x80;
            }
            *slot = byte;
        }
        self.put(&tmp[..len])
    }

    /// Writes a signed varint (zig-zag encoded).
    pub fn write_var_i32(&mut self, value: i32) -> Result<(), Error> {
        self.write_var_u32(zigzag_encode(value))
    }

    /// Writes length-prefixed UTF-8 text: varint byte length + raw bytes.
    pub fn write_str(&mut self, value: &str) -> Result<(), Error> {
        self.write_var_u32(value.len() as u32)?;
        self.put(value.as_bytes())
    }

    /// Opens a nested region at the current byte offset with its own
    /// `bit_count`-sized flag area, runs `body` against it, finalizes it and
    /// advances this writer past the nested region.
    pub fn with_sub_writer<F>(&mut self, bit_count: usize, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Writer<'_>) -> Result<(), Error>,
    {
        let mut sub = Writer::new(&mut *self.buf, self.offset, bit_count);
        body(&mut sub)?;
        sub.finish()?;
        self.offset = sub.offset;
        Ok(())
    }

    fn flush_word(&mut self) -> Result<(), Error> {
        let word = self.bits.to_be_bytes();
        self.put_flags_slice(&word)?;
        self.bits = 0;
        self.bit_index = 32;
        Ok(())
    }

    fn put_flags_slice(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self.bit_offset + bytes.len();
        if end > self.buf.len() {
            return Err(Error::BufferBounds {
                at: self.bit_offset,
                need: bytes.len(),
                len: self.buf.len(),
            });
        }
        self.buf[self.bit_offset..end].copy_from_slice(bytes);
        self.bit_offset = end;
        Ok(())
    }

    #[inline]
    fn put(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self.offset + bytes.len();
        if end > self.buf.len() {
            return Err(Error::BufferBounds {
                at: self.offset,
                need: bytes.len(),
                len: self.buf.len(),
            });
        }
        self.buf[self.offset..end].copy_from_slice(bytes);
        self.offset = end;
        Ok(())
    }
}

// =============================================================================
// READING
// =============================================================================

/// Reader for one region of a byte buffer.
///
/// Mirrors [`Writer`] but consumes flag bits one byte at a time; no
/// finalization step is needed.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
    bits: u32,
    /// Unread bits remaining in the current flag byte.
    bit_index: u32,
    bit_offset: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader at `base`, skipping `ceil(bit_count / 8)` flag bytes.
    pub fn new(buf: &'a [u8], base: usize, bit_count: usize) -> Reader<'a> {
        Reader {
            offset: base + bit_count.div_ceil(8),
            bits: 0,
            bit_index: 0,
            bit_offset: base,
            buf,
        }
    }

    /// Current byte-cursor position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Reads a single flag bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool, Error> {
        if self.bit_index == 0 {
            self.bits = self.next_flag_byte()? as u32;
            self.bit_index = 8;
        }
        self.bit_index -= 1;
        Ok((self.bits >> self.bit_index) & 1 != 0)
    }

    /// Reads `count` bits, MSB-first, `count <= 32`.
    pub fn read_bits(&mut self, count: u32) -> Result<u32, Error> {
        debug_assert!(count <= 32);
        if count == 0 {
            return Ok(0);
        }
        let mut n = count;
        let mut value: u32 = 0;
        while n > self.bit_index {
            if self.bit_index > 0 {
                value = (value << self.bit_index) | (self.bits & ((1 << self.bit_index) - 1));
                n -= self.bit_index;
            }
            self.bits = self.next_flag_byte()? as u32;
            self.bit_index = 8;
        }
        self.bit_index -= n;
        Ok((value << n) | ((self.bits >> self.bit_index) & ((1 << n) - 1)))
    }

    #[inline]
    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.take(1)?[0] as i8)
    }

    #[inline]
    pub fn read_i16(&mut self) -> Result<i16, Error> {
        // take(2) guarantees exactly 2 bytes, try_into always succeeds
        Ok(i16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    #[inline]
    pub fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(f32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    #[inline]
    pub fn read_f64(&mut self) -> Result<f64, Error> {
        Ok(f64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Reads an unsigned varint.
    pub fn read_var_u32(&mut self) -> Result<u32, Error> {
        let mut byte = self.take(1)?[0];
        let mut result = (byte & 0x7F) as u32;
        let mut len = 1;
        while byte & 0x80 != 0 {
            if len == MAX_VARINT_BYTES {
                return Err(Error::VarintTooLong);
            }
            byte = self.take(1)?[0];
            result = (result << 7) | (byte & 0x7F) as u32;
            len += 1;
        }
        Ok(result)
    }

    /// Reads a signed varint (zig-zag encoded).
    pub fn read_var_i32(&mut self) -> Result<i32, Error> {
        Ok(zigzag_decode(self.read_var_u32()?))
    }

    /// Reads length-prefixed UTF-8 text.
    pub fn read_str(&mut self) -> Result<String, Error> {
        let len = self.read_var_u32()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| Error::InvalidUtf8)
    }

    /// Opens a nested region at the current byte offset with its own
    /// `bit_count`-sized flag area, runs `body` against it and advances this
    /// reader past the nested region.
    pub fn with_sub_reader<T, F>(&mut self, bit_count: usize, body: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Reader<'_>) -> Result<T, Error>,
    {
        let mut sub = Reader::new(self.buf, self.offset, bit_count);
        let result = body(&mut sub)?;
        self.offset = sub.offset;
        Ok(result)
    }

    fn next_flag_byte(&mut self) -> Result<u8, Error> {
        if self.bit_offset >= self.buf.len() {
            return Err(Error::BufferBounds {
                at: self.bit_offset,
                need: 1,
                len: self.buf.len(),
            });
        }
        let byte = self.buf[self.bit_offset];
        self.bit_offset += 1;
        Ok(byte)
    }

    #[inline]
    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self.offset + n;
        if end > self.buf.len() {
            return Err(Error::BufferBounds {
                at: self.offset,
                need: n,
                len: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }
}

// =============================================================================
// ZIGZAG AND LENGTH HELPERS
// =============================================================================

/// Encodes a signed integer using zig-zag encoding:
/// 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, 2 -> 4, ...
#[inline]
pub fn zigzag_encode(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Decodes a zig-zag-encoded unsigned integer back to signed.
#[inline]
pub fn zigzag_decode(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Encoded length of an unsigned varint, in bytes.
#[inline]
pub fn var_u32_len(value: u32) -> usize {
    if value >> 7 == 0 {
        1
    } else if value >> 14 == 0 {
        2
    } else if value >> 21 == 0 {
        3
    } else if value >> 28 == 0 {
        4
    } else {
        5
    }
}

/// Encoded length of a signed (zig-zag) varint, in bytes.
#[inline]
pub fn var_i32_len(value: i32) -> usize {
    var_u32_len(zigzag_encode(value))
}

/// Encoded length of length-prefixed text, in bytes.
#[inline]
pub fn str_size(value: &str) -> usize {
    var_u32_len(value.len() as u32) + value.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Round-trips a write/read pair at offset 0 and at offset 1 within a
    /// dirtied buffer, checking cursor positions on both sides.
    fn cursor_test(
        full_size: usize,
        bit_count: usize,
        write: impl Fn(&mut Writer<'_>) -> Result<(), Error>,
        read: impl Fn(&mut Reader<'_>) -> Result<(), Error>,
    ) {
        for offset in [0usize, 1] {
            let mut buf = vec![0xA5u8; offset + full_size + 1];
            let mut writer = Writer::new(&mut buf, offset, bit_count);
            write(&mut writer).unwrap();
            writer.finish().unwrap();
            assert_eq!(writer.offset(), offset + full_size, "writer offset");

            let mut reader = Reader::new(&buf, offset, bit_count);
            read(&mut reader).unwrap();
            assert_eq!(reader.offset(), offset + full_size, "reader offset");
        }
    }

    #[test]
    fn fixed_width_roundtrip() {
        cursor_test(
            8 + 4 + 2 + 1 + 8 + 4,
            0,
            |w| {
                w.write_i64(-1234567890123456789)?;
                w.write_i32(-1234567890)?;
                w.write_i16(-12345)?;
                w.write_i8(-123)?;
                w.write_f64(123.456)?;
                w.write_f32(123.456)
            },
            |r| {
                assert_eq!(r.read_i64()?, -1234567890123456789);
                assert_eq!(r.read_i32()?, -1234567890);
                assert_eq!(r.read_i16()?, -12345);
                assert_eq!(r.read_i8()?, -123);
                assert_eq!(r.read_f64()?, 123.456);
                assert_eq!(r.read_f32()?, 123.456);
                Ok(())
            },
        );
    }

    #[test]
    fn primitives_are_big_endian() {
        let mut buf = [0u8; 4];
        let mut writer = Writer::new(&mut buf, 0, 0);
        writer.write_i32(1).unwrap();
        writer.finish().unwrap();
        assert_eq!(buf, [0, 0, 0, 1]);
    }

    #[test]
    fn varint_length_thresholds() {
        let cases: &[(u32, usize)] = &[
            (0, 1),
            (127, 1),
            (128, 2),
            (16383, 2),
            (16384, 3),
            (0x1F_FFFF, 3),
            (0x20_0000, 4),
            (0x0FFF_FFFF, 4),
            (0x1000_0000, 5),
            (u32::MAX, 5),
        ];
        for &(value, len) in cases {
            assert_eq!(var_u32_len(value), len, "length of {value}");
            cursor_test(
                len,
                0,
                |w| w.write_var_u32(value),
                |r| {
                    assert_eq!(r.read_var_u32()?, value);
                    Ok(())
                },
            );
        }
    }

    #[test]
    fn signed_varint_length_thresholds() {
        let cases: &[(i32, usize)] = &[
            (0, 1),
            (63, 1),
            (64, 2),
            (-1, 1),
            (-64, 1),
            (-65, 2),
            (8191, 2),
            (8192, 3),
            (-8192, 2),
            (-8193, 3),
            (i32::MAX, 5),
            (i32::MIN, 5),
        ];
        for &(value, len) in cases {
            assert_eq!(var_i32_len(value), len, "length of {value}");
            cursor_test(
                len,
                0,
                |w| w.write_var_i32(value),
                |r| {
                    assert_eq!(r.read_var_i32()?, value);
                    Ok(())
                },
            );
        }
    }

    #[test]
    fn zigzag_values() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(2), 4);
    }

    #[test]
    fn varint_with_trailing_continuation_is_rejected() {
        let data = [0x80u8; 6];
        let mut reader = Reader::new(&data, 0, 0);
        assert_eq!(reader.read_var_u32(), Err(Error::VarintTooLong));
    }

    #[test]
    fn string_roundtrip_and_size() {
        for s in ["", "hello", "xyz яблоко", "emoji: \u{1F600}"] {
            assert_eq!(str_size(s), var_u32_len(s.len() as u32) + s.len());
            cursor_test(
                str_size(s),
                0,
                |w| w.write_str(s),
                |r| {
                    assert_eq!(r.read_str()?, s);
                    Ok(())
                },
            );
        }
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        // length 2, then an invalid sequence
        let data = [0x02, 0xC0, 0x00];
        let mut reader = Reader::new(&data, 0, 0);
        assert_eq!(reader.read_str(), Err(Error::InvalidUtf8));
    }

    #[test]
    fn bit_sequences_roundtrip_across_flush_boundaries() {
        for count in [1usize, 8, 9, 16, 17, 24, 25, 32, 33, 71] {
            let values: Vec<bool> = (0..count).map(|i| i % 3 == 1).collect();
            cursor_test(
                count.div_ceil(8),
                count,
                |w| {
                    for &bit in &values {
                        w.write_bit(bit)?;
                    }
                    Ok(())
                },
                |r| {
                    for (i, &expected) in values.iter().enumerate() {
                        assert_eq!(r.read_bit()?, expected, "bit {i}");
                    }
                    Ok(())
                },
            );
        }
    }

    #[test]
    fn multi_bit_fields_roundtrip() {
        let sequences: &[&[(u32, u32)]] = &[
            &[(0, 0)],
            &[(1, 1)],
            &[(5, 3)],
            &[(26, 5), (11, 4), (1, 1)],
            &[(27, 5), (33554464, 31), (33554465, 32)],
            &[(0, 8), (127, 8), (2, 7)],
            &[(2854503626u32, 32), (879336341, 31), (5, 3), (154557292, 30)],
        ];
        for seq in sequences {
            let total: u32 = seq.iter().map(|&(_, n)| n).sum();
            cursor_test(
                (total as usize).div_ceil(8),
                total as usize,
                |w| {
                    for &(value, n) in *seq {
                        w.write_bits(value, n)?;
                    }
                    Ok(())
                },
                |r| {
                    for (i, &(expected, n)) in seq.iter().enumerate() {
                        assert_eq!(r.read_bits(n)?, expected, "field {i}");
                    }
                    Ok(())
                },
            );
        }
    }

    #[test]
    fn sub_regions_nest_and_advance_the_parent() {
        cursor_test(
            1 + 4 + (1 + 4) + 4,
            1,
            |w| {
                w.write_bit(true)?;
                w.write_i32(16)?;
                w.with_sub_writer(1, |sub| {
                    sub.write_bit(true)?;
                    sub.write_i32(32)
                })?;
                w.write_i32(48)
            },
            |r| {
                assert!(r.read_bit()?);
                assert_eq!(r.read_i32()?, 16);
                r.with_sub_reader(1, |sub| {
                    assert!(sub.read_bit()?);
                    assert_eq!(sub.read_i32()?, 32);
                    Ok(())
                })?;
                assert_eq!(r.read_i32()?, 48);
                Ok(())
            },
        );
    }

    #[test]
    fn out_of_bounds_write_fails() {
        let mut buf = [0u8; 2];
        let mut writer = Writer::new(&mut buf, 0, 0);
        assert!(matches!(
            writer.write_i32(1),
            Err(Error::BufferBounds { .. })
        ));
    }

    proptest! {
        #[test]
        fn varint_law(value: u32) {
            let mut buf = [0u8; MAX_VARINT_BYTES];
            let mut writer = Writer::new(&mut buf, 0, 0);
            writer.write_var_u32(value).unwrap();
            writer.finish().unwrap();
            prop_assert_eq!(writer.offset(), var_u32_len(value));

            let mut reader = Reader::new(&buf, 0, 0);
            prop_assert_eq!(reader.read_var_u32().unwrap(), value);
        }

        #[test]
        fn signed_varint_law(value: i32) {
            prop_assert_eq!(zigzag_decode(zigzag_encode(value)), value);

            let mut buf = [0u8; MAX_VARINT_BYTES];
            let mut writer = Writer::new(&mut buf, 0, 0);
            writer.write_var_i32(value).unwrap();
            writer.finish().unwrap();

            let mut reader = Reader::new(&buf, 0, 0);
            prop_assert_eq!(reader.read_var_i32().unwrap(), value);
        }

        #[test]
        fn write_bits_law(fields in prop::collection::vec((any::<u32>(), 0u32..=32), 0..12)) {
            let total: u32 = fields.iter().map(|&(_, n)| n).sum();
            let mut buf = vec![0u8; (total as usize).div_ceil(8)];
            let mut writer = Writer::new(&mut buf, 0, total as usize);
            for &(value, n) in &fields {
                writer.write_bits(value, n).unwrap();
            }
            writer.finish().unwrap();

            let mut reader = Reader::new(&buf, 0, total as usize);
            for &(value, n) in &fields {
                let expected = if n < 32 { value & ((1 << n) - 1) } else { value };
                prop_assert_eq!(reader.read_bits(n).unwrap(), expected);
            }
        }
    }
}
