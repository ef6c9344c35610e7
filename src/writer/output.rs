//! Little-endian byte sink with deferred patching.
//!
//! [`Output`] is the single sink every serialization stage writes through. It is append-only
//! with one escape hatch: `write_*_at` patches a previously reserved position, which is how
//! RVAs, directory sizes and the deterministic-build hash land in headers that were laid out
//! before their values were known.
//!
//! The free `push_compressed_*` functions implement the ECMA-335 compressed integer formats
//! (II.23.2) and are shared with the heap builders, which size blob entries before any
//! [`Output`] exists.

use widestring::U16String;

use crate::{Error, Result};

/// Number of bytes the compressed unsigned encoding of `value` occupies.
///
/// Callers must have range-checked `value` already; out-of-range values report the 4-byte
/// width so size accounting stays consistent until the encode itself fails.
#[must_use]
pub fn compressed_u32_len(value: u32) -> u32 {
    if value < 0x80 {
        1
    } else if value < 0x4000 {
        2
    } else {
        4
    }
}

/// Appends `value` in the ECMA-335 compressed unsigned integer format.
///
/// # Errors
/// Fails for values above `0x1FFF_FFFF`, which the format cannot represent.
pub fn push_compressed_u32(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    if value < 0x80 {
        buffer.push(value as u8);
    } else if value < 0x4000 {
        buffer.push(0x80 | (value >> 8) as u8);
        buffer.push(value as u8);
    } else if value < 0x2000_0000 {
        buffer.push(0xC0 | (value >> 24) as u8);
        buffer.push((value >> 16) as u8);
        buffer.push((value >> 8) as u8);
        buffer.push(value as u8);
    } else {
        return Err(Error::CompressedIntegerOutOfRange(value));
    }
    Ok(())
}

/// Appends `value` in the ECMA-335 compressed signed integer format.
///
/// The two's complement value is truncated to the width's bit count and rotated left by one,
/// moving the sign bit into the least significant position.
///
/// # Errors
/// Fails for values outside `-0x1000_0000..=0x0FFF_FFFF`.
pub fn push_compressed_i32(buffer: &mut Vec<u8>, value: i32) -> Result<()> {
    if (-0x40..0x40).contains(&value) {
        let bits = (value as u32) & 0x7F;
        buffer.push((((bits << 1) & 0x7F) | (bits >> 6)) as u8);
    } else if (-0x2000..0x2000).contains(&value) {
        let bits = (value as u32) & 0x3FFF;
        let rotated = ((bits << 1) & 0x3FFF) | (bits >> 13);
        buffer.push(0x80 | (rotated >> 8) as u8);
        buffer.push(rotated as u8);
    } else if (-0x1000_0000..0x1000_0000).contains(&value) {
        let bits = (value as u32) & 0x1FFF_FFFF;
        let rotated = ((bits << 1) & 0x1FFF_FFFF) | (bits >> 28);
        buffer.push(0xC0 | (rotated >> 24) as u8);
        buffer.push((rotated >> 16) as u8);
        buffer.push((rotated >> 8) as u8);
        buffer.push(rotated as u8);
    } else {
        return Err(Error::CompressedSignedIntegerOutOfRange(value));
    }
    Ok(())
}

/// Growable little-endian output buffer.
#[derive(Debug, Default)]
pub struct Output {
    buffer: Vec<u8>,
}

impl Output {
    #[must_use]
    pub fn new() -> Self {
        Output::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Output {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Current write position, equal to the number of bytes emitted so far.
    #[must_use]
    pub fn position(&self) -> u32 {
        self.buffer.len() as u32
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the sink and returns the finished image bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a string as raw UTF-8 without a terminator.
    pub fn write_utf8(&mut self, value: &str) {
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Writes a string as UTF-16LE code units without a terminator.
    pub fn write_utf16le(&mut self, value: &str) {
        for unit in U16String::from_str(value).as_slice() {
            self.buffer.extend_from_slice(&unit.to_le_bytes());
        }
    }

    /// Appends a compressed unsigned integer.
    ///
    /// # Errors
    /// Fails for values above `0x1FFF_FFFF`.
    pub fn write_compressed_u32(&mut self, value: u32) -> Result<()> {
        push_compressed_u32(&mut self.buffer, value)
    }

    /// Appends a compressed signed integer.
    ///
    /// # Errors
    /// Fails for values outside `-0x1000_0000..=0x0FFF_FFFF`.
    pub fn write_compressed_i32(&mut self, value: i32) -> Result<()> {
        push_compressed_i32(&mut self.buffer, value)
    }

    /// Zero-pads until the position is a multiple of `alignment`.
    pub fn align(&mut self, alignment: u32) {
        let remainder = self.buffer.len() % alignment as usize;
        if remainder != 0 {
            self.buffer
                .resize(self.buffer.len() + alignment as usize - remainder, 0);
        }
    }

    /// Appends `count` zero bytes.
    pub fn pad(&mut self, count: u32) {
        self.buffer.resize(self.buffer.len() + count as usize, 0);
    }

    /// Patches a previously written 16-bit slot.
    ///
    /// # Errors
    /// Fails if the slot lies beyond the current position.
    pub fn write_u16_at(&mut self, offset: u32, value: u16) -> Result<()> {
        self.patch(offset, &value.to_le_bytes())
    }

    /// Patches a previously written 32-bit slot.
    ///
    /// # Errors
    /// Fails if the slot lies beyond the current position.
    pub fn write_u32_at(&mut self, offset: u32, value: u32) -> Result<()> {
        self.patch(offset, &value.to_le_bytes())
    }

    /// Patches previously written bytes.
    ///
    /// # Errors
    /// Fails if the range lies beyond the current position.
    pub fn write_bytes_at(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        self.patch(offset, bytes)
    }

    fn patch(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.buffer.len() {
            return Err(Error::InvariantViolated(
                "patch target lies beyond the written output",
            ));
        }
        self.buffer[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_u32_boundaries() {
        let encode = |value: u32| {
            let mut buffer = Vec::new();
            push_compressed_u32(&mut buffer, value).unwrap();
            buffer
        };
        assert_eq!(encode(0x03), vec![0x03]);
        assert_eq!(encode(0x7F), vec![0x7F]);
        assert_eq!(encode(0x80), vec![0x80, 0x80]);
        assert_eq!(encode(0x3FFF), vec![0xBF, 0xFF]);
        assert_eq!(encode(0x4000), vec![0xC0, 0x00, 0x40, 0x00]);
        assert_eq!(encode(0x1FFF_FFFF), vec![0xDF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_compressed_u32_rejects_out_of_range() {
        let mut buffer = Vec::new();
        assert!(matches!(
            push_compressed_u32(&mut buffer, 0x2000_0000),
            Err(Error::CompressedIntegerOutOfRange(0x2000_0000))
        ));
    }

    #[test]
    fn test_compressed_i32_known_values() {
        // Worked examples from ECMA-335 II.23.2.
        let encode = |value: i32| {
            let mut buffer = Vec::new();
            push_compressed_i32(&mut buffer, value).unwrap();
            buffer
        };
        assert_eq!(encode(3), vec![0x06]);
        assert_eq!(encode(-3), vec![0x7B]);
        assert_eq!(encode(64), vec![0x80, 0x80]);
        assert_eq!(encode(-64), vec![0x01]);
        assert_eq!(encode(8192), vec![0xC0, 0x00, 0x40, 0x00]);
        assert_eq!(encode(-8193), vec![0xDF, 0xFF, 0xBF, 0xFF]);
    }

    #[test]
    fn test_patching_reserved_slot() {
        let mut output = Output::new();
        output.write_u32(0);
        output.write_u8(0xAA);
        output.write_u32_at(0, 0xDEAD_BEEF).unwrap();
        assert_eq!(output.as_slice(), &[0xEF, 0xBE, 0xAD, 0xDE, 0xAA]);
    }

    #[test]
    fn test_patch_beyond_end_fails() {
        let mut output = Output::new();
        output.write_u16(0);
        assert!(output.write_u32_at(0, 1).is_err());
    }

    #[test]
    fn test_align_pads_with_zeros() {
        let mut output = Output::new();
        output.write_u8(1);
        output.align(4);
        assert_eq!(output.position(), 4);
        assert_eq!(output.as_slice(), &[1, 0, 0, 0]);
        output.align(4);
        assert_eq!(output.position(), 4, "aligned position must not move");
    }

    #[test]
    fn test_utf16_write() {
        let mut output = Output::new();
        output.write_utf16le("Hi");
        assert_eq!(output.as_slice(), &[0x48, 0x00, 0x69, 0x00]);
    }
}
