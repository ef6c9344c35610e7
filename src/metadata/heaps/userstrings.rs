//! `#US` heap builder for string literals referenced from IL.

use std::collections::HashMap;

use widestring::U16String;

use crate::writer::output::push_compressed_u32;
use crate::{Error, Result};

/// Builds the `#US` heap.
///
/// Each entry is a compressed byte count covering the UTF-16LE code units plus one trailing
/// marker byte. The marker is 1 when any code unit would need more than simple-ASCII handling,
/// a hint some runtimes use to skip normalization. Offsets are final at interning time and
/// feed directly into `0x70`-tagged IL tokens.
#[derive(Debug)]
pub struct UserStringsBuilder {
    index: HashMap<String, u32>,
    bytes: Vec<u8>,
    sealed: bool,
}

impl Default for UserStringsBuilder {
    fn default() -> Self {
        UserStringsBuilder {
            index: HashMap::new(),
            // Reserved zero byte at offset 0.
            bytes: vec![0],
            sealed: false,
        }
    }
}

impl UserStringsBuilder {
    #[must_use]
    pub fn new() -> Self {
        UserStringsBuilder::default()
    }

    /// Interns a literal and returns its heap offset. Identical literals share one entry.
    ///
    /// # Errors
    /// Fails after sealing, and when the offset would no longer fit the 24-bit token space.
    pub fn intern(&mut self, value: &str) -> Result<u32> {
        if self.sealed {
            return Err(Error::InvariantViolated(
                "user string interned after the heap was sealed",
            ));
        }
        if let Some(offset) = self.index.get(value) {
            return Ok(*offset);
        }

        let offset = self.bytes.len() as u32;
        if offset > 0x00FF_FFFF {
            return Err(Error::Error(format!(
                "user string heap offset 0x{offset:X} exceeds the 24-bit token space"
            )));
        }

        let units = U16String::from_str(value);
        push_compressed_u32(&mut self.bytes, (units.len() * 2 + 1) as u32)?;
        let mut marker = 0u8;
        for unit in units.as_slice() {
            self.bytes.extend_from_slice(&unit.to_le_bytes());
            if needs_marker(*unit) {
                marker = 1;
            }
        }
        self.bytes.push(marker);

        self.index.insert(value.to_string(), offset);
        Ok(offset)
    }

    /// Blocks further interning; offsets were already final.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Serialized heap content before 4-byte stream alignment.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Unaligned byte size of the heap.
    #[must_use]
    pub fn unaligned_size(&self) -> u32 {
        self.bytes.len() as u32
    }
}

/// Whether a UTF-16 code unit forces the entry's trailing marker byte to 1.
///
/// Anything at or past DEL, plus the low control characters, the apostrophe and the hyphen.
fn needs_marker(unit: u16) -> bool {
    unit >= 0x7F || matches!(unit, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ascii_entry_layout() {
        let mut heap = UserStringsBuilder::new();
        let offset = heap.intern("Hi").unwrap();
        assert_eq!(offset, 1);
        // Zero byte, compressed length 5, "Hi" in UTF-16LE, marker 0.
        assert_eq!(
            heap.bytes(),
            &[0x00, 0x05, 0x48, 0x00, 0x69, 0x00, 0x00]
        );
    }

    #[test]
    fn test_hyphen_sets_marker() {
        let mut heap = UserStringsBuilder::new();
        heap.intern("-").unwrap();
        assert_eq!(heap.bytes().last(), Some(&1));
    }

    #[test]
    fn test_non_ascii_sets_marker() {
        let mut heap = UserStringsBuilder::new();
        heap.intern("\u{00E9}").unwrap();
        assert_eq!(heap.bytes().last(), Some(&1));
    }

    #[test]
    fn test_deduplication() {
        let mut heap = UserStringsBuilder::new();
        let first = heap.intern("shared").unwrap();
        let second = heap.intern("shared").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_string_gets_real_entry() {
        let mut heap = UserStringsBuilder::new();
        let offset = heap.intern("").unwrap();
        // The empty literal is a length prefix of 1 and a marker, not the reserved byte.
        assert_eq!(offset, 1);
        assert_eq!(heap.bytes(), &[0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_intern_after_seal_fails() {
        let mut heap = UserStringsBuilder::new();
        heap.seal();
        assert!(heap.intern("late").is_err());
    }
}
