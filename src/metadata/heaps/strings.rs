//! `#Strings` heap builder with suffix folding.

use std::collections::HashMap;

use crate::metadata::heaps::StringHandle;
use crate::{Error, Result};

/// Builds the `#Strings` heap of deduplicated, null-terminated UTF-8 strings.
///
/// Interning hands out virtual indices only. Final byte offsets exist once [`seal`] has run
/// the suffix-folding pass: strings are sorted so that a string which is a suffix of another
/// sorts directly after it, and the suffix is then not written at all, it resolves to an
/// offset inside its superstring (`"Stream"` inside `"MemoryStream"` shares the terminator).
///
/// [`seal`]: StringsBuilder::seal
#[derive(Debug, Default)]
pub struct StringsBuilder {
    index: HashMap<String, StringHandle>,
    /// Interned strings in insertion order; virtual index `n` is `strings[n - 1]`.
    strings: Vec<String>,
    sealed: Option<SealedStrings>,
}

#[derive(Debug)]
struct SealedStrings {
    /// Virtual index to final byte offset. Slot 0 is the empty string.
    offsets: Vec<u32>,
    bytes: Vec<u8>,
}

impl StringsBuilder {
    #[must_use]
    pub fn new() -> Self {
        StringsBuilder::default()
    }

    /// Interns a string and returns its virtual index. Identical strings always return the
    /// same handle.
    ///
    /// # Errors
    /// Fails once the heap is sealed.
    pub fn intern(&mut self, value: &str) -> Result<StringHandle> {
        if self.sealed.is_some() {
            return Err(Error::InvariantViolated(
                "string interned after the heap was sealed",
            ));
        }
        if value.is_empty() {
            return Ok(StringHandle::EMPTY);
        }
        if let Some(handle) = self.index.get(value) {
            return Ok(*handle);
        }
        self.strings.push(value.to_string());
        let handle = StringHandle(self.strings.len() as u32);
        self.index.insert(value.to_string(), handle);
        Ok(handle)
    }

    /// Freezes the heap, runs suffix folding and assigns final byte offsets.
    ///
    /// Idempotent; the fold is computed once.
    pub fn seal(&mut self) {
        if self.sealed.is_some() {
            return;
        }

        let mut order: Vec<usize> = (0..self.strings.len()).collect();
        order.sort_by(|a, b| suffix_order(&self.strings[*a], &self.strings[*b]));

        let mut offsets = vec![0u32; self.strings.len() + 1];
        // Reserved zero byte; doubles as the empty string's representation.
        let mut bytes = vec![0u8];
        let mut prev: Option<(usize, u32)> = None;

        for position in order {
            let current = &self.strings[position];
            let folded = prev.and_then(|(prev_index, prev_offset)| {
                let previous = &self.strings[prev_index];
                previous
                    .ends_with(current.as_str())
                    .then(|| prev_offset + (previous.len() - current.len()) as u32)
            });
            let offset = match folded {
                Some(offset) => offset,
                None => {
                    let offset = bytes.len() as u32;
                    bytes.extend_from_slice(current.as_bytes());
                    bytes.push(0);
                    prev = Some((position, offset));
                    offset
                }
            };
            offsets[position + 1] = offset;
        }

        self.sealed = Some(SealedStrings { offsets, bytes });
    }

    /// Resolves a virtual index to its final byte offset.
    ///
    /// # Errors
    /// Fails if the heap has not been sealed yet.
    pub fn resolve(&self, handle: StringHandle) -> Result<u32> {
        let sealed = self.sealed.as_ref().ok_or(Error::InvariantViolated(
            "string offset requested before the heap was sealed",
        ))?;
        sealed
            .offsets
            .get(handle.0 as usize)
            .copied()
            .ok_or(Error::InvariantViolated("string handle out of range"))
    }

    /// Serialized heap content before 4-byte stream alignment.
    ///
    /// # Errors
    /// Fails if the heap has not been sealed yet.
    pub fn bytes(&self) -> Result<&[u8]> {
        self.sealed
            .as_ref()
            .map(|sealed| sealed.bytes.as_slice())
            .ok_or(Error::InvariantViolated(
                "string heap bytes requested before sealing",
            ))
    }

    /// Unaligned byte size of the sealed heap.
    ///
    /// # Errors
    /// Fails if the heap has not been sealed yet.
    pub fn unaligned_size(&self) -> Result<u32> {
        Ok(self.bytes()?.len() as u32)
    }
}

/// Ordering that places every string directly before its suffixes.
///
/// Compares character-by-character from the end; on a shared tail the longer string sorts
/// first so the fold pass only ever needs to look at its immediate predecessor.
fn suffix_order(a: &str, b: &str) -> std::cmp::Ordering {
    let mut left = a.chars().rev();
    let mut right = b.chars().rev();
    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) => match x.cmp(&y) {
                std::cmp::Ordering::Equal => continue,
                unequal => return unequal,
            },
            (Some(_), None) => return std::cmp::Ordering::Less,
            (None, Some(_)) => return std::cmp::Ordering::Greater,
            (None, None) => return std::cmp::Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_string_resolves_to_zero() {
        let mut heap = StringsBuilder::new();
        let handle = heap.intern("").unwrap();
        heap.seal();
        assert_eq!(handle, StringHandle::EMPTY);
        assert_eq!(heap.resolve(handle).unwrap(), 0);
    }

    #[test]
    fn test_interning_deduplicates() {
        let mut heap = StringsBuilder::new();
        let first = heap.intern("System").unwrap();
        let second = heap.intern("System").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_suffix_is_folded_into_superstring() {
        let mut heap = StringsBuilder::new();
        let long = heap.intern("MemoryStream").unwrap();
        let short = heap.intern("Stream").unwrap();
        heap.seal();
        let long_offset = heap.resolve(long).unwrap();
        let short_offset = heap.resolve(short).unwrap();
        assert_eq!(short_offset, long_offset + 6, "suffix should share storage");
        // Folding must save the suffix's bytes: zero byte + superstring + terminator only.
        assert_eq!(heap.unaligned_size().unwrap(), 1 + 12 + 1);
    }

    #[test]
    fn test_non_suffix_strings_are_written_separately() {
        let mut heap = StringsBuilder::new();
        let a = heap.intern("Alpha").unwrap();
        let b = heap.intern("Beta").unwrap();
        heap.seal();
        assert_ne!(heap.resolve(a).unwrap(), heap.resolve(b).unwrap());
        assert_eq!(heap.unaligned_size().unwrap(), 1 + 6 + 5);
    }

    #[test]
    fn test_intern_after_seal_fails() {
        let mut heap = StringsBuilder::new();
        heap.intern("Sealed").unwrap();
        heap.seal();
        assert!(heap.intern("Late").is_err());
    }

    #[test]
    fn test_heap_bytes_null_terminate_each_entry() {
        let mut heap = StringsBuilder::new();
        let handle = heap.intern("Mvid").unwrap();
        heap.seal();
        let bytes = heap.bytes().unwrap();
        let offset = heap.resolve(handle).unwrap() as usize;
        assert_eq!(&bytes[offset..offset + 4], b"Mvid");
        assert_eq!(bytes[offset + 4], 0);
        assert_eq!(bytes[0], 0, "heap must start with the reserved zero byte");
    }
}
