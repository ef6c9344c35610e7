//! `#Blob` heap builder.

use std::collections::HashMap;

use crate::metadata::heaps::BlobHandle;
use crate::writer::output::push_compressed_u32;
use crate::{Error, Result};

/// Builds the `#Blob` heap of deduplicated, length-prefixed byte sequences.
///
/// Signatures, constant values, public keys and custom attribute payloads all land here. Each
/// entry is a compressed byte count followed by the raw data; offsets are final at interning
/// time. The empty blob is the heap's reserved zero byte at offset 0.
#[derive(Debug)]
pub struct BlobsBuilder {
    index: HashMap<Vec<u8>, BlobHandle>,
    bytes: Vec<u8>,
    sealed: bool,
}

impl Default for BlobsBuilder {
    fn default() -> Self {
        BlobsBuilder {
            index: HashMap::new(),
            bytes: vec![0],
            sealed: false,
        }
    }
}

impl BlobsBuilder {
    #[must_use]
    pub fn new() -> Self {
        BlobsBuilder::default()
    }

    /// Interns a byte sequence and returns its heap offset. Identical sequences share one
    /// entry; the empty sequence maps to offset 0 without storing anything.
    ///
    /// # Errors
    /// Fails after sealing, and for blobs too large for a compressed length prefix.
    pub fn intern(&mut self, data: &[u8]) -> Result<BlobHandle> {
        if self.sealed {
            return Err(Error::InvariantViolated(
                "blob interned after the heap was sealed",
            ));
        }
        if data.is_empty() {
            return Ok(BlobHandle::EMPTY);
        }
        if let Some(handle) = self.index.get(data) {
            return Ok(*handle);
        }

        let handle = BlobHandle(self.bytes.len() as u32);
        push_compressed_u32(&mut self.bytes, data.len() as u32)?;
        self.bytes.extend_from_slice(data);
        self.index.insert(data.to_vec(), handle);
        Ok(handle)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_blob_is_offset_zero() {
        let mut heap = BlobsBuilder::new();
        assert_eq!(heap.intern(&[]).unwrap(), BlobHandle::EMPTY);
        assert_eq!(heap.unaligned_size(), 1);
    }

    #[test]
    fn test_entry_layout_and_dedup() {
        let mut heap = BlobsBuilder::new();
        let first = heap.intern(&[0x06, 0x0E]).unwrap();
        let second = heap.intern(&[0x06, 0x0E]).unwrap();
        assert_eq!(first, BlobHandle(1));
        assert_eq!(first, second);
        assert_eq!(heap.bytes(), &[0x00, 0x02, 0x06, 0x0E]);
    }

    #[test]
    fn test_distinct_blobs_get_distinct_offsets() {
        let mut heap = BlobsBuilder::new();
        let a = heap.intern(&[1]).unwrap();
        let b = heap.intern(&[2]).unwrap();
        assert_ne!(a, b);
        assert_eq!(b.0, 3, "second entry starts after the first's prefix+data");
    }

    #[test]
    fn test_intern_after_seal_fails() {
        let mut heap = BlobsBuilder::new();
        heap.seal();
        assert!(heap.intern(&[1]).is_err());
    }
}
