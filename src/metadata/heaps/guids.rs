//! `#GUID` heap builder.

use std::collections::HashMap;

use uguid::Guid;

use crate::metadata::heaps::GuidHandle;
use crate::{Error, Result};

/// Builds the `#GUID` heap of raw 16-byte GUIDs.
///
/// Unlike the byte heaps this one is indexed, not offset: handles are 1-based slot numbers and
/// there is no reserved leading byte. The module version id is the usual sole occupant.
#[derive(Debug, Default)]
pub struct GuidsBuilder {
    index: HashMap<Guid, GuidHandle>,
    guids: Vec<Guid>,
    sealed: bool,
}

impl GuidsBuilder {
    #[must_use]
    pub fn new() -> Self {
        GuidsBuilder::default()
    }

    /// Interns a GUID and returns its 1-based heap index.
    ///
    /// # Errors
    /// Fails after sealing.
    pub fn intern(&mut self, guid: Guid) -> Result<GuidHandle> {
        if self.sealed {
            return Err(Error::InvariantViolated(
                "GUID interned after the heap was sealed",
            ));
        }
        if let Some(handle) = self.index.get(&guid) {
            return Ok(*handle);
        }
        self.guids.push(guid);
        let handle = GuidHandle(self.guids.len() as u32);
        self.index.insert(guid, handle);
        Ok(handle)
    }

    /// Blocks further interning.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Serialized heap content; always a multiple of 16 bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.guids.len() * 16);
        for guid in &self.guids {
            bytes.extend_from_slice(&guid.to_bytes());
        }
        bytes
    }

    /// Byte size of the heap.
    #[must_use]
    pub fn size(&self) -> u32 {
        (self.guids.len() * 16) as u32
    }

    /// Byte offset of a GUID within the heap, for the deterministic-MVID patch.
    #[must_use]
    pub fn offset_of(&self, handle: GuidHandle) -> Option<u32> {
        if handle.0 == 0 || handle.0 as usize > self.guids.len() {
            None
        } else {
            Some((handle.0 - 1) * 16)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uguid::guid;

    #[test]
    fn test_indices_are_one_based() {
        let mut heap = GuidsBuilder::new();
        let first = heap
            .intern(guid!("12345678-1234-1234-1234-123456789abc"))
            .unwrap();
        assert_eq!(first, GuidHandle(1));
        assert_eq!(heap.size(), 16);
        assert_eq!(heap.offset_of(first), Some(0));
    }

    #[test]
    fn test_deduplication() {
        let mut heap = GuidsBuilder::new();
        let guid = guid!("12345678-1234-1234-1234-123456789abc");
        let first = heap.intern(guid).unwrap();
        let second = heap.intern(guid).unwrap();
        assert_eq!(first, second);
        assert_eq!(heap.size(), 16);
    }

    #[test]
    fn test_null_handle_has_no_offset() {
        let heap = GuidsBuilder::new();
        assert_eq!(heap.offset_of(GuidHandle::NONE), None);
    }
}
