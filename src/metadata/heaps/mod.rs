//! Builders for the four metadata heaps.
//!
//! ## Key Components
//!
//! - [`StringsBuilder`] - `#Strings`, deduplicated null-terminated UTF-8 with suffix folding
//! - [`UserStringsBuilder`] - `#US`, length-prefixed UTF-16 literals referenced from IL
//! - [`BlobsBuilder`] - `#Blob`, length-prefixed binary signatures and values
//! - [`GuidsBuilder`] - `#GUID`, raw 16-byte GUIDs referenced by 1-based index
//!
//! ## Architecture
//!
//! Heaps are append-only during population and must be sealed before any byte is laid out;
//! sealing freezes the content so the final heap sizes can drive index-width decisions. The
//! string heap is special: [`StringHandle`] stays a virtual index until sealing runs the
//! suffix-folding pass, only then does it resolve to a real byte offset. Blob and user-string
//! handles are final byte offsets from the moment of interning; GUID handles are final 1-based
//! indices.
//!
//! All heaps except `#GUID` reserve a zero byte at offset 0, so offset 0 doubles as the null
//! reference.

mod blobs;
mod guids;
mod strings;
mod userstrings;

pub use blobs::BlobsBuilder;
pub use guids::GuidsBuilder;
pub use strings::StringsBuilder;
pub use userstrings::UserStringsBuilder;

/// Virtual index into the `#Strings` heap.
///
/// Not a byte offset. Resolves to one through [`StringsBuilder::resolve`] once the heap is
/// sealed and suffix folding has assigned final positions. Index 0 is the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringHandle(pub u32);

impl StringHandle {
    /// The empty string, resolving to byte offset 0.
    pub const EMPTY: StringHandle = StringHandle(0);
}

/// Byte offset into the `#Blob` heap, final at interning time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobHandle(pub u32);

impl BlobHandle {
    /// The empty blob at the heap's reserved offset 0.
    pub const EMPTY: BlobHandle = BlobHandle(0);
}

/// 1-based index into the `#GUID` heap. 0 means no GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuidHandle(pub u32);

impl GuidHandle {
    /// The null GUID reference.
    pub const NONE: GuidHandle = GuidHandle(0);
}
