use thiserror::Error;

use crate::metadata::token::Token;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors split into two families. Invariant violations
/// ([`Error::CompressedIntegerOutOfRange`], [`Error::TokenOverflow`],
/// [`Error::InvariantViolated`]) indicate the supplied object model broke a precondition the
/// serializer assumes always holds; no realistic input should trigger them and they abort the
/// emission. Everything else is an ordinary failure surfaced to the caller.
///
/// Recoverable conditions (oversized identifiers, PDB string limits) are *not* errors; they are
/// reported through [`crate::diagnostics::DiagnosticSink`] and emission continues.
#[derive(Error, Debug)]
pub enum Error {
    /// A value could not be encoded as an ECMA-335 compressed unsigned integer.
    ///
    /// Compressed unsigned integers cover `0..=0x1FFF_FFFF`. The object model is expected to
    /// never produce larger values in a compressed position, so this is an invariant violation,
    /// not an input error.
    #[error("value 0x{0:08X} is not representable as a compressed unsigned integer")]
    CompressedIntegerOutOfRange(u32),

    /// A signed value could not be encoded as an ECMA-335 compressed signed integer.
    #[error("value {0} is not representable as a compressed signed integer")]
    CompressedSignedIntegerOutOfRange(i32),

    /// A table grew past the 24-bit row-index space addressable by a metadata token.
    #[error("metadata table row index overflow - {0}")]
    TokenOverflow(Token),

    /// A cross-table reference could not be resolved to an existing row.
    ///
    /// Every coded index must point at a row that exists by the time rows are serialized; a
    /// dangling reference means the reference walk missed a node or the object model handed the
    /// writer an id from a different module.
    #[error("unresolved metadata reference - {0}")]
    UnresolvedReference(String),

    /// An internal sequencing or consistency invariant was violated.
    ///
    /// The write pipeline is a strict phase sequence (indices, rows, widths, bytes); calling a
    /// phase out of order, or inserting into a sealed heap, surfaces here.
    #[error("writer invariant violated - {0}")]
    InvariantViolated(&'static str),

    /// The emission was cancelled cooperatively.
    ///
    /// Raised at a phase boundary when the caller's cancellation token was triggered. Partial
    /// output must be discarded.
    #[error("emission was cancelled")]
    Cancelled,

    /// The debug-info collaborator failed while consuming writer callbacks.
    ///
    /// Wraps whatever the opaque symbol-writer sink reported; the original message is preserved
    /// and the whole emission aborts. There is no partial-PDB recovery path.
    #[error("debug information writing failed: {0}")]
    DebugInfoWriteFailed(String),

    /// The requested emission configuration is not supported.
    ///
    /// For example an executable image without an entry point, or a delta emission without a
    /// previous-generation baseline.
    #[error("{0}")]
    UnsupportedConfiguration(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
