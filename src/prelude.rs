//! # cilemit Prelude
//!
//! Convenient re-exports of the types most callers touch when building a module and emitting
//! it. Import this module to get the essentials without spelling out each path.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilemit operations
pub use crate::Error;

/// The result type used throughout cilemit
pub use crate::Result;

// ================================================================================================
// Emission Entry Points
// ================================================================================================

/// One emission session over a module
pub use crate::writer::MetadataWriter;

/// Image and metadata-root configuration
pub use crate::writer::EmitOptions;

/// Cooperative cancellation of a running emission
pub use crate::writer::CancellationToken;

/// Callback surface for symbol writers
pub use crate::writer::DebugSink;

/// PE-level configuration
pub use crate::writer::pe::{ImageKind, Machine, PdbInfo, PeOptions, Subsystem};

// ================================================================================================
// Module Model
// ================================================================================================

/// The module description the writer consumes
pub use crate::model::Module;

/// Arena handles into the module
pub use crate::model::{
    AssemblyRefId, FieldId, FileId, MemberRefId, MethodId, MethodSpecId, ModuleRefId, TypeDefId,
    TypeRefId,
};

/// Type and member definitions
pub use crate::model::members::{
    AssemblyInfo, AssemblyRef, AssemblyVersion, Event, Field, Method, MethodSignature, Property,
    SignatureParam, TypeDef, TypeRef,
};

/// Type shapes used in signatures
pub use crate::model::types::{PrimitiveKind, TypeShape};

/// Method bodies and IL references
pub use crate::model::body::{ExceptionRegion, ExceptionRegionKind, IlReference, MethodBody};

// ================================================================================================
// Diagnostics
// ================================================================================================

/// Receiver for recoverable emission diagnostics
pub use crate::diagnostics::DiagnosticSink;

/// Vec-backed default diagnostic sink
pub use crate::diagnostics::CollectingSink;

/// A single recoverable diagnostic
pub use crate::diagnostics::EmitDiagnostic;

// ================================================================================================
// Metadata Primitives
// ================================================================================================

/// Metadata token referencing a table row or user string
pub use crate::metadata::token::Token;

/// Metadata table identifiers
pub use crate::metadata::tables::TableId;
