//! Method bodies: IL streams with pseudo-tokens, locals and exception regions.
//!
//! IL arrives with *pseudo-tokens* in its inline operands: 4-byte little-endian values whose
//! high byte is one of the tags below and whose low 24 bits index a module-level side table.
//! The body serializer classifies each opcode's operand, looks the index up and overwrites the
//! slot with the real metadata token. Real tokens never appear in model IL.

use crate::model::members::{FieldRefKind, MethodRefKind, MethodSignature};
use crate::model::types::{CustomModifier, TypeShape};
use crate::model::MethodSpecId;

/// High byte of a pseudo-token indexing [`crate::model::Module::il_references`].
pub const IL_REFERENCE_TAG: u8 = 0x7E;
/// High byte of a pseudo-token indexing [`crate::model::Module::il_strings`].
pub const IL_STRING_TAG: u8 = 0x7F;

/// Builds the pseudo-token for entry `index` of the module's IL reference table.
#[must_use]
pub fn reference_pseudo_token(index: u32) -> u32 {
    (u32::from(IL_REFERENCE_TAG) << 24) | (index & 0x00FF_FFFF)
}

/// Builds the pseudo-token for entry `index` of the module's IL string table.
#[must_use]
pub fn string_pseudo_token(index: u32) -> u32 {
    (u32::from(IL_STRING_TAG) << 24) | (index & 0x00FF_FFFF)
}

/// An entity referenced from IL through a pseudo-token.
#[derive(Debug, Clone)]
pub enum IlReference {
    /// `ldtoken`/`box`/`castclass`/... type operand.
    Type(TypeShape),
    /// `ldfld`/`stfld`/`ldtoken` field operand.
    Field(FieldRefKind),
    /// `call`/`callvirt`/`ldftn`/`newobj` method operand.
    Method(MethodRefKind),
    /// Call to a generic method instantiation.
    MethodSpec(MethodSpecId),
    /// `calli` signature operand, indexing [`crate::model::Module::il_signatures`].
    Signature(u32),
}

/// A standalone method signature referenced by a `calli` site.
#[derive(Debug, Clone, PartialEq)]
pub struct StandaloneSignature {
    /// The call-site signature.
    pub signature: MethodSignature,
}

/// One local variable slot.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSlot {
    /// Custom modifiers, outermost first.
    pub modifiers: Vec<CustomModifier>,
    /// Whether the slot is a managed reference (`&`).
    pub by_ref: bool,
    /// Whether the slot pins its referent.
    pub is_pinned: bool,
    /// Declared type of the slot.
    pub local_type: TypeShape,
}

impl LocalSlot {
    /// An unmodified by-value slot of the given type.
    #[must_use]
    pub fn plain(local_type: TypeShape) -> Self {
        LocalSlot {
            modifiers: Vec::new(),
            by_ref: false,
            is_pinned: false,
            local_type,
        }
    }
}

/// Handler flavor of an exception region.
#[derive(Debug, Clone)]
pub enum ExceptionRegionKind {
    /// Typed catch clause.
    Catch(TypeShape),
    /// Filter clause.
    Filter {
        /// IL offset the filter block starts at.
        filter_offset: u32,
    },
    /// `finally` clause.
    Finally,
    /// `fault` clause, running only on exceptional exit.
    Fault,
}

impl ExceptionRegionKind {
    /// The flag value serialized into the EH clause.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            ExceptionRegionKind::Catch(_) => 0x0000,
            ExceptionRegionKind::Filter { .. } => 0x0001,
            ExceptionRegionKind::Finally => 0x0002,
            ExceptionRegionKind::Fault => 0x0004,
        }
    }
}

/// One protected region of a method body.
#[derive(Debug, Clone)]
pub struct ExceptionRegion {
    /// Handler flavor.
    pub kind: ExceptionRegionKind,
    /// IL offset the protected block starts at.
    pub try_offset: u32,
    /// Length of the protected block in bytes.
    pub try_length: u32,
    /// IL offset the handler starts at.
    pub handler_offset: u32,
    /// Length of the handler in bytes.
    pub handler_length: u32,
}

/// A method body as handed to the writer.
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    /// IL with pseudo-tokens in inline operands.
    pub il: Vec<u8>,
    /// Declared operand stack depth.
    pub max_stack: u16,
    /// Whether locals are zero-initialized (`localsinit`).
    pub init_locals: bool,
    /// Local variable slots.
    pub locals: Vec<LocalSlot>,
    /// Protected regions, innermost first.
    pub exception_regions: Vec<ExceptionRegion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pseudo_token_tags() {
        assert_eq!(reference_pseudo_token(0x12), 0x7E00_0012);
        assert_eq!(string_pseudo_token(3), 0x7F00_0003);
    }

    #[test]
    fn test_region_kind_codes() {
        assert_eq!(ExceptionRegionKind::Finally.code(), 2);
        assert_eq!(ExceptionRegionKind::Fault.code(), 4);
        assert_eq!(
            ExceptionRegionKind::Filter { filter_offset: 0 }.code(),
            1
        );
    }
}
