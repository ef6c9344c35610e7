//! Metadata table identities, row value types and coded indices.
//!
//! This module carries the format-level vocabulary of the `#~` table stream: [`TableId`] with
//! the numeric ids and canonical serialization order mandated by ECMA-335, the
//! [`CodedIndexKind`](codedindex::CodedIndexKind) tag spaces used to pack multi-table
//! references into single columns, and the row value structs appended by the populators.
//!
//! ## Reference
//! * [ECMA-335 Partition II, Section 22](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Metadata Tables

mod codedindex;
mod rows;

pub use codedindex::CodedIndexKind;
pub use rows::*;

use strum::{EnumCount, EnumIter};

/// Identifiers for the different metadata tables defined in the ECMA-335 specification.
///
/// Each variant represents a specific type of metadata table that can be present in a .NET
/// assembly. The numeric values correspond to the table IDs as defined in the CLI
/// specification, which is also the canonical order in which table rows are serialized into
/// the `#~` stream and in which per-table row counts appear after the valid-tables bitmask.
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TableId {
    /// `Module` table (0x00) - Information about the current module.
    Module = 0x00,
    /// `TypeRef` table (0x01) - References to types defined in external scopes.
    TypeRef = 0x01,
    /// `TypeDef` table (0x02) - Definitions of types within this module.
    TypeDef = 0x02,
    /// `FieldPtr` table (0x03) - Indirection for uncompressed metadata; never emitted here.
    FieldPtr = 0x03,
    /// `Field` table (0x04) - Field definitions within types.
    Field = 0x04,
    /// `MethodPtr` table (0x05) - Indirection for uncompressed metadata; never emitted here.
    MethodPtr = 0x05,
    /// `MethodDef` table (0x06) - Method definitions within types.
    MethodDef = 0x06,
    /// `ParamPtr` table (0x07) - Indirection for uncompressed metadata; never emitted here.
    ParamPtr = 0x07,
    /// `Param` table (0x08) - Parameter definitions for methods.
    Param = 0x08,
    /// `InterfaceImpl` table (0x09) - Interface implementations by types.
    InterfaceImpl = 0x09,
    /// `MemberRef` table (0x0A) - References to members of external types.
    MemberRef = 0x0A,
    /// `Constant` table (0x0B) - Compile-time constant values for fields, params, properties.
    Constant = 0x0B,
    /// `CustomAttribute` table (0x0C) - Custom attribute applications.
    CustomAttribute = 0x0C,
    /// `FieldMarshal` table (0x0D) - Marshalling descriptors for fields and parameters.
    FieldMarshal = 0x0D,
    /// `DeclSecurity` table (0x0E) - Declarative security permission sets.
    DeclSecurity = 0x0E,
    /// `ClassLayout` table (0x0F) - Explicit layout information for types.
    ClassLayout = 0x0F,
    /// `FieldLayout` table (0x10) - Explicit field offsets.
    FieldLayout = 0x10,
    /// `StandAloneSig` table (0x11) - Standalone signatures (locals, calli sites).
    StandAloneSig = 0x11,
    /// `EventMap` table (0x12) - Type-to-event list mapping.
    EventMap = 0x12,
    /// `EventPtr` table (0x13) - Indirection for uncompressed metadata; never emitted here.
    EventPtr = 0x13,
    /// `Event` table (0x14) - Event definitions.
    Event = 0x14,
    /// `PropertyMap` table (0x15) - Type-to-property list mapping.
    PropertyMap = 0x15,
    /// `PropertyPtr` table (0x16) - Indirection for uncompressed metadata; never emitted here.
    PropertyPtr = 0x16,
    /// `Property` table (0x17) - Property definitions.
    Property = 0x17,
    /// `MethodSemantics` table (0x18) - Property/event accessor associations.
    MethodSemantics = 0x18,
    /// `MethodImpl` table (0x19) - Explicit method implementation overrides.
    MethodImpl = 0x19,
    /// `ModuleRef` table (0x1A) - References to external modules.
    ModuleRef = 0x1A,
    /// `TypeSpec` table (0x1B) - Signature-described type specifications.
    TypeSpec = 0x1B,
    /// `ImplMap` table (0x1C) - P/Invoke implementation mappings.
    ImplMap = 0x1C,
    /// `FieldRVA` table (0x1D) - Mapped initial data for fields.
    FieldRva = 0x1D,
    /// `EncLog` table (0x1E) - Edit-and-continue log entries (delta metadata only).
    EncLog = 0x1E,
    /// `EncMap` table (0x1F) - Edit-and-continue token map (delta metadata only).
    EncMap = 0x1F,
    /// `Assembly` table (0x20) - The manifest of the assembly being emitted.
    Assembly = 0x20,
    /// `AssemblyProcessor` table (0x21) - Legacy, never emitted.
    AssemblyProcessor = 0x21,
    /// `AssemblyOS` table (0x22) - Legacy, never emitted.
    AssemblyOs = 0x22,
    /// `AssemblyRef` table (0x23) - References to external assemblies.
    AssemblyRef = 0x23,
    /// `AssemblyRefProcessor` table (0x24) - Legacy, never emitted.
    AssemblyRefProcessor = 0x24,
    /// `AssemblyRefOS` table (0x25) - Legacy, never emitted.
    AssemblyRefOs = 0x25,
    /// `File` table (0x26) - Files that are part of this assembly.
    File = 0x26,
    /// `ExportedType` table (0x27) - Types exported from other modules of this assembly.
    ExportedType = 0x27,
    /// `ManifestResource` table (0x28) - Embedded or linked resources.
    ManifestResource = 0x28,
    /// `NestedClass` table (0x29) - Nested type relationships.
    NestedClass = 0x29,
    /// `GenericParam` table (0x2A) - Generic parameter declarations.
    GenericParam = 0x2A,
    /// `GenericParamConstraint` table (0x2C) - Constraints on generic parameters.
    GenericParamConstraint = 0x2C,
    /// `MethodSpec` table (0x2B) - Generic method instantiations.
    MethodSpec = 0x2B,
}

/// Number of table-id slots addressable by the valid/sorted bitmasks.
pub const TABLE_COUNT: usize = 0x2D;

/// The canonical order in which table row blocks appear in the `#~` stream.
///
/// This is numeric table-id order over the tables this writer can emit; the pointer and legacy
/// OS/processor tables never carry rows.
pub const TABLE_SERIALIZATION_ORDER: &[TableId] = &[
    TableId::Module,
    TableId::TypeRef,
    TableId::TypeDef,
    TableId::Field,
    TableId::MethodDef,
    TableId::Param,
    TableId::InterfaceImpl,
    TableId::MemberRef,
    TableId::Constant,
    TableId::CustomAttribute,
    TableId::FieldMarshal,
    TableId::DeclSecurity,
    TableId::ClassLayout,
    TableId::FieldLayout,
    TableId::StandAloneSig,
    TableId::EventMap,
    TableId::Event,
    TableId::PropertyMap,
    TableId::Property,
    TableId::MethodSemantics,
    TableId::MethodImpl,
    TableId::ModuleRef,
    TableId::TypeSpec,
    TableId::ImplMap,
    TableId::FieldRva,
    TableId::EncLog,
    TableId::EncMap,
    TableId::Assembly,
    TableId::AssemblyRef,
    TableId::File,
    TableId::ExportedType,
    TableId::ManifestResource,
    TableId::NestedClass,
    TableId::GenericParam,
    TableId::MethodSpec,
    TableId::GenericParamConstraint,
];

/// The "sorted tables" bitmask written into the `#~` stream header.
///
/// A fixed constant replicated from the reference writer rather than recomputed from the
/// actually-sorted set; downstream tooling depends on this exact legacy value.
pub const SORTED_TABLES_MASK: u64 = 0x0000_1600_3301_FA00;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_order_is_numeric_id_order() {
        let mut prev = None;
        for table in TABLE_SERIALIZATION_ORDER {
            let id = *table as u8;
            if let Some(p) = prev {
                assert!(id > p, "table 0x{id:02X} out of order");
            }
            prev = Some(id);
        }
    }

    #[test]
    fn test_sorted_mask_covers_expected_tables() {
        // Spot checks against the known-sorted table set of the reference layout.
        for sorted in [
            TableId::InterfaceImpl,
            TableId::Constant,
            TableId::CustomAttribute,
            TableId::FieldMarshal,
            TableId::DeclSecurity,
            TableId::ClassLayout,
            TableId::FieldLayout,
            TableId::MethodSemantics,
            TableId::MethodImpl,
            TableId::ImplMap,
            TableId::FieldRva,
            TableId::NestedClass,
            TableId::GenericParam,
            TableId::GenericParamConstraint,
        ] {
            assert!(
                SORTED_TABLES_MASK & (1u64 << (sorted as u8)) != 0,
                "{sorted:?} should be in the sorted mask"
            );
        }
        for unsorted in [TableId::Module, TableId::TypeDef, TableId::MethodDef] {
            assert!(
                SORTED_TABLES_MASK & (1u64 << (unsorted as u8)) == 0,
                "{unsorted:?} should not be in the sorted mask"
            );
        }
    }
}
