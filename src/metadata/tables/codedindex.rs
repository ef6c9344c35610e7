use strum::{EnumCount, EnumIter};

use crate::{metadata::tables::TableId, Error, Result};

/// Represents all possible coded index types
///
/// A coded index packs a small table tag into the low bits of a row reference so that one
/// column can point into any of several tables. The tag width is the minimum number of bits
/// needed to discriminate the member tables; the serialized column is 2 bytes unless any
/// member table's row count pushes the packed value past 16 bits.
///
/// ## Reference
/// * '<https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf>' - II.24.2.6
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
pub enum CodedIndexKind {
    /// `TypeDef`, `TypeRef`, `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param`, `Property`
    HasConstant,
    /// `MethodDef`, `Field`, `TypeRef`, `TypeDef`, `Param`, `InterfaceImpl`, `MemberRef`, `Module`,
    /// `DeclSecurity`, `Property`, `Event`, `StandAloneSig`, `ModuleRef`, `TypeSpec`, `Assembly`,
    /// `AssemblyRef`, `File`, `ExportedType`, `ManifestResource`, `GenericParam`,
    /// `GenericParamConstraint`, `MethodSpec`
    HasCustomAttribute,
    /// `Field`, `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef`, `Assembly`
    HasDeclSecurity,
    /// `TypeDef`, `TypeRef`, `ModuleRef`, `MethodDef`, `TypeSpec`
    MemberRefParent,
    /// `Event`, `Property`
    HasSemantics,
    /// `MethodDef`, `MemberRef`
    MethodDefOrRef,
    /// `Field`, `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef`, `ExportedType`
    Implementation,
    /// `MethodDef` (tag 2), `MemberRef` (tag 3); tags 0, 1 and 4 are not used
    CustomAttributeType,
    /// `Module`, `ModuleRef`, `AssemblyRef`, `TypeRef`
    ResolutionScope,
    /// `TypeDef`, `MethodDef`
    TypeOrMethodDef,
}

impl CodedIndexKind {
    /// Lookup table for coded combinations of the various types and their table IDs.
    ///
    /// The slice position of a table is its tag value; `CustomAttributeType` pads its unused
    /// low tags with `Module`, which can never legitimately appear there.
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexKind::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexKind::HasConstant => &[TableId::Field, TableId::Param, TableId::Property],
            CodedIndexKind::HasCustomAttribute => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity,
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
            ],
            CodedIndexKind::HasFieldMarshal => &[TableId::Field, TableId::Param],
            CodedIndexKind::HasDeclSecurity => {
                &[TableId::TypeDef, TableId::MethodDef, TableId::Assembly]
            }
            CodedIndexKind::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexKind::HasSemantics => &[TableId::Event, TableId::Property],
            CodedIndexKind::MethodDefOrRef => &[TableId::MethodDef, TableId::MemberRef],
            CodedIndexKind::MemberForwarded => &[TableId::Field, TableId::MethodDef],
            CodedIndexKind::Implementation => {
                &[TableId::File, TableId::AssemblyRef, TableId::ExportedType]
            }
            CodedIndexKind::CustomAttributeType => &[
                TableId::Module,
                TableId::Module,
                TableId::MethodDef,
                TableId::MemberRef,
            ],
            CodedIndexKind::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
            CodedIndexKind::TypeOrMethodDef => &[TableId::TypeDef, TableId::MethodDef],
        }
    }

    /// Number of low bits consumed by the table tag.
    #[must_use]
    pub fn tag_bits(&self) -> u32 {
        match self {
            CodedIndexKind::HasFieldMarshal
            | CodedIndexKind::HasSemantics
            | CodedIndexKind::MethodDefOrRef
            | CodedIndexKind::MemberForwarded
            | CodedIndexKind::TypeOrMethodDef => 1,
            CodedIndexKind::TypeDefOrRef
            | CodedIndexKind::HasConstant
            | CodedIndexKind::HasDeclSecurity
            | CodedIndexKind::Implementation
            | CodedIndexKind::ResolutionScope => 2,
            CodedIndexKind::MemberRefParent | CodedIndexKind::CustomAttributeType => 3,
            CodedIndexKind::HasCustomAttribute => 5,
        }
    }

    /// Returns the tag value for a member table of this coded index space.
    ///
    /// # Errors
    /// Returns an error if `table` is not a member of this tag space.
    pub fn tag_for(&self, table: TableId) -> Result<u32> {
        match self {
            // Tags 0 and 1 are unused padding in CustomAttributeType.
            CodedIndexKind::CustomAttributeType => match table {
                TableId::MethodDef => Ok(2),
                TableId::MemberRef => Ok(3),
                _ => Err(Error::UnresolvedReference(format!(
                    "table {table:?} is not valid for a CustomAttributeType coded index"
                ))),
            },
            _ => self
                .tables()
                .iter()
                .position(|candidate| *candidate == table)
                .map(|position| position as u32)
                .ok_or_else(|| {
                    Error::UnresolvedReference(format!(
                        "table {table:?} is not valid for a {self:?} coded index"
                    ))
                }),
        }
    }

    /// Packs a table tag and 1-based row number into the coded integer value.
    ///
    /// # Errors
    /// Returns an error if `table` is not a member of this tag space.
    pub fn encode(&self, table: TableId, row: u32) -> Result<u32> {
        Ok((row << self.tag_bits()) | self.tag_for(table)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_tag_bits_cover_member_count() {
        for kind in CodedIndexKind::iter() {
            let members = kind.tables().len() as u32;
            assert!(
                members <= 1 << kind.tag_bits(),
                "{kind:?} has {members} members but only {} tag bits",
                kind.tag_bits()
            );
        }
    }

    #[test]
    fn test_type_def_or_ref_encoding() {
        assert_eq!(
            CodedIndexKind::TypeDefOrRef
                .encode(TableId::TypeDef, 5)
                .unwrap(),
            5 << 2
        );
        assert_eq!(
            CodedIndexKind::TypeDefOrRef
                .encode(TableId::TypeRef, 5)
                .unwrap(),
            (5 << 2) | 1
        );
        assert_eq!(
            CodedIndexKind::TypeDefOrRef
                .encode(TableId::TypeSpec, 5)
                .unwrap(),
            (5 << 2) | 2
        );
    }

    #[test]
    fn test_custom_attribute_type_tags() {
        assert_eq!(
            CodedIndexKind::CustomAttributeType
                .encode(TableId::MethodDef, 1)
                .unwrap(),
            (1 << 3) | 2
        );
        assert_eq!(
            CodedIndexKind::CustomAttributeType
                .encode(TableId::MemberRef, 1)
                .unwrap(),
            (1 << 3) | 3
        );
        assert!(CodedIndexKind::CustomAttributeType
            .encode(TableId::Module, 1)
            .is_err());
    }

    #[test]
    fn test_has_custom_attribute_generic_param_tag() {
        assert_eq!(
            CodedIndexKind::HasCustomAttribute
                .tag_for(TableId::GenericParam)
                .unwrap(),
            19
        );
        assert_eq!(
            CodedIndexKind::HasCustomAttribute
                .tag_for(TableId::Module)
                .unwrap(),
            7
        );
    }
}
