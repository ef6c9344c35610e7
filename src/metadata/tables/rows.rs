//! In-memory row values for the metadata tables.
//!
//! Rows are plain value structs appended by the table populators and serialized by the stream
//! writer once all row counts are final. Heap columns carry handles
//! ([`StringHandle`](crate::metadata::heaps::StringHandle) stays virtual until the string heap
//! is sealed); cross-table columns carry either a 1-based row index or an already-packed coded
//! index value, both widened to `u32`. Tables that are sorted after population keep the
//! original append position alongside the row so later fixups can map back.

use crate::metadata::heaps::{BlobHandle, GuidHandle, StringHandle};
use crate::metadata::tables::TableId;

/// Row of the `Module` table (0x00).
#[derive(Debug, Clone, Copy)]
pub struct ModuleRow {
    pub generation: u16,
    pub name: StringHandle,
    pub module_version_id: GuidHandle,
    pub enc_id: GuidHandle,
    pub enc_base_id: GuidHandle,
}

/// Row of the `TypeRef` table (0x01).
#[derive(Debug, Clone, Copy)]
pub struct TypeRefRow {
    /// `ResolutionScope` coded index.
    pub resolution_scope: u32,
    pub name: StringHandle,
    pub namespace: StringHandle,
}

/// Row of the `TypeDef` table (0x02).
#[derive(Debug, Clone, Copy)]
pub struct TypeDefRow {
    pub flags: u32,
    pub name: StringHandle,
    pub namespace: StringHandle,
    /// `TypeDefOrRef` coded index, 0 when the type has no base.
    pub extends: u32,
    /// 1-based start of this type's run in the `Field` table.
    pub field_list: u32,
    /// 1-based start of this type's run in the `MethodDef` table.
    pub method_list: u32,
}

/// Row of the `Field` table (0x04).
#[derive(Debug, Clone, Copy)]
pub struct FieldRow {
    pub flags: u16,
    pub name: StringHandle,
    pub signature: BlobHandle,
}

/// Row of the `MethodDef` table (0x06).
#[derive(Debug, Clone, Copy)]
pub struct MethodDefRow {
    /// Relative virtual address of the body, 0 for abstract/extern methods.
    pub rva: u32,
    pub impl_flags: u16,
    pub flags: u16,
    pub name: StringHandle,
    pub signature: BlobHandle,
    /// 1-based start of this method's run in the `Param` table.
    pub param_list: u32,
}

/// Row of the `Param` table (0x08).
#[derive(Debug, Clone, Copy)]
pub struct ParamRow {
    pub flags: u16,
    /// 0 for the return parameter, 1-based for real parameters.
    pub sequence: u16,
    pub name: StringHandle,
}

/// Row of the `InterfaceImpl` table (0x09).
#[derive(Debug, Clone, Copy)]
pub struct InterfaceImplRow {
    /// 1-based `TypeDef` row of the implementing type.
    pub class: u32,
    /// `TypeDefOrRef` coded index of the implemented interface.
    pub interface: u32,
}

/// Row of the `MemberRef` table (0x0A).
#[derive(Debug, Clone, Copy)]
pub struct MemberRefRow {
    /// `MemberRefParent` coded index.
    pub class: u32,
    pub name: StringHandle,
    pub signature: BlobHandle,
}

/// Row of the `Constant` table (0x0B). Sorted by `parent` after population.
#[derive(Debug, Clone, Copy)]
pub struct ConstantRow {
    /// `ELEMENT_TYPE_*` code of the constant value.
    pub type_code: u8,
    /// `HasConstant` coded index.
    pub parent: u32,
    pub value: BlobHandle,
}

/// Row of the `CustomAttribute` table (0x0C). Sorted by `parent` after population, with the
/// original append position as the tie-breaker so repeated attributes on one parent keep
/// their source order.
#[derive(Debug, Clone, Copy)]
pub struct CustomAttributeRow {
    /// `HasCustomAttribute` coded index.
    pub parent: u32,
    /// `CustomAttributeType` coded index of the attribute constructor.
    pub constructor: u32,
    pub value: BlobHandle,
    pub original_position: usize,
}

/// Row of the `FieldMarshal` table (0x0D). Sorted by `parent` after population.
#[derive(Debug, Clone, Copy)]
pub struct FieldMarshalRow {
    /// `HasFieldMarshal` coded index.
    pub parent: u32,
    pub native_type: BlobHandle,
}

/// Row of the `DeclSecurity` table (0x0E). Sorted by `parent` after population.
#[derive(Debug, Clone, Copy)]
pub struct DeclSecurityRow {
    pub action: u16,
    /// `HasDeclSecurity` coded index.
    pub parent: u32,
    pub permission_set: BlobHandle,
    pub original_index: usize,
}

/// Row of the `ClassLayout` table (0x0F). Populated in `TypeDef` row order, so sorted by
/// construction.
#[derive(Debug, Clone, Copy)]
pub struct ClassLayoutRow {
    pub packing_size: u16,
    pub class_size: u32,
    /// 1-based `TypeDef` row.
    pub parent: u32,
}

/// Row of the `FieldLayout` table (0x10). Populated in `Field` row order.
#[derive(Debug, Clone, Copy)]
pub struct FieldLayoutRow {
    pub offset: u32,
    /// 1-based `Field` row.
    pub field: u32,
}

/// Row of the `StandAloneSig` table (0x11).
#[derive(Debug, Clone, Copy)]
pub struct StandAloneSigRow {
    pub signature: BlobHandle,
}

/// Row of the `EventMap` table (0x12).
#[derive(Debug, Clone, Copy)]
pub struct EventMapRow {
    /// 1-based `TypeDef` row.
    pub parent: u32,
    /// 1-based start of this type's run in the `Event` table.
    pub event_list: u32,
}

/// Row of the `Event` table (0x14).
#[derive(Debug, Clone, Copy)]
pub struct EventRow {
    pub event_flags: u16,
    pub name: StringHandle,
    /// `TypeDefOrRef` coded index of the event's delegate type.
    pub event_type: u32,
}

/// Row of the `PropertyMap` table (0x15).
#[derive(Debug, Clone, Copy)]
pub struct PropertyMapRow {
    /// 1-based `TypeDef` row.
    pub parent: u32,
    /// 1-based start of this type's run in the `Property` table.
    pub property_list: u32,
}

/// Row of the `Property` table (0x17).
#[derive(Debug, Clone, Copy)]
pub struct PropertyRow {
    pub prop_flags: u16,
    pub name: StringHandle,
    pub signature: BlobHandle,
}

/// Row of the `MethodSemantics` table (0x18). Sorted by `association` after population.
#[derive(Debug, Clone, Copy)]
pub struct MethodSemanticsRow {
    pub semantic: u16,
    /// 1-based `MethodDef` row of the accessor.
    pub method: u32,
    /// `HasSemantics` coded index of the owning event or property.
    pub association: u32,
    pub original_index: usize,
}

/// Row of the `MethodImpl` table (0x19). Populated in `TypeDef` row order.
#[derive(Debug, Clone, Copy)]
pub struct MethodImplRow {
    /// 1-based `TypeDef` row.
    pub class: u32,
    /// `MethodDefOrRef` coded index of the implementing body.
    pub method_body: u32,
    /// `MethodDefOrRef` coded index of the declaration being implemented.
    pub method_decl: u32,
}

/// Row of the `ModuleRef` table (0x1A).
#[derive(Debug, Clone, Copy)]
pub struct ModuleRefRow {
    pub name: StringHandle,
}

/// Row of the `TypeSpec` table (0x1B).
#[derive(Debug, Clone, Copy)]
pub struct TypeSpecRow {
    pub signature: BlobHandle,
}

/// Row of the `ImplMap` table (0x1C). Populated in `MethodDef` row order.
#[derive(Debug, Clone, Copy)]
pub struct ImplMapRow {
    pub mapping_flags: u16,
    /// `MemberForwarded` coded index.
    pub member_forwarded: u32,
    pub import_name: StringHandle,
    /// 1-based `ModuleRef` row.
    pub import_scope: u32,
}

/// Row of the `FieldRVA` table (0x1D). Populated in `Field` row order.
#[derive(Debug, Clone, Copy)]
pub struct FieldRvaRow {
    /// Offset into the mapped-data block, rebased to an RVA at serialization time.
    pub offset: u32,
    /// 1-based `Field` row.
    pub field: u32,
}

/// Row of the `EncLog` table (0x1E), delta metadata only.
#[derive(Debug, Clone, Copy)]
pub struct EncLogRow {
    pub token: u32,
    pub func_code: u32,
}

/// Row of the `EncMap` table (0x1F), delta metadata only.
#[derive(Debug, Clone, Copy)]
pub struct EncMapRow {
    pub token: u32,
}

/// Row of the `Assembly` table (0x20).
#[derive(Debug, Clone, Copy)]
pub struct AssemblyRow {
    pub hash_algorithm: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub build_number: u16,
    pub revision_number: u16,
    pub flags: u32,
    pub public_key: BlobHandle,
    pub name: StringHandle,
    pub culture: StringHandle,
}

/// Row of the `AssemblyRef` table (0x23).
#[derive(Debug, Clone, Copy)]
pub struct AssemblyRefRow {
    pub major_version: u16,
    pub minor_version: u16,
    pub build_number: u16,
    pub revision_number: u16,
    pub flags: u32,
    pub public_key_or_token: BlobHandle,
    pub name: StringHandle,
    pub culture: StringHandle,
    pub hash_value: BlobHandle,
}

/// Row of the `File` table (0x26).
#[derive(Debug, Clone, Copy)]
pub struct FileRow {
    pub flags: u32,
    pub name: StringHandle,
    pub hash_value: BlobHandle,
}

/// Row of the `ExportedType` table (0x27).
#[derive(Debug, Clone, Copy)]
pub struct ExportedTypeRow {
    pub flags: u32,
    /// `TypeDef` token hint in the implementing module, 0 when unknown.
    pub type_def_id: u32,
    pub name: StringHandle,
    pub namespace: StringHandle,
    /// `Implementation` coded index.
    pub implementation: u32,
}

/// Row of the `ManifestResource` table (0x28).
#[derive(Debug, Clone, Copy)]
pub struct ManifestResourceRow {
    pub offset: u32,
    pub flags: u32,
    pub name: StringHandle,
    /// `Implementation` coded index, 0 for resources embedded in this image.
    pub implementation: u32,
}

/// Row of the `NestedClass` table (0x29). Populated in `TypeDef` row order.
#[derive(Debug, Clone, Copy)]
pub struct NestedClassRow {
    /// 1-based `TypeDef` row of the nested type.
    pub nested_class: u32,
    /// 1-based `TypeDef` row of the enclosing type.
    pub enclosing_class: u32,
}

/// Row of the `GenericParam` table (0x2A). Sorted by `owner` after population.
#[derive(Debug, Clone, Copy)]
pub struct GenericParamRow {
    pub number: u16,
    pub flags: u16,
    /// `TypeOrMethodDef` coded index.
    pub owner: u32,
    pub name: StringHandle,
    pub original_index: usize,
}

/// Row of the `MethodSpec` table (0x2B).
#[derive(Debug, Clone, Copy)]
pub struct MethodSpecRow {
    /// `MethodDefOrRef` coded index of the generic method.
    pub method: u32,
    pub instantiation: BlobHandle,
}

/// Row of the `GenericParamConstraint` table (0x2C). Populated in `GenericParam` row order.
#[derive(Debug, Clone, Copy)]
pub struct GenericParamConstraintRow {
    /// 1-based `GenericParam` row.
    pub owner: u32,
    /// `TypeDefOrRef` coded index of the constraint type.
    pub constraint: u32,
}

/// All populated table rows of one metadata emission, in append order until the
/// sort pass runs.
#[derive(Debug, Default)]
pub struct TableSet {
    pub module: Vec<ModuleRow>,
    pub type_ref: Vec<TypeRefRow>,
    pub type_def: Vec<TypeDefRow>,
    pub field: Vec<FieldRow>,
    pub method_def: Vec<MethodDefRow>,
    pub param: Vec<ParamRow>,
    pub interface_impl: Vec<InterfaceImplRow>,
    pub member_ref: Vec<MemberRefRow>,
    pub constant: Vec<ConstantRow>,
    pub custom_attribute: Vec<CustomAttributeRow>,
    pub field_marshal: Vec<FieldMarshalRow>,
    pub decl_security: Vec<DeclSecurityRow>,
    pub class_layout: Vec<ClassLayoutRow>,
    pub field_layout: Vec<FieldLayoutRow>,
    pub stand_alone_sig: Vec<StandAloneSigRow>,
    pub event_map: Vec<EventMapRow>,
    pub event: Vec<EventRow>,
    pub property_map: Vec<PropertyMapRow>,
    pub property: Vec<PropertyRow>,
    pub method_semantics: Vec<MethodSemanticsRow>,
    pub method_impl: Vec<MethodImplRow>,
    pub module_ref: Vec<ModuleRefRow>,
    pub type_spec: Vec<TypeSpecRow>,
    pub impl_map: Vec<ImplMapRow>,
    pub field_rva: Vec<FieldRvaRow>,
    pub enc_log: Vec<EncLogRow>,
    pub enc_map: Vec<EncMapRow>,
    pub assembly: Vec<AssemblyRow>,
    pub assembly_ref: Vec<AssemblyRefRow>,
    pub file: Vec<FileRow>,
    pub exported_type: Vec<ExportedTypeRow>,
    pub manifest_resource: Vec<ManifestResourceRow>,
    pub nested_class: Vec<NestedClassRow>,
    pub generic_param: Vec<GenericParamRow>,
    pub method_spec: Vec<MethodSpecRow>,
    pub generic_param_constraint: Vec<GenericParamConstraintRow>,
}

impl TableSet {
    /// Final row count of one table. Pointer and legacy tables are always empty.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        let count = match table {
            TableId::Module => self.module.len(),
            TableId::TypeRef => self.type_ref.len(),
            TableId::TypeDef => self.type_def.len(),
            TableId::Field => self.field.len(),
            TableId::MethodDef => self.method_def.len(),
            TableId::Param => self.param.len(),
            TableId::InterfaceImpl => self.interface_impl.len(),
            TableId::MemberRef => self.member_ref.len(),
            TableId::Constant => self.constant.len(),
            TableId::CustomAttribute => self.custom_attribute.len(),
            TableId::FieldMarshal => self.field_marshal.len(),
            TableId::DeclSecurity => self.decl_security.len(),
            TableId::ClassLayout => self.class_layout.len(),
            TableId::FieldLayout => self.field_layout.len(),
            TableId::StandAloneSig => self.stand_alone_sig.len(),
            TableId::EventMap => self.event_map.len(),
            TableId::Event => self.event.len(),
            TableId::PropertyMap => self.property_map.len(),
            TableId::Property => self.property.len(),
            TableId::MethodSemantics => self.method_semantics.len(),
            TableId::MethodImpl => self.method_impl.len(),
            TableId::ModuleRef => self.module_ref.len(),
            TableId::TypeSpec => self.type_spec.len(),
            TableId::ImplMap => self.impl_map.len(),
            TableId::FieldRva => self.field_rva.len(),
            TableId::EncLog => self.enc_log.len(),
            TableId::EncMap => self.enc_map.len(),
            TableId::Assembly => self.assembly.len(),
            TableId::AssemblyRef => self.assembly_ref.len(),
            TableId::File => self.file.len(),
            TableId::ExportedType => self.exported_type.len(),
            TableId::ManifestResource => self.manifest_resource.len(),
            TableId::NestedClass => self.nested_class.len(),
            TableId::GenericParam => self.generic_param.len(),
            TableId::MethodSpec => self.method_spec.len(),
            TableId::GenericParamConstraint => self.generic_param_constraint.len(),
            TableId::FieldPtr
            | TableId::MethodPtr
            | TableId::ParamPtr
            | TableId::EventPtr
            | TableId::PropertyPtr
            | TableId::AssemblyProcessor
            | TableId::AssemblyOs
            | TableId::AssemblyRefProcessor
            | TableId::AssemblyRefOs => 0,
        };
        count as u32
    }

    /// Sorts the tables whose ECMA-335 ordering cannot be guaranteed by population order.
    ///
    /// `CustomAttribute` uses a stable key of (parent, original position) so that multiple
    /// attributes on the same parent keep their source order. `MethodSemantics`, `DeclSecurity`
    /// and `GenericParam` keep their original index for the same reason.
    pub fn sort_unordered_tables(&mut self) {
        self.constant.sort_by_key(|row| row.parent);
        self.custom_attribute
            .sort_by_key(|row| (row.parent, row.original_position));
        self.field_marshal.sort_by_key(|row| row.parent);
        self.decl_security
            .sort_by_key(|row| (row.parent, row.original_index));
        self.method_semantics
            .sort_by_key(|row| (row.association, row.original_index));
        self.generic_param
            .sort_by_key(|row| (row.owner, row.original_index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::heaps::BlobHandle;

    #[test]
    fn test_row_counts_start_empty() {
        let tables = TableSet::default();
        assert_eq!(tables.row_count(TableId::TypeDef), 0);
        assert_eq!(tables.row_count(TableId::FieldPtr), 0);
    }

    #[test]
    fn test_custom_attribute_sort_is_stable_per_parent() {
        let mut tables = TableSet::default();
        for (parent, position) in [(34u32, 0usize), (2, 1), (34, 2), (2, 3)] {
            tables.custom_attribute.push(CustomAttributeRow {
                parent,
                constructor: 0x0A,
                value: BlobHandle::EMPTY,
                original_position: position,
            });
        }
        tables.sort_unordered_tables();
        let order: Vec<(u32, usize)> = tables
            .custom_attribute
            .iter()
            .map(|row| (row.parent, row.original_position))
            .collect();
        assert_eq!(order, vec![(2, 1), (2, 3), (34, 0), (34, 2)]);
    }
}
