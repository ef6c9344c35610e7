//! Row population for every metadata table.
//!
//! ## Architecture
//!
//! Rows are appended in a fixed pass order with all index assignment already done, so each
//! populator is a straight transcription: look rows up, intern names and blobs, push. Every
//! pass that fans out per type iterates in the assigned `TypeDef` row order (level by level,
//! enclosing types first), so list columns and tables ordered by a definition column line up
//! with the rows the walk assigned. Tables whose required ordering cannot be guaranteed by
//! population order carry an original-index key and are sorted at the end
//! ([`TableSet::sort_unordered_tables`]).
//!
//! The custom attribute passes replicate a legacy parent ordering: assembly first, then the
//! `HasCustomAttribute` tag groups 0 (methods), 1 (fields), 3 (types), 4 (parameters),
//! 7 (module), 9 (properties), 10 (events), 12 (module refs) and 19 (generic parameters, in
//! final sorted row order). The interleaved tags never carry attributes here, and the final
//! stable sort by packed parent value restores the ECMA ordering anyway.

use std::collections::HashMap;

use crate::diagnostics::{check_name_length, check_path_length, DiagnosticSink};
use crate::metadata::heaps::{BlobsBuilder, GuidHandle, GuidsBuilder, StringsBuilder};
use crate::metadata::tables::{
    AssemblyRefRow, AssemblyRow, ClassLayoutRow, CodedIndexKind, ConstantRow,
    CustomAttributeRow, DeclSecurityRow, EncLogRow, EncMapRow, EventMapRow, EventRow,
    ExportedTypeRow, FieldLayoutRow, FieldMarshalRow, FieldRow, FieldRvaRow, FileRow,
    GenericParamConstraintRow, GenericParamRow, ImplMapRow, InterfaceImplRow,
    ManifestResourceRow, MemberRefRow, MethodDefRow, MethodImplRow, MethodSemanticsRow,
    MethodSpecRow, ModuleRefRow, ModuleRow, NestedClassRow, ParamRow, PropertyMapRow,
    PropertyRow, StandAloneSigRow, TableId, TableSet, TypeDefRow, TypeRefRow, TypeSpecRow,
};
use crate::model::attributes::{ConstantValue, CustomAttribute, SecurityDeclaration};
use crate::model::members::{
    ExportedTypeImplementation, FieldFlags, GenericParamDef, MemberRefParentRef,
    MemberRefSignature, MethodFlags, MethodRefKind, ParamFlags, PropertyFlags,
    ResourcePayload, TypeDef, TypeFlags,
};
use crate::model::types::TypeShape;
use crate::model::{MethodId, Module, TypeDefId};
use crate::writer::refs::{ModuleIndices, ParamKey};
use crate::writer::signatures::SignatureEncoder;
use crate::{Error, Result};

const SEMANTIC_SETTER: u16 = 0x0001;
const SEMANTIC_GETTER: u16 = 0x0002;
const SEMANTIC_OTHER: u16 = 0x0004;
const SEMANTIC_ADD_ON: u16 = 0x0008;
const SEMANTIC_REMOVE_ON: u16 = 0x0010;
const SEMANTIC_FIRE: u16 = 0x0020;

/// `File` table flag for files without metadata.
const FILE_CONTAINS_NO_METADATA: u32 = 0x0001;

/// Data blocks assembled alongside the rows, laid into the image by the PE writer.
#[derive(Debug, Default)]
pub struct PopulatedBlocks {
    /// Initial values of `FieldRVA` fields, each entry 8-byte aligned.
    pub mapped_field_data: Vec<u8>,
    /// Embedded manifest resources, each length-prefixed and 8-byte aligned.
    pub managed_resources: Vec<u8>,
}

/// Fills every table of `tables` from the module, using already-assigned indices.
///
/// `body_offsets` maps methods with bodies to their offset in the serialized IL block;
/// methods without an entry get an RVA column of zero.
#[allow(clippy::too_many_arguments)]
pub fn populate_tables(
    module: &Module,
    indices: &ModuleIndices,
    body_offsets: &HashMap<MethodId, u32>,
    strings: &mut StringsBuilder,
    blobs: &mut BlobsBuilder,
    guids: &mut GuidsBuilder,
    tables: &mut TableSet,
    diagnostics: &mut dyn DiagnosticSink,
) -> Result<PopulatedBlocks> {
    let mut populator = Populator {
        module,
        indices,
        body_offsets,
        strings,
        blobs,
        guids,
        tables,
        diagnostics,
        blocks: PopulatedBlocks::default(),
    };
    populator.run()?;
    Ok(populator.blocks)
}

struct Populator<'a> {
    module: &'a Module,
    indices: &'a ModuleIndices,
    body_offsets: &'a HashMap<MethodId, u32>,
    strings: &'a mut StringsBuilder,
    blobs: &'a mut BlobsBuilder,
    guids: &'a mut GuidsBuilder,
    tables: &'a mut TableSet,
    diagnostics: &'a mut dyn DiagnosticSink,
    blocks: PopulatedBlocks,
}

/// One `GenericParam` row before sorting, with the attribute/constraint payloads that must
/// follow it into final row order.
struct PendingGenericParam<'m> {
    owner: u32,
    number: u16,
    flags: u16,
    name: &'m str,
    constraints: &'m [TypeShape],
    /// Present only for a type's own parameters, so redeclared inherited rows do not
    /// duplicate attributes.
    attributes: Option<&'m [CustomAttribute]>,
    original_index: usize,
}

impl<'a> Populator<'a> {
    fn run(&mut self) -> Result<()> {
        self.populate_module_row()?;
        self.populate_type_ref_rows()?;
        self.populate_type_def_rows()?;
        self.populate_field_rows()?;
        self.populate_method_def_rows()?;
        self.populate_param_rows()?;
        self.populate_interface_impl_rows()?;
        self.populate_member_ref_rows()?;
        self.populate_constant_rows()?;
        self.populate_field_marshal_rows()?;
        self.populate_decl_security_rows()?;
        self.populate_class_and_field_layout_rows()?;
        self.populate_standalone_sig_rows()?;
        self.populate_event_and_property_rows()?;
        self.populate_method_semantics_rows()?;
        self.populate_method_impl_rows()?;
        self.populate_module_ref_rows()?;
        self.populate_type_spec_rows()?;
        self.populate_impl_map_rows()?;
        self.populate_field_rva_rows()?;
        self.populate_enc_rows();
        self.populate_assembly_rows()?;
        self.populate_file_rows()?;
        self.populate_exported_type_rows()?;
        self.populate_manifest_resource_rows()?;
        self.populate_nested_class_rows()?;
        self.populate_method_spec_rows()?;

        let generic_params = self.populate_generic_param_rows()?;
        self.populate_custom_attribute_rows(&generic_params)?;

        self.tables.sort_unordered_tables();
        Ok(())
    }

    fn encoder(&self) -> SignatureEncoder<'a> {
        SignatureEncoder::new(self.module, self.indices)
    }

    fn type_def(&self, id: TypeDefId) -> Result<&'a TypeDef> {
        self.module
            .type_def(id)
            .ok_or_else(|| Error::UnresolvedReference(format!("type definition {id:?}")))
    }

    fn populate_module_row(&mut self) -> Result<()> {
        check_path_length(&self.module.name, self.diagnostics);
        let name = self.strings.intern(&self.module.name)?;
        let module_version_id = self.guids.intern(self.module.mvid)?;
        let enc_id = match self.module.enc_id {
            Some(guid) => self.guids.intern(guid)?,
            None => GuidHandle::NONE,
        };
        let enc_base_id = match self.module.enc_base_id {
            Some(guid) => self.guids.intern(guid)?,
            None => GuidHandle::NONE,
        };
        self.tables.module.push(ModuleRow {
            generation: self.module.generation,
            name,
            module_version_id,
            enc_id,
            enc_base_id,
        });
        Ok(())
    }

    fn populate_type_ref_rows(&mut self) -> Result<()> {
        for id in self.indices.type_refs.rows() {
            let reference = self.module.type_refs.get(id.index()).ok_or_else(|| {
                Error::UnresolvedReference(format!("type reference {id:?}"))
            })?;
            let (table, row) = self.indices.resolution_scope(reference.scope)?;
            let resolution_scope = CodedIndexKind::ResolutionScope.encode(table, row)?;
            self.tables.type_ref.push(TypeRefRow {
                resolution_scope,
                name: self.strings.intern(&reference.name)?,
                namespace: self.strings.intern(&reference.namespace)?,
            });
        }
        Ok(())
    }

    fn populate_type_def_rows(&mut self) -> Result<()> {
        let mut next_field = 1u32;
        let mut next_method = 1u32;
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            check_name_length(&type_def.name, self.diagnostics);
            let mut flags = type_def.flags;
            if !type_def.security.is_empty() {
                flags |= TypeFlags::HAS_SECURITY;
            }
            let extends = match &type_def.base {
                None => 0,
                Some(base) => {
                    let (table, row) = self.indices.type_def_or_ref(base)?;
                    CodedIndexKind::TypeDefOrRef.encode(table, row)?
                }
            };
            let row = TypeDefRow {
                flags: flags.bits(),
                name: self.strings.intern(&type_def.name)?,
                namespace: self.strings.intern(&type_def.namespace)?,
                extends,
                field_list: next_field,
                method_list: next_method,
            };
            next_field += type_def.fields.len() as u32;
            next_method += type_def.methods.len() as u32;
            self.tables.type_def.push(row);
        }
        Ok(())
    }

    fn populate_field_rows(&mut self) -> Result<()> {
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for field_id in &type_def.fields {
                let field = self.module.field(*field_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("field definition {field_id:?}"))
                })?;
                check_name_length(&field.name, self.diagnostics);
                let mut flags = field.flags;
                if field.default.is_some() {
                    flags |= FieldFlags::HAS_DEFAULT;
                }
                if field.marshalling.is_some() {
                    flags |= FieldFlags::HAS_FIELD_MARSHAL;
                }
                if field.mapped_data.is_some() {
                    flags |= FieldFlags::HAS_FIELD_RVA;
                }
                let signature = self.encoder().field_signature(&field.signature)?;
                self.tables.field.push(FieldRow {
                    flags: flags.bits(),
                    name: self.strings.intern(&field.name)?,
                    signature: self.blobs.intern(&signature)?,
                });
            }
        }
        Ok(())
    }

    fn populate_method_def_rows(&mut self) -> Result<()> {
        let mut next_param = 1u32;
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for method_id in &type_def.methods {
                let method = self.module.method(*method_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("method definition {method_id:?}"))
                })?;
                check_name_length(&method.name, self.diagnostics);
                let mut flags = method.flags;
                if !method.security.is_empty() {
                    flags |= MethodFlags::HAS_SECURITY;
                }
                let signature = self.encoder().method_signature(&method.signature)?;
                let rva = self
                    .body_offsets
                    .get(method_id)
                    .copied()
                    .unwrap_or(u32::MAX);
                let row = MethodDefRow {
                    rva,
                    impl_flags: method.impl_flags.bits(),
                    flags: flags.bits(),
                    name: self.strings.intern(&method.name)?,
                    signature: self.blobs.intern(&signature)?,
                    param_list: next_param,
                };
                if method.return_param.is_some() {
                    next_param += 1;
                }
                next_param += method.params.iter().filter(|p| p.needs_row()).count() as u32;
                self.tables.method_def.push(row);
            }
        }
        Ok(())
    }

    fn populate_param_rows(&mut self) -> Result<()> {
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for method_id in &type_def.methods {
                let method = self.module.method(*method_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("method definition {method_id:?}"))
                })?;
                if let Some(return_param) = &method.return_param {
                    let mut flags = ParamFlags::empty();
                    if return_param.marshalling.is_some() {
                        flags |= ParamFlags::HAS_FIELD_MARSHAL;
                    }
                    self.tables.param.push(ParamRow {
                        flags: flags.bits(),
                        sequence: 0,
                        name: self.strings.intern("")?,
                    });
                }
                for param in &method.params {
                    if !param.needs_row() {
                        continue;
                    }
                    let mut flags = param.flags;
                    if param.default.is_some() {
                        flags |= ParamFlags::HAS_DEFAULT;
                    }
                    if param.marshalling.is_some() {
                        flags |= ParamFlags::HAS_FIELD_MARSHAL;
                    }
                    self.tables.param.push(ParamRow {
                        flags: flags.bits(),
                        sequence: param.sequence,
                        name: self.strings.intern(&param.name)?,
                    });
                }
            }
        }
        Ok(())
    }

    fn populate_interface_impl_rows(&mut self) -> Result<()> {
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            let class = self.indices.type_def_row(type_id)?;
            for interface in &type_def.interfaces {
                let (table, row) = self.indices.type_def_or_ref(interface)?;
                self.tables.interface_impl.push(InterfaceImplRow {
                    class,
                    interface: CodedIndexKind::TypeDefOrRef.encode(table, row)?,
                });
            }
        }
        Ok(())
    }

    fn populate_member_ref_rows(&mut self) -> Result<()> {
        for id in self.indices.member_refs.rows() {
            let member_ref = self.module.member_refs.get(id.index()).ok_or_else(|| {
                Error::UnresolvedReference(format!("member reference {id:?}"))
            })?;
            let (table, row) = match &member_ref.parent {
                MemberRefParentRef::TypeDef(type_def) => {
                    (TableId::TypeDef, self.indices.type_def_row(*type_def)?)
                }
                MemberRefParentRef::TypeRef(type_ref) => {
                    (TableId::TypeRef, self.indices.type_ref_row(*type_ref)?)
                }
                MemberRefParentRef::TypeSpec(shape) => self.indices.type_def_or_ref(shape)?,
                MemberRefParentRef::ModuleRef(module_ref) => {
                    let row = self.indices.module_refs.get(module_ref).ok_or_else(|| {
                        Error::UnresolvedReference(format!("module reference {module_ref:?}"))
                    })?;
                    (TableId::ModuleRef, row)
                }
                MemberRefParentRef::MethodDef(method) => {
                    (TableId::MethodDef, self.indices.method_row(*method)?)
                }
            };
            let class = CodedIndexKind::MemberRefParent.encode(table, row)?;
            let signature = match &member_ref.signature {
                MemberRefSignature::Method(method) => self.encoder().method_signature(method)?,
                MemberRefSignature::Field(field) => self.encoder().field_signature(field)?,
            };
            self.tables.member_ref.push(MemberRefRow {
                class,
                name: self.strings.intern(&member_ref.name)?,
                signature: self.blobs.intern(&signature)?,
            });
        }
        Ok(())
    }

    fn push_constant(
        &mut self,
        parent_table: TableId,
        parent_row: u32,
        value: &ConstantValue,
    ) -> Result<()> {
        let parent = CodedIndexKind::HasConstant.encode(parent_table, parent_row)?;
        self.tables.constant.push(ConstantRow {
            type_code: value.type_code(),
            parent,
            value: self.blobs.intern(&value.blob_bytes())?,
        });
        Ok(())
    }

    fn populate_constant_rows(&mut self) -> Result<()> {
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for field_id in &type_def.fields {
                let field = self.module.field(*field_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("field definition {field_id:?}"))
                })?;
                if let Some(value) = &field.default {
                    let row = self.indices.field_row(*field_id)?;
                    self.push_constant(TableId::Field, row, value)?;
                }
            }
            for method_id in &type_def.methods {
                let method = self.module.method(*method_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("method definition {method_id:?}"))
                })?;
                for (index, param) in method.params.iter().enumerate() {
                    if let Some(value) = &param.default {
                        let row = self
                            .indices
                            .params
                            .get(&ParamKey::Param(*method_id, index))
                            .copied()
                            .ok_or(Error::InvariantViolated(
                                "parameter with default has no assigned row",
                            ))?;
                        self.push_constant(TableId::Param, row, value)?;
                    }
                }
            }
        }
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for (index, property) in type_def.properties.iter().enumerate() {
                if let Some(value) = &property.default {
                    let row = self.indices.properties[&(type_id, index)];
                    self.push_constant(TableId::Property, row, value)?;
                }
            }
        }
        Ok(())
    }

    fn populate_field_marshal_rows(&mut self) -> Result<()> {
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for field_id in &type_def.fields {
                let field = self.module.field(*field_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("field definition {field_id:?}"))
                })?;
                if let Some(descriptor) = &field.marshalling {
                    let row = self.indices.field_row(*field_id)?;
                    let parent =
                        CodedIndexKind::HasFieldMarshal.encode(TableId::Field, row)?;
                    let blob = self.encoder().marshalling_blob(descriptor)?;
                    self.tables.field_marshal.push(FieldMarshalRow {
                        parent,
                        native_type: self.blobs.intern(&blob)?,
                    });
                }
            }
            for method_id in &type_def.methods {
                let method = self.module.method(*method_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("method definition {method_id:?}"))
                })?;
                if let Some(return_param) = &method.return_param {
                    if let Some(descriptor) = &return_param.marshalling {
                        let row = self.indices.params[&ParamKey::Return(*method_id)];
                        let parent =
                            CodedIndexKind::HasFieldMarshal.encode(TableId::Param, row)?;
                        let blob = self.encoder().marshalling_blob(descriptor)?;
                        self.tables.field_marshal.push(FieldMarshalRow {
                            parent,
                            native_type: self.blobs.intern(&blob)?,
                        });
                    }
                }
                for (index, param) in method.params.iter().enumerate() {
                    if let Some(descriptor) = &param.marshalling {
                        let row = self.indices.params[&ParamKey::Param(*method_id, index)];
                        let parent =
                            CodedIndexKind::HasFieldMarshal.encode(TableId::Param, row)?;
                        let blob = self.encoder().marshalling_blob(descriptor)?;
                        self.tables.field_marshal.push(FieldMarshalRow {
                            parent,
                            native_type: self.blobs.intern(&blob)?,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn push_security_rows(
        &mut self,
        table: TableId,
        row: u32,
        declarations: &[SecurityDeclaration],
        original_index: &mut usize,
    ) -> Result<()> {
        for declaration in declarations {
            let parent = CodedIndexKind::HasDeclSecurity.encode(table, row)?;
            let blob = self.encoder().permission_set_blob(declaration)?;
            self.tables.decl_security.push(DeclSecurityRow {
                action: declaration.action,
                parent,
                permission_set: self.blobs.intern(&blob)?,
                original_index: *original_index,
            });
            *original_index += 1;
        }
        Ok(())
    }

    fn populate_decl_security_rows(&mut self) -> Result<()> {
        let module = self.module;
        let mut original_index = 0usize;

        if let Some(assembly) = &module.assembly {
            self.push_security_rows(
                TableId::Assembly,
                1,
                &assembly.security,
                &mut original_index,
            )?;
        }
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            if type_def.security.is_empty() {
                continue;
            }
            let row = self.indices.type_def_row(type_id)?;
            self.push_security_rows(
                TableId::TypeDef,
                row,
                &type_def.security,
                &mut original_index,
            )?;
        }
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for method_id in &type_def.methods {
                let method = module.method(*method_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("method definition {method_id:?}"))
                })?;
                if method.security.is_empty() {
                    continue;
                }
                let row = self.indices.method_row(*method_id)?;
                self.push_security_rows(
                    TableId::MethodDef,
                    row,
                    &method.security,
                    &mut original_index,
                )?;
            }
        }
        Ok(())
    }

    fn populate_class_and_field_layout_rows(&mut self) -> Result<()> {
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            if let Some(layout) = &type_def.layout {
                self.tables.class_layout.push(ClassLayoutRow {
                    packing_size: layout.packing_size,
                    class_size: layout.class_size,
                    parent: self.indices.type_def_row(type_id)?,
                });
            }
            for field_id in &type_def.fields {
                let field = self.module.field(*field_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("field definition {field_id:?}"))
                })?;
                if let Some(offset) = field.layout_offset {
                    self.tables.field_layout.push(FieldLayoutRow {
                        offset,
                        field: self.indices.field_row(*field_id)?,
                    });
                }
            }
        }
        Ok(())
    }

    fn populate_standalone_sig_rows(&mut self) -> Result<()> {
        for blob in self.indices.standalone_sigs.rows() {
            let signature = self.blobs.intern(blob)?;
            self.tables
                .stand_alone_sig
                .push(StandAloneSigRow { signature });
        }
        Ok(())
    }

    fn populate_event_and_property_rows(&mut self) -> Result<()> {
        let mut next_event = 1u32;
        let mut next_property = 1u32;
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            let parent = self.indices.type_def_row(type_id)?;
            if !type_def.events.is_empty() {
                self.tables.event_map.push(EventMapRow {
                    parent,
                    event_list: next_event,
                });
                next_event += type_def.events.len() as u32;
                for event in &type_def.events {
                    check_name_length(&event.name, self.diagnostics);
                    let (table, row) = self.indices.type_def_or_ref(&event.event_type)?;
                    self.tables.event.push(EventRow {
                        event_flags: event.flags.bits(),
                        name: self.strings.intern(&event.name)?,
                        event_type: CodedIndexKind::TypeDefOrRef.encode(table, row)?,
                    });
                }
            }
            if !type_def.properties.is_empty() {
                self.tables.property_map.push(PropertyMapRow {
                    parent,
                    property_list: next_property,
                });
                next_property += type_def.properties.len() as u32;
                for property in &type_def.properties {
                    check_name_length(&property.name, self.diagnostics);
                    let mut flags = property.flags;
                    if property.default.is_some() {
                        flags |= PropertyFlags::HAS_DEFAULT;
                    }
                    let signature = self.encoder().property_signature(&property.signature)?;
                    self.tables.property.push(PropertyRow {
                        prop_flags: flags.bits(),
                        name: self.strings.intern(&property.name)?,
                        signature: self.blobs.intern(&signature)?,
                    });
                }
            }
        }
        Ok(())
    }

    fn push_semantic(
        &mut self,
        semantic: u16,
        method: MethodId,
        association: u32,
        original_index: &mut usize,
    ) -> Result<()> {
        self.tables.method_semantics.push(MethodSemanticsRow {
            semantic,
            method: self.indices.method_row(method)?,
            association,
            original_index: *original_index,
        });
        *original_index += 1;
        Ok(())
    }

    fn populate_method_semantics_rows(&mut self) -> Result<()> {
        let mut original_index = 0usize;

        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for (index, property) in type_def.properties.iter().enumerate() {
                let row = self.indices.properties[&(type_id, index)];
                let association =
                    CodedIndexKind::HasSemantics.encode(TableId::Property, row)?;
                if let Some(setter) = property.setter {
                    self.push_semantic(SEMANTIC_SETTER, setter, association, &mut original_index)?;
                }
                if let Some(getter) = property.getter {
                    self.push_semantic(SEMANTIC_GETTER, getter, association, &mut original_index)?;
                }
                for other in &property.others {
                    self.push_semantic(SEMANTIC_OTHER, *other, association, &mut original_index)?;
                }
            }
            for (index, event) in type_def.events.iter().enumerate() {
                let row = self.indices.events[&(type_id, index)];
                let association = CodedIndexKind::HasSemantics.encode(TableId::Event, row)?;
                if let Some(add) = event.add_method {
                    self.push_semantic(SEMANTIC_ADD_ON, add, association, &mut original_index)?;
                }
                if let Some(remove) = event.remove_method {
                    self.push_semantic(
                        SEMANTIC_REMOVE_ON,
                        remove,
                        association,
                        &mut original_index,
                    )?;
                }
                if let Some(raise) = event.raise_method {
                    self.push_semantic(SEMANTIC_FIRE, raise, association, &mut original_index)?;
                }
                for other in &event.others {
                    self.push_semantic(SEMANTIC_OTHER, *other, association, &mut original_index)?;
                }
            }
        }
        Ok(())
    }

    fn populate_method_impl_rows(&mut self) -> Result<()> {
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            let class = self.indices.type_def_row(type_id)?;
            for impl_info in &type_def.method_impls {
                let (body_table, body_row) =
                    self.indices.method_def_or_ref(impl_info.body)?;
                let (decl_table, decl_row) =
                    self.indices.method_def_or_ref(impl_info.declaration)?;
                self.tables.method_impl.push(MethodImplRow {
                    class,
                    method_body: CodedIndexKind::MethodDefOrRef
                        .encode(body_table, body_row)?,
                    method_decl: CodedIndexKind::MethodDefOrRef
                        .encode(decl_table, decl_row)?,
                });
            }
        }
        Ok(())
    }

    fn populate_module_ref_rows(&mut self) -> Result<()> {
        for id in self.indices.module_refs.rows() {
            let name = self.module.module_refs.get(id.index()).ok_or_else(|| {
                Error::UnresolvedReference(format!("module reference {id:?}"))
            })?;
            self.tables.module_ref.push(ModuleRefRow {
                name: self.strings.intern(name)?,
            });
        }
        Ok(())
    }

    fn populate_type_spec_rows(&mut self) -> Result<()> {
        for shape in self.indices.type_specs.rows() {
            let signature = self.encoder().type_spec_signature(shape)?;
            self.tables.type_spec.push(TypeSpecRow {
                signature: self.blobs.intern(&signature)?,
            });
        }
        Ok(())
    }

    fn populate_impl_map_rows(&mut self) -> Result<()> {
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for method_id in &type_def.methods {
                let method = self.module.method(*method_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("method definition {method_id:?}"))
                })?;
                if let Some(pinvoke) = &method.pinvoke {
                    let member_row = self.indices.method_row(*method_id)?;
                    let import_scope =
                        self.indices.module_refs.get(&pinvoke.module).ok_or_else(|| {
                            Error::UnresolvedReference(format!(
                                "module reference {:?}",
                                pinvoke.module
                            ))
                        })?;
                    self.tables.impl_map.push(ImplMapRow {
                        mapping_flags: pinvoke.flags.bits(),
                        member_forwarded: CodedIndexKind::MemberForwarded
                            .encode(TableId::MethodDef, member_row)?,
                        import_name: self.strings.intern(&pinvoke.entry_point)?,
                        import_scope,
                    });
                }
            }
        }
        Ok(())
    }

    fn populate_field_rva_rows(&mut self) -> Result<()> {
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for field_id in &type_def.fields {
                let field = self.module.field(*field_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("field definition {field_id:?}"))
                })?;
                if let Some(data) = &field.mapped_data {
                    while self.blocks.mapped_field_data.len() % 8 != 0 {
                        self.blocks.mapped_field_data.push(0);
                    }
                    let offset = self.blocks.mapped_field_data.len() as u32;
                    self.blocks.mapped_field_data.extend_from_slice(data);
                    self.tables.field_rva.push(FieldRvaRow {
                        offset,
                        field: self.indices.field_row(*field_id)?,
                    });
                }
            }
        }
        Ok(())
    }

    fn populate_enc_rows(&mut self) {
        for (token, func_code) in &self.module.enc_log {
            self.tables.enc_log.push(EncLogRow {
                token: *token,
                func_code: *func_code,
            });
        }
        for token in &self.module.enc_map {
            self.tables.enc_map.push(EncMapRow { token: *token });
        }
    }

    fn populate_assembly_rows(&mut self) -> Result<()> {
        if let Some(assembly) = &self.module.assembly {
            check_name_length(&assembly.name, self.diagnostics);
            self.tables.assembly.push(AssemblyRow {
                hash_algorithm: assembly.hash_algorithm,
                major_version: assembly.version.major,
                minor_version: assembly.version.minor,
                build_number: assembly.version.build,
                revision_number: assembly.version.revision,
                flags: assembly.flags.bits(),
                public_key: self.blobs.intern(&assembly.public_key)?,
                name: self.strings.intern(&assembly.name)?,
                culture: self.strings.intern(&assembly.culture)?,
            });
        }
        for id in self.indices.assembly_refs.rows() {
            let reference = self.module.assembly_refs.get(id.index()).ok_or_else(|| {
                Error::UnresolvedReference(format!("assembly reference {id:?}"))
            })?;
            self.tables.assembly_ref.push(AssemblyRefRow {
                major_version: reference.version.major,
                minor_version: reference.version.minor,
                build_number: reference.version.build,
                revision_number: reference.version.revision,
                flags: reference.flags.bits(),
                public_key_or_token: self.blobs.intern(&reference.public_key_or_token)?,
                name: self.strings.intern(&reference.name)?,
                culture: self.strings.intern(&reference.culture)?,
                hash_value: self.blobs.intern(&reference.hash_value)?,
            });
        }
        Ok(())
    }

    fn populate_file_rows(&mut self) -> Result<()> {
        for file in &self.module.files {
            check_path_length(&file.name, self.diagnostics);
            self.tables.file.push(FileRow {
                flags: if file.contains_metadata {
                    0
                } else {
                    FILE_CONTAINS_NO_METADATA
                },
                name: self.strings.intern(&file.name)?,
                hash_value: self.blobs.intern(&file.hash_value)?,
            });
        }
        Ok(())
    }

    fn populate_exported_type_rows(&mut self) -> Result<()> {
        for exported in &self.module.exported_types {
            let (table, row) = match exported.implementation {
                ExportedTypeImplementation::File(file) => {
                    (TableId::File, file.0 + 1)
                }
                ExportedTypeImplementation::AssemblyRef(assembly) => {
                    let row = self.indices.assembly_refs.get(&assembly).ok_or_else(|| {
                        Error::UnresolvedReference(format!("assembly reference {assembly:?}"))
                    })?;
                    (TableId::AssemblyRef, row)
                }
                ExportedTypeImplementation::Exported(index) => {
                    (TableId::ExportedType, index as u32 + 1)
                }
            };
            self.tables.exported_type.push(ExportedTypeRow {
                flags: exported.flags,
                type_def_id: exported.type_def_hint,
                name: self.strings.intern(&exported.name)?,
                namespace: self.strings.intern(&exported.namespace)?,
                implementation: CodedIndexKind::Implementation.encode(table, row)?,
            });
        }
        Ok(())
    }

    fn populate_manifest_resource_rows(&mut self) -> Result<()> {
        for resource in &self.module.resources {
            let flags = if resource.is_public { 1 } else { 2 };
            let (offset, implementation) = match &resource.payload {
                ResourcePayload::Embedded(data) => {
                    while self.blocks.managed_resources.len() % 8 != 0 {
                        self.blocks.managed_resources.push(0);
                    }
                    let offset = self.blocks.managed_resources.len() as u32;
                    self.blocks
                        .managed_resources
                        .extend_from_slice(&(data.len() as u32).to_le_bytes());
                    self.blocks.managed_resources.extend_from_slice(data);
                    (offset, 0)
                }
                ResourcePayload::InFile(file, offset) => {
                    let coded = CodedIndexKind::Implementation
                        .encode(TableId::File, file.0 + 1)?;
                    (*offset, coded)
                }
                ResourcePayload::InAssembly(assembly) => {
                    let row = self.indices.assembly_refs.get(assembly).ok_or_else(|| {
                        Error::UnresolvedReference(format!("assembly reference {assembly:?}"))
                    })?;
                    let coded =
                        CodedIndexKind::Implementation.encode(TableId::AssemblyRef, row)?;
                    (0, coded)
                }
            };
            self.tables.manifest_resource.push(ManifestResourceRow {
                offset,
                flags,
                name: self.strings.intern(&resource.name)?,
                implementation,
            });
        }
        Ok(())
    }

    fn populate_nested_class_rows(&mut self) -> Result<()> {
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            if let Some(enclosing) = type_def.enclosing {
                self.tables.nested_class.push(NestedClassRow {
                    nested_class: self.indices.type_def_row(type_id)?,
                    enclosing_class: self.indices.type_def_row(enclosing)?,
                });
            }
        }
        Ok(())
    }

    fn populate_method_spec_rows(&mut self) -> Result<()> {
        for id in self.indices.method_specs.rows() {
            let spec = self.module.method_specs.get(id.index()).ok_or_else(|| {
                Error::UnresolvedReference(format!("method instantiation {id:?}"))
            })?;
            let (table, row) = self.indices.method_def_or_ref(spec.method)?;
            let instantiation = self.encoder().method_spec_signature(&spec.arguments)?;
            self.tables.method_spec.push(MethodSpecRow {
                method: CodedIndexKind::MethodDefOrRef.encode(table, row)?,
                instantiation: self.blobs.intern(&instantiation)?,
            });
        }
        Ok(())
    }

    /// Emits `GenericParam` rows in final sorted order and their constraints, returning the
    /// sorted pending list for the attribute pass.
    ///
    /// A nested type redeclares its enclosing chain's parameters before its own; numbers are
    /// consolidated positions. Constraints follow the sorted row order because the
    /// `GenericParamConstraint` table is keyed by final `GenericParam` rows.
    fn populate_generic_param_rows(&mut self) -> Result<Vec<(u32, &'a [CustomAttribute])>> {
        let module = self.module;
        let mut pending: Vec<PendingGenericParam<'a>> = Vec::new();
        let mut original_index = 0usize;

        for &type_id in &self.indices.type_def_order {
            let consolidated = self.consolidated_generic_params(type_id)?;
            if consolidated.is_empty() {
                continue;
            }
            let row = self.indices.type_def_row(type_id)?;
            let owner = CodedIndexKind::TypeOrMethodDef.encode(TableId::TypeDef, row)?;
            for (number, (param, is_own)) in consolidated.into_iter().enumerate() {
                pending.push(PendingGenericParam {
                    owner,
                    number: number as u16,
                    flags: param.flags.bits(),
                    name: &param.name,
                    constraints: &param.constraints,
                    attributes: is_own.then_some(param.custom_attributes.as_slice()),
                    original_index,
                });
                original_index += 1;
            }
        }
        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for method_id in &type_def.methods {
                let method = module.method(*method_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("method definition {method_id:?}"))
                })?;
                if method.generic_params.is_empty() {
                    continue;
                }
                let row = self.indices.method_row(*method_id)?;
                let owner =
                    CodedIndexKind::TypeOrMethodDef.encode(TableId::MethodDef, row)?;
                for (number, param) in method.generic_params.iter().enumerate() {
                    pending.push(PendingGenericParam {
                        owner,
                        number: number as u16,
                        flags: param.flags.bits(),
                        name: &param.name,
                        constraints: &param.constraints,
                        attributes: Some(param.custom_attributes.as_slice()),
                        original_index,
                    });
                    original_index += 1;
                }
            }
        }

        pending.sort_by_key(|entry| (entry.owner, entry.original_index));

        let mut attribute_rows = Vec::new();
        for entry in &pending {
            self.tables.generic_param.push(GenericParamRow {
                number: entry.number,
                flags: entry.flags,
                owner: entry.owner,
                name: self.strings.intern(entry.name)?,
                original_index: entry.original_index,
            });
            let row = self.tables.generic_param.len() as u32;
            for constraint in entry.constraints {
                let (table, constraint_row) = self.indices.type_def_or_ref(constraint)?;
                self.tables
                    .generic_param_constraint
                    .push(GenericParamConstraintRow {
                        owner: row,
                        constraint: CodedIndexKind::TypeDefOrRef
                            .encode(table, constraint_row)?,
                    });
            }
            if let Some(attributes) = entry.attributes {
                if !attributes.is_empty() {
                    attribute_rows.push((row, attributes));
                }
            }
        }
        Ok(attribute_rows)
    }

    /// The consolidated generic parameter list of a type: enclosing chain outermost-first,
    /// then the type's own. The flag marks the type's own parameters.
    fn consolidated_generic_params(
        &self,
        type_id: TypeDefId,
    ) -> Result<Vec<(&'a GenericParamDef, bool)>> {
        let module = self.module;
        let mut chain = Vec::new();
        let mut current = Some(type_id);
        while let Some(id) = current {
            let def = module
                .type_def(id)
                .ok_or_else(|| Error::UnresolvedReference(format!("type definition {id:?}")))?;
            chain.push(id);
            current = def.enclosing;
        }
        chain.reverse();

        let mut params = Vec::new();
        for (position, id) in chain.iter().enumerate() {
            let is_own = position == chain.len() - 1;
            let def = module
                .type_def(*id)
                .ok_or_else(|| Error::UnresolvedReference(format!("type definition {id:?}")))?;
            for param in &def.generic_params {
                params.push((param, is_own));
            }
        }
        Ok(params)
    }

    fn push_attributes(
        &mut self,
        parent: u32,
        attributes: &[CustomAttribute],
        position: &mut usize,
    ) -> Result<()> {
        for attribute in attributes {
            let (table, row) = match attribute.constructor {
                MethodRefKind::Definition(method) => {
                    (TableId::MethodDef, self.indices.method_row(method)?)
                }
                MethodRefKind::Reference(member) => {
                    let row = self.indices.member_refs.get(&member).ok_or_else(|| {
                        Error::UnresolvedReference(format!("member reference {member:?}"))
                    })?;
                    (TableId::MemberRef, row)
                }
            };
            let constructor = CodedIndexKind::CustomAttributeType.encode(table, row)?;
            let blob = self.encoder().custom_attribute_blob(attribute)?;
            self.tables.custom_attribute.push(CustomAttributeRow {
                parent,
                constructor,
                value: self.blobs.intern(&blob)?,
                original_position: *position,
            });
            *position += 1;
        }
        Ok(())
    }

    fn populate_custom_attribute_rows(
        &mut self,
        generic_param_attributes: &[(u32, &[CustomAttribute])],
    ) -> Result<()> {
        let module = self.module;
        let mut position = 0usize;

        if module.assembly.is_some() {
            let parent = CodedIndexKind::HasCustomAttribute.encode(TableId::Assembly, 1)?;
            self.push_attributes(parent, &module.assembly_attributes, &mut position)?;
        }

        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for method_id in &type_def.methods {
                let method = module.method(*method_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("method definition {method_id:?}"))
                })?;
                if method.custom_attributes.is_empty() {
                    continue;
                }
                let row = self.indices.method_row(*method_id)?;
                let parent =
                    CodedIndexKind::HasCustomAttribute.encode(TableId::MethodDef, row)?;
                self.push_attributes(parent, &method.custom_attributes, &mut position)?;
            }
        }

        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for field_id in &type_def.fields {
                let field = module.field(*field_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("field definition {field_id:?}"))
                })?;
                if field.custom_attributes.is_empty() {
                    continue;
                }
                let row = self.indices.field_row(*field_id)?;
                let parent =
                    CodedIndexKind::HasCustomAttribute.encode(TableId::Field, row)?;
                self.push_attributes(parent, &field.custom_attributes, &mut position)?;
            }
        }

        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            if type_def.custom_attributes.is_empty() {
                continue;
            }
            let row = self.indices.type_def_row(type_id)?;
            let parent = CodedIndexKind::HasCustomAttribute.encode(TableId::TypeDef, row)?;
            self.push_attributes(parent, &type_def.custom_attributes, &mut position)?;
        }

        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for method_id in &type_def.methods {
                let method = module.method(*method_id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("method definition {method_id:?}"))
                })?;
                if let Some(return_param) = &method.return_param {
                    if !return_param.custom_attributes.is_empty() {
                        let row = self.indices.params[&ParamKey::Return(*method_id)];
                        let parent = CodedIndexKind::HasCustomAttribute
                            .encode(TableId::Param, row)?;
                        self.push_attributes(
                            parent,
                            &return_param.custom_attributes,
                            &mut position,
                        )?;
                    }
                }
                for (index, param) in method.params.iter().enumerate() {
                    if param.custom_attributes.is_empty() {
                        continue;
                    }
                    let row = self
                        .indices
                        .params
                        .get(&ParamKey::Param(*method_id, index))
                        .copied()
                        .ok_or(Error::InvariantViolated(
                            "parameter with attributes has no assigned row",
                        ))?;
                    let parent =
                        CodedIndexKind::HasCustomAttribute.encode(TableId::Param, row)?;
                    self.push_attributes(parent, &param.custom_attributes, &mut position)?;
                }
            }
        }

        if !module.module_attributes.is_empty() {
            let parent = CodedIndexKind::HasCustomAttribute.encode(TableId::Module, 1)?;
            self.push_attributes(parent, &module.module_attributes, &mut position)?;
        }

        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for (index, property) in type_def.properties.iter().enumerate() {
                if property.custom_attributes.is_empty() {
                    continue;
                }
                let row = self.indices.properties[&(type_id, index)];
                let parent =
                    CodedIndexKind::HasCustomAttribute.encode(TableId::Property, row)?;
                self.push_attributes(parent, &property.custom_attributes, &mut position)?;
            }
        }

        for &type_id in &self.indices.type_def_order {
            let type_def = self.type_def(type_id)?;
            for (index, event) in type_def.events.iter().enumerate() {
                if event.custom_attributes.is_empty() {
                    continue;
                }
                let row = self.indices.events[&(type_id, index)];
                let parent =
                    CodedIndexKind::HasCustomAttribute.encode(TableId::Event, row)?;
                self.push_attributes(parent, &event.custom_attributes, &mut position)?;
            }
        }

        for (row, attributes) in generic_param_attributes {
            let parent =
                CodedIndexKind::HasCustomAttribute.encode(TableId::GenericParam, *row)?;
            self.push_attributes(parent, attributes, &mut position)?;
        }

        Ok(())
    }
}
