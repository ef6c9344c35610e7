//! Pre-serialization reference walk.
//!
//! ## Architecture
//!
//! Row numbers must be final before any row or signature byte is produced, so the walk runs
//! first and alone decides what gets a row. Types get dense rows level by level (top-level
//! types, then each nesting level, in declaration order within a level), which keeps every
//! enclosing type's row below the rows of its nested types; members follow their owning
//! type's row. References get rows in first-visit order, and only if the walk actually
//! reaches them. The traversal is deterministic, which is what makes repeated emissions of
//! the same module byte-identical.
//!
//! The walk is idempotent: re-visiting a reference returns its existing row.

use crate::model::attributes::CustomAttribute;
use crate::model::body::{ExceptionRegionKind, IlReference, MethodBody};
use crate::model::members::{
    MemberRefParentRef, MethodRefKind, ResolutionScopeRef, TypeDef,
};
use crate::model::types::TypeShape;
use crate::model::{MemberRefId, MethodSpecId, Module, TypeDefId, TypeRefId};
use crate::writer::refs::{ModuleIndices, ParamKey};
use crate::{Error, Result};

/// Walks `module` and fills `indices` with every row assignment except `StandAloneSig` and
/// `Param`-independent late additions.
pub fn walk(module: &Module, indices: &mut ModuleIndices) -> Result<()> {
    let mut walker = Walker { module, indices };
    walker.assign_definition_rows()?;
    walker.visit_module()
}

struct Walker<'a> {
    module: &'a Module,
    indices: &'a mut ModuleIndices,
}

impl Walker<'_> {
    /// Dense rows for definitions. Types go level by level so every enclosing type's row
    /// precedes the rows of the types nested inside it; within a level declaration order is
    /// kept. Field, method and parameter rows follow their owning type's row so each type
    /// owns a contiguous run.
    fn assign_definition_rows(&mut self) -> Result<()> {
        let order = self.type_def_level_order()?;

        let mut field_row = 0u32;
        let mut method_row = 0u32;
        let mut param_row = 0u32;
        let mut property_row = 0u32;
        let mut event_row = 0u32;

        for (slot, type_id) in order.iter().enumerate() {
            let type_id = *type_id;
            let type_def = self.module.type_def(type_id).ok_or_else(|| {
                Error::UnresolvedReference(format!("type definition {type_id:?}"))
            })?;
            self.indices.type_defs.insert(type_id, slot as u32 + 1);

            for field_id in &type_def.fields {
                field_row += 1;
                self.indices.fields.insert(*field_id, field_row);
            }
            for method_id in &type_def.methods {
                method_row += 1;
                self.indices.methods.insert(*method_id, method_row);
                if let Some(method) = self.module.method(*method_id) {
                    if method.return_param.is_some() {
                        param_row += 1;
                        self.indices
                            .params
                            .insert(ParamKey::Return(*method_id), param_row);
                    }
                    for (index, param) in method.params.iter().enumerate() {
                        if param.needs_row() {
                            param_row += 1;
                            self.indices
                                .params
                                .insert(ParamKey::Param(*method_id, index), param_row);
                        }
                    }
                }
            }
            for index in 0..type_def.properties.len() {
                property_row += 1;
                self.indices.properties.insert((type_id, index), property_row);
            }
            for index in 0..type_def.events.len() {
                event_row += 1;
                self.indices.events.insert((type_id, index), event_row);
            }
        }

        self.indices.type_def_order = order;
        Ok(())
    }

    /// Orders type definitions level by level: top-level types first, then each nesting
    /// level, each in declaration order. The row of a nested type therefore always exceeds
    /// its enclosing type's row.
    fn type_def_level_order(&self) -> Result<Vec<TypeDefId>> {
        let total = self.module.type_defs.len();
        let mut order = Vec::with_capacity(total);
        let mut slot_of = vec![usize::MAX; total];

        for (position, type_def) in self.module.type_defs.iter().enumerate() {
            if type_def.enclosing.is_none() {
                slot_of[position] = order.len();
                order.push(TypeDefId(position as u32));
            }
        }

        // Each sweep places the types whose enclosing type landed in an earlier level.
        let mut placed_before_sweep = order.len();
        while order.len() < total {
            for (position, type_def) in self.module.type_defs.iter().enumerate() {
                if slot_of[position] != usize::MAX {
                    continue;
                }
                let Some(enclosing) = type_def.enclosing else {
                    continue;
                };
                if enclosing.index() >= total {
                    return Err(Error::UnresolvedReference(format!(
                        "type definition {enclosing:?}"
                    )));
                }
                if slot_of[enclosing.index()] < placed_before_sweep {
                    slot_of[position] = order.len();
                    order.push(TypeDefId(position as u32));
                }
            }
            if order.len() == placed_before_sweep {
                return Err(Error::InvariantViolated(
                    "nested type's enclosing chain never reaches a top-level type",
                ));
            }
            placed_before_sweep = order.len();
        }
        Ok(order)
    }

    fn visit_module(&mut self) -> Result<()> {
        self.visit_attributes(&self.module.assembly_attributes)?;
        self.visit_attributes(&self.module.module_attributes)?;

        for position in 0..self.module.type_defs.len() {
            let type_def = &self.module.type_defs[position];
            self.visit_type_def(type_def)?;
        }

        for reference in &self.module.il_references {
            self.visit_il_reference(reference)?;
        }

        for exported in &self.module.exported_types {
            use crate::model::members::ExportedTypeImplementation;
            if let ExportedTypeImplementation::AssemblyRef(id) = exported.implementation {
                self.indices.assembly_refs.get_or_add(id);
            }
        }
        for resource in &self.module.resources {
            use crate::model::members::ResourcePayload;
            if let ResourcePayload::InAssembly(id) = resource.payload {
                self.indices.assembly_refs.get_or_add(id);
            }
        }
        Ok(())
    }

    fn visit_type_def(&mut self, type_def: &TypeDef) -> Result<()> {
        if let Some(base) = &type_def.base {
            self.visit_coded_type_position(base)?;
        }
        for interface in &type_def.interfaces {
            self.visit_coded_type_position(interface)?;
        }
        for generic_param in &type_def.generic_params {
            for constraint in &generic_param.constraints {
                self.visit_coded_type_position(constraint)?;
            }
            self.visit_attributes(&generic_param.custom_attributes)?;
        }
        for impl_info in &type_def.method_impls {
            self.visit_method_ref(impl_info.body)?;
            self.visit_method_ref(impl_info.declaration)?;
        }
        self.visit_attributes(&type_def.custom_attributes)?;

        for field_id in &type_def.fields {
            let field = self.module.field(*field_id).ok_or_else(|| {
                Error::UnresolvedReference(format!("field definition {field_id:?}"))
            })?;
            for modifier in &field.signature.modifiers {
                self.visit_coded_type_position(&modifier.modifier)?;
            }
            self.visit_shape_refs(&field.signature.field_type)?;
            self.visit_attributes(&field.custom_attributes)?;
        }

        for method_id in &type_def.methods {
            let method = self.module.method(*method_id).ok_or_else(|| {
                Error::UnresolvedReference(format!("method definition {method_id:?}"))
            })?;
            self.visit_method_signature_refs(&method.signature)?;
            for generic_param in &method.generic_params {
                for constraint in &generic_param.constraints {
                    self.visit_coded_type_position(constraint)?;
                }
                self.visit_attributes(&generic_param.custom_attributes)?;
            }
            if let Some(pinvoke) = &method.pinvoke {
                self.indices.module_refs.get_or_add(pinvoke.module);
            }
            if let Some(body) = &method.body {
                self.visit_body(body)?;
            }
            for param in &method.params {
                self.visit_attributes(&param.custom_attributes)?;
            }
            if let Some(return_param) = &method.return_param {
                self.visit_attributes(&return_param.custom_attributes)?;
            }
            self.visit_attributes(&method.custom_attributes)?;
        }

        for property in &type_def.properties {
            self.visit_shape_refs(&property.signature.return_type.param_type)?;
            for param in &property.signature.params {
                self.visit_shape_refs(&param.param_type)?;
            }
            self.visit_attributes(&property.custom_attributes)?;
        }
        for event in &type_def.events {
            self.visit_coded_type_position(&event.event_type)?;
            self.visit_attributes(&event.custom_attributes)?;
        }
        Ok(())
    }

    fn visit_body(&mut self, body: &MethodBody) -> Result<()> {
        for local in &body.locals {
            for modifier in &local.modifiers {
                self.visit_coded_type_position(&modifier.modifier)?;
            }
            self.visit_shape_refs(&local.local_type)?;
        }
        for region in &body.exception_regions {
            if let ExceptionRegionKind::Catch(catch_type) = &region.kind {
                self.visit_coded_type_position(catch_type)?;
            }
        }
        Ok(())
    }

    fn visit_il_reference(&mut self, reference: &IlReference) -> Result<()> {
        match reference {
            IlReference::Type(shape) => self.visit_coded_type_position(shape),
            IlReference::Field(field) => match field {
                crate::model::members::FieldRefKind::Definition(_) => Ok(()),
                crate::model::members::FieldRefKind::Reference(id) => {
                    self.visit_member_ref(*id)
                }
            },
            IlReference::Method(method) => self.visit_method_ref(*method),
            IlReference::MethodSpec(id) => self.visit_method_spec(*id),
            IlReference::Signature(index) => {
                // Calli signature shapes; the StandAloneSig row itself is assigned when the
                // body serializer encodes the blob.
                let signature = self
                    .module
                    .il_signatures
                    .get(*index as usize)
                    .ok_or_else(|| {
                        Error::UnresolvedReference(format!("IL signature index {index}"))
                    })?;
                self.visit_method_signature_refs(&signature.signature)
            }
        }
    }

    fn visit_method_spec(&mut self, id: MethodSpecId) -> Result<()> {
        let spec = self.module.method_specs.get(id.index()).ok_or_else(|| {
            Error::UnresolvedReference(format!("method instantiation {id:?}"))
        })?;
        self.visit_method_ref(spec.method)?;
        for argument in &spec.arguments {
            self.visit_shape_refs(argument)?;
        }
        self.indices
            .method_specs
            .get_or_add(id, (spec.method, spec.arguments.clone()));
        Ok(())
    }

    fn visit_method_ref(&mut self, method: MethodRefKind) -> Result<()> {
        match method {
            MethodRefKind::Definition(_) => Ok(()),
            MethodRefKind::Reference(id) => self.visit_member_ref(id),
        }
    }

    fn visit_member_ref(&mut self, id: MemberRefId) -> Result<()> {
        let member_ref = self.module.member_refs.get(id.index()).ok_or_else(|| {
            Error::UnresolvedReference(format!("member reference {id:?}"))
        })?;
        match &member_ref.parent {
            MemberRefParentRef::TypeDef(_) | MemberRefParentRef::MethodDef(_) => {}
            MemberRefParentRef::TypeRef(type_ref) => {
                self.register_type_ref(*type_ref)?;
            }
            MemberRefParentRef::TypeSpec(shape) => {
                self.visit_coded_type_position(shape)?;
            }
            MemberRefParentRef::ModuleRef(module_ref) => {
                self.indices.module_refs.get_or_add(*module_ref);
            }
        }
        match &member_ref.signature {
            crate::model::members::MemberRefSignature::Method(signature) => {
                self.visit_method_signature_refs(signature)?;
            }
            crate::model::members::MemberRefSignature::Field(signature) => {
                self.visit_shape_refs(&signature.field_type)?;
            }
        }
        self.indices.member_refs.get_or_add(id, member_ref.clone());
        Ok(())
    }

    fn visit_method_signature_refs(
        &mut self,
        signature: &crate::model::members::MethodSignature,
    ) -> Result<()> {
        self.visit_shape_refs(&signature.return_type.param_type)?;
        for modifier in &signature.return_type.modifiers {
            self.visit_coded_type_position(&modifier.modifier)?;
        }
        for param in &signature.params {
            for modifier in &param.modifiers {
                self.visit_coded_type_position(&modifier.modifier)?;
            }
            self.visit_shape_refs(&param.param_type)?;
        }
        Ok(())
    }

    fn visit_attributes(&mut self, attributes: &[CustomAttribute]) -> Result<()> {
        for attribute in attributes {
            self.visit_method_ref(attribute.constructor)?;
        }
        Ok(())
    }

    /// A shape sitting in a `TypeDefOrRef` position. Anything that is not a plain definition
    /// or reference needs a `TypeSpec` row.
    fn visit_coded_type_position(&mut self, shape: &TypeShape) -> Result<()> {
        self.visit_shape_refs(shape)?;
        match shape {
            TypeShape::Definition(_) | TypeShape::Reference(_) => Ok(()),
            other => {
                self.indices.type_specs.get_or_add(other.clone());
                Ok(())
            }
        }
    }

    /// Registers every type reference nested anywhere inside a shape. Shapes embedded in
    /// signatures are encoded inline and need no `TypeSpec` row of their own.
    fn visit_shape_refs(&mut self, shape: &TypeShape) -> Result<()> {
        match shape {
            TypeShape::Primitive(_)
            | TypeShape::TypeParameter { .. }
            | TypeShape::MethodParameter { .. }
            | TypeShape::Definition(_) => Ok(()),
            TypeShape::Reference(id) => self.register_type_ref(*id),
            TypeShape::Pointer(inner) | TypeShape::SzArray(inner) => {
                self.visit_shape_refs(inner)
            }
            TypeShape::Array { element, .. } => self.visit_shape_refs(element),
            TypeShape::GenericInstance {
                template,
                arguments,
            } => {
                self.visit_shape_refs(template)?;
                for argument in arguments {
                    self.visit_shape_refs(argument)?;
                }
                Ok(())
            }
            TypeShape::Modified {
                modifier,
                unmodified,
            } => {
                self.visit_coded_type_position(&modifier.modifier)?;
                self.visit_shape_refs(unmodified)
            }
        }
    }

    /// Registers a type reference and, first, everything its resolution scope needs.
    fn register_type_ref(&mut self, id: TypeRefId) -> Result<()> {
        if self.indices.type_refs.get(&id).is_some() {
            return Ok(());
        }
        let reference = self.module.type_refs.get(id.index()).ok_or_else(|| {
            Error::UnresolvedReference(format!("type reference {id:?}"))
        })?;
        match reference.scope {
            ResolutionScopeRef::CurrentModule => {}
            ResolutionScopeRef::ModuleRef(module_ref) => {
                self.indices.module_refs.get_or_add(module_ref);
            }
            ResolutionScopeRef::AssemblyRef(assembly_ref) => {
                self.indices.assembly_refs.get_or_add(assembly_ref);
            }
            ResolutionScopeRef::Nested(outer) => {
                self.register_type_ref(outer)?;
            }
        }
        self.indices.type_refs.get_or_add(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::members::{
        AssemblyRef, AssemblyVersion, Field, FieldFlags, FieldSignature, TypeDef, TypeRef,
    };
    use crate::model::types::PrimitiveKind;
    use crate::model::{AssemblyRefId, FieldId};

    fn module_with_field_of_referenced_type() -> Module {
        let mut module = Module::new("walk.dll");
        module.assembly_refs.push(AssemblyRef {
            name: "mscorlib".to_string(),
            culture: String::new(),
            version: AssemblyVersion::default(),
            flags: Default::default(),
            public_key_or_token: Vec::new(),
            hash_value: Vec::new(),
        });
        module.type_refs.push(TypeRef {
            scope: ResolutionScopeRef::AssemblyRef(AssemblyRefId(0)),
            namespace: "System".to_string(),
            name: "Object".to_string(),
            is_value_type: false,
        });
        module.fields.push(Field {
            name: "state".to_string(),
            flags: FieldFlags::PRIVATE,
            signature: FieldSignature {
                modifiers: vec![],
                field_type: TypeShape::Reference(TypeRefId(0)),
            },
            default: None,
            marshalling: None,
            layout_offset: None,
            mapped_data: None,
            custom_attributes: vec![],
        });
        module.type_defs.push(TypeDef {
            name: "<Module>".to_string(),
            ..TypeDef::default()
        });
        module.type_defs.push(TypeDef {
            name: "Holder".to_string(),
            base: Some(TypeShape::Reference(TypeRefId(0))),
            fields: vec![FieldId(0)],
            ..TypeDef::default()
        });
        module
    }

    #[test]
    fn test_walk_assigns_definition_and_reference_rows() {
        let module = module_with_field_of_referenced_type();
        let mut indices = ModuleIndices::default();
        walk(&module, &mut indices).unwrap();

        assert_eq!(indices.type_defs[&TypeDefId(0)], 1);
        assert_eq!(indices.type_defs[&TypeDefId(1)], 2);
        assert_eq!(indices.fields[&FieldId(0)], 1);
        assert_eq!(indices.type_refs.get(&TypeRefId(0)), Some(1));
        assert_eq!(indices.assembly_refs.get(&AssemblyRefId(0)), Some(1));
        assert!(indices.type_specs.is_empty());
    }

    #[test]
    fn test_nested_type_row_exceeds_its_enclosing_types_row() {
        // Inner is declared ahead of its enclosing type.
        let mut module = Module::new("nest.dll");
        module.type_defs.push(TypeDef {
            name: "<Module>".to_string(),
            ..TypeDef::default()
        });
        module.type_defs.push(TypeDef {
            name: "Inner".to_string(),
            enclosing: Some(TypeDefId(2)),
            ..TypeDef::default()
        });
        module.type_defs.push(TypeDef {
            name: "Outer".to_string(),
            ..TypeDef::default()
        });

        let mut indices = ModuleIndices::default();
        walk(&module, &mut indices).unwrap();

        assert_eq!(
            indices.type_def_order,
            vec![TypeDefId(0), TypeDefId(2), TypeDefId(1)]
        );
        assert_eq!(indices.type_defs[&TypeDefId(2)], 2);
        assert_eq!(indices.type_defs[&TypeDefId(1)], 3);
        assert!(indices.type_defs[&TypeDefId(1)] > indices.type_defs[&TypeDefId(2)]);
    }

    #[test]
    fn test_deeper_nesting_levels_come_after_shallower_ones() {
        let mut module = Module::new("nest.dll");
        module.type_defs.push(TypeDef {
            name: "Innermost".to_string(),
            enclosing: Some(TypeDefId(1)),
            ..TypeDef::default()
        });
        module.type_defs.push(TypeDef {
            name: "Inner".to_string(),
            enclosing: Some(TypeDefId(2)),
            ..TypeDef::default()
        });
        module.type_defs.push(TypeDef {
            name: "Outer".to_string(),
            ..TypeDef::default()
        });

        let mut indices = ModuleIndices::default();
        walk(&module, &mut indices).unwrap();

        assert_eq!(
            indices.type_def_order,
            vec![TypeDefId(2), TypeDefId(1), TypeDefId(0)]
        );
    }

    #[test]
    fn test_cyclic_enclosing_chain_is_rejected() {
        let mut module = Module::new("cycle.dll");
        module.type_defs.push(TypeDef {
            name: "Top".to_string(),
            ..TypeDef::default()
        });
        module.type_defs.push(TypeDef {
            name: "A".to_string(),
            enclosing: Some(TypeDefId(2)),
            ..TypeDef::default()
        });
        module.type_defs.push(TypeDef {
            name: "B".to_string(),
            enclosing: Some(TypeDefId(1)),
            ..TypeDef::default()
        });

        let mut indices = ModuleIndices::default();
        assert!(matches!(
            walk(&module, &mut indices),
            Err(Error::InvariantViolated(_))
        ));
    }

    #[test]
    fn test_walk_is_idempotent() {
        let module = module_with_field_of_referenced_type();
        let mut indices = ModuleIndices::default();
        walk(&module, &mut indices).unwrap();
        let type_refs_before = indices.type_refs.len();
        walk(&module, &mut indices).unwrap();
        assert_eq!(indices.type_refs.len(), type_refs_before);
    }

    #[test]
    fn test_complex_base_type_gets_a_type_spec_row() {
        let mut module = module_with_field_of_referenced_type();
        module.type_defs[1].base = Some(TypeShape::generic_instance(
            TypeShape::Reference(TypeRefId(0)),
            vec![TypeShape::Primitive(PrimitiveKind::Int32)],
        ));
        let mut indices = ModuleIndices::default();
        walk(&module, &mut indices).unwrap();
        assert_eq!(indices.type_specs.len(), 1);
    }
}
