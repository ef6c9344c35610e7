//! Blob encoders for signatures, custom attributes, marshalling and permission sets.
//!
//! ## Key Components
//!
//! - [`SignatureEncoder`] - stateless encoder borrowing the module and the assigned row
//!   indices; every method appends ECMA-335 II.23.2 structures to a byte buffer
//!
//! ## Architecture
//!
//! Signature blobs embed `TypeDefOrRef` coded indices, so encoding can only run after the
//! reference walk assigned rows. Custom attribute payloads are the exception: they never
//! embed tokens, types appearing inside them (typeof arguments, enum types, named-argument
//! kinds) are serialized as assembly-qualified *name strings* instead, so the same attribute
//! blob is valid in any module that can resolve the names.

use crate::metadata::tables::CodedIndexKind;
use crate::model::attributes::{
    AttributeElementKind, AttributeValue, CustomAttribute, MarshallingDescriptor,
    NamedArgument, PermissionSetPayload, SecurityDeclaration,
};
use crate::model::body::LocalSlot;
use crate::model::members::{
    FieldSignature, MethodSignature, PropertySignature, ResolutionScopeRef, SignatureParam,
};
use crate::model::types::{CustomModifier, PrimitiveKind, TypeShape};
use crate::model::Module;
use crate::writer::output::push_compressed_u32;
use crate::writer::refs::ModuleIndices;
use crate::{Error, Result};

const ELEMENT_TYPE_BYREF: u8 = 0x10;
const ELEMENT_TYPE_VALUETYPE: u8 = 0x11;
const ELEMENT_TYPE_CLASS: u8 = 0x12;
const ELEMENT_TYPE_VAR: u8 = 0x13;
const ELEMENT_TYPE_ARRAY: u8 = 0x14;
const ELEMENT_TYPE_GENERICINST: u8 = 0x15;
const ELEMENT_TYPE_PTR: u8 = 0x0F;
const ELEMENT_TYPE_SZARRAY: u8 = 0x1D;
const ELEMENT_TYPE_MVAR: u8 = 0x1E;
const ELEMENT_TYPE_CMOD_REQD: u8 = 0x1F;
const ELEMENT_TYPE_CMOD_OPT: u8 = 0x20;
const ELEMENT_TYPE_PINNED: u8 = 0x45;

/// Custom-attribute element tag for `System.Type` slots.
const SERIALIZATION_TYPE_TYPE: u8 = 0x50;
/// Custom-attribute element tag for boxed `object` slots.
const SERIALIZATION_TYPE_TAGGED_OBJECT: u8 = 0x51;
/// Custom-attribute element tag for enum slots, followed by the enum's serialized name.
const SERIALIZATION_TYPE_ENUM: u8 = 0x55;
const SERIALIZATION_TYPE_FIELD: u8 = 0x53;
const SERIALIZATION_TYPE_PROPERTY: u8 = 0x54;

const SIG_FIELD: u8 = 0x06;
const SIG_LOCALS: u8 = 0x07;
const SIG_PROPERTY: u8 = 0x08;
const SIG_GENERIC_INST: u8 = 0x0A;
const SIG_HAS_THIS: u8 = 0x20;
const SIG_EXPLICIT_THIS: u8 = 0x40;
const SIG_GENERIC: u8 = 0x10;

const NATIVE_TYPE_FIXEDSYSSTRING: u8 = 0x17;
const NATIVE_TYPE_FIXEDARRAY: u8 = 0x1E;
const NATIVE_TYPE_ARRAY: u8 = 0x2A;
const NATIVE_TYPE_CUSTOMMARSHALER: u8 = 0x2C;
/// Placeholder element type for arrays without one, `NATIVE_TYPE_MAX`.
const NATIVE_TYPE_MAX: u8 = 0x50;

/// Writes a `SerString`: compressed UTF-8 byte length then the bytes, 0xFF for null.
pub fn push_ser_string(buffer: &mut Vec<u8>, value: Option<&str>) -> Result<()> {
    match value {
        None => buffer.push(0xFF),
        Some(text) => {
            push_compressed_u32(buffer, text.len() as u32)?;
            buffer.extend_from_slice(text.as_bytes());
        }
    }
    Ok(())
}

/// Encodes signature and attribute blobs against one module's assigned indices.
pub struct SignatureEncoder<'a> {
    module: &'a Module,
    indices: &'a ModuleIndices,
}

impl<'a> SignatureEncoder<'a> {
    #[must_use]
    pub fn new(module: &'a Module, indices: &'a ModuleIndices) -> Self {
        SignatureEncoder { module, indices }
    }

    /// Serializes a method (or standalone/member-ref method) signature.
    pub fn method_signature(&self, signature: &MethodSignature) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut first = signature.calling_convention.to_bits();
        if signature.has_this {
            first |= SIG_HAS_THIS;
        }
        if signature.explicit_this {
            first |= SIG_EXPLICIT_THIS;
        }
        if signature.generic_param_count > 0 {
            first |= SIG_GENERIC;
        }
        buffer.push(first);
        if signature.generic_param_count > 0 {
            push_compressed_u32(&mut buffer, u32::from(signature.generic_param_count))?;
        }
        push_compressed_u32(&mut buffer, signature.params.len() as u32)?;
        self.signature_param(&mut buffer, &signature.return_type)?;
        for param in &signature.params {
            self.signature_param(&mut buffer, param)?;
        }
        Ok(buffer)
    }

    /// Serializes a field signature.
    pub fn field_signature(&self, signature: &FieldSignature) -> Result<Vec<u8>> {
        let mut buffer = vec![SIG_FIELD];
        for modifier in &signature.modifiers {
            self.custom_modifier(&mut buffer, modifier)?;
        }
        self.type_shape(&mut buffer, &signature.field_type)?;
        Ok(buffer)
    }

    /// Serializes a property signature.
    pub fn property_signature(&self, signature: &PropertySignature) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut first = SIG_PROPERTY;
        if signature.has_this {
            first |= SIG_HAS_THIS;
        }
        buffer.push(first);
        push_compressed_u32(&mut buffer, signature.params.len() as u32)?;
        self.signature_param(&mut buffer, &signature.return_type)?;
        for param in &signature.params {
            self.signature_param(&mut buffer, param)?;
        }
        Ok(buffer)
    }

    /// Serializes a local variable signature for a `StandAloneSig` row.
    pub fn local_signature(&self, locals: &[LocalSlot]) -> Result<Vec<u8>> {
        let mut buffer = vec![SIG_LOCALS];
        push_compressed_u32(&mut buffer, locals.len() as u32)?;
        for local in locals {
            for modifier in &local.modifiers {
                self.custom_modifier(&mut buffer, modifier)?;
            }
            if local.is_pinned {
                buffer.push(ELEMENT_TYPE_PINNED);
            }
            if local.by_ref {
                buffer.push(ELEMENT_TYPE_BYREF);
            }
            self.type_shape(&mut buffer, &local.local_type)?;
        }
        Ok(buffer)
    }

    /// Serializes a `MethodSpec` instantiation blob.
    pub fn method_spec_signature(&self, arguments: &[TypeShape]) -> Result<Vec<u8>> {
        let mut buffer = vec![SIG_GENERIC_INST];
        push_compressed_u32(&mut buffer, arguments.len() as u32)?;
        for argument in arguments {
            self.type_shape(&mut buffer, argument)?;
        }
        Ok(buffer)
    }

    /// Serializes a `TypeSpec` blob, which is just the type shape itself.
    pub fn type_spec_signature(&self, shape: &TypeShape) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.type_shape(&mut buffer, shape)?;
        Ok(buffer)
    }

    fn signature_param(&self, buffer: &mut Vec<u8>, param: &SignatureParam) -> Result<()> {
        for modifier in &param.modifiers {
            self.custom_modifier(buffer, modifier)?;
        }
        if param.by_ref {
            buffer.push(ELEMENT_TYPE_BYREF);
        }
        self.type_shape(buffer, &param.param_type)
    }

    fn custom_modifier(&self, buffer: &mut Vec<u8>, modifier: &CustomModifier) -> Result<()> {
        buffer.push(if modifier.required {
            ELEMENT_TYPE_CMOD_REQD
        } else {
            ELEMENT_TYPE_CMOD_OPT
        });
        self.coded_type_index(buffer, &modifier.modifier)
    }

    /// Appends the compressed `TypeDefOrRef` coded index of a named type.
    fn coded_type_index(&self, buffer: &mut Vec<u8>, shape: &TypeShape) -> Result<()> {
        let (table, row) = self.indices.type_def_or_ref(shape)?;
        let coded = CodedIndexKind::TypeDefOrRef.encode(table, row)?;
        push_compressed_u32(buffer, coded)
    }

    /// Appends one type shape in signature encoding.
    pub fn type_shape(&self, buffer: &mut Vec<u8>, shape: &TypeShape) -> Result<()> {
        match shape {
            TypeShape::Primitive(kind) => buffer.push(kind.element_type()),
            TypeShape::Definition(_) | TypeShape::Reference(_) => {
                buffer.push(if self.is_value_type(shape) {
                    ELEMENT_TYPE_VALUETYPE
                } else {
                    ELEMENT_TYPE_CLASS
                });
                self.coded_type_index(buffer, shape)?;
            }
            TypeShape::Pointer(pointee) => {
                buffer.push(ELEMENT_TYPE_PTR);
                self.type_shape(buffer, pointee)?;
            }
            TypeShape::SzArray(element) => {
                buffer.push(ELEMENT_TYPE_SZARRAY);
                self.type_shape(buffer, element)?;
            }
            TypeShape::Array {
                element,
                rank,
                sizes,
                lower_bounds,
            } => {
                buffer.push(ELEMENT_TYPE_ARRAY);
                self.type_shape(buffer, element)?;
                push_compressed_u32(buffer, *rank)?;
                push_compressed_u32(buffer, sizes.len() as u32)?;
                for size in sizes {
                    push_compressed_u32(buffer, *size)?;
                }
                push_compressed_u32(buffer, lower_bounds.len() as u32)?;
                for bound in lower_bounds {
                    crate::writer::output::push_compressed_i32(buffer, *bound)?;
                }
            }
            TypeShape::GenericInstance {
                template,
                arguments,
            } => {
                buffer.push(ELEMENT_TYPE_GENERICINST);
                buffer.push(if self.is_value_type(template) {
                    ELEMENT_TYPE_VALUETYPE
                } else {
                    ELEMENT_TYPE_CLASS
                });
                self.coded_type_index(buffer, template)?;
                push_compressed_u32(buffer, arguments.len() as u32)?;
                for argument in arguments {
                    self.type_shape(buffer, argument)?;
                }
            }
            TypeShape::TypeParameter { owner, index } => {
                buffer.push(ELEMENT_TYPE_VAR);
                let inherited = self.module.inherited_generic_param_count(*owner);
                push_compressed_u32(buffer, u32::from(inherited + index))?;
            }
            TypeShape::MethodParameter { index } => {
                buffer.push(ELEMENT_TYPE_MVAR);
                push_compressed_u32(buffer, u32::from(*index))?;
            }
            TypeShape::Modified {
                modifier,
                unmodified,
            } => {
                self.custom_modifier(buffer, modifier)?;
                self.type_shape(buffer, unmodified)?;
            }
        }
        Ok(())
    }

    fn is_value_type(&self, shape: &TypeShape) -> bool {
        match shape.without_modifiers() {
            TypeShape::Definition(id) => self
                .module
                .type_def(*id)
                .is_some_and(|def| def.is_value_type),
            TypeShape::Reference(id) => self
                .module
                .type_ref(*id)
                .is_some_and(|reference| reference.is_value_type),
            TypeShape::GenericInstance { template, .. } => self.is_value_type(template),
            _ => false,
        }
    }

    /// Serializes a custom attribute value blob: prolog, fixed arguments, named arguments.
    pub fn custom_attribute_blob(&self, attribute: &CustomAttribute) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&0x0001u16.to_le_bytes());
        for argument in &attribute.fixed_args {
            self.attribute_value(&mut buffer, argument)?;
        }
        buffer.extend_from_slice(&(attribute.named_args.len() as u16).to_le_bytes());
        for named in &attribute.named_args {
            self.named_argument(&mut buffer, named)?;
        }
        Ok(buffer)
    }

    fn named_argument(&self, buffer: &mut Vec<u8>, named: &NamedArgument) -> Result<()> {
        buffer.push(if named.is_field {
            SERIALIZATION_TYPE_FIELD
        } else {
            SERIALIZATION_TYPE_PROPERTY
        });
        self.element_kind(buffer, &named.kind)?;
        push_ser_string(buffer, Some(&named.name))?;
        self.attribute_value(buffer, &named.value)
    }

    /// Appends a `FieldOrPropType` element tag.
    fn element_kind(&self, buffer: &mut Vec<u8>, kind: &AttributeElementKind) -> Result<()> {
        match kind {
            AttributeElementKind::Boolean => buffer.push(0x02),
            AttributeElementKind::Char => buffer.push(0x03),
            AttributeElementKind::SByte => buffer.push(0x04),
            AttributeElementKind::Byte => buffer.push(0x05),
            AttributeElementKind::Int16 => buffer.push(0x06),
            AttributeElementKind::UInt16 => buffer.push(0x07),
            AttributeElementKind::Int32 => buffer.push(0x08),
            AttributeElementKind::UInt32 => buffer.push(0x09),
            AttributeElementKind::Int64 => buffer.push(0x0A),
            AttributeElementKind::UInt64 => buffer.push(0x0B),
            AttributeElementKind::Single => buffer.push(0x0C),
            AttributeElementKind::Double => buffer.push(0x0D),
            AttributeElementKind::String => buffer.push(0x0E),
            AttributeElementKind::Type => buffer.push(SERIALIZATION_TYPE_TYPE),
            AttributeElementKind::Object => buffer.push(SERIALIZATION_TYPE_TAGGED_OBJECT),
            AttributeElementKind::Enum(enum_type) => {
                buffer.push(SERIALIZATION_TYPE_ENUM);
                let name = self.assembly_qualified_name(enum_type)?;
                push_ser_string(buffer, Some(&name))?;
            }
            AttributeElementKind::SzArray(element) => {
                buffer.push(ELEMENT_TYPE_SZARRAY);
                self.element_kind(buffer, element)?;
            }
        }
        Ok(())
    }

    fn attribute_value(&self, buffer: &mut Vec<u8>, value: &AttributeValue) -> Result<()> {
        match value {
            AttributeValue::Boolean(v) => buffer.push(u8::from(*v)),
            AttributeValue::Char(v) => buffer.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::SByte(v) => buffer.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::Byte(v) => buffer.push(*v),
            AttributeValue::Int16(v) => buffer.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::UInt16(v) => buffer.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::Int32(v) => buffer.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::UInt32(v) => buffer.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::Int64(v) => buffer.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::UInt64(v) => buffer.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::Single(v) => buffer.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::Double(v) => buffer.extend_from_slice(&v.to_le_bytes()),
            AttributeValue::String(text) => push_ser_string(buffer, text.as_deref())?,
            AttributeValue::Type(shape) => match shape {
                None => buffer.push(0xFF),
                Some(shape) => {
                    let name = self.assembly_qualified_name(shape)?;
                    push_ser_string(buffer, Some(&name))?;
                }
            },
            AttributeValue::Enum { value, .. } => self.attribute_value(buffer, value)?,
            AttributeValue::Array { values, .. } => match values {
                None => buffer.extend_from_slice(&u32::MAX.to_le_bytes()),
                Some(values) => {
                    buffer.extend_from_slice(&(values.len() as u32).to_le_bytes());
                    for element in values {
                        self.attribute_value(buffer, element)?;
                    }
                }
            },
            AttributeValue::Boxed(inner) => {
                let kind = Self::kind_of_value(inner)?;
                self.element_kind(buffer, &kind)?;
                self.attribute_value(buffer, inner)?;
            }
        }
        Ok(())
    }

    /// Element kind a value serializes under when its static slot type is `object`.
    fn kind_of_value(value: &AttributeValue) -> Result<AttributeElementKind> {
        Ok(match value {
            AttributeValue::Boolean(_) => AttributeElementKind::Boolean,
            AttributeValue::Char(_) => AttributeElementKind::Char,
            AttributeValue::SByte(_) => AttributeElementKind::SByte,
            AttributeValue::Byte(_) => AttributeElementKind::Byte,
            AttributeValue::Int16(_) => AttributeElementKind::Int16,
            AttributeValue::UInt16(_) => AttributeElementKind::UInt16,
            AttributeValue::Int32(_) => AttributeElementKind::Int32,
            AttributeValue::UInt32(_) => AttributeElementKind::UInt32,
            AttributeValue::Int64(_) => AttributeElementKind::Int64,
            AttributeValue::UInt64(_) => AttributeElementKind::UInt64,
            AttributeValue::Single(_) => AttributeElementKind::Single,
            AttributeValue::Double(_) => AttributeElementKind::Double,
            AttributeValue::String(_) => AttributeElementKind::String,
            AttributeValue::Type(_) => AttributeElementKind::Type,
            AttributeValue::Enum { enum_type, .. } => {
                AttributeElementKind::Enum(enum_type.clone())
            }
            AttributeValue::Array { element, .. } => {
                AttributeElementKind::SzArray(Box::new(element.clone()))
            }
            AttributeValue::Boxed(_) => {
                return Err(Error::InvariantViolated(
                    "boxed value nested directly inside another box",
                ))
            }
        })
    }

    /// Serializes a marshalling descriptor for a `FieldMarshal` row.
    pub fn marshalling_blob(&self, descriptor: &MarshallingDescriptor) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        match descriptor {
            MarshallingDescriptor::Simple(code) => buffer.push(*code),
            MarshallingDescriptor::FixedString { length } => {
                buffer.push(NATIVE_TYPE_FIXEDSYSSTRING);
                push_compressed_u32(&mut buffer, *length)?;
            }
            MarshallingDescriptor::FixedArray { length, element } => {
                buffer.push(NATIVE_TYPE_FIXEDARRAY);
                push_compressed_u32(&mut buffer, *length)?;
                if let Some(element) = element {
                    buffer.push(*element);
                }
            }
            MarshallingDescriptor::Array {
                element,
                size_param_index,
                extra_elements,
            } => {
                buffer.push(NATIVE_TYPE_ARRAY);
                buffer.push(element.unwrap_or(NATIVE_TYPE_MAX));
                if let Some(index) = size_param_index {
                    push_compressed_u32(&mut buffer, u32::from(*index))?;
                    if let Some(extra) = extra_elements {
                        push_compressed_u32(&mut buffer, *extra)?;
                    }
                } else if extra_elements.is_some() {
                    return Err(Error::InvariantViolated(
                        "marshalling array element count requires a size parameter index",
                    ));
                }
            }
            MarshallingDescriptor::Custom {
                marshaler_type,
                cookie,
            } => {
                buffer.push(NATIVE_TYPE_CUSTOMMARSHALER);
                // Two legacy fields (GUID, native type name) are always empty.
                push_ser_string(&mut buffer, Some(""))?;
                push_ser_string(&mut buffer, Some(""))?;
                push_ser_string(&mut buffer, Some(marshaler_type))?;
                push_ser_string(&mut buffer, Some(cookie))?;
            }
            MarshallingDescriptor::Raw(bytes) => buffer.extend_from_slice(bytes),
        }
        Ok(buffer)
    }

    /// Serializes a `DeclSecurity` permission-set blob.
    pub fn permission_set_blob(&self, declaration: &SecurityDeclaration) -> Result<Vec<u8>> {
        match &declaration.payload {
            PermissionSetPayload::Xml(xml) => {
                let mut buffer = Vec::with_capacity(xml.len() * 2);
                for unit in xml.encode_utf16() {
                    buffer.extend_from_slice(&unit.to_le_bytes());
                }
                Ok(buffer)
            }
            PermissionSetPayload::Attributes(attributes) => {
                let mut buffer = vec![b'.'];
                push_compressed_u32(&mut buffer, attributes.len() as u32)?;
                for attribute in attributes {
                    push_ser_string(&mut buffer, Some(&attribute.type_name))?;
                    let mut inner = Vec::new();
                    push_compressed_u32(&mut inner, attribute.named_arguments.len() as u32)?;
                    for named in &attribute.named_arguments {
                        self.named_argument(&mut inner, named)?;
                    }
                    push_compressed_u32(&mut buffer, inner.len() as u32)?;
                    buffer.extend_from_slice(&inner);
                }
                Ok(buffer)
            }
        }
    }

    /// Renders a type's assembly-qualified reflection name for attribute payloads.
    pub fn assembly_qualified_name(&self, shape: &TypeShape) -> Result<String> {
        let name = self.type_full_name(shape)?;
        match self.owning_assembly_display(shape)? {
            Some(assembly) => Ok(format!("{name}, {assembly}")),
            None => Ok(name),
        }
    }

    fn type_full_name(&self, shape: &TypeShape) -> Result<String> {
        match shape {
            TypeShape::Primitive(kind) => Ok(primitive_full_name(*kind).to_string()),
            TypeShape::Definition(id) => {
                let def = self.module.type_def(*id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("type definition {id:?}"))
                })?;
                let base = match def.enclosing {
                    Some(enclosing) => format!(
                        "{}+{}",
                        self.type_full_name(&TypeShape::Definition(enclosing))?,
                        def.name
                    ),
                    None if def.namespace.is_empty() => def.name.clone(),
                    None => format!("{}.{}", def.namespace, def.name),
                };
                Ok(base)
            }
            TypeShape::Reference(id) => {
                let reference = self.module.type_ref(*id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("type reference {id:?}"))
                })?;
                match reference.scope {
                    ResolutionScopeRef::Nested(outer) => Ok(format!(
                        "{}+{}",
                        self.type_full_name(&TypeShape::Reference(outer))?,
                        reference.name
                    )),
                    _ if reference.namespace.is_empty() => Ok(reference.name.clone()),
                    _ => Ok(format!("{}.{}", reference.namespace, reference.name)),
                }
            }
            TypeShape::SzArray(element) => Ok(format!("{}[]", self.type_full_name(element)?)),
            TypeShape::Array { element, rank, .. } => Ok(format!(
                "{}[{}]",
                self.type_full_name(element)?,
                ",".repeat((*rank as usize).saturating_sub(1))
            )),
            TypeShape::Pointer(pointee) => Ok(format!("{}*", self.type_full_name(pointee)?)),
            TypeShape::GenericInstance {
                template,
                arguments,
            } => {
                let mut rendered = format!("{}[", self.type_full_name(template)?);
                for (position, argument) in arguments.iter().enumerate() {
                    if position > 0 {
                        rendered.push(',');
                    }
                    rendered.push('[');
                    rendered.push_str(&self.assembly_qualified_name(argument)?);
                    rendered.push(']');
                }
                rendered.push(']');
                Ok(rendered)
            }
            TypeShape::Modified { unmodified, .. } => self.type_full_name(unmodified),
            TypeShape::TypeParameter { .. } | TypeShape::MethodParameter { .. } => {
                Err(Error::InvariantViolated(
                    "open generic parameter has no serialized type name",
                ))
            }
        }
    }

    /// Display name of the assembly a type resolves through, `None` for the current module.
    fn owning_assembly_display(&self, shape: &TypeShape) -> Result<Option<String>> {
        match shape.without_modifiers() {
            TypeShape::Definition(_) | TypeShape::TypeParameter { .. } => Ok(None),
            TypeShape::Reference(id) => {
                let reference = self.module.type_ref(*id).ok_or_else(|| {
                    Error::UnresolvedReference(format!("type reference {id:?}"))
                })?;
                match reference.scope {
                    ResolutionScopeRef::AssemblyRef(assembly) => {
                        let info = self
                            .module
                            .assembly_refs
                            .get(assembly.index())
                            .ok_or_else(|| {
                                Error::UnresolvedReference(format!(
                                    "assembly reference {assembly:?}"
                                ))
                            })?;
                        let token = if info.public_key_or_token.is_empty() {
                            "null".to_string()
                        } else {
                            info.public_key_or_token
                                .iter()
                                .map(|byte| format!("{byte:02x}"))
                                .collect()
                        };
                        let culture = if info.culture.is_empty() {
                            "neutral"
                        } else {
                            &info.culture
                        };
                        Ok(Some(format!(
                            "{}, Version={}.{}.{}.{}, Culture={}, PublicKeyToken={}",
                            info.name,
                            info.version.major,
                            info.version.minor,
                            info.version.build,
                            info.version.revision,
                            culture,
                            token
                        )))
                    }
                    ResolutionScopeRef::Nested(outer) => {
                        self.owning_assembly_display(&TypeShape::Reference(outer))
                    }
                    _ => Ok(None),
                }
            }
            TypeShape::SzArray(element) | TypeShape::Pointer(element) => {
                self.owning_assembly_display(element)
            }
            TypeShape::Array { element, .. } => self.owning_assembly_display(element),
            TypeShape::GenericInstance { template, .. } => {
                self.owning_assembly_display(template)
            }
            _ => Ok(None),
        }
    }
}

fn primitive_full_name(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::Void => "System.Void",
        PrimitiveKind::Boolean => "System.Boolean",
        PrimitiveKind::Char => "System.Char",
        PrimitiveKind::SByte => "System.SByte",
        PrimitiveKind::Byte => "System.Byte",
        PrimitiveKind::Int16 => "System.Int16",
        PrimitiveKind::UInt16 => "System.UInt16",
        PrimitiveKind::Int32 => "System.Int32",
        PrimitiveKind::UInt32 => "System.UInt32",
        PrimitiveKind::Int64 => "System.Int64",
        PrimitiveKind::UInt64 => "System.UInt64",
        PrimitiveKind::Single => "System.Single",
        PrimitiveKind::Double => "System.Double",
        PrimitiveKind::String => "System.String",
        PrimitiveKind::IntPtr => "System.IntPtr",
        PrimitiveKind::UIntPtr => "System.UIntPtr",
        PrimitiveKind::Object => "System.Object",
        PrimitiveKind::TypedReference => "System.TypedReference",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::members::{
        AssemblyRef, AssemblyVersion, SignatureCallingConvention, TypeRef,
    };
    use crate::model::{AssemblyRefId, TypeRefId};

    fn test_module() -> (Module, ModuleIndices) {
        let mut module = Module::new("test.dll");
        module.assembly_refs.push(AssemblyRef {
            name: "mscorlib".to_string(),
            culture: String::new(),
            version: AssemblyVersion {
                major: 4,
                minor: 0,
                build: 0,
                revision: 0,
            },
            flags: Default::default(),
            public_key_or_token: vec![0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89],
            hash_value: Vec::new(),
        });
        module.type_refs.push(TypeRef {
            scope: ResolutionScopeRef::AssemblyRef(AssemblyRefId(0)),
            namespace: "System".to_string(),
            name: "DayOfWeek".to_string(),
            is_value_type: true,
        });
        let mut indices = ModuleIndices::default();
        indices.type_refs.get_or_add(TypeRefId(0));
        indices.assembly_refs.get_or_add(AssemblyRefId(0));
        (module, indices)
    }

    #[test]
    fn test_static_parameterless_void_signature() {
        let (module, indices) = test_module();
        let encoder = SignatureEncoder::new(&module, &indices);
        let signature = MethodSignature {
            has_this: false,
            explicit_this: false,
            calling_convention: SignatureCallingConvention::Default,
            generic_param_count: 0,
            return_type: SignatureParam::plain(TypeShape::Primitive(PrimitiveKind::Void)),
            params: vec![],
        };
        assert_eq!(
            encoder.method_signature(&signature).unwrap(),
            vec![0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_instance_generic_signature_carries_arity() {
        let (module, indices) = test_module();
        let encoder = SignatureEncoder::new(&module, &indices);
        let signature = MethodSignature {
            has_this: true,
            explicit_this: false,
            calling_convention: SignatureCallingConvention::Default,
            generic_param_count: 1,
            return_type: SignatureParam::plain(TypeShape::MethodParameter { index: 0 }),
            params: vec![SignatureParam::plain(TypeShape::Primitive(
                PrimitiveKind::Int32,
            ))],
        };
        // HASTHIS|GENERIC, arity 1, 1 param, MVAR 0 return, I4 param.
        assert_eq!(
            encoder.method_signature(&signature).unwrap(),
            vec![0x30, 0x01, 0x01, 0x1E, 0x00, 0x08]
        );
    }

    #[test]
    fn test_value_type_reference_encoding() {
        let (module, indices) = test_module();
        let encoder = SignatureEncoder::new(&module, &indices);
        let mut buffer = Vec::new();
        encoder
            .type_shape(&mut buffer, &TypeShape::Reference(TypeRefId(0)))
            .unwrap();
        // VALUETYPE, coded TypeRef row 1 = (1 << 2) | 1 = 5.
        assert_eq!(buffer, vec![0x11, 0x05]);
    }

    #[test]
    fn test_field_signature_prolog() {
        let (module, indices) = test_module();
        let encoder = SignatureEncoder::new(&module, &indices);
        let signature = FieldSignature {
            modifiers: vec![],
            field_type: TypeShape::szarray(TypeShape::Primitive(PrimitiveKind::String)),
        };
        assert_eq!(
            encoder.field_signature(&signature).unwrap(),
            vec![0x06, 0x1D, 0x0E]
        );
    }

    #[test]
    fn test_local_signature_with_pinned_slot() {
        let (module, indices) = test_module();
        let encoder = SignatureEncoder::new(&module, &indices);
        let mut pinned = LocalSlot::plain(TypeShape::Primitive(PrimitiveKind::IntPtr));
        pinned.is_pinned = true;
        let locals = vec![
            LocalSlot::plain(TypeShape::Primitive(PrimitiveKind::Int32)),
            pinned,
        ];
        assert_eq!(
            encoder.local_signature(&locals).unwrap(),
            vec![0x07, 0x02, 0x08, 0x45, 0x18]
        );
    }

    #[test]
    fn test_array_marshalling_without_element_writes_the_placeholder() {
        let (module, indices) = test_module();
        let encoder = SignatureEncoder::new(&module, &indices);
        let descriptor = MarshallingDescriptor::Array {
            element: None,
            size_param_index: Some(1),
            extra_elements: None,
        };
        // NATIVE_TYPE_ARRAY, NATIVE_TYPE_MAX element, size parameter 1.
        assert_eq!(
            encoder.marshalling_blob(&descriptor).unwrap(),
            vec![0x2A, 0x50, 0x01]
        );

        let explicit = MarshallingDescriptor::Array {
            element: Some(0x02), // NATIVE_TYPE_I1
            size_param_index: None,
            extra_elements: None,
        };
        assert_eq!(
            encoder.marshalling_blob(&explicit).unwrap(),
            vec![0x2A, 0x02]
        );
    }

    #[test]
    fn test_assembly_qualified_name_for_reference() {
        let (module, indices) = test_module();
        let encoder = SignatureEncoder::new(&module, &indices);
        let name = encoder
            .assembly_qualified_name(&TypeShape::Reference(TypeRefId(0)))
            .unwrap();
        assert_eq!(
            name,
            "System.DayOfWeek, mscorlib, Version=4.0.0.0, Culture=neutral, \
             PublicKeyToken=b77a5c561934e089"
        );
    }

    #[test]
    fn test_null_string_attribute_argument() {
        let (module, indices) = test_module();
        let encoder = SignatureEncoder::new(&module, &indices);
        let attribute = CustomAttribute {
            constructor: crate::model::members::MethodRefKind::Definition(
                crate::model::MethodId(0),
            ),
            fixed_args: vec![AttributeValue::String(None)],
            named_args: vec![],
        };
        assert_eq!(
            encoder.custom_attribute_blob(&attribute).unwrap(),
            vec![0x01, 0x00, 0xFF, 0x00, 0x00]
        );
    }

    #[test]
    fn test_null_array_attribute_argument() {
        let (module, indices) = test_module();
        let encoder = SignatureEncoder::new(&module, &indices);
        let mut buffer = Vec::new();
        encoder
            .attribute_value(
                &mut buffer,
                &AttributeValue::Array {
                    element: AttributeElementKind::Int32,
                    values: None,
                },
            )
            .unwrap();
        assert_eq!(buffer, vec![0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_boxed_value_carries_element_tag() {
        let (module, indices) = test_module();
        let encoder = SignatureEncoder::new(&module, &indices);
        let mut buffer = Vec::new();
        encoder
            .attribute_value(
                &mut buffer,
                &AttributeValue::Boxed(Box::new(AttributeValue::Int32(7))),
            )
            .unwrap();
        assert_eq!(buffer, vec![0x08, 0x07, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_permission_set_dot_format() {
        let (module, indices) = test_module();
        let encoder = SignatureEncoder::new(&module, &indices);
        let declaration = SecurityDeclaration {
            action: 0x08,
            payload: PermissionSetPayload::Attributes(vec![
                crate::model::attributes::PermissionAttribute {
                    type_name: "X".to_string(),
                    named_arguments: vec![],
                },
            ]),
        };
        let blob = encoder.permission_set_blob(&declaration).unwrap();
        // '.', one attribute, SerString "X", inner blob of one compressed zero.
        assert_eq!(blob, vec![b'.', 0x01, 0x01, b'X', 0x01, 0x00]);
    }
}
