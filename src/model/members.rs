//! Definitions and references for types and their members.

use bitflags::bitflags;

use crate::model::attributes::{
    ConstantValue, CustomAttribute, MarshallingDescriptor, SecurityDeclaration,
};
use crate::model::body::MethodBody;
use crate::model::types::{CustomModifier, TypeShape};
use crate::model::{
    AssemblyRefId, FieldId, FileId, MemberRefId, MethodId, ModuleRefId, TypeDefId, TypeRefId,
};

bitflags! {
    /// `TypeDef` flags, ECMA-335 II.23.1.15.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeFlags: u32 {
        const PUBLIC = 0x0000_0001;
        const NESTED_PUBLIC = 0x0000_0002;
        const NESTED_PRIVATE = 0x0000_0003;
        const NESTED_FAMILY = 0x0000_0004;
        const NESTED_ASSEMBLY = 0x0000_0005;
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        const EXPLICIT_LAYOUT = 0x0000_0010;
        const INTERFACE = 0x0000_0020;
        const ABSTRACT = 0x0000_0080;
        const SEALED = 0x0000_0100;
        const SPECIAL_NAME = 0x0000_0400;
        const RT_SPECIAL_NAME = 0x0000_0800;
        const IMPORT = 0x0000_1000;
        const SERIALIZABLE = 0x0000_2000;
        const UNICODE_CLASS = 0x0001_0000;
        const AUTO_CLASS = 0x0002_0000;
        const HAS_SECURITY = 0x0004_0000;
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

bitflags! {
    /// `MethodDef` flags, ECMA-335 II.23.1.10. Accessibility occupies the low 3 bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodFlags: u16 {
        const PRIVATE = 0x0001;
        const FAM_AND_ASSEM = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAM_OR_ASSEM = 0x0005;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const FINAL = 0x0020;
        const VIRTUAL = 0x0040;
        const HIDE_BY_SIG = 0x0080;
        const NEW_SLOT = 0x0100;
        const STRICT = 0x0200;
        const ABSTRACT = 0x0400;
        const SPECIAL_NAME = 0x0800;
        const RT_SPECIAL_NAME = 0x1000;
        const PINVOKE_IMPL = 0x2000;
        const HAS_SECURITY = 0x4000;
        const REQUIRE_SEC_OBJECT = 0x8000;
    }
}

bitflags! {
    /// `MethodDef` implementation flags, ECMA-335 II.23.1.11.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodImplFlags: u16 {
        const NATIVE = 0x0001;
        const RUNTIME = 0x0003;
        const UNMANAGED = 0x0004;
        const NO_INLINING = 0x0008;
        const FORWARD_REF = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const NO_OPTIMIZATION = 0x0040;
        const PRESERVE_SIG = 0x0080;
        const INTERNAL_CALL = 0x1000;
    }
}

bitflags! {
    /// `Field` flags, ECMA-335 II.23.1.5. Accessibility occupies the low 3 bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FieldFlags: u16 {
        const PRIVATE = 0x0001;
        const FAM_AND_ASSEM = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAM_OR_ASSEM = 0x0005;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const INIT_ONLY = 0x0020;
        const LITERAL = 0x0040;
        const NOT_SERIALIZED = 0x0080;
        const HAS_FIELD_RVA = 0x0100;
        const SPECIAL_NAME = 0x0200;
        const RT_SPECIAL_NAME = 0x0400;
        const HAS_FIELD_MARSHAL = 0x1000;
        const PINVOKE_IMPL = 0x2000;
        const HAS_DEFAULT = 0x8000;
    }
}

bitflags! {
    /// `Param` flags, ECMA-335 II.23.1.13.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParamFlags: u16 {
        const IN = 0x0001;
        const OUT = 0x0002;
        const OPTIONAL = 0x0010;
        const HAS_DEFAULT = 0x1000;
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    /// `Property` flags, ECMA-335 II.23.1.14.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PropertyFlags: u16 {
        const SPECIAL_NAME = 0x0200;
        const RT_SPECIAL_NAME = 0x0400;
        const HAS_DEFAULT = 0x1000;
    }
}

bitflags! {
    /// `Event` flags, ECMA-335 II.23.1.4.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventFlags: u16 {
        const SPECIAL_NAME = 0x0200;
        const RT_SPECIAL_NAME = 0x0400;
    }
}

bitflags! {
    /// `GenericParam` flags, ECMA-335 II.23.1.7.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GenericParamFlags: u16 {
        const COVARIANT = 0x0001;
        const CONTRAVARIANT = 0x0002;
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        const VALUE_TYPE_CONSTRAINT = 0x0008;
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

bitflags! {
    /// `ImplMap` mapping flags, ECMA-335 II.23.1.8.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PInvokeFlags: u16 {
        const NO_MANGLE = 0x0001;
        const CHAR_SET_ANSI = 0x0002;
        const CHAR_SET_UNICODE = 0x0004;
        const CHAR_SET_AUTO = 0x0006;
        const SUPPORTS_LAST_ERROR = 0x0040;
        const CALL_CONV_WINAPI = 0x0100;
        const CALL_CONV_CDECL = 0x0200;
        const CALL_CONV_STDCALL = 0x0300;
        const CALL_CONV_THISCALL = 0x0400;
        const CALL_CONV_FASTCALL = 0x0500;
    }
}

bitflags! {
    /// `Assembly`/`AssemblyRef` flags, ECMA-335 II.23.1.2.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AssemblyFlags: u32 {
        const PUBLIC_KEY = 0x0000_0001;
        const RETARGETABLE = 0x0000_0100;
        const DISABLE_JIT_OPTIMIZER = 0x0000_4000;
        const ENABLE_JIT_TRACKING = 0x0000_8000;
    }
}

/// Unmanaged calling convention of a method signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignatureCallingConvention {
    /// The managed default.
    #[default]
    Default,
    /// Unmanaged `cdecl`.
    CDecl,
    /// Unmanaged `stdcall`.
    StdCall,
    /// Unmanaged `thiscall`.
    ThisCall,
    /// Unmanaged `fastcall`.
    FastCall,
    /// Managed variable-argument list.
    VarArg,
}

impl SignatureCallingConvention {
    /// Low nibble of the signature's calling convention byte.
    #[must_use]
    pub fn to_bits(self) -> u8 {
        match self {
            SignatureCallingConvention::Default => 0x0,
            SignatureCallingConvention::CDecl => 0x1,
            SignatureCallingConvention::StdCall => 0x2,
            SignatureCallingConvention::ThisCall => 0x3,
            SignatureCallingConvention::FastCall => 0x4,
            SignatureCallingConvention::VarArg => 0x5,
        }
    }
}

/// One parameter or return slot of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureParam {
    /// `modreq`/`modopt` annotations, outermost first.
    pub modifiers: Vec<CustomModifier>,
    /// Whether the slot is passed by reference (`ELEMENT_TYPE_BYREF`).
    pub by_ref: bool,
    /// The slot's type.
    pub param_type: TypeShape,
}

impl SignatureParam {
    /// An unmodified by-value slot of the given type.
    #[must_use]
    pub fn plain(param_type: TypeShape) -> Self {
        SignatureParam {
            modifiers: Vec::new(),
            by_ref: false,
            param_type,
        }
    }
}

/// A method signature as serialized into the `#Blob` heap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Whether the method takes an implicit `this`.
    pub has_this: bool,
    /// Whether `this` appears explicitly in the parameter list.
    pub explicit_this: bool,
    /// Low-nibble calling convention.
    pub calling_convention: SignatureCallingConvention,
    /// Generic arity; nonzero sets the `GENERIC` bit.
    pub generic_param_count: u16,
    /// The return slot.
    pub return_type: SignatureParam,
    /// The parameter slots, in order.
    pub params: Vec<SignatureParam>,
}

/// A field signature as serialized into the `#Blob` heap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldSignature {
    /// `modreq`/`modopt` annotations, outermost first.
    pub modifiers: Vec<CustomModifier>,
    /// The field's type.
    pub field_type: TypeShape,
}

/// A property signature: like a method signature but tagged `PROPERTY`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySignature {
    /// Whether the accessors take an implicit `this`.
    pub has_this: bool,
    /// The property's type.
    pub return_type: SignatureParam,
    /// Indexer parameters, empty for plain properties.
    pub params: Vec<SignatureParam>,
}

/// Explicit size and packing for a type with controlled layout.
#[derive(Debug, Clone, Copy)]
pub struct TypeLayout {
    /// Field alignment in bytes, 0 for the default.
    pub packing_size: u16,
    /// Total type size in bytes, 0 for the default.
    pub class_size: u32,
}

/// A method either defined here or referenced from elsewhere, the `MethodDefOrRef` space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodRefKind {
    /// A method defined in this module.
    Definition(MethodId),
    /// A method referenced through a `MemberRef`.
    Reference(MemberRefId),
}

/// A field either defined here or referenced from elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRefKind {
    /// A field defined in this module.
    Definition(FieldId),
    /// A field referenced through a `MemberRef`.
    Reference(MemberRefId),
}

/// An explicit override entry, one `MethodImpl` row.
#[derive(Debug, Clone, Copy)]
pub struct MethodImplInfo {
    /// The implementing method.
    pub body: MethodRefKind,
    /// The declaration being overridden.
    pub declaration: MethodRefKind,
}

/// One source-level generic parameter of a type or method.
#[derive(Debug, Clone)]
pub struct GenericParamDef {
    /// Parameter name, e.g. `T`.
    pub name: String,
    /// Variance and special-constraint flags.
    pub flags: GenericParamFlags,
    /// Type constraints, one `GenericParamConstraint` row each.
    pub constraints: Vec<TypeShape>,
    /// Attributes applied to the parameter.
    pub custom_attributes: Vec<CustomAttribute>,
}

/// A type definition in this module.
#[derive(Debug, Default)]
pub struct TypeDef {
    /// Namespace, empty for the global namespace and for nested types.
    pub namespace: String,
    /// Simple type name.
    pub name: String,
    /// `TypeAttributes` column value.
    pub flags: TypeFlags,
    /// Drives `ELEMENT_TYPE_VALUETYPE` vs `ELEMENT_TYPE_CLASS` in signatures.
    pub is_value_type: bool,
    /// Base type, `None` for `<Module>` and interfaces.
    pub base: Option<TypeShape>,
    /// Implemented interfaces, one `InterfaceImpl` row each.
    pub interfaces: Vec<TypeShape>,
    /// The containing type for nested types.
    pub enclosing: Option<TypeDefId>,
    /// Owned fields, in declaration order. Becomes this type's contiguous `Field` run.
    pub fields: Vec<FieldId>,
    /// Owned methods, in declaration order. Becomes this type's contiguous `MethodDef` run.
    pub methods: Vec<MethodId>,
    /// Owned properties, in declaration order.
    pub properties: Vec<Property>,
    /// Owned events, in declaration order.
    pub events: Vec<Event>,
    /// Own source-level generic parameters, excluding inherited ones from enclosing types.
    pub generic_params: Vec<GenericParamDef>,
    /// Explicit size and packing, one `ClassLayout` row when present.
    pub layout: Option<TypeLayout>,
    /// Explicit overrides, one `MethodImpl` row each.
    pub method_impls: Vec<MethodImplInfo>,
    /// Declarative security annotations.
    pub security: Vec<SecurityDeclaration>,
    /// Attributes applied to the type.
    pub custom_attributes: Vec<CustomAttribute>,
}

/// A field definition.
#[derive(Debug)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// `FieldAttributes` column value.
    pub flags: FieldFlags,
    /// The field's type signature.
    pub signature: FieldSignature,
    /// Compile-time default, one `Constant` row when present.
    pub default: Option<ConstantValue>,
    /// Marshalling information, one `FieldMarshal` row when present.
    pub marshalling: Option<MarshallingDescriptor>,
    /// Explicit byte offset within the containing type, one `FieldLayout` row.
    pub layout_offset: Option<u32>,
    /// Initial data mapped into the image, one `FieldRVA` row.
    pub mapped_data: Option<Vec<u8>>,
    /// Attributes applied to the field.
    pub custom_attributes: Vec<CustomAttribute>,
}

/// A real parameter of a method definition.
#[derive(Debug, Default)]
pub struct ParamDef {
    /// Parameter name, empty when unnamed.
    pub name: String,
    /// 1-based position; 0 is reserved for the return pseudo-parameter.
    pub sequence: u16,
    /// `ParamAttributes` column value.
    pub flags: ParamFlags,
    /// Compile-time default, one `Constant` row when present.
    pub default: Option<ConstantValue>,
    /// Marshalling information, one `FieldMarshal` row when present.
    pub marshalling: Option<MarshallingDescriptor>,
    /// Attributes applied to the parameter.
    pub custom_attributes: Vec<CustomAttribute>,
}

impl ParamDef {
    /// Whether this parameter needs a `Param` row at all. Nameless, flagless parameters with
    /// no default, marshalling or attributes are elided.
    #[must_use]
    pub fn needs_row(&self) -> bool {
        !self.name.is_empty()
            || !self.flags.is_empty()
            || self.default.is_some()
            || self.marshalling.is_some()
            || !self.custom_attributes.is_empty()
    }
}

/// Return-value metadata that forces a sequence-0 `Param` row.
#[derive(Debug, Default)]
pub struct ReturnParamDef {
    /// Marshalling information for the return value.
    pub marshalling: Option<MarshallingDescriptor>,
    /// Attributes applied to the return value.
    pub custom_attributes: Vec<CustomAttribute>,
}

/// P/Invoke import information, one `ImplMap` row.
#[derive(Debug)]
pub struct PInvokeInfo {
    /// Character set and calling-convention mapping flags.
    pub flags: PInvokeFlags,
    /// Name of the imported symbol.
    pub entry_point: String,
    /// The unmanaged module the symbol lives in.
    pub module: ModuleRefId,
}

/// A method definition.
#[derive(Debug)]
pub struct Method {
    /// Method name.
    pub name: String,
    /// `MethodAttributes` column value.
    pub flags: MethodFlags,
    /// `MethodImplAttributes` column value.
    pub impl_flags: MethodImplFlags,
    /// The method's signature as serialized into `#Blob`.
    pub signature: MethodSignature,
    /// Source-level parameter metadata; rows are elided for bare parameters.
    pub params: Vec<ParamDef>,
    /// Return-value metadata, present only when it forces a sequence-0 row.
    pub return_param: Option<ReturnParamDef>,
    /// The method's own generic parameters.
    pub generic_params: Vec<GenericParamDef>,
    /// IL body, `None` for abstract, extern and runtime-provided methods.
    pub body: Option<MethodBody>,
    /// P/Invoke import information, one `ImplMap` row when present.
    pub pinvoke: Option<PInvokeInfo>,
    /// Declarative security annotations.
    pub security: Vec<SecurityDeclaration>,
    /// Attributes applied to the method.
    pub custom_attributes: Vec<CustomAttribute>,
}

/// A property definition, owned by its type.
#[derive(Debug)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// `PropertyAttributes` column value.
    pub flags: PropertyFlags,
    /// The property's type signature.
    pub signature: PropertySignature,
    /// Getter accessor, one `MethodSemantics` row when present.
    pub getter: Option<MethodId>,
    /// Setter accessor, one `MethodSemantics` row when present.
    pub setter: Option<MethodId>,
    /// Additional `Other`-semantic accessors.
    pub others: Vec<MethodId>,
    /// Compile-time default, one `Constant` row when present.
    pub default: Option<ConstantValue>,
    /// Attributes applied to the property.
    pub custom_attributes: Vec<CustomAttribute>,
}

/// An event definition, owned by its type.
#[derive(Debug)]
pub struct Event {
    /// Event name.
    pub name: String,
    /// `EventAttributes` column value.
    pub flags: EventFlags,
    /// The delegate type of the event.
    pub event_type: TypeShape,
    /// `AddOn` accessor.
    pub add_method: Option<MethodId>,
    /// `RemoveOn` accessor.
    pub remove_method: Option<MethodId>,
    /// `Fire` accessor.
    pub raise_method: Option<MethodId>,
    /// Additional `Other`-semantic accessors.
    pub others: Vec<MethodId>,
    /// Attributes applied to the event.
    pub custom_attributes: Vec<CustomAttribute>,
}

/// Where a referenced type is resolved, the `ResolutionScope` space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionScopeRef {
    /// Defined in this module (rare, used for forwarded lookups).
    CurrentModule,
    /// Another module of this assembly.
    ModuleRef(ModuleRefId),
    /// Another assembly.
    AssemblyRef(AssemblyRefId),
    /// The enclosing type reference, for nested type references.
    Nested(TypeRefId),
}

/// A reference to a type in another scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Where the type resolves.
    pub scope: ResolutionScopeRef,
    /// Namespace, empty for nested references.
    pub namespace: String,
    /// Simple type name.
    pub name: String,
    /// Drives `ELEMENT_TYPE_VALUETYPE` vs `ELEMENT_TYPE_CLASS` in signatures.
    pub is_value_type: bool,
}

/// What a member reference points into, the `MemberRefParent` space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRefParentRef {
    /// A type defined in this module.
    TypeDef(TypeDefId),
    /// A type in another scope.
    TypeRef(TypeRefId),
    /// A constructed type, e.g. a generic instantiation.
    TypeSpec(TypeShape),
    /// An unmanaged module, for global functions.
    ModuleRef(ModuleRefId),
    /// A method definition, for vararg call-site signatures.
    MethodDef(MethodId),
}

/// Signature payload of a member reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRefSignature {
    /// The referenced member is a method.
    Method(MethodSignature),
    /// The referenced member is a field.
    Field(FieldSignature),
}

/// A reference to a member of another type (or of a generic instantiation).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// What the member belongs to.
    pub parent: MemberRefParentRef,
    /// Member name.
    pub name: String,
    /// Method or field signature.
    pub signature: MemberRefSignature,
}

/// A generic method instantiation, one `MethodSpec` row.
#[derive(Debug, Clone)]
pub struct MethodGenericInstantiation {
    /// The generic method being instantiated.
    pub method: MethodRefKind,
    /// The type arguments, in declaration order.
    pub arguments: Vec<TypeShape>,
}

/// Four-part assembly version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyVersion {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
    /// Build number.
    pub build: u16,
    /// Revision number.
    pub revision: u16,
}

/// Manifest of the assembly being emitted.
#[derive(Debug, Default)]
pub struct AssemblyInfo {
    /// Simple assembly name, without extension.
    pub name: String,
    /// Culture name, empty for culture-neutral assemblies.
    pub culture: String,
    /// Assembly version.
    pub version: AssemblyVersion,
    /// `AssemblyFlags` column value.
    pub flags: AssemblyFlags,
    /// Full public key, empty when unsigned.
    pub public_key: Vec<u8>,
    /// `AssemblyHashAlgorithm`; 0x8004 is SHA-1.
    pub hash_algorithm: u32,
    /// Declarative security annotations.
    pub security: Vec<SecurityDeclaration>,
}

/// A referenced assembly.
#[derive(Debug, Clone)]
pub struct AssemblyRef {
    /// Simple assembly name.
    pub name: String,
    /// Culture name, empty for culture-neutral assemblies.
    pub culture: String,
    /// Referenced version.
    pub version: AssemblyVersion,
    /// `AssemblyFlags` column value.
    pub flags: AssemblyFlags,
    /// Full public key or its 8-byte token.
    pub public_key_or_token: Vec<u8>,
    /// Hash of the referenced assembly, usually empty.
    pub hash_value: Vec<u8>,
}

/// A file belonging to this assembly, one `File` row.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// File name.
    pub name: String,
    /// Hash of the file's contents.
    pub hash_value: Vec<u8>,
    /// Whether the file carries metadata.
    pub contains_metadata: bool,
}

/// Where an exported type actually lives.
#[derive(Debug, Clone, Copy)]
pub enum ExportedTypeImplementation {
    /// Another file of this assembly.
    File(FileId),
    /// Another assembly, for type forwarding.
    AssemblyRef(AssemblyRefId),
    /// Index of the enclosing entry in [`crate::model::Module::exported_types`].
    Exported(usize),
}

/// A type exported from another module of this assembly, one `ExportedType` row.
#[derive(Debug, Clone)]
pub struct ExportedTypeInfo {
    /// Namespace of the exported type.
    pub namespace: String,
    /// Simple name of the exported type.
    pub name: String,
    /// `TypeAttributes` column value.
    pub flags: u32,
    /// `TypeDef` token hint in the defining module, 0 when unknown.
    pub type_def_hint: u32,
    /// Where the type actually lives.
    pub implementation: ExportedTypeImplementation,
}

/// Payload of a manifest resource.
#[derive(Debug, Clone)]
pub enum ResourcePayload {
    /// Bytes written into this image's managed-resource block.
    Embedded(Vec<u8>),
    /// Lives at an offset inside another file of the assembly.
    InFile(FileId, u32),
    /// Lives in another assembly.
    InAssembly(AssemblyRefId),
}

/// One `ManifestResource` row.
#[derive(Debug, Clone)]
pub struct ManifestResourceInfo {
    /// Resource name.
    pub name: String,
    /// Public visibility; private otherwise.
    pub is_public: bool,
    /// Where the resource's bytes live.
    pub payload: ResourcePayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::PrimitiveKind;

    #[test]
    fn test_param_row_elision() {
        let elided = ParamDef {
            sequence: 1,
            ..ParamDef::default()
        };
        assert!(!elided.needs_row());

        let named = ParamDef {
            name: "value".to_string(),
            sequence: 1,
            ..ParamDef::default()
        };
        assert!(named.needs_row());

        let defaulted = ParamDef {
            sequence: 2,
            flags: ParamFlags::HAS_DEFAULT,
            default: Some(ConstantValue::Int32(7)),
            ..ParamDef::default()
        };
        assert!(defaulted.needs_row());
    }

    #[test]
    fn test_signature_param_plain() {
        let param = SignatureParam::plain(TypeShape::Primitive(PrimitiveKind::Int32));
        assert!(!param.by_ref);
        assert!(param.modifiers.is_empty());
    }
}
