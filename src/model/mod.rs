//! The object model consumed by the writer.
//!
//! ## Key Components
//!
//! - [`Module`] - one compilation unit: arenas of definitions and references plus the
//!   manifest, resources and IL reference tables
//! - [`types::TypeShape`] - closed sum type over everything a signature can mention
//! - [`members`] - type, method, field, property and event definitions
//! - [`body::MethodBody`] - IL with pseudo-tokens, locals and exception regions
//! - [`attributes`] - custom attribute values, constants, marshalling and security
//!
//! ## Architecture
//!
//! Definitions and references live in flat arenas on [`Module`] and point at each other
//! through typed index handles ([`TypeDefId`], [`MethodId`], ...). The writer never mutates
//! the model; it walks it, assigns metadata row indices to the arena entries it reaches, and
//! serializes. Handles from one module are meaningless in another, the writer treats a
//! dangling handle as an unresolved-reference error.

pub mod attributes;
pub mod body;
pub mod members;
pub mod types;

use uguid::Guid;

use crate::model::attributes::CustomAttribute;
use crate::model::body::StandaloneSignature;
use crate::model::members::{
    AssemblyInfo, AssemblyRef, ExportedTypeInfo, Field, FileInfo, ManifestResourceInfo,
    MemberRef, Method, MethodGenericInstantiation, TypeDef, TypeRef,
};

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Arena slot this handle points at.
            #[must_use]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Handle to a [`TypeDef`] in [`Module::type_defs`].
    TypeDefId
);
arena_id!(
    /// Handle to a [`TypeRef`] in [`Module::type_refs`].
    TypeRefId
);
arena_id!(
    /// Handle to a [`Field`] in [`Module::fields`].
    FieldId
);
arena_id!(
    /// Handle to a [`Method`] in [`Module::methods`].
    MethodId
);
arena_id!(
    /// Handle to a [`MemberRef`] in [`Module::member_refs`].
    MemberRefId
);
arena_id!(
    /// Handle to an [`AssemblyRef`] in [`Module::assembly_refs`].
    AssemblyRefId
);
arena_id!(
    /// Handle to a module-reference name in [`Module::module_refs`].
    ModuleRefId
);
arena_id!(
    /// Handle to a [`MethodGenericInstantiation`] in [`Module::method_specs`].
    MethodSpecId
);
arena_id!(
    /// Handle to a [`FileInfo`] in [`Module::files`].
    FileId
);

/// Everything the writer needs to emit one module.
#[derive(Debug, Default)]
pub struct Module {
    /// Module file name, e.g. `Program.exe`.
    pub name: String,
    /// Module version id. Zero under deterministic emission; the writer derives and patches
    /// the real value from the content hash.
    pub mvid: Guid,
    /// Edit-and-continue generation, 0 for a full emission.
    pub generation: u16,
    /// EnC generation id GUID, `None` outside delta scenarios.
    pub enc_id: Option<Guid>,
    /// EnC id of the generation this delta builds on, `None` outside delta scenarios.
    pub enc_base_id: Option<Guid>,

    /// Assembly manifest when this module is the manifest module.
    pub assembly: Option<AssemblyInfo>,

    /// Type definitions. Slot 0 is the `<Module>` type.
    pub type_defs: Vec<TypeDef>,
    /// Field definitions, owned by types via [`TypeDef::fields`].
    pub fields: Vec<Field>,
    /// Method definitions, owned by types via [`TypeDef::methods`].
    pub methods: Vec<Method>,

    /// References to types in other scopes.
    pub type_refs: Vec<TypeRef>,
    /// References to members of other types.
    pub member_refs: Vec<MemberRef>,
    /// References to other assemblies.
    pub assembly_refs: Vec<AssemblyRef>,
    /// Names of referenced unmanaged or managed modules.
    pub module_refs: Vec<String>,
    /// Generic method instantiations referenced from IL.
    pub method_specs: Vec<MethodGenericInstantiation>,

    /// Files belonging to this assembly.
    pub files: Vec<FileInfo>,
    /// Types exported from other modules of this assembly.
    pub exported_types: Vec<ExportedTypeInfo>,
    /// Manifest resources, embedded or linked.
    pub resources: Vec<ManifestResourceInfo>,

    /// Attributes applied to the assembly manifest.
    pub assembly_attributes: Vec<CustomAttribute>,
    /// Attributes applied to the module itself.
    pub module_attributes: Vec<CustomAttribute>,

    /// Entities referenced by pseudo-tokens inside method body IL.
    pub il_references: Vec<body::IlReference>,
    /// String literals referenced by pseudo-tokens inside method body IL.
    pub il_strings: Vec<String>,
    /// Standalone signatures (calli sites) referenced from IL.
    pub il_signatures: Vec<StandaloneSignature>,

    /// Edit-and-continue log entries `(token, function code)`, delta emissions only.
    pub enc_log: Vec<(u32, u32)>,
    /// Edit-and-continue token map, delta emissions only.
    pub enc_map: Vec<u32>,

    /// The method the image starts at, if the image is executable.
    pub entry_point: Option<MethodId>,
    /// Win32 resource section payload, passed through opaquely.
    pub win32_resources: Option<Vec<u8>>,
}

impl Module {
    /// Creates an empty module with the given file name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ..Module::default()
        }
    }

    /// Looks a type definition up by handle.
    #[must_use]
    pub fn type_def(&self, id: TypeDefId) -> Option<&TypeDef> {
        self.type_defs.get(id.index())
    }

    /// Looks a method definition up by handle.
    #[must_use]
    pub fn method(&self, id: MethodId) -> Option<&Method> {
        self.methods.get(id.index())
    }

    /// Looks a field definition up by handle.
    #[must_use]
    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(id.index())
    }

    /// Looks a type reference up by handle.
    #[must_use]
    pub fn type_ref(&self, id: TypeRefId) -> Option<&TypeRef> {
        self.type_refs.get(id.index())
    }

    /// Total number of source-level generic parameters on a type's enclosing chain, which is
    /// the index offset its own parameters start at in consolidated numbering.
    #[must_use]
    pub fn inherited_generic_param_count(&self, id: TypeDefId) -> u16 {
        let mut count = 0u16;
        let mut current = self.type_def(id).and_then(|def| def.enclosing);
        while let Some(enclosing_id) = current {
            let Some(enclosing) = self.type_def(enclosing_id) else {
                break;
            };
            count += enclosing.generic_params.len() as u16;
            current = enclosing.enclosing;
        }
        count
    }
}
