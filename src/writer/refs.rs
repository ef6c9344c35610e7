//! Row index assignment for references.
//!
//! ## Architecture
//!
//! Reference tables (`TypeRef`, `MemberRef`, `TypeSpec`, ...) only get rows for entities the
//! module actually reaches, in first-visit order. The walker performs that visit and mutates
//! the maps here; every later stage reads them and treats a missing entry as an
//! unresolved-reference error, which catches walker gaps instead of silently emitting a
//! dangling coded index.
//!
//! Two map flavors exist. [`ReferenceIndex`] is keyed by one value. For member references and
//! method instantiations, distinct model handles can describe the same metadata row, so
//! [`StructuralReferenceIndex`] keys each row by a structural description as well and caches
//! the resolution under the instance handle after the first lookup.

use std::collections::HashMap;
use std::hash::Hash;

use crate::metadata::tables::TableId;
use crate::model::members::{FieldRefKind, MethodRefKind, ResolutionScopeRef};
use crate::model::types::TypeShape;
use crate::model::{
    AssemblyRefId, FieldId, MemberRefId, MethodId, MethodSpecId, ModuleRefId, TypeDefId,
    TypeRefId,
};
use crate::{Error, Result};

/// Assigns 1-based rows to keys in first-add order.
#[derive(Debug)]
pub struct ReferenceIndex<K> {
    map: HashMap<K, u32>,
    rows: Vec<K>,
}

impl<K> Default for ReferenceIndex<K> {
    fn default() -> Self {
        ReferenceIndex {
            map: HashMap::new(),
            rows: Vec::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> ReferenceIndex<K> {
    /// Returns the key's row, assigning the next free one on first sight.
    pub fn get_or_add(&mut self, key: K) -> u32 {
        if let Some(row) = self.map.get(&key) {
            return *row;
        }
        self.rows.push(key.clone());
        let row = self.rows.len() as u32;
        self.map.insert(key, row);
        row
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<u32> {
        self.map.get(key).copied()
    }

    /// Keys in row order; slot `n` is row `n + 1`.
    #[must_use]
    pub fn rows(&self) -> &[K] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Assigns rows keyed both by instance handle and by structural description.
///
/// Two different handles with equal structure share one row; the second handle's resolution
/// is cached so the structural comparison runs at most once per instance.
#[derive(Debug)]
pub struct StructuralReferenceIndex<I, S> {
    instances: HashMap<I, u32>,
    structures: HashMap<S, u32>,
    rows: Vec<I>,
}

impl<I, S> Default for StructuralReferenceIndex<I, S> {
    fn default() -> Self {
        StructuralReferenceIndex {
            instances: HashMap::new(),
            structures: HashMap::new(),
            rows: Vec::new(),
        }
    }
}

impl<I: Eq + Hash + Copy, S: Eq + Hash> StructuralReferenceIndex<I, S> {
    pub fn get_or_add(&mut self, instance: I, structure: S) -> u32 {
        if let Some(row) = self.instances.get(&instance) {
            return *row;
        }
        if let Some(row) = self.structures.get(&structure) {
            self.instances.insert(instance, *row);
            return *row;
        }
        self.rows.push(instance);
        let row = self.rows.len() as u32;
        self.instances.insert(instance, row);
        self.structures.insert(structure, row);
        row
    }

    #[must_use]
    pub fn get(&self, instance: &I) -> Option<u32> {
        self.instances.get(instance).copied()
    }

    /// The first instance that produced each row, in row order.
    #[must_use]
    pub fn rows(&self) -> &[I] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Identifies one `Param` row before rows exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    /// The injected sequence-0 return pseudo-parameter.
    Return(MethodId),
    /// A real parameter, by position in [`crate::model::members::Method::params`].
    Param(MethodId, usize),
}

/// All row assignments of one emission.
///
/// Definition rows (`type_defs`, `fields`, `methods`, ...) are dense and assigned up front in
/// declaration order; reference rows accrue during the walk.
#[derive(Debug, Default)]
pub struct ModuleIndices {
    /// `TypeDef` emission order: level by level, every enclosing type ahead of the types
    /// nested inside it. Slot `n` is row `n + 1`.
    pub type_def_order: Vec<TypeDefId>,
    pub type_defs: HashMap<TypeDefId, u32>,
    pub fields: HashMap<FieldId, u32>,
    pub methods: HashMap<MethodId, u32>,
    pub params: HashMap<ParamKey, u32>,
    pub properties: HashMap<(TypeDefId, usize), u32>,
    pub events: HashMap<(TypeDefId, usize), u32>,

    pub type_refs: ReferenceIndex<TypeRefId>,
    pub type_specs: ReferenceIndex<TypeShape>,
    pub member_refs: StructuralReferenceIndex<MemberRefId, crate::model::members::MemberRef>,
    pub method_specs: StructuralReferenceIndex<MethodSpecId, (MethodRefKind, Vec<TypeShape>)>,
    pub assembly_refs: ReferenceIndex<AssemblyRefId>,
    pub module_refs: ReferenceIndex<ModuleRefId>,
    /// StandAloneSig rows, keyed by the encoded signature blob.
    pub standalone_sigs: ReferenceIndex<Vec<u8>>,
}

impl ModuleIndices {
    pub fn type_def_row(&self, id: TypeDefId) -> Result<u32> {
        self.type_defs
            .get(&id)
            .copied()
            .ok_or_else(|| Error::UnresolvedReference(format!("type definition {id:?}")))
    }

    pub fn field_row(&self, id: FieldId) -> Result<u32> {
        self.fields
            .get(&id)
            .copied()
            .ok_or_else(|| Error::UnresolvedReference(format!("field definition {id:?}")))
    }

    pub fn method_row(&self, id: MethodId) -> Result<u32> {
        self.methods
            .get(&id)
            .copied()
            .ok_or_else(|| Error::UnresolvedReference(format!("method definition {id:?}")))
    }

    pub fn type_ref_row(&self, id: TypeRefId) -> Result<u32> {
        self.type_refs
            .get(&id)
            .ok_or_else(|| Error::UnresolvedReference(format!("type reference {id:?}")))
    }

    /// Resolves a type shape into the `TypeDefOrRef` space. Definitions short-circuit to
    /// their `TypeDef` row, plain references to their `TypeRef` row, everything else goes
    /// through `TypeSpec`.
    pub fn type_def_or_ref(&self, shape: &TypeShape) -> Result<(TableId, u32)> {
        match shape {
            TypeShape::Definition(id) => Ok((TableId::TypeDef, self.type_def_row(*id)?)),
            TypeShape::Reference(id) => Ok((TableId::TypeRef, self.type_ref_row(*id)?)),
            other => self
                .type_specs
                .get(other)
                .map(|row| (TableId::TypeSpec, row))
                .ok_or_else(|| {
                    Error::UnresolvedReference(format!("type specification {other:?}"))
                }),
        }
    }

    /// Resolves a method into the `MethodDefOrRef` space.
    pub fn method_def_or_ref(&self, method: MethodRefKind) -> Result<(TableId, u32)> {
        match method {
            MethodRefKind::Definition(id) => Ok((TableId::MethodDef, self.method_row(id)?)),
            MethodRefKind::Reference(id) => self
                .member_refs
                .get(&id)
                .map(|row| (TableId::MemberRef, row))
                .ok_or_else(|| Error::UnresolvedReference(format!("member reference {id:?}"))),
        }
    }

    /// Resolves a field reference to its defining or referencing table row.
    pub fn field_def_or_ref(&self, field: FieldRefKind) -> Result<(TableId, u32)> {
        match field {
            FieldRefKind::Definition(id) => Ok((TableId::Field, self.field_row(id)?)),
            FieldRefKind::Reference(id) => self
                .member_refs
                .get(&id)
                .map(|row| (TableId::MemberRef, row))
                .ok_or_else(|| Error::UnresolvedReference(format!("member reference {id:?}"))),
        }
    }

    /// Resolves a resolution scope into its table row.
    pub fn resolution_scope(&self, scope: ResolutionScopeRef) -> Result<(TableId, u32)> {
        match scope {
            ResolutionScopeRef::CurrentModule => Ok((TableId::Module, 1)),
            ResolutionScopeRef::ModuleRef(id) => self
                .module_refs
                .get(&id)
                .map(|row| (TableId::ModuleRef, row))
                .ok_or_else(|| Error::UnresolvedReference(format!("module reference {id:?}"))),
            ResolutionScopeRef::AssemblyRef(id) => self
                .assembly_refs
                .get(&id)
                .map(|row| (TableId::AssemblyRef, row))
                .ok_or_else(|| {
                    Error::UnresolvedReference(format!("assembly reference {id:?}"))
                }),
            ResolutionScopeRef::Nested(id) => {
                Ok((TableId::TypeRef, self.type_ref_row(id)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_index_assigns_in_first_visit_order() {
        let mut index: ReferenceIndex<&str> = ReferenceIndex::default();
        assert_eq!(index.get_or_add("mscorlib"), 1);
        assert_eq!(index.get_or_add("System"), 2);
        assert_eq!(index.get_or_add("mscorlib"), 1);
        assert_eq!(index.rows(), &["mscorlib", "System"]);
    }

    #[test]
    fn test_structural_index_unifies_equal_structures() {
        let mut index: StructuralReferenceIndex<u32, (&str, &str)> =
            StructuralReferenceIndex::default();
        let first = index.get_or_add(10, ("Console", "WriteLine"));
        let second = index.get_or_add(99, ("Console", "WriteLine"));
        assert_eq!(first, second);
        assert_eq!(index.len(), 1);
        // The cached instance resolves without consulting the structural map again.
        assert_eq!(index.get(&99), Some(first));
    }

    #[test]
    fn test_structural_index_distinct_structures_get_new_rows() {
        let mut index: StructuralReferenceIndex<u32, &str> = StructuralReferenceIndex::default();
        assert_eq!(index.get_or_add(1, "a"), 1);
        assert_eq!(index.get_or_add(2, "b"), 2);
        assert_eq!(index.rows(), &[1, 2]);
    }

    #[test]
    fn test_unresolved_lookup_is_an_error() {
        let indices = ModuleIndices::default();
        assert!(indices.type_def_row(TypeDefId(0)).is_err());
        assert!(indices
            .type_def_or_ref(&TypeShape::Primitive(
                crate::model::types::PrimitiveKind::Int32
            ))
            .is_err());
    }
}
