//! Type shapes referenced from signatures and member definitions.

use crate::model::{TypeDefId, TypeRefId};

/// Built-in CLI element types with a single-byte signature encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// `void`.
    Void,
    /// `bool`.
    Boolean,
    /// `char`.
    Char,
    /// `sbyte`.
    SByte,
    /// `byte`.
    Byte,
    /// `short`.
    Int16,
    /// `ushort`.
    UInt16,
    /// `int`.
    Int32,
    /// `uint`.
    UInt32,
    /// `long`.
    Int64,
    /// `ulong`.
    UInt64,
    /// `float`.
    Single,
    /// `double`.
    Double,
    /// `string`.
    String,
    /// `System.IntPtr`.
    IntPtr,
    /// `System.UIntPtr`.
    UIntPtr,
    /// `object`.
    Object,
    /// `System.TypedReference`.
    TypedReference,
}

impl PrimitiveKind {
    /// The `ELEMENT_TYPE_*` code this primitive serializes as.
    #[must_use]
    pub fn element_type(self) -> u8 {
        match self {
            PrimitiveKind::Void => 0x01,
            PrimitiveKind::Boolean => 0x02,
            PrimitiveKind::Char => 0x03,
            PrimitiveKind::SByte => 0x04,
            PrimitiveKind::Byte => 0x05,
            PrimitiveKind::Int16 => 0x06,
            PrimitiveKind::UInt16 => 0x07,
            PrimitiveKind::Int32 => 0x08,
            PrimitiveKind::UInt32 => 0x09,
            PrimitiveKind::Int64 => 0x0A,
            PrimitiveKind::UInt64 => 0x0B,
            PrimitiveKind::Single => 0x0C,
            PrimitiveKind::Double => 0x0D,
            PrimitiveKind::String => 0x0E,
            PrimitiveKind::TypedReference => 0x16,
            PrimitiveKind::IntPtr => 0x18,
            PrimitiveKind::UIntPtr => 0x19,
            PrimitiveKind::Object => 0x1C,
        }
    }
}

/// A custom modifier (`modreq`/`modopt`) attached to a signature position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomModifier {
    /// `modreq` when false is `modopt`.
    pub required: bool,
    /// The modifier type itself.
    pub modifier: TypeShape,
}

/// Closed sum over everything a metadata signature can denote.
///
/// Generic instantiations carry the *consolidated* argument list: for an instantiation of a
/// nested type the arguments of every enclosing container come first, outermost to innermost,
/// followed by the innermost type's own. Type parameter references likewise use consolidated
/// numbering, computed from the source-relative index plus the enclosing chain's arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeShape {
    /// A built-in element type.
    Primitive(PrimitiveKind),
    /// A type defined in this module.
    Definition(TypeDefId),
    /// A type defined in another scope.
    Reference(TypeRefId),
    /// Unmanaged pointer.
    Pointer(Box<TypeShape>),
    /// Single-dimensional zero-based array.
    SzArray(Box<TypeShape>),
    /// General array with explicit rank and optional bounds.
    Array {
        /// Element type.
        element: Box<TypeShape>,
        /// Number of dimensions.
        rank: u32,
        /// Declared sizes, one per leading dimension that has one.
        sizes: Vec<u32>,
        /// Declared lower bounds, one per leading dimension that has one.
        lower_bounds: Vec<i32>,
    },
    /// Instantiation of a generic type template with concrete arguments.
    GenericInstance {
        /// The open generic type, a [`TypeShape::Definition`] or [`TypeShape::Reference`].
        template: Box<TypeShape>,
        /// Consolidated arguments, enclosing containers first.
        arguments: Vec<TypeShape>,
    },
    /// Generic parameter of a type, by owning type and source-relative position.
    TypeParameter {
        /// The type declaring the parameter.
        owner: TypeDefId,
        /// Source-relative position among the owner's own parameters.
        index: u16,
    },
    /// Generic parameter of the enclosing method, by position.
    MethodParameter {
        /// Position in the method's parameter list.
        index: u16,
    },
    /// A type carrying a custom modifier.
    Modified {
        /// The modifier.
        modifier: Box<CustomModifier>,
        /// The type underneath it.
        unmodified: Box<TypeShape>,
    },
}

impl TypeShape {
    /// A single-dimensional zero-based array of `element`.
    #[must_use]
    pub fn szarray(element: TypeShape) -> Self {
        TypeShape::SzArray(Box::new(element))
    }

    /// An unmanaged pointer to `pointee`.
    #[must_use]
    pub fn pointer(pointee: TypeShape) -> Self {
        TypeShape::Pointer(Box::new(pointee))
    }

    /// An instantiation of `template` with the given consolidated arguments.
    #[must_use]
    pub fn generic_instance(template: TypeShape, arguments: Vec<TypeShape>) -> Self {
        TypeShape::GenericInstance {
            template: Box::new(template),
            arguments,
        }
    }

    /// Strips custom modifiers down to the underlying shape.
    #[must_use]
    pub fn without_modifiers(&self) -> &TypeShape {
        let mut current = self;
        while let TypeShape::Modified { unmodified, .. } = current {
            current = unmodified;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_element_codes() {
        assert_eq!(PrimitiveKind::Void.element_type(), 0x01);
        assert_eq!(PrimitiveKind::String.element_type(), 0x0E);
        assert_eq!(PrimitiveKind::Object.element_type(), 0x1C);
        assert_eq!(PrimitiveKind::IntPtr.element_type(), 0x18);
    }

    #[test]
    fn test_without_modifiers_unwraps_nesting() {
        let inner = TypeShape::Primitive(PrimitiveKind::Int32);
        let modified = TypeShape::Modified {
            modifier: Box::new(CustomModifier {
                required: true,
                modifier: TypeShape::Reference(TypeRefId(0)),
            }),
            unmodified: Box::new(inner.clone()),
        };
        assert_eq!(modified.without_modifiers(), &inner);
    }
}
