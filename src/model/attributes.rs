//! Custom attribute values, constants, marshalling descriptors and security declarations.

use crate::model::members::MethodRefKind;
use crate::model::types::TypeShape;

/// A compile-time constant, one `Constant` row.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    /// `bool` constant.
    Boolean(bool),
    /// `char` constant, a UTF-16 code unit.
    Char(u16),
    /// `sbyte` constant.
    SByte(i8),
    /// `byte` constant.
    Byte(u8),
    /// `short` constant.
    Int16(i16),
    /// `ushort` constant.
    UInt16(u16),
    /// `int` constant.
    Int32(i32),
    /// `uint` constant.
    UInt32(u32),
    /// `long` constant.
    Int64(i64),
    /// `ulong` constant.
    UInt64(u64),
    /// `float` constant.
    Single(f32),
    /// `double` constant.
    Double(f64),
    /// String constant, serialized as UTF-16LE.
    String(String),
    /// The null reference. Serialized with the `ELEMENT_TYPE_CLASS` type tag and a four-byte
    /// zero payload, a quirk the format requires for null constants of any reference type.
    Null,
}

impl ConstantValue {
    /// The `ELEMENT_TYPE_*` code written into the `Constant` row's type column.
    #[must_use]
    pub fn type_code(&self) -> u8 {
        match self {
            ConstantValue::Boolean(_) => 0x02,
            ConstantValue::Char(_) => 0x03,
            ConstantValue::SByte(_) => 0x04,
            ConstantValue::Byte(_) => 0x05,
            ConstantValue::Int16(_) => 0x06,
            ConstantValue::UInt16(_) => 0x07,
            ConstantValue::Int32(_) => 0x08,
            ConstantValue::UInt32(_) => 0x09,
            ConstantValue::Int64(_) => 0x0A,
            ConstantValue::UInt64(_) => 0x0B,
            ConstantValue::Single(_) => 0x0C,
            ConstantValue::Double(_) => 0x0D,
            ConstantValue::String(_) => 0x0E,
            ConstantValue::Null => 0x12,
        }
    }

    /// The `Constant` row's value blob content.
    #[must_use]
    pub fn blob_bytes(&self) -> Vec<u8> {
        match self {
            ConstantValue::Boolean(value) => vec![u8::from(*value)],
            ConstantValue::Char(value) => value.to_le_bytes().to_vec(),
            ConstantValue::SByte(value) => value.to_le_bytes().to_vec(),
            ConstantValue::Byte(value) => value.to_le_bytes().to_vec(),
            ConstantValue::Int16(value) => value.to_le_bytes().to_vec(),
            ConstantValue::UInt16(value) => value.to_le_bytes().to_vec(),
            ConstantValue::Int32(value) => value.to_le_bytes().to_vec(),
            ConstantValue::UInt32(value) => value.to_le_bytes().to_vec(),
            ConstantValue::Int64(value) => value.to_le_bytes().to_vec(),
            ConstantValue::UInt64(value) => value.to_le_bytes().to_vec(),
            ConstantValue::Single(value) => value.to_le_bytes().to_vec(),
            ConstantValue::Double(value) => value.to_le_bytes().to_vec(),
            ConstantValue::String(value) => {
                let mut bytes = Vec::with_capacity(value.len() * 2);
                for unit in value.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_le_bytes());
                }
                bytes
            }
            ConstantValue::Null => vec![0, 0, 0, 0],
        }
    }
}

/// Serialized element type of a custom attribute slot, needed where the value alone is not
/// enough: empty or null arrays, object-typed slots and named arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeElementKind {
    /// `bool` slot.
    Boolean,
    /// `char` slot.
    Char,
    /// `sbyte` slot.
    SByte,
    /// `byte` slot.
    Byte,
    /// `short` slot.
    Int16,
    /// `ushort` slot.
    UInt16,
    /// `int` slot.
    Int32,
    /// `uint` slot.
    UInt32,
    /// `long` slot.
    Int64,
    /// `ulong` slot.
    UInt64,
    /// `float` slot.
    Single,
    /// `double` slot.
    Double,
    /// String slot.
    String,
    /// `System.Type`, serialized as an assembly-qualified name string.
    Type,
    /// `object`, a boxed value prefixed with its own element kind.
    Object,
    /// An enum type, serialized as its assembly-qualified name followed by the underlying
    /// primitive value.
    Enum(TypeShape),
    /// A single-dimension array of the inner kind.
    SzArray(Box<AttributeElementKind>),
}

/// A custom attribute argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// `bool` argument.
    Boolean(bool),
    /// `char` argument, a UTF-16 code unit.
    Char(u16),
    /// `sbyte` argument.
    SByte(i8),
    /// `byte` argument.
    Byte(u8),
    /// `short` argument.
    Int16(i16),
    /// `ushort` argument.
    UInt16(u16),
    /// `int` argument.
    Int32(i32),
    /// `uint` argument.
    UInt32(u32),
    /// `long` argument.
    Int64(i64),
    /// `ulong` argument.
    UInt64(u64),
    /// `float` argument.
    Single(f32),
    /// `double` argument.
    Double(f64),
    /// `None` is the null string, serialized as the single byte 0xFF.
    String(Option<String>),
    /// A `typeof` argument; `None` is the null `System.Type`.
    Type(Option<TypeShape>),
    /// An enum value with its declaring enum type.
    Enum {
        /// The declaring enum type.
        enum_type: TypeShape,
        /// The underlying primitive value.
        value: Box<AttributeValue>,
    },
    /// An array; `None` is the null array, serialized as length 0xFFFF_FFFF.
    Array {
        /// Declared element kind.
        element: AttributeElementKind,
        /// The elements, or `None` for the null array.
        values: Option<Vec<AttributeValue>>,
    },
    /// A value in an `object`-typed slot, serialized with a leading element-kind tag.
    Boxed(Box<AttributeValue>),
}

/// A named field or property argument of a custom attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArgument {
    /// Field (`0x53`) when true, property (`0x54`) when false.
    pub is_field: bool,
    /// Name of the target field or property.
    pub name: String,
    /// Declared element kind of the target.
    pub kind: AttributeElementKind,
    /// The assigned value.
    pub value: AttributeValue,
}

/// One applied custom attribute.
#[derive(Debug, Clone)]
pub struct CustomAttribute {
    /// The attribute type's constructor.
    pub constructor: MethodRefKind,
    /// Positional constructor arguments.
    pub fixed_args: Vec<AttributeValue>,
    /// Named field and property arguments.
    pub named_args: Vec<NamedArgument>,
}

/// Marshalling information for a field or parameter, one `FieldMarshal` row.
#[derive(Debug, Clone, PartialEq)]
pub enum MarshallingDescriptor {
    /// A single `NATIVE_TYPE_*` byte.
    Simple(u8),
    /// `NATIVE_TYPE_FIXEDARRAY`: inline array of fixed length.
    FixedArray {
        /// Element count.
        length: u32,
        /// `NATIVE_TYPE_*` of the elements, if declared.
        element: Option<u8>,
    },
    /// `NATIVE_TYPE_BYVALSTR`-style fixed-length string buffer.
    FixedString {
        /// Buffer length in characters.
        length: u32,
    },
    /// `NATIVE_TYPE_ARRAY` with optional size parameter plumbing.
    Array {
        /// `NATIVE_TYPE_*` of the elements; `None` writes the `NATIVE_TYPE_MAX` placeholder.
        element: Option<u8>,
        /// 0-based parameter carrying the runtime element count.
        size_param_index: Option<u16>,
        /// Additional fixed element count on top of the size parameter.
        extra_elements: Option<u32>,
    },
    /// Custom marshaler with its type name and cookie.
    Custom {
        /// Assembly-qualified name of the marshaler type.
        marshaler_type: String,
        /// Cookie string handed to the marshaler.
        cookie: String,
    },
    /// A pre-encoded descriptor passed through untouched.
    Raw(Vec<u8>),
}

/// One security attribute inside a declarative permission set.
#[derive(Debug, Clone)]
pub struct PermissionAttribute {
    /// Assembly-qualified name of the attribute type.
    pub type_name: String,
    /// Named field and property arguments.
    pub named_arguments: Vec<NamedArgument>,
}

/// Payload flavor of a `DeclSecurity` row.
#[derive(Debug, Clone)]
pub enum PermissionSetPayload {
    /// The binary `.`-format list of permission attributes.
    Attributes(Vec<PermissionAttribute>),
    /// The legacy XML form, stored as UTF-16LE text.
    Xml(String),
}

/// A declarative security annotation, one `DeclSecurity` row.
#[derive(Debug, Clone)]
pub struct SecurityDeclaration {
    /// `SecurityAction` code, e.g. 0x08 for `Demand`.
    pub action: u16,
    /// The permission set itself.
    pub payload: PermissionSetPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_constant_encoding() {
        assert_eq!(ConstantValue::Null.type_code(), 0x12);
        assert_eq!(ConstantValue::Null.blob_bytes(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_string_constant_is_utf16() {
        let value = ConstantValue::String("Hi".to_string());
        assert_eq!(value.type_code(), 0x0E);
        assert_eq!(value.blob_bytes(), vec![0x48, 0x00, 0x69, 0x00]);
    }

    #[test]
    fn test_numeric_constants_are_little_endian() {
        assert_eq!(
            ConstantValue::Int32(0x0102_0304).blob_bytes(),
            vec![0x04, 0x03, 0x02, 0x01]
        );
        assert_eq!(ConstantValue::Boolean(true).blob_bytes(), vec![1]);
    }
}
