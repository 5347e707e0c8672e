//! Runtime value model.
//!
//! These types sit between the codec and the consumers: the capture side
//! builds them from live call arguments, the decode side reconstructs them
//! from the stream, and consumers receive them fully formed. They are
//! format-agnostic; the wire layout is the codec's business.

use std::fmt;

use crate::format::{HandleId, TypeTag};

/// A single decoded (or to-be-encoded) value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    /// Enumeration value by its underlying integer. Unknown members pass
    /// through unchanged.
    Enum(i64),
    /// Opaque handle by its capture-assigned id.
    Handle(HandleId),
    Array(Vec<Value>),
    Struct(StructValue),
    Union(UnionValue),
    /// An optional-pointer slot with nothing behind it.
    Null,
}

impl Value {
    /// Variant name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::U8(_) => "u8",
            Value::I8(_) => "i8",
            Value::U16(_) => "u16",
            Value::I16(_) => "i16",
            Value::U32(_) => "u32",
            Value::I32(_) => "i32",
            Value::U64(_) => "u64",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Enum(_) => "enum",
            Value::Handle(_) => "handle",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Union(_) => "union",
            Value::Null => "null",
        }
    }

    /// The value as an unsigned integer, for length-field resolution.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(u64::from(*v)),
            Value::U16(v) => Some(u64::from(*v)),
            Value::U32(v) => Some(u64::from(*v)),
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }
}

/// A structure value: named fields in declaration order, plus the extension
/// chain for extensible structs.
#[derive(Clone, Debug, PartialEq)]
pub struct StructValue {
    /// Catalog name of the structure type.
    pub ty: String,
    /// Extension chain nodes in wire order. Always empty for structs that
    /// are not extensible.
    pub chain: Vec<ChainNode>,
    /// (field name, value) pairs in declaration order.
    pub fields: Vec<(String, Value)>,
}

impl StructValue {
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            chain: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn extend_with(mut self, node: ChainNode) -> Self {
        self.chain.push(node);
        self
    }

    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// One node of an extension chain: the type tag and the decoded payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainNode {
    pub tag: TypeTag,
    pub value: StructValue,
}

/// A union value: which member is active and its value.
#[derive(Clone, Debug, PartialEq)]
pub struct UnionValue {
    /// Catalog name of the union type.
    pub ty: String,
    /// Index of the active member; this is what travels on the wire.
    pub selector: u32,
    /// Name of the active member, for display.
    pub member: String,
    pub value: Box<Value>,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U8(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "\"{}\"", v.escape_debug()),
            Value::Enum(v) => write!(f, "{v}"),
            Value::Handle(id) => write!(f, "{id:#x}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Struct(sv) => write!(f, "{sv}"),
            Value::Union(uv) => write!(f, "{}.{}={}", uv.ty, uv.member, uv.value),
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl fmt::Display for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.ty)?;
        let mut first = true;
        if !self.chain.is_empty() {
            write!(f, " pNext: [")?;
            for (i, node) in self.chain.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", node.value)?;
            }
            write!(f, "]")?;
            first = false;
        }
        for (name, value) in &self.fields {
            if !first {
                write!(f, ",")?;
            }
            write!(f, " {name}: {value}")?;
            first = false;
        }
        write!(f, " }}")
    }
}
