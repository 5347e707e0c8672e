//! Registry description records.
//!
//! These structs are the in-memory form of the registry output the external
//! front end produces: commands with ordered parameters, structures with
//! ordered typed fields, enumerations, unions, and handle types. They carry
//! serde derives so a registry description can be loaded from JSON; the
//! validated, indexed form lives in [`super::ApiCatalog`].

use serde::{Deserialize, Serialize};

use crate::format::{CommandId, TypeTag};

/// Reference to a wire type, either primitive or by catalog name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
    /// Length-prefixed UTF-8 string.
    Str,
    Enum(String),
    Handle(String),
    Struct(String),
    Union(String),
    Array { elem: Box<TypeRef>, len: LenRef },
}

impl TypeRef {
    /// Short human name for error messages.
    pub fn describe(&self) -> String {
        match self {
            TypeRef::U8 => "u8".to_string(),
            TypeRef::I8 => "i8".to_string(),
            TypeRef::U16 => "u16".to_string(),
            TypeRef::I16 => "i16".to_string(),
            TypeRef::U32 => "u32".to_string(),
            TypeRef::I32 => "i32".to_string(),
            TypeRef::U64 => "u64".to_string(),
            TypeRef::I64 => "i64".to_string(),
            TypeRef::F32 => "f32".to_string(),
            TypeRef::F64 => "f64".to_string(),
            TypeRef::Bool => "bool".to_string(),
            TypeRef::Str => "string".to_string(),
            TypeRef::Enum(name) => format!("enum {name}"),
            TypeRef::Handle(name) => format!("handle {name}"),
            TypeRef::Struct(name) => format!("struct {name}"),
            TypeRef::Union(name) => format!("union {name}"),
            TypeRef::Array { elem, .. } => format!("array of {}", elem.describe()),
        }
    }

    /// True for the unsigned integer types usable as length fields.
    pub fn is_uint(&self) -> bool {
        matches!(
            self,
            TypeRef::U8 | TypeRef::U16 | TypeRef::U32 | TypeRef::U64
        )
    }
}

/// How an array's element count is determined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LenRef {
    /// Count travels on the wire immediately before the elements.
    Prefixed,
    /// Count is a constant fixed by the API.
    Fixed(u32),
    /// Count is the value of an earlier field or parameter of the same
    /// struct or command.
    Field(String),
}

/// One field of a structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub ty: TypeRef,
    /// Optional-pointer field: a one-byte presence flag precedes the value
    /// on the wire and the value may be absent.
    #[serde(default)]
    pub optional: bool,
}

/// A structure: ordered fields plus its role in extension chains.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructInfo {
    pub name: String,
    /// Stable chain discriminant. Present iff the struct can appear as an
    /// extension chain node.
    #[serde(default)]
    pub tag: Option<TypeTag>,
    /// Struct carries an extension-chain slot of its own.
    #[serde(default)]
    pub extensible: bool,
    /// Base structs this struct may be chained onto.
    #[serde(default)]
    pub extends: Vec<String>,
    pub fields: Vec<FieldInfo>,
}

/// Parameter direction relative to the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
    /// Captured twice: input value before the call, output value after.
    InOut,
}

/// One parameter of a command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub name: String,
    pub ty: TypeRef,
    pub direction: Direction,
    #[serde(default)]
    pub optional: bool,
}

/// A command: stable id, ordered parameters, optional return type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub name: String,
    pub id: CommandId,
    pub params: Vec<ParamInfo>,
    /// None means the command returns nothing.
    #[serde(default)]
    pub ret: Option<TypeRef>,
}

fn default_enum_width() -> u8 {
    4
}

/// An enumeration. Membership is deliberately not modeled: unknown values
/// pass through the codec unchanged so newer traces stay decodable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumInfo {
    pub name: String,
    /// Wire width in bytes, 4 or 8.
    #[serde(default = "default_enum_width")]
    pub width: u8,
}

/// One member of a union.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnionMember {
    pub name: String,
    pub ty: TypeRef,
}

/// A union: exactly one member is active, selected on the wire by index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnionInfo {
    pub name: String,
    pub members: Vec<UnionMember>,
}

/// Unvalidated registry description as produced by the external front end
/// (or built programmatically). [`super::ApiCatalog::build`] validates and
/// indexes it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiRegistry {
    #[serde(default)]
    pub enums: Vec<EnumInfo>,
    #[serde(default)]
    pub handles: Vec<String>,
    #[serde(default)]
    pub unions: Vec<UnionInfo>,
    #[serde(default)]
    pub structs: Vec<StructInfo>,
    #[serde(default)]
    pub commands: Vec<CommandInfo>,
}
