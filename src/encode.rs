//! Encode-side serialization.
//!
//! [`Encoder`] walks the type catalog to turn runtime [`Value`]s into wire
//! bytes: fixed-width little-endian scalars, length-prefixed strings and
//! arrays, presence-flagged optionals, struct fields in declaration order,
//! and count-prefixed extension chains where each node is framed as
//! tag + payload length + payload so an older decoder can skip it.
//!
//! Encoding is strict: a value that does not match its declared type, an
//! array that disagrees with its length field, or a chain node that does
//! not extend its base struct is an error, never a silent coercion.

use crate::catalog::{ApiCatalog, LenRef, StructInfo, TypeRef, UnionInfo};
use crate::error::EncodeError;
use crate::value::{ChainNode, StructValue, UnionValue, Value};

/// Resolve a cross-field length against already-processed (name, value)
/// pairs. The latest capture of the name wins, which is what makes in/out
/// re-captures of the same parameter resolve to the value in effect.
pub(crate) fn resolve_len(prior: &[(String, Value)], name: &str) -> Option<u64> {
    prior
        .iter()
        .rev()
        .find(|(n, _)| n == name)
        .and_then(|(_, v)| v.as_uint())
}

fn mismatch(ty: &TypeRef, value: &Value) -> EncodeError {
    EncodeError::TypeMismatch {
        expected: ty.describe(),
        found: value.kind().to_string(),
    }
}

/// Catalog-driven value encoder.
pub struct Encoder<'c> {
    catalog: &'c ApiCatalog,
}

impl<'c> Encoder<'c> {
    pub fn new(catalog: &'c ApiCatalog) -> Self {
        Self { catalog }
    }

    /// Encode a standalone value of the given type.
    pub fn encode_value(
        &self,
        ty: &TypeRef,
        value: &Value,
        out: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        self.encode_slot(ty, false, value, &[], out)
    }

    /// Encode one field or parameter slot. `prior` holds the slots already
    /// encoded in the same struct or call, for cross-field array lengths.
    pub fn encode_slot(
        &self,
        ty: &TypeRef,
        optional: bool,
        value: &Value,
        prior: &[(String, Value)],
        out: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        if optional {
            if matches!(value, Value::Null) {
                out.push(0);
                return Ok(());
            }
            out.push(1);
        }
        match (ty, value) {
            (TypeRef::U8, Value::U8(v)) => out.push(*v),
            (TypeRef::I8, Value::I8(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (TypeRef::U16, Value::U16(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (TypeRef::I16, Value::I16(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (TypeRef::U32, Value::U32(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (TypeRef::I32, Value::I32(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (TypeRef::U64, Value::U64(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (TypeRef::I64, Value::I64(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (TypeRef::F32, Value::F32(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (TypeRef::F64, Value::F64(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (TypeRef::Bool, Value::Bool(v)) => out.push(u8::from(*v)),
            (TypeRef::Str, Value::Str(s)) => {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            (TypeRef::Enum(name), Value::Enum(v)) => {
                let info = self
                    .catalog
                    .enum_by_name(name)
                    .ok_or_else(|| EncodeError::MissingType(name.clone()))?;
                match info.width {
                    4 => {
                        let narrow =
                            i32::try_from(*v).map_err(|_| EncodeError::EnumOutOfRange {
                                name: name.clone(),
                                width: 4,
                                value: *v,
                            })?;
                        out.extend_from_slice(&narrow.to_le_bytes());
                    }
                    _ => out.extend_from_slice(&v.to_le_bytes()),
                }
            }
            (TypeRef::Handle(_), Value::Handle(id)) => {
                out.extend_from_slice(&id.to_le_bytes());
            }
            (TypeRef::Struct(name), Value::Struct(sv)) => {
                let info = self
                    .catalog
                    .struct_by_name(name)
                    .ok_or_else(|| EncodeError::MissingType(name.clone()))?;
                self.encode_struct(info, sv, out)?;
            }
            (TypeRef::Union(name), Value::Union(uv)) => {
                let info = self
                    .catalog
                    .union_by_name(name)
                    .ok_or_else(|| EncodeError::MissingType(name.clone()))?;
                self.encode_union(info, uv, out)?;
            }
            (TypeRef::Array { elem, len }, Value::Array(items)) => {
                self.encode_array(elem, len, items, prior, out)?;
            }
            (ty, value) => return Err(mismatch(ty, value)),
        }
        Ok(())
    }

    /// Encode a struct value: extension chain first (when the struct is
    /// extensible), then every field in declaration order.
    pub fn encode_struct(
        &self,
        info: &StructInfo,
        value: &StructValue,
        out: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        if value.ty != info.name {
            return Err(EncodeError::TypeMismatch {
                expected: format!("struct {}", info.name),
                found: format!("struct {}", value.ty),
            });
        }
        if info.extensible {
            self.encode_chain(info, &value.chain, out)?;
        } else if !value.chain.is_empty() {
            return Err(EncodeError::NotExtensible(info.name.clone()));
        }
        if value.fields.len() != info.fields.len() {
            return Err(EncodeError::FieldMismatch(info.name.clone()));
        }
        for (i, field) in info.fields.iter().enumerate() {
            let (name, v) = &value.fields[i];
            if name != &field.name {
                return Err(EncodeError::FieldMismatch(info.name.clone()));
            }
            self.encode_slot(&field.ty, field.optional, v, &value.fields[..i], out)?;
        }
        Ok(())
    }

    /// Encode an extension chain: node count, then per node the type tag,
    /// the payload byte length, and the payload. The length is patched in
    /// after the payload is encoded, since only the encoded size is
    /// authoritative.
    pub fn encode_chain(
        &self,
        base: &StructInfo,
        chain: &[ChainNode],
        out: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        out.extend_from_slice(&(chain.len() as u32).to_le_bytes());
        for node in chain {
            let ext = self
                .catalog
                .struct_by_tag(node.tag)
                .ok_or(EncodeError::UnknownTag(node.tag))?;
            if !self.catalog.extension_applies(ext, &base.name) {
                return Err(EncodeError::ExtensionNotApplicable {
                    tag: node.tag,
                    base: base.name.clone(),
                });
            }
            out.extend_from_slice(&node.tag.to_le_bytes());
            let len_pos = out.len();
            out.extend_from_slice(&0u32.to_le_bytes());
            self.encode_struct(ext, &node.value, out)?;
            let payload_len = (out.len() - len_pos - 4) as u32;
            out[len_pos..len_pos + 4].copy_from_slice(&payload_len.to_le_bytes());
        }
        Ok(())
    }

    fn encode_union(
        &self,
        info: &UnionInfo,
        value: &UnionValue,
        out: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        if value.ty != info.name {
            return Err(EncodeError::TypeMismatch {
                expected: format!("union {}", info.name),
                found: format!("union {}", value.ty),
            });
        }
        let member = info.members.get(value.selector as usize).ok_or_else(|| {
            EncodeError::BadUnionSelector {
                union: info.name.clone(),
                selector: value.selector,
            }
        })?;
        if member.name != value.member {
            return Err(EncodeError::FieldMismatch(info.name.clone()));
        }
        out.extend_from_slice(&value.selector.to_le_bytes());
        self.encode_value(&member.ty, &value.value, out)
    }

    fn encode_array(
        &self,
        elem: &TypeRef,
        len: &LenRef,
        items: &[Value],
        prior: &[(String, Value)],
        out: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        match len {
            LenRef::Prefixed => {
                out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            }
            LenRef::Fixed(expected) => {
                if items.len() != *expected as usize {
                    return Err(EncodeError::FixedArrayMismatch {
                        expected: *expected,
                        actual: items.len(),
                    });
                }
            }
            LenRef::Field(name) => {
                let expected = resolve_len(prior, name)
                    .ok_or_else(|| EncodeError::MissingLengthField(name.clone()))?;
                if items.len() as u64 != expected {
                    return Err(EncodeError::LengthFieldMismatch {
                        field: name.clone(),
                        expected,
                        actual: items.len(),
                    });
                }
            }
        }
        for item in items {
            self.encode_value(elem, item, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ApiRegistry, EnumInfo, FieldInfo, StructInfo};

    fn catalog() -> ApiCatalog {
        let registry = ApiRegistry {
            enums: vec![
                EnumInfo {
                    name: "Result".to_string(),
                    width: 4,
                },
                EnumInfo {
                    name: "Flags64".to_string(),
                    width: 8,
                },
            ],
            handles: vec!["Device".to_string()],
            structs: vec![
                StructInfo {
                    name: "CreateInfo".to_string(),
                    tag: Some(1),
                    extensible: true,
                    extends: Vec::new(),
                    fields: vec![
                        FieldInfo {
                            name: "count".to_string(),
                            ty: TypeRef::U32,
                            optional: false,
                        },
                        FieldInfo {
                            name: "values".to_string(),
                            ty: TypeRef::Array {
                                elem: Box::new(TypeRef::U32),
                                len: LenRef::Field("count".to_string()),
                            },
                            optional: false,
                        },
                    ],
                },
                StructInfo {
                    name: "ExtraInfo".to_string(),
                    tag: Some(7),
                    extensible: false,
                    extends: vec!["CreateInfo".to_string()],
                    fields: vec![FieldInfo {
                        name: "flags".to_string(),
                        ty: TypeRef::U16,
                        optional: false,
                    }],
                },
            ],
            ..Default::default()
        };
        ApiCatalog::build(registry).unwrap()
    }

    #[test]
    fn test_scalars_are_little_endian() {
        let cat = catalog();
        let enc = Encoder::new(&cat);
        let mut out = Vec::new();
        enc.encode_value(&TypeRef::U32, &Value::U32(0x0102_0304), &mut out)
            .unwrap();
        assert_eq!(out, [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let cat = catalog();
        let enc = Encoder::new(&cat);
        let mut out = Vec::new();
        enc.encode_value(&TypeRef::Str, &Value::Str("ab".to_string()), &mut out)
            .unwrap();
        assert_eq!(out, [2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_optional_presence_flags() {
        let cat = catalog();
        let enc = Encoder::new(&cat);

        let mut absent = Vec::new();
        enc.encode_slot(&TypeRef::U8, true, &Value::Null, &[], &mut absent)
            .unwrap();
        assert_eq!(absent, [0]);

        let mut present = Vec::new();
        enc.encode_slot(&TypeRef::U8, true, &Value::U8(5), &[], &mut present)
            .unwrap();
        assert_eq!(present, [1, 5]);
    }

    #[test]
    fn test_null_in_required_slot_is_an_error() {
        let cat = catalog();
        let enc = Encoder::new(&cat);
        let mut out = Vec::new();
        let err = enc
            .encode_value(&TypeRef::U32, &Value::Null, &mut out)
            .unwrap_err();
        assert!(matches!(err, EncodeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_enum_widths() {
        let cat = catalog();
        let enc = Encoder::new(&cat);

        let mut out = Vec::new();
        enc.encode_value(
            &TypeRef::Enum("Result".to_string()),
            &Value::Enum(-1),
            &mut out,
        )
        .unwrap();
        assert_eq!(out, [0xff; 4]);

        let mut wide = Vec::new();
        enc.encode_value(
            &TypeRef::Enum("Flags64".to_string()),
            &Value::Enum(1 << 40),
            &mut wide,
        )
        .unwrap();
        assert_eq!(wide.len(), 8);

        // A value that cannot survive the 4 byte width must not truncate.
        let err = enc
            .encode_value(
                &TypeRef::Enum("Result".to_string()),
                &Value::Enum(1 << 40),
                &mut Vec::new(),
            )
            .unwrap_err();
        assert!(matches!(err, EncodeError::EnumOutOfRange { width: 4, .. }));
    }

    #[test]
    fn test_struct_with_chain_framing() {
        let cat = catalog();
        let enc = Encoder::new(&cat);
        let value = StructValue::new("CreateInfo")
            .extend_with(ChainNode {
                tag: 7,
                value: StructValue::new("ExtraInfo").field("flags", Value::U16(0x0305)),
            })
            .field("count", Value::U32(0))
            .field("values", Value::Array(vec![]));

        let mut out = Vec::new();
        let info = cat.struct_by_name("CreateInfo").unwrap();
        enc.encode_struct(info, &value, &mut out).unwrap();

        #[rustfmt::skip]
        assert_eq!(out, [
            1, 0, 0, 0,       // one chain node
            7, 0, 0, 0,       // tag
            2, 0, 0, 0,       // payload length
            0x05, 0x03,       // ExtraInfo.flags
            0, 0, 0, 0,       // count = 0
                              // values: no bytes, count field gives length 0
        ]);
    }

    #[test]
    fn test_length_field_mismatch_rejected() {
        let cat = catalog();
        let enc = Encoder::new(&cat);
        let value = StructValue::new("CreateInfo")
            .field("count", Value::U32(2))
            .field("values", Value::Array(vec![Value::U32(1)]));
        let info = cat.struct_by_name("CreateInfo").unwrap();
        let err = enc
            .encode_struct(info, &value, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            EncodeError::LengthFieldMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_chain_node_must_extend_base() {
        let cat = catalog();
        let enc = Encoder::new(&cat);
        // ExtraInfo extends CreateInfo, not itself; chaining CreateInfo
        // onto CreateInfo is not declared either.
        let value = StructValue::new("CreateInfo")
            .extend_with(ChainNode {
                tag: 1,
                value: StructValue::new("CreateInfo")
                    .field("count", Value::U32(0))
                    .field("values", Value::Array(vec![])),
            })
            .field("count", Value::U32(0))
            .field("values", Value::Array(vec![]));
        let info = cat.struct_by_name("CreateInfo").unwrap();
        let err = enc
            .encode_struct(info, &value, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            EncodeError::ExtensionNotApplicable { tag: 1, .. }
        ));
    }

    #[test]
    fn test_fixed_array_length_enforced() {
        let cat = catalog();
        let enc = Encoder::new(&cat);
        let ty = TypeRef::Array {
            elem: Box::new(TypeRef::U8),
            len: LenRef::Fixed(4),
        };
        let err = enc
            .encode_value(
                &ty,
                &Value::Array(vec![Value::U8(1), Value::U8(2)]),
                &mut Vec::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EncodeError::FixedArrayMismatch {
                expected: 4,
                actual: 2
            }
        ));
    }
}
