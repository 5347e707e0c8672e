//! Decode-side deserialization.
//!
//! [`Cursor`] is a bounds-checked view over a record's bytes; every read
//! that would pass the end fails with `UnexpectedEndOfStream` instead of
//! panicking or wrapping. [`Decoder`] mirrors the encoder exactly: fields
//! in declaration order, presence flags before optional slots, cross-field
//! array lengths resolved against already-decoded fields.
//!
//! Extension chains are where decode diverges from encode on purpose: a
//! node whose tag the catalog does not know is skipped over its declared
//! payload length and omitted from the output chain, so traces produced by
//! a newer API revision stay decodable. A tag the catalog *does* know but
//! that does not extend the base struct is a hard error for the record.

use crate::catalog::{ApiCatalog, LenRef, StructInfo, TypeRef, UnionInfo};
use crate::encode::resolve_len;
use crate::error::DecodeError;
use crate::format::TypeTag;
use crate::value::{ChainNode, StructValue, UnionValue, Value};

/// Bounds-checked read cursor over a byte slice.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Take the next `n` bytes, advancing the cursor.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::UnexpectedEndOfStream {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Split off a bounded sub-cursor over the next `n` bytes. The parent
    /// cursor advances past them regardless of how much the sub-cursor
    /// ends up consuming.
    pub fn sub(&mut self, n: usize) -> Result<Cursor<'a>, DecodeError> {
        Ok(Cursor::new(self.take(n)?))
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

/// Catalog-driven value decoder.
///
/// Unlike the encoder this carries state: the tags of unknown extension
/// nodes skipped since the last [`Decoder::take_skipped`], so callers can
/// report them without the skip becoming an error.
pub struct Decoder<'c> {
    catalog: &'c ApiCatalog,
    skipped: Vec<TypeTag>,
}

impl<'c> Decoder<'c> {
    pub fn new(catalog: &'c ApiCatalog) -> Self {
        Self {
            catalog,
            skipped: Vec::new(),
        }
    }

    /// Drain the unknown extension tags skipped so far.
    pub fn take_skipped(&mut self) -> Vec<TypeTag> {
        std::mem::take(&mut self.skipped)
    }

    /// Decode a standalone value of the given type.
    pub fn decode_value(
        &mut self,
        ty: &TypeRef,
        cur: &mut Cursor<'_>,
    ) -> Result<Value, DecodeError> {
        self.decode_slot(ty, false, &[], cur)
    }

    /// Decode one field or parameter slot. `prior` holds the slots already
    /// decoded in the same struct or call, for cross-field array lengths.
    pub fn decode_slot(
        &mut self,
        ty: &TypeRef,
        optional: bool,
        prior: &[(String, Value)],
        cur: &mut Cursor<'_>,
    ) -> Result<Value, DecodeError> {
        if optional {
            match cur.read_u8()? {
                0 => return Ok(Value::Null),
                1 => {}
                other => return Err(DecodeError::BadPresenceFlag(other)),
            }
        }
        let value = match ty {
            TypeRef::U8 => Value::U8(cur.read_u8()?),
            TypeRef::I8 => Value::I8(cur.read_i8()?),
            TypeRef::U16 => Value::U16(cur.read_u16()?),
            TypeRef::I16 => Value::I16(cur.read_i16()?),
            TypeRef::U32 => Value::U32(cur.read_u32()?),
            TypeRef::I32 => Value::I32(cur.read_i32()?),
            TypeRef::U64 => Value::U64(cur.read_u64()?),
            TypeRef::I64 => Value::I64(cur.read_i64()?),
            TypeRef::F32 => Value::F32(cur.read_f32()?),
            TypeRef::F64 => Value::F64(cur.read_f64()?),
            TypeRef::Bool => match cur.read_u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => return Err(DecodeError::BadBool(other)),
            },
            TypeRef::Str => {
                let len = cur.read_u32()? as usize;
                let bytes = cur.take(len)?;
                Value::Str(String::from_utf8(bytes.to_vec())?)
            }
            TypeRef::Enum(name) => {
                let info = self
                    .catalog
                    .enum_by_name(name)
                    .ok_or_else(|| DecodeError::MissingType(name.clone()))?;
                match info.width {
                    4 => Value::Enum(i64::from(cur.read_i32()?)),
                    _ => Value::Enum(cur.read_i64()?),
                }
            }
            TypeRef::Handle(_) => Value::Handle(cur.read_u64()?),
            TypeRef::Struct(name) => {
                let info = self
                    .catalog
                    .struct_by_name(name)
                    .ok_or_else(|| DecodeError::MissingType(name.clone()))?;
                Value::Struct(self.decode_struct(info, cur)?)
            }
            TypeRef::Union(name) => {
                let info = self
                    .catalog
                    .union_by_name(name)
                    .ok_or_else(|| DecodeError::MissingType(name.clone()))?;
                Value::Union(self.decode_union(info, cur)?)
            }
            TypeRef::Array { elem, len } => self.decode_array(elem, len, prior, cur)?,
        };
        Ok(value)
    }

    /// Decode a struct: extension chain first (when extensible), then every
    /// field in declaration order.
    pub fn decode_struct(
        &mut self,
        info: &StructInfo,
        cur: &mut Cursor<'_>,
    ) -> Result<StructValue, DecodeError> {
        let chain = if info.extensible {
            self.decode_chain(info, cur)?
        } else {
            Vec::new()
        };
        let mut fields: Vec<(String, Value)> = Vec::with_capacity(info.fields.len());
        for field in &info.fields {
            let value = self.decode_slot(&field.ty, field.optional, &fields, cur)?;
            fields.push((field.name.clone(), value));
        }
        Ok(StructValue {
            ty: info.name.clone(),
            chain,
            fields,
        })
    }

    /// Decode an extension chain attached to `base`.
    fn decode_chain(
        &mut self,
        base: &StructInfo,
        cur: &mut Cursor<'_>,
    ) -> Result<Vec<ChainNode>, DecodeError> {
        let count = cur.read_u32()?;
        let mut nodes = Vec::new();
        for _ in 0..count {
            let tag = cur.read_u32()?;
            let len = cur.read_u32()?;
            match self.catalog.struct_by_tag(tag) {
                None => {
                    // Produced by a newer API revision than this catalog.
                    // The length framing makes the payload safely skippable.
                    cur.take(len as usize)?;
                    tracing::debug!(tag, len, "skipping unknown extension tag");
                    self.skipped.push(tag);
                }
                Some(ext) => {
                    if !self.catalog.extension_applies(ext, &base.name) {
                        return Err(DecodeError::ExtensionNotApplicable {
                            tag,
                            base: base.name.clone(),
                        });
                    }
                    let mut sub = cur.sub(len as usize)?;
                    let value = self.decode_struct(ext, &mut sub)?;
                    if !sub.is_empty() {
                        return Err(DecodeError::ExtensionPayloadMismatch {
                            tag,
                            declared: len,
                            consumed: sub.consumed() as u32,
                        });
                    }
                    nodes.push(ChainNode { tag, value });
                }
            }
        }
        Ok(nodes)
    }

    fn decode_union(
        &mut self,
        info: &UnionInfo,
        cur: &mut Cursor<'_>,
    ) -> Result<UnionValue, DecodeError> {
        let selector = cur.read_u32()?;
        let member = info.members.get(selector as usize).ok_or_else(|| {
            DecodeError::BadUnionSelector {
                union: info.name.clone(),
                selector,
            }
        })?;
        let value = self.decode_value(&member.ty, cur)?;
        Ok(UnionValue {
            ty: info.name.clone(),
            selector,
            member: member.name.clone(),
            value: Box::new(value),
        })
    }

    fn decode_array(
        &mut self,
        elem: &TypeRef,
        len: &LenRef,
        prior: &[(String, Value)],
        cur: &mut Cursor<'_>,
    ) -> Result<Value, DecodeError> {
        let count = match len {
            LenRef::Prefixed => cur.read_u32()? as usize,
            LenRef::Fixed(n) => *n as usize,
            LenRef::Field(name) => resolve_len(prior, name)
                .ok_or_else(|| DecodeError::MissingLengthField(name.clone()))?
                as usize,
        };
        // The count is attacker-controlled; every element is at least one
        // byte, so the remaining bytes bound the allocation up front.
        let mut items = Vec::with_capacity(count.min(cur.remaining()));
        for _ in 0..count {
            items.push(self.decode_value(elem, cur)?);
        }
        Ok(Value::Array(items))
    }
}
