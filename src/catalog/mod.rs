//! The API type catalog.
//!
//! [`ApiCatalog`] is the validated, indexed form of a registry description.
//! Both codec sides walk it: the encoder to lay out fields in declaration
//! order, the decoder to reconstruct them, and the extension-chain routines
//! to resolve a type tag to a structure (or establish that the tag is
//! unknown and its payload must be skipped).
//!
//! Validation happens once, in [`ApiCatalog::build`]. In particular every
//! cross-field array length is checked to name an earlier, non-optional,
//! unsigned integer field in wire order, so the codec itself never has to
//! re-derive or re-order anything at runtime.

mod model;

pub use model::{
    ApiRegistry, CommandInfo, Direction, EnumInfo, FieldInfo, LenRef, ParamInfo, StructInfo,
    TypeRef, UnionInfo, UnionMember,
};

use std::collections::HashMap;

use anyhow::Context;

use crate::error::CatalogError;
use crate::format::{CommandId, TypeTag};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TypeKind {
    Enum,
    Handle,
    Union,
    Struct,
}

/// Validated, indexed API description.
#[derive(Debug)]
pub struct ApiCatalog {
    registry: ApiRegistry,
    struct_index: HashMap<String, usize>,
    tag_index: HashMap<TypeTag, usize>,
    enum_index: HashMap<String, usize>,
    union_index: HashMap<String, usize>,
    command_index: HashMap<CommandId, usize>,
    command_names: HashMap<String, usize>,
}

impl ApiCatalog {
    /// Validate a registry description and build the lookup indexes.
    pub fn build(registry: ApiRegistry) -> Result<Self, CatalogError> {
        // All type names share one namespace.
        let mut kinds: HashMap<String, TypeKind> = HashMap::new();
        let mut claim = |name: &str, kind: TypeKind| -> Result<(), CatalogError> {
            if kinds.insert(name.to_string(), kind).is_some() {
                return Err(CatalogError::DuplicateName(name.to_string()));
            }
            Ok(())
        };
        for e in &registry.enums {
            claim(&e.name, TypeKind::Enum)?;
        }
        for h in &registry.handles {
            claim(h, TypeKind::Handle)?;
        }
        for u in &registry.unions {
            claim(&u.name, TypeKind::Union)?;
        }
        for s in &registry.structs {
            claim(&s.name, TypeKind::Struct)?;
        }

        for e in &registry.enums {
            if e.width != 4 && e.width != 8 {
                return Err(CatalogError::BadEnumWidth {
                    name: e.name.clone(),
                    width: e.width,
                });
            }
        }

        for u in &registry.unions {
            let mut seen = HashMap::new();
            for m in &u.members {
                if seen.insert(m.name.as_str(), ()).is_some() {
                    return Err(CatalogError::DuplicateField {
                        owner: u.name.clone(),
                        name: m.name.clone(),
                    });
                }
                check_typeref(&kinds, &u.name, &m.ty, false)?;
            }
        }

        let mut struct_index = HashMap::new();
        let mut tag_index: HashMap<TypeTag, usize> = HashMap::new();
        for (idx, s) in registry.structs.iter().enumerate() {
            struct_index.insert(s.name.clone(), idx);
            if let Some(tag) = s.tag {
                if let Some(&prev) = tag_index.get(&tag) {
                    return Err(CatalogError::DuplicateTag {
                        tag,
                        first: registry.structs[prev].name.clone(),
                        second: s.name.clone(),
                    });
                }
                tag_index.insert(tag, idx);
            }
            validate_struct(&kinds, s)?;
        }

        // The extends relation can only be checked once every struct is known.
        for s in &registry.structs {
            for base in &s.extends {
                let Some(&base_idx) = struct_index.get(base) else {
                    return Err(CatalogError::UnknownBase {
                        child: s.name.clone(),
                        base: base.clone(),
                    });
                };
                if !registry.structs[base_idx].extensible {
                    return Err(CatalogError::BaseNotExtensible {
                        child: s.name.clone(),
                        base: base.clone(),
                    });
                }
                if s.tag.is_none() {
                    return Err(CatalogError::UntaggedExtension {
                        child: s.name.clone(),
                        base: base.clone(),
                    });
                }
            }
        }

        let mut command_index: HashMap<CommandId, usize> = HashMap::new();
        let mut command_names = HashMap::new();
        for (idx, c) in registry.commands.iter().enumerate() {
            if let Some(&prev) = command_index.get(&c.id) {
                return Err(CatalogError::DuplicateCommandId {
                    id: c.id,
                    first: registry.commands[prev].name.clone(),
                    second: c.name.clone(),
                });
            }
            if command_names.insert(c.name.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateName(c.name.clone()));
            }
            command_index.insert(c.id, idx);
            validate_command(&kinds, c)?;
        }

        let enum_index = registry
            .enums
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        let union_index = registry
            .unions
            .iter()
            .enumerate()
            .map(|(i, u)| (u.name.clone(), i))
            .collect();

        Ok(Self {
            registry,
            struct_index,
            tag_index,
            enum_index,
            union_index,
            command_index,
            command_names,
        })
    }

    /// Load and validate a registry description from its JSON form.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let registry: ApiRegistry =
            serde_json::from_str(json).context("Failed to parse registry JSON")?;
        Ok(Self::build(registry).context("Registry description failed validation")?)
    }

    pub fn struct_by_name(&self, name: &str) -> Option<&StructInfo> {
        self.struct_index
            .get(name)
            .map(|&i| &self.registry.structs[i])
    }

    /// Resolve an extension chain tag to its structure, if the tag is known
    /// to this catalog.
    pub fn struct_by_tag(&self, tag: TypeTag) -> Option<&StructInfo> {
        self.tag_index.get(&tag).map(|&i| &self.registry.structs[i])
    }

    /// Whether `ext` may legally be chained onto the named base struct.
    pub fn extension_applies(&self, ext: &StructInfo, base: &str) -> bool {
        ext.extends.iter().any(|b| b == base)
    }

    pub fn enum_by_name(&self, name: &str) -> Option<&EnumInfo> {
        self.enum_index.get(name).map(|&i| &self.registry.enums[i])
    }

    pub fn union_by_name(&self, name: &str) -> Option<&UnionInfo> {
        self.union_index
            .get(name)
            .map(|&i| &self.registry.unions[i])
    }

    pub fn is_handle_type(&self, name: &str) -> bool {
        self.registry.handles.iter().any(|h| h == name)
    }

    pub fn command_by_id(&self, id: CommandId) -> Option<&CommandInfo> {
        self.command_index
            .get(&id)
            .map(|&i| &self.registry.commands[i])
    }

    pub fn command_by_name(&self, name: &str) -> Option<&CommandInfo> {
        self.command_names
            .get(name)
            .map(|&i| &self.registry.commands[i])
    }

    pub fn commands(&self) -> &[CommandInfo] {
        &self.registry.commands
    }

    pub fn structs(&self) -> &[StructInfo] {
        &self.registry.structs
    }
}

/// Check a type reference against the declared type names. `field_len`
/// permits a top-level `LenRef::Field`; it never propagates into element
/// types, where a cross-field count has no field list to refer to.
fn check_typeref(
    kinds: &HashMap<String, TypeKind>,
    owner: &str,
    ty: &TypeRef,
    field_len: bool,
) -> Result<(), CatalogError> {
    let check_named = |name: &str, want: TypeKind| -> Result<(), CatalogError> {
        match kinds.get(name) {
            Some(&kind) if kind == want => Ok(()),
            _ => Err(CatalogError::UnknownType {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
        }
    };
    match ty {
        TypeRef::Enum(name) => check_named(name, TypeKind::Enum),
        TypeRef::Handle(name) => check_named(name, TypeKind::Handle),
        TypeRef::Struct(name) => check_named(name, TypeKind::Struct),
        TypeRef::Union(name) => check_named(name, TypeKind::Union),
        TypeRef::Array { elem, len } => {
            if matches!(len, LenRef::Field(_)) && !field_len {
                // Reported by the caller with the proper field context when
                // field_len is true; here it is simply an illegal position.
                return Err(CatalogError::BadLengthRef {
                    owner: owner.to_string(),
                    field: "<element>".to_string(),
                    len_field: match len {
                        LenRef::Field(f) => f.clone(),
                        _ => unreachable!(),
                    },
                });
            }
            check_typeref(kinds, owner, elem, false)
        }
        _ => Ok(()),
    }
}

/// A cross-field length must name an earlier slot that is a required
/// unsigned integer.
fn length_field_ok(earlier: &[(&str, &TypeRef, bool)], len_field: &str) -> bool {
    earlier
        .iter()
        .any(|(name, ty, optional)| *name == len_field && ty.is_uint() && !optional)
}

fn validate_struct(
    kinds: &HashMap<String, TypeKind>,
    s: &StructInfo,
) -> Result<(), CatalogError> {
    let mut earlier: Vec<(&str, &TypeRef, bool)> = Vec::new();
    for f in &s.fields {
        if earlier.iter().any(|(name, _, _)| *name == f.name) {
            return Err(CatalogError::DuplicateField {
                owner: s.name.clone(),
                name: f.name.clone(),
            });
        }
        check_typeref(kinds, &s.name, &f.ty, true)?;
        if let TypeRef::Array {
            len: LenRef::Field(len_field),
            ..
        } = &f.ty
        {
            if !length_field_ok(&earlier, len_field) {
                return Err(CatalogError::BadLengthRef {
                    owner: s.name.clone(),
                    field: f.name.clone(),
                    len_field: len_field.clone(),
                });
            }
        }
        earlier.push((f.name.as_str(), &f.ty, f.optional));
    }
    Ok(())
}

fn validate_command(
    kinds: &HashMap<String, TypeKind>,
    c: &CommandInfo,
) -> Result<(), CatalogError> {
    let mut seen = HashMap::new();
    for p in &c.params {
        if seen.insert(p.name.as_str(), ()).is_some() {
            return Err(CatalogError::DuplicateField {
                owner: c.name.clone(),
                name: p.name.clone(),
            });
        }
        check_typeref(kinds, &c.name, &p.ty, true)?;
    }
    if let Some(ret) = &c.ret {
        check_typeref(kinds, &c.name, ret, false)?;
    }

    // Length references are resolved against capture order: input-direction
    // parameters travel before output-direction ones regardless of where
    // they sit in the declaration.
    let wire_order: Vec<&ParamInfo> = c
        .params
        .iter()
        .filter(|p| matches!(p.direction, Direction::In | Direction::InOut))
        .chain(
            c.params
                .iter()
                .filter(|p| matches!(p.direction, Direction::Out | Direction::InOut)),
        )
        .collect();
    let mut earlier: Vec<(&str, &TypeRef, bool)> = Vec::new();
    for p in wire_order {
        if let TypeRef::Array {
            len: LenRef::Field(len_field),
            ..
        } = &p.ty
        {
            if !length_field_ok(&earlier, len_field) {
                return Err(CatalogError::BadLengthRef {
                    owner: c.name.clone(),
                    field: p.name.clone(),
                    len_field: len_field.clone(),
                });
            }
        }
        earlier.push((p.name.as_str(), &p.ty, p.optional));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_field(name: &str) -> FieldInfo {
        FieldInfo {
            name: name.to_string(),
            ty: TypeRef::U32,
            optional: false,
        }
    }

    fn plain_struct(name: &str, fields: Vec<FieldInfo>) -> StructInfo {
        StructInfo {
            name: name.to_string(),
            tag: None,
            extensible: false,
            extends: Vec::new(),
            fields,
        }
    }

    #[test]
    fn test_build_indexes_commands_and_tags() {
        let registry = ApiRegistry {
            structs: vec![
                StructInfo {
                    name: "CreateInfo".to_string(),
                    tag: Some(1),
                    extensible: true,
                    extends: Vec::new(),
                    fields: vec![u32_field("count")],
                },
                StructInfo {
                    name: "ExtraInfo".to_string(),
                    tag: Some(2),
                    extensible: false,
                    extends: vec!["CreateInfo".to_string()],
                    fields: vec![u32_field("flags")],
                },
            ],
            commands: vec![CommandInfo {
                name: "createThing".to_string(),
                id: 17,
                params: vec![ParamInfo {
                    name: "info".to_string(),
                    ty: TypeRef::Struct("CreateInfo".to_string()),
                    direction: Direction::In,
                    optional: false,
                }],
                ret: None,
            }],
            ..Default::default()
        };
        let catalog = ApiCatalog::build(registry).unwrap();

        assert_eq!(catalog.struct_by_tag(2).unwrap().name, "ExtraInfo");
        assert!(catalog.struct_by_tag(3).is_none());
        assert_eq!(catalog.command_by_id(17).unwrap().name, "createThing");
        let ext = catalog.struct_by_name("ExtraInfo").unwrap();
        assert!(catalog.extension_applies(ext, "CreateInfo"));
        assert!(!catalog.extension_applies(ext, "ExtraInfo"));
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let registry = ApiRegistry {
            structs: vec![
                StructInfo {
                    tag: Some(5),
                    ..plain_struct("A", vec![])
                },
                StructInfo {
                    tag: Some(5),
                    ..plain_struct("B", vec![])
                },
            ],
            ..Default::default()
        };
        assert!(matches!(
            ApiCatalog::build(registry),
            Err(CatalogError::DuplicateTag { tag: 5, .. })
        ));
    }

    #[test]
    fn test_duplicate_command_id_rejected() {
        let cmd = |name: &str| CommandInfo {
            name: name.to_string(),
            id: 9,
            params: Vec::new(),
            ret: None,
        };
        let registry = ApiRegistry {
            commands: vec![cmd("a"), cmd("b")],
            ..Default::default()
        };
        assert!(matches!(
            ApiCatalog::build(registry),
            Err(CatalogError::DuplicateCommandId { id: 9, .. })
        ));
    }

    #[test]
    fn test_extends_must_name_extensible_struct() {
        let registry = ApiRegistry {
            structs: vec![
                plain_struct("Base", vec![]),
                StructInfo {
                    tag: Some(1),
                    extends: vec!["Base".to_string()],
                    ..plain_struct("Ext", vec![])
                },
            ],
            ..Default::default()
        };
        assert!(matches!(
            ApiCatalog::build(registry),
            Err(CatalogError::BaseNotExtensible { .. })
        ));
    }

    #[test]
    fn test_extension_struct_requires_tag() {
        let registry = ApiRegistry {
            structs: vec![
                StructInfo {
                    extensible: true,
                    ..plain_struct("Base", vec![])
                },
                StructInfo {
                    extends: vec!["Base".to_string()],
                    ..plain_struct("Ext", vec![])
                },
            ],
            ..Default::default()
        };
        assert!(matches!(
            ApiCatalog::build(registry),
            Err(CatalogError::UntaggedExtension { .. })
        ));
    }

    #[test]
    fn test_length_field_must_come_first() {
        // The array is declared before the field that holds its count, so
        // in-order decoding could never resolve it.
        let registry = ApiRegistry {
            structs: vec![plain_struct(
                "Backwards",
                vec![
                    FieldInfo {
                        name: "values".to_string(),
                        ty: TypeRef::Array {
                            elem: Box::new(TypeRef::U32),
                            len: LenRef::Field("count".to_string()),
                        },
                        optional: false,
                    },
                    u32_field("count"),
                ],
            )],
            ..Default::default()
        };
        assert!(matches!(
            ApiCatalog::build(registry),
            Err(CatalogError::BadLengthRef { .. })
        ));
    }

    #[test]
    fn test_length_field_in_declaration_order_accepted() {
        let registry = ApiRegistry {
            structs: vec![plain_struct(
                "Forwards",
                vec![
                    u32_field("count"),
                    FieldInfo {
                        name: "values".to_string(),
                        ty: TypeRef::Array {
                            elem: Box::new(TypeRef::U32),
                            len: LenRef::Field("count".to_string()),
                        },
                        optional: false,
                    },
                ],
            )],
            ..Default::default()
        };
        assert!(ApiCatalog::build(registry).is_ok());
    }

    #[test]
    fn test_out_array_may_reference_in_count() {
        let registry = ApiRegistry {
            commands: vec![CommandInfo {
                name: "enumerateThings".to_string(),
                id: 1,
                params: vec![
                    ParamInfo {
                        name: "things".to_string(),
                        ty: TypeRef::Array {
                            elem: Box::new(TypeRef::U64),
                            len: LenRef::Field("count".to_string()),
                        },
                        direction: Direction::Out,
                        optional: false,
                    },
                    ParamInfo {
                        name: "count".to_string(),
                        ty: TypeRef::U32,
                        direction: Direction::In,
                        optional: false,
                    },
                ],
                ret: None,
            }],
            ..Default::default()
        };
        // Output parameters travel after every input parameter, so the
        // count is available even though it is declared second.
        assert!(ApiCatalog::build(registry).is_ok());
    }

    #[test]
    fn test_unknown_type_reference_rejected() {
        let registry = ApiRegistry {
            structs: vec![plain_struct(
                "Broken",
                vec![FieldInfo {
                    name: "nested".to_string(),
                    ty: TypeRef::Struct("Nope".to_string()),
                    optional: false,
                }],
            )],
            ..Default::default()
        };
        assert!(matches!(
            ApiCatalog::build(registry),
            Err(CatalogError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_enum_width_must_be_4_or_8() {
        let registry = ApiRegistry {
            enums: vec![EnumInfo {
                name: "Weird".to_string(),
                width: 3,
            }],
            ..Default::default()
        };
        assert!(matches!(
            ApiCatalog::build(registry),
            Err(CatalogError::BadEnumWidth { width: 3, .. })
        ));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "enums": [{ "name": "Result" }],
            "handles": ["Device"],
            "structs": [
                {
                    "name": "Limits",
                    "fields": [
                        { "name": "max_width", "ty": "u32" },
                        { "name": "device", "ty": { "handle": "Device" }, "optional": true }
                    ]
                }
            ],
            "commands": [
                {
                    "name": "getLimits",
                    "id": 3,
                    "params": [
                        { "name": "limits", "ty": { "struct": "Limits" }, "direction": "out" }
                    ],
                    "ret": { "enum": "Result" }
                }
            ]
        }"#;
        let catalog = ApiCatalog::from_json(json).unwrap();
        assert!(catalog.is_handle_type("Device"));
        assert_eq!(catalog.enum_by_name("Result").unwrap().width, 4);
        assert_eq!(catalog.command_by_name("getLimits").unwrap().id, 3);
    }
}
