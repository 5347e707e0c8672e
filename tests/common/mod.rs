//! Shared catalog fixtures for the integration tests.
//!
//! `full_catalog` models a miniature graphics API: instance lifetime
//! commands whose create-info struct is extensible, one extension struct
//! for debug configuration, one for frame timing, and a small arithmetic
//! command. `old_catalog` is the same API one revision earlier, before the
//! frame timing extension existed, for forward-compatibility tests.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use vksnoop::catalog::{
    ApiCatalog, ApiRegistry, CommandInfo, Direction, EnumInfo, FieldInfo, LenRef, ParamInfo,
    StructInfo, TypeRef,
};

pub const TIMING_TAG: u32 = 2000;

fn base_registry() -> ApiRegistry {
    ApiRegistry {
        enums: vec![EnumInfo {
            name: "Result".to_string(),
            width: 4,
        }],
        handles: vec!["Instance".to_string()],
        structs: vec![
            StructInfo {
                name: "InstanceCreateInfo".to_string(),
                tag: Some(1),
                extensible: true,
                extends: Vec::new(),
                fields: vec![
                    FieldInfo {
                        name: "app_name".to_string(),
                        ty: TypeRef::Str,
                        optional: false,
                    },
                    FieldInfo {
                        name: "app_version".to_string(),
                        ty: TypeRef::U32,
                        optional: false,
                    },
                    FieldInfo {
                        name: "layer_count".to_string(),
                        ty: TypeRef::U32,
                        optional: false,
                    },
                    FieldInfo {
                        name: "layers".to_string(),
                        ty: TypeRef::Array {
                            elem: Box::new(TypeRef::Str),
                            len: LenRef::Field("layer_count".to_string()),
                        },
                        optional: false,
                    },
                ],
            },
            StructInfo {
                name: "DebugInfo".to_string(),
                tag: Some(100),
                extensible: false,
                extends: vec!["InstanceCreateInfo".to_string()],
                fields: vec![
                    FieldInfo {
                        name: "severity".to_string(),
                        ty: TypeRef::U32,
                        optional: false,
                    },
                    FieldInfo {
                        name: "verbose".to_string(),
                        ty: TypeRef::Bool,
                        optional: false,
                    },
                ],
            },
        ],
        commands: vec![
            CommandInfo {
                name: "createInstance".to_string(),
                id: 1,
                params: vec![
                    ParamInfo {
                        name: "info".to_string(),
                        ty: TypeRef::Struct("InstanceCreateInfo".to_string()),
                        direction: Direction::In,
                        optional: false,
                    },
                    ParamInfo {
                        name: "instance".to_string(),
                        ty: TypeRef::Handle("Instance".to_string()),
                        direction: Direction::Out,
                        optional: false,
                    },
                ],
                ret: Some(TypeRef::Enum("Result".to_string())),
            },
            CommandInfo {
                name: "destroyInstance".to_string(),
                id: 2,
                params: vec![ParamInfo {
                    name: "instance".to_string(),
                    ty: TypeRef::Handle("Instance".to_string()),
                    direction: Direction::In,
                    optional: false,
                }],
                ret: None,
            },
            CommandInfo {
                name: "addValues".to_string(),
                id: 40,
                params: vec![
                    ParamInfo {
                        name: "a".to_string(),
                        ty: TypeRef::U32,
                        direction: Direction::In,
                        optional: false,
                    },
                    ParamInfo {
                        name: "b".to_string(),
                        ty: TypeRef::U32,
                        direction: Direction::In,
                        optional: false,
                    },
                    ParamInfo {
                        name: "sum".to_string(),
                        ty: TypeRef::U32,
                        direction: Direction::Out,
                        optional: false,
                    },
                ],
                ret: None,
            },
        ],
        ..Default::default()
    }
}

/// The current API revision, frame timing extension included.
pub fn full_catalog() -> ApiCatalog {
    let mut registry = base_registry();
    registry.structs.push(StructInfo {
        name: "FrameTimingInfo".to_string(),
        tag: Some(TIMING_TAG),
        extensible: false,
        extends: vec!["InstanceCreateInfo".to_string()],
        fields: vec![FieldInfo {
            name: "interval_ns".to_string(),
            ty: TypeRef::U64,
            optional: false,
        }],
    });
    ApiCatalog::build(registry).unwrap()
}

/// The previous API revision: it has never heard of frame timing.
pub fn old_catalog() -> ApiCatalog {
    ApiCatalog::build(base_registry()).unwrap()
}
