//! Error types for the capture codec.
//!
//! The split mirrors the two sides of the codec: `EncodeError` for the
//! capture path, `DecodeError` for the scan path, plus `CatalogError` for
//! registry validation. Decode errors are scoped to a single record; the
//! record length prefix lets the scanner resynchronize and keep going, so
//! none of them (except stream-level truncation and I/O) are fatal for the
//! stream as a whole.

use thiserror::Error;

use crate::format::{CommandId, TypeTag};

/// Failure while decoding a stream, a record, or a value.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of stream: needed {needed} bytes, {available} available")]
    UnexpectedEndOfStream { needed: usize, available: usize },

    #[error("no decoder registered for command id {0}")]
    UnknownCommandId(CommandId),

    #[error("extension tag {tag} does not extend struct {base}")]
    ExtensionNotApplicable { tag: TypeTag, base: String },

    #[error("extension tag {tag} declared a {declared} byte payload but decoding consumed {consumed}")]
    ExtensionPayloadMismatch {
        tag: TypeTag,
        declared: u32,
        consumed: u32,
    },

    #[error("presence flag must be 0 or 1, found {0:#04x}")]
    BadPresenceFlag(u8),

    #[error("bool byte must be 0 or 1, found {0:#04x}")]
    BadBool(u8),

    #[error("string is not valid UTF-8")]
    BadString(#[from] std::string::FromUtf8Error),

    #[error("union {union} selector {selector} is out of range")]
    BadUnionSelector { union: String, selector: u32 },

    #[error("catalog names missing type {0}")]
    MissingType(String),

    #[error("length field {0} was not decoded before the array that uses it")]
    MissingLengthField(String),

    #[error("record contains {0} undecoded trailing bytes")]
    TrailingBytes(usize),

    #[error("stream does not begin with the capture magic")]
    BadMagic,

    #[error("unsupported stream format version {0}")]
    UnsupportedVersion(u16),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure while encoding a value or capturing a call.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("value of kind {found} does not match declared type {expected}")]
    TypeMismatch { expected: String, found: String },

    #[error("struct {0} has a different field list than its descriptor")]
    FieldMismatch(String),

    #[error("field {field} declares length {expected} but the array holds {actual} elements")]
    LengthFieldMismatch {
        field: String,
        expected: u64,
        actual: usize,
    },

    #[error("array is fixed at {expected} elements but holds {actual}")]
    FixedArrayMismatch { expected: u32, actual: usize },

    #[error("length field {0} was not captured before the array that uses it")]
    MissingLengthField(String),

    #[error("enum value {value} does not fit the {width} byte wire width of {name}")]
    EnumOutOfRange { name: String, width: u8, value: i64 },

    #[error("union {union} selector {selector} is out of range")]
    BadUnionSelector { union: String, selector: u32 },

    #[error("no command named {0} in the catalog")]
    UnknownCommand(String),

    #[error("no structure registered for extension tag {0}")]
    UnknownTag(TypeTag),

    #[error("extension tag {tag} does not extend struct {base}")]
    ExtensionNotApplicable { tag: TypeTag, base: String },

    #[error("struct {0} is not extensible but a chain was supplied")]
    NotExtensible(String),

    #[error("catalog names missing type {0}")]
    MissingType(String),

    #[error("call capture is in the {found} phase, expected {expected}")]
    Phase {
        expected: &'static str,
        found: &'static str,
    },

    #[error("command {command} takes {expected} {direction} arguments, {got} were captured")]
    ArgumentCount {
        command: String,
        direction: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("command {0} returns a value but none was captured")]
    MissingReturn(String),

    #[error("command {0} returns nothing but a return value was captured")]
    UnexpectedReturn(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure while validating a registry description into a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate type name {0}")]
    DuplicateName(String),

    #[error("duplicate field or parameter {name} in {owner}")]
    DuplicateField { owner: String, name: String },

    #[error("structure tag {tag} is claimed by both {first} and {second}")]
    DuplicateTag {
        tag: TypeTag,
        first: String,
        second: String,
    },

    #[error("command id {id} is claimed by both {first} and {second}")]
    DuplicateCommandId {
        id: CommandId,
        first: String,
        second: String,
    },

    #[error("{owner} references unknown type {name}")]
    UnknownType { owner: String, name: String },

    #[error("struct {child} extends {base}, which does not exist")]
    UnknownBase { child: String, base: String },

    #[error("struct {child} extends {base}, which is not extensible")]
    BaseNotExtensible { child: String, base: String },

    #[error("struct {child} extends {base} but carries no type tag")]
    UntaggedExtension { child: String, base: String },

    #[error("array {field} in {owner} takes its length from {len_field}, which must be an earlier unsigned integer field")]
    BadLengthRef {
        owner: String,
        field: String,
        len_field: String,
    },

    #[error("enum {name} has wire width {width}, only 4 and 8 are supported")]
    BadEnumWidth { name: String, width: u8 },
}

/// A consumer entry point failed while handling a record. Dispatch keeps
/// going; the failure is reported to the caller instead of aborting.
#[derive(Debug, Error)]
#[error("consumer {consumer} failed: {reason:#}")]
pub struct ConsumerError {
    pub consumer: String,
    pub reason: anyhow::Error,
}
