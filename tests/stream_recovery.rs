//! Tests for the scanner's recovery behavior: records that cannot be
//! decoded must cost exactly one record, and version-skewed extension
//! chains must degrade to the known nodes instead of failing.

mod common;

use common::{full_catalog, old_catalog, TIMING_TAG};
use vksnoop::capture::{CallCapture, TraceWriter};
use vksnoop::error::DecodeError;
use vksnoop::format::StreamHeader;
use vksnoop::reader::TraceReader;
use vksnoop::validate::validate_stream;
use vksnoop::value::{ChainNode, StructValue, Value};

/// Create-info whose chain carries both a debug node and a frame timing
/// node; only the newest catalog revision knows the latter.
fn chained_info() -> StructValue {
    StructValue::new("InstanceCreateInfo")
        .extend_with(ChainNode {
            tag: 100,
            value: StructValue::new("DebugInfo")
                .field("severity", Value::U32(1))
                .field("verbose", Value::Bool(false)),
        })
        .extend_with(ChainNode {
            tag: TIMING_TAG,
            value: StructValue::new("FrameTimingInfo").field("interval_ns", Value::U64(16_666_667)),
        })
        .field("app_name", Value::Str("demo".to_string()))
        .field("app_version", Value::U32(1))
        .field("layer_count", Value::U32(0))
        .field("layers", Value::Array(vec![]))
}

fn stream_with_chained_create() -> Vec<u8> {
    let catalog = full_catalog();
    let writer = TraceWriter::new(Vec::new()).unwrap();
    let mut call = CallCapture::begin(&catalog, &writer, "createInstance").unwrap();
    call.argument(&Value::Struct(chained_info())).unwrap();
    call.invoked().unwrap();
    call.output(&Value::Handle(1)).unwrap();
    call.returns(&Value::Enum(0)).unwrap();
    call.finish().unwrap();
    writer.into_inner().unwrap()
}

#[test]
fn test_newer_catalog_decodes_full_chain() {
    let catalog = full_catalog();
    let bytes = stream_with_chained_create();
    let mut reader = TraceReader::new(&catalog, bytes.as_slice()).unwrap();

    let call = reader.next_call().unwrap().unwrap();
    let Value::Struct(info) = &call.inputs[0].1 else {
        panic!("expected struct input");
    };
    assert_eq!(info.chain.len(), 2);
    assert_eq!(info.chain[0].tag, 100);
    assert_eq!(info.chain[1].tag, TIMING_TAG);
    assert!(reader.skipped_tags().is_empty());
}

#[test]
fn test_older_catalog_skips_unknown_extension() {
    let catalog = old_catalog();
    let bytes = stream_with_chained_create();
    let mut reader = TraceReader::new(&catalog, bytes.as_slice()).unwrap();

    // The record still decodes; the unknown node is simply absent.
    let call = reader.next_call().unwrap().unwrap();
    let Value::Struct(info) = &call.inputs[0].1 else {
        panic!("expected struct input");
    };
    assert_eq!(info.chain.len(), 1);
    assert_eq!(info.chain[0].tag, 100);
    assert_eq!(
        info.chain[0].value.get("severity"),
        Some(&Value::U32(1))
    );
    // The base struct fields survived the skip intact.
    assert_eq!(info.get("app_name"), Some(&Value::Str("demo".to_string())));

    // The skip is reported, not swallowed.
    assert_eq!(reader.skipped_tags(), &[(0, TIMING_TAG)]);
}

#[test]
fn test_unknown_command_of_declared_length_40_is_skipped() {
    let catalog = full_catalog();

    let mut bytes = Vec::new();
    StreamHeader::new(7).write_to(&mut bytes).unwrap();

    // 40 byte record for a command id nothing registered a decoder for.
    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&0xdddd_ddddu32.to_le_bytes());
    bytes.extend_from_slice(&[0x5a; 36]);

    // Followed by a well-formed addValues record captured normally.
    let tail = {
        let writer = TraceWriter::new(Vec::new()).unwrap();
        let mut call = CallCapture::begin(&catalog, &writer, "addValues").unwrap();
        call.argument(&Value::U32(7)).unwrap();
        call.argument(&Value::U32(12)).unwrap();
        call.invoked().unwrap();
        call.output(&Value::U32(19)).unwrap();
        call.finish().unwrap();
        writer.into_inner().unwrap()
    };
    bytes.extend_from_slice(&tail[16..]);

    let mut reader = TraceReader::new(&catalog, bytes.as_slice()).unwrap();

    // The unknown record is an error for that record only.
    let err = reader.next_call().unwrap().unwrap_err();
    assert!(matches!(err, DecodeError::UnknownCommandId(0xdddd_dddd)));

    // The cursor landed exactly on the next record.
    let call = reader.next_call().unwrap().unwrap();
    assert_eq!(call.command, "addValues");
    assert_eq!(call.inputs[0].1, Value::U32(7));
    assert_eq!(call.inputs[1].1, Value::U32(12));
    assert_eq!(call.outputs[0].1, Value::U32(19));
    assert!(reader.next_call().is_none());
}

#[test]
fn test_validate_reports_errors_and_warnings() {
    // A stream whose first record carries an unknown extension (a warning
    // under the old catalog) and whose second record is garbage.
    let mut bytes = stream_with_chained_create();
    bytes.extend_from_slice(&6u32.to_le_bytes());
    bytes.extend_from_slice(&[0xff; 6]);

    let result = validate_stream(&old_catalog(), bytes.as_slice()).unwrap();
    assert_eq!(result.records, 2);
    assert!(result.has_errors());
    assert!(result.has_warnings());
    assert!(!result.is_valid());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].record, 1);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].tag, TIMING_TAG);

    // The same stream under the full catalog: still one error, no warning.
    let result = validate_stream(&full_catalog(), bytes.as_slice()).unwrap();
    assert_eq!(result.errors.len(), 1);
    assert!(!result.has_warnings());
}

#[test]
fn test_stream_truncated_inside_a_record_ends_the_scan() {
    let bytes = stream_with_chained_create();
    let cut = &bytes[..bytes.len() - 5];

    let catalog = full_catalog();
    let mut reader = TraceReader::new(&catalog, cut).unwrap();
    let err = reader.next_call().unwrap().unwrap_err();
    assert!(matches!(err, DecodeError::UnexpectedEndOfStream { .. }));
    assert!(reader.next_call().is_none());
}
