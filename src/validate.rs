//! Trace validation module.
//!
//! Scans an entire capture stream against a catalog and collects every
//! problem instead of stopping at the first: undecodable records are
//! errors, unknown extension tags skipped during decode are warnings
//! (they are expected when the trace came from a newer API revision).

use std::fmt;
use std::io::Read;

use crate::catalog::ApiCatalog;
use crate::error::DecodeError;
use crate::format::TypeTag;
use crate::reader::TraceReader;

/// A record that could not be decoded.
#[derive(Debug)]
pub struct ValidationError {
    /// Index of the record in the stream.
    pub record: u64,
    pub error: DecodeError,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: {}", self.record, self.error)
    }
}

/// An extension tag the catalog does not know, skipped during decode.
#[derive(Debug)]
pub struct ValidationWarning {
    pub record: u64,
    pub tag: TypeTag,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record {}: skipped unknown extension tag {}",
            self.record, self.tag
        )
    }
}

/// Result of validating a trace.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Records scanned, decodable or not.
    pub records: u64,
    /// Errors that indicate undecodable trace data.
    pub errors: Vec<ValidationError>,
    /// Warnings that indicate version skew, not corruption.
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Returns true if there are any validation errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if there are any validation warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Returns true if the trace is valid (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Decode every record of a capture stream, collecting all errors and
/// warnings. Fails outright only when the stream header itself is
/// unreadable, since nothing past it could be framed.
pub fn validate_stream<R: Read>(
    catalog: &ApiCatalog,
    source: R,
) -> Result<ValidationResult, DecodeError> {
    let mut reader = TraceReader::new(catalog, source)?;
    let mut result = ValidationResult::default();

    while let Some(item) = reader.next_call() {
        if let Err(error) = item {
            result.errors.push(ValidationError {
                record: reader.records_scanned().saturating_sub(1),
                error,
            });
        }
    }

    result.records = reader.records_scanned();
    result.warnings = reader
        .skipped_tags()
        .iter()
        .map(|&(record, tag)| ValidationWarning { record, tag })
        .collect();
    Ok(result)
}
