//! The `validate` subcommand: decode everything, report every problem,
//! fail the process if any record was undecodable.

use std::path::Path;

use anyhow::{bail, Result};

use vksnoop::validate::validate_stream;

pub fn run(catalog: &Path, trace: &Path) -> Result<()> {
    let catalog = super::load_catalog(catalog)?;
    let result = validate_stream(&catalog, super::open_trace(trace)?)?;

    for warning in &result.warnings {
        println!("warning: {warning}");
    }
    for error in &result.errors {
        println!("error: {error}");
    }
    println!(
        "{} records scanned, {} errors, {} warnings",
        result.records,
        result.errors.len(),
        result.warnings.len()
    );

    if result.has_errors() {
        bail!("trace failed validation");
    }
    Ok(())
}
