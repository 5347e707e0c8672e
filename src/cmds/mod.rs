//! CLI subcommand implementations.

pub mod dump;
pub mod stats;
pub mod validate;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};

use vksnoop::catalog::ApiCatalog;

/// Load and validate a registry description from a JSON file.
pub fn load_catalog(path: &Path) -> Result<ApiCatalog> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    ApiCatalog::from_json(&json)
}

/// Open a capture stream for buffered reading.
pub fn open_trace(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open trace {}", path.display()))?;
    Ok(BufReader::new(file))
}
