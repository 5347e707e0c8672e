//! The `dump` subcommand: decode a capture stream and render every call
//! as one text line, optionally filtered by command name.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

use vksnoop::consumer::{dispatch_stream, AsciiConsumer, CallConsumer, ConsumerSet};
use vksnoop::reader::{CallRecord, TraceReader};

/// Ascii dump gated by a command-name filter.
struct FilteredDump<W: Write + Send> {
    inner: AsciiConsumer<W>,
    filter: Option<Regex>,
}

impl<W: Write + Send> CallConsumer for FilteredDump<W> {
    fn name(&self) -> &str {
        "dump"
    }

    fn begin_stream(&mut self, header: &vksnoop::format::StreamHeader) -> Result<()> {
        self.inner.begin_stream(header)
    }

    fn handle_call(&mut self, call: &CallRecord) -> Result<()> {
        if let Some(filter) = &self.filter {
            if !filter.is_match(&call.command) {
                return Ok(());
            }
        }
        self.inner.handle_call(call)
    }

    fn end_stream(&mut self) -> Result<()> {
        self.inner.end_stream()
    }
}

pub fn run(
    catalog: &Path,
    trace: &Path,
    filter: Option<&str>,
    output: Option<&Path>,
    thread_info: bool,
) -> Result<()> {
    let catalog = super::load_catalog(catalog)?;
    let filter = filter
        .map(Regex::new)
        .transpose()
        .context("Invalid --filter regex")?;

    let sink: Box<dyn Write + Send> = match output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let mut ascii = AsciiConsumer::new(sink);
    if thread_info {
        ascii = ascii.with_thread_info();
    }

    let mut consumers = ConsumerSet::new();
    consumers.register(Box::new(FilteredDump {
        inner: ascii,
        filter,
    }));

    let mut reader = TraceReader::new(&catalog, super::open_trace(trace)?)?;
    let summary = dispatch_stream(&mut reader, &mut consumers);

    for (record, error) in &summary.decode_errors {
        eprintln!("record {record}: {error}");
    }
    for (record, error) in &summary.consumer_errors {
        eprintln!("record {record}: {error}");
    }
    eprintln!(
        "{} records, {} undecodable, {} unknown extension tags skipped",
        summary.records,
        summary.decode_errors.len(),
        summary.skipped_tags.len()
    );
    Ok(())
}
