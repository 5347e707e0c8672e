//! The `stats` subcommand: per-command record counts and byte totals.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;

use vksnoop::reader::TraceReader;

#[derive(Default)]
struct CommandStats {
    calls: u64,
    bytes: u64,
}

pub fn run(catalog: &Path, trace: &Path) -> Result<()> {
    let catalog = super::load_catalog(catalog)?;
    let mut reader = TraceReader::new(&catalog, super::open_trace(trace)?)?;

    let mut per_command: HashMap<String, CommandStats> = HashMap::new();
    let mut undecodable = 0u64;
    let mut last_ts = 0u64;
    let mut scanned = reader.bytes_scanned();

    while let Some(item) = reader.next_call() {
        // Framing bytes of this record, whether it decoded or not.
        let size = reader.bytes_scanned() - scanned;
        scanned = reader.bytes_scanned();
        match item {
            Ok(call) => {
                let entry = per_command.entry(call.command).or_default();
                entry.calls += 1;
                entry.bytes += size;
                last_ts = last_ts.max(call.timestamp_ns);
            }
            Err(_) => undecodable += 1,
        }
    }

    let mut rows: Vec<(&String, &CommandStats)> = per_command.iter().collect();
    rows.sort_by(|a, b| b.1.calls.cmp(&a.1.calls).then(a.0.cmp(b.0)));

    println!("{:<40} {:>10} {:>12}", "COMMAND", "CALLS", "BYTES");
    for (name, stats) in rows {
        println!("{:<40} {:>10} {:>12}", name, stats.calls, stats.bytes);
    }
    println!();
    println!(
        "session {:#018x}: {} records ({} undecodable), {} bytes, {} unknown extension tags, last call at {} ns",
        reader.header().session_id,
        reader.records_scanned(),
        undecodable,
        reader.bytes_scanned(),
        reader.skipped_tags().len(),
        last_ts
    );
    Ok(())
}
