//! Textual dump consumer.

use std::io::Write;

use anyhow::{Context, Result};

use crate::consumer::CallConsumer;
use crate::reader::CallRecord;

/// Renders every call record as a single text line:
/// `command(arg=value, ...) = return`. Input arguments come first, then
/// the post-call values of output arguments, in declaration order.
pub struct AsciiConsumer<W: Write + Send> {
    sink: W,
    show_thread: bool,
    lines: u64,
}

impl<W: Write + Send> AsciiConsumer<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            show_thread: false,
            lines: 0,
        }
    }

    /// Prefix every line with `[thread @ timestamp]`.
    pub fn with_thread_info(mut self) -> Self {
        self.show_thread = true;
        self
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Format one call record as its dump line, without a trailing newline.
pub fn format_call(call: &CallRecord) -> String {
    let mut line = String::new();
    line.push_str(&call.command);
    line.push('(');
    let mut first = true;
    for (name, value) in call.inputs.iter().chain(call.outputs.iter()) {
        if !first {
            line.push_str(", ");
        }
        line.push_str(name);
        line.push('=');
        line.push_str(&value.to_string());
        first = false;
    }
    line.push(')');
    if let Some(ret) = &call.ret {
        line.push_str(" = ");
        line.push_str(&ret.to_string());
    }
    line
}

impl<W: Write + Send> CallConsumer for AsciiConsumer<W> {
    fn name(&self) -> &str {
        "ascii"
    }

    fn handle_call(&mut self, call: &CallRecord) -> Result<()> {
        if self.show_thread {
            write!(
                self.sink,
                "[{} @ {}ns] ",
                call.thread_id, call.timestamp_ns
            )
            .context("Failed to write dump line")?;
        }
        writeln!(self.sink, "{}", format_call(call)).context("Failed to write dump line")?;
        self.lines += 1;
        Ok(())
    }

    fn end_stream(&mut self) -> Result<()> {
        self.sink.flush().context("Failed to flush dump output")?;
        Ok(())
    }
}
