//! Consumer dispatch layer.
//!
//! This module provides the abstraction between the decoder and whatever
//! wants the decoded calls. The [`CallConsumer`] trait lets the scanner
//! hand each reconstructed [`CallRecord`] to any number of registered
//! implementations without knowing what they do with it:
//!
//! - Format-agnostic consumption: consumers see values, not wire bytes
//! - Ordered fan-out: consumers run in registration order, every record
//! - Isolation: one consumer failing never starves the others, and never
//!   aborts the scan; failures are collected and reported, not dropped
//!
//! Consumers receive records strictly in stream order, one at a time. The
//! record order carries meaning (timestamps, handle lifetimes), so records
//! are never dispatched out of order or concurrently with each other.

mod ascii;
mod replay;

pub use ascii::AsciiConsumer;
pub use replay::{ReplayBackend, ReplayCall, ReplayConsumer, ReplayOutcome};

use std::io::Read;

use anyhow::Result;

use crate::error::{ConsumerError, DecodeError};
use crate::format::{StreamHeader, TypeTag};
use crate::reader::{CallRecord, TraceReader};

/// A pluggable handler for decoded call records.
pub trait CallConsumer: Send {
    /// Name used when reporting this consumer's failures.
    fn name(&self) -> &str;

    /// Called once before the first record of a stream.
    fn begin_stream(&mut self, _header: &StreamHeader) -> Result<()> {
        Ok(())
    }

    /// Called for every decoded call record, in stream order.
    fn handle_call(&mut self, call: &CallRecord) -> Result<()>;

    /// Called once after the last record of a stream.
    fn end_stream(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Identifier returned by [`ConsumerSet::register`], usable to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConsumerId(u64);

/// Ordered registry of consumers.
#[derive(Default)]
pub struct ConsumerSet {
    consumers: Vec<(ConsumerId, Box<dyn CallConsumer>)>,
    next_id: u64,
}

impl ConsumerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a consumer at the end of the dispatch order.
    pub fn register(&mut self, consumer: Box<dyn CallConsumer>) -> ConsumerId {
        let id = ConsumerId(self.next_id);
        self.next_id += 1;
        self.consumers.push((id, consumer));
        id
    }

    /// Remove a consumer, returning it if it was registered.
    pub fn unregister(&mut self, id: ConsumerId) -> Option<Box<dyn CallConsumer>> {
        let pos = self.consumers.iter().position(|(cid, _)| *cid == id)?;
        Some(self.consumers.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    fn fan_out(
        &mut self,
        mut call: impl FnMut(&mut Box<dyn CallConsumer>) -> Result<()>,
    ) -> Vec<ConsumerError> {
        let mut errors = Vec::new();
        for (_, consumer) in &mut self.consumers {
            if let Err(reason) = call(consumer) {
                let error = ConsumerError {
                    consumer: consumer.name().to_string(),
                    reason,
                };
                tracing::warn!(consumer = %error.consumer, "consumer failed: {:#}", error.reason);
                errors.push(error);
            }
        }
        errors
    }

    /// Notify every consumer of the stream start, in registration order.
    pub fn begin_stream(&mut self, header: &StreamHeader) -> Vec<ConsumerError> {
        self.fan_out(|c| c.begin_stream(header))
    }

    /// Dispatch one record to every consumer in registration order. A
    /// failing consumer is reported and skipped over, never letting it
    /// block the consumers after it.
    pub fn dispatch(&mut self, call: &CallRecord) -> Vec<ConsumerError> {
        self.fan_out(|c| c.handle_call(call))
    }

    /// Notify every consumer of the stream end, in registration order.
    pub fn end_stream(&mut self) -> Vec<ConsumerError> {
        self.fan_out(|c| c.end_stream())
    }
}

/// Everything that went wrong (and how much went right) while pumping one
/// stream through a consumer set. Nothing in here was silently dropped
/// during the scan; this is the caller's complete account.
#[derive(Debug, Default)]
pub struct StreamSummary {
    /// Records scanned, including ones that failed to decode.
    pub records: u64,
    /// Per-record decode failures, by record index.
    pub decode_errors: Vec<(u64, DecodeError)>,
    /// Consumer failures, by record index (`u64::MAX` for stream begin/end
    /// notifications).
    pub consumer_errors: Vec<(u64, ConsumerError)>,
    /// Unknown extension tags skipped during decoding, by record index.
    pub skipped_tags: Vec<(u64, TypeTag)>,
}

impl StreamSummary {
    /// True when every record decoded and every consumer succeeded.
    /// Skipped unknown extension tags do not count against cleanliness.
    pub fn is_clean(&self) -> bool {
        self.decode_errors.is_empty() && self.consumer_errors.is_empty()
    }
}

/// Scan an entire stream, dispatching every decodable record to the
/// consumer set and accounting for every failure along the way.
pub fn dispatch_stream<R: Read>(
    reader: &mut TraceReader<'_, R>,
    consumers: &mut ConsumerSet,
) -> StreamSummary {
    let mut summary = StreamSummary::default();

    let header = *reader.header();
    for error in consumers.begin_stream(&header) {
        summary.consumer_errors.push((u64::MAX, error));
    }

    while let Some(result) = reader.next_call() {
        let index = reader.records_scanned().saturating_sub(1);
        match result {
            Ok(call) => {
                for error in consumers.dispatch(&call) {
                    summary.consumer_errors.push((index, error));
                }
            }
            Err(error) => summary.decode_errors.push((index, error)),
        }
    }

    for error in consumers.end_stream() {
        summary.consumer_errors.push((u64::MAX, error));
    }

    summary.records = reader.records_scanned();
    summary.skipped_tags = reader.skipped_tags().to_vec();
    summary
}
