//! Decode-side record scanning.
//!
//! [`TraceReader`] walks a capture stream record by record. Each record is
//! sliced out of the stream by its length prefix *before* any decoding
//! happens, so a record that fails to decode (unknown command id, short
//! field, bad flag byte) costs exactly that record: the error is returned
//! to the caller and the next `next_call` picks up at the following
//! record. Only stream-level truncation and I/O failures end the scan.

use std::io::Read;

use crate::catalog::{ApiCatalog, Direction};
use crate::decode::{Cursor, Decoder};
use crate::error::DecodeError;
use crate::format::{try_read_exact, CommandId, StreamHeader, TypeTag, RECORD_HEADER_BYTES};
use crate::value::Value;

/// One fully decoded API call.
#[derive(Clone, Debug, PartialEq)]
pub struct CallRecord {
    pub command_id: CommandId,
    pub command: String,
    /// Process-local id of the thread that issued the call.
    pub thread_id: u64,
    /// Nanoseconds since the capture session started.
    pub timestamp_ns: u64,
    /// Pre-call values of input-direction parameters, in declaration order.
    pub inputs: Vec<(String, Value)>,
    /// Post-call values of output-direction parameters, in declaration
    /// order. An in/out parameter appears in both lists.
    pub outputs: Vec<(String, Value)>,
    /// Return value, absent for commands that return nothing.
    pub ret: Option<Value>,
}

/// Streaming reader over a capture stream.
pub struct TraceReader<'c, R: Read> {
    catalog: &'c ApiCatalog,
    source: R,
    header: StreamHeader,
    records: u64,
    bytes: u64,
    /// Unknown extension tags skipped so far, with the index of the record
    /// they appeared in.
    skipped_tags: Vec<(u64, TypeTag)>,
    done: bool,
}

impl<'c, R: Read> TraceReader<'c, R> {
    /// Open a capture stream, reading and checking the stream header.
    pub fn new(catalog: &'c ApiCatalog, mut source: R) -> Result<Self, DecodeError> {
        let header = StreamHeader::read_from(&mut source)?;
        Ok(Self {
            catalog,
            source,
            header,
            records: 0,
            bytes: 16,
            skipped_tags: Vec::new(),
            done: false,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Records scanned so far, decodable or not.
    pub fn records_scanned(&self) -> u64 {
        self.records
    }

    /// Stream bytes consumed so far, including framing.
    pub fn bytes_scanned(&self) -> u64 {
        self.bytes
    }

    /// Unknown extension tags skipped so far as (record index, tag) pairs.
    pub fn skipped_tags(&self) -> &[(u64, TypeTag)] {
        &self.skipped_tags
    }

    /// Scan the next record.
    ///
    /// Returns `None` at a clean end of stream. An `Err` item reports a
    /// failure confined to one record; the scan continues at the next
    /// record afterwards, except for stream truncation or I/O errors,
    /// which end it.
    pub fn next_call(&mut self) -> Option<Result<CallRecord, DecodeError>> {
        if self.done {
            return None;
        }

        let mut len_buf = [0u8; 4];
        match try_read_exact(&mut self.source, &mut len_buf) {
            Ok(0) => {
                self.done = true;
                return None;
            }
            Ok(4) => {}
            Ok(n) => {
                self.done = true;
                self.records += 1;
                return Some(Err(DecodeError::UnexpectedEndOfStream {
                    needed: 4,
                    available: n,
                }));
            }
            Err(e) => {
                self.done = true;
                self.records += 1;
                return Some(Err(e.into()));
            }
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut record = vec![0u8; len];
        match try_read_exact(&mut self.source, &mut record) {
            Ok(n) if n == len => {}
            Ok(n) => {
                // The stream ends inside this record; there is no frame
                // boundary left to resynchronize on.
                self.done = true;
                self.records += 1;
                return Some(Err(DecodeError::UnexpectedEndOfStream {
                    needed: len,
                    available: n,
                }));
            }
            Err(e) => {
                self.done = true;
                self.records += 1;
                return Some(Err(e.into()));
            }
        }

        let index = self.records;
        self.records += 1;
        self.bytes += 4 + len as u64;
        Some(self.decode_record(index, &record))
    }

    fn decode_record(&mut self, index: u64, record: &[u8]) -> Result<CallRecord, DecodeError> {
        let mut cur = Cursor::new(record);
        let command_id = cur.read_u32()?;
        let thread_id = cur.read_u64()?;
        let timestamp_ns = cur.read_u64()?;
        debug_assert!(cur.consumed() == RECORD_HEADER_BYTES);

        let command = self
            .catalog
            .command_by_id(command_id)
            .ok_or(DecodeError::UnknownCommandId(command_id))?;

        let mut dec = Decoder::new(self.catalog);
        // `seen` accumulates every decoded slot in wire order so later
        // arrays can resolve cross-field lengths, including an output
        // array sized by an input count.
        let mut seen: Vec<(String, Value)> = Vec::new();

        let mut inputs = Vec::new();
        for param in command
            .params
            .iter()
            .filter(|p| matches!(p.direction, Direction::In | Direction::InOut))
        {
            let value = dec.decode_slot(&param.ty, param.optional, &seen, &mut cur)?;
            inputs.push((param.name.clone(), value.clone()));
            seen.push((param.name.clone(), value));
        }

        let mut outputs = Vec::new();
        for param in command
            .params
            .iter()
            .filter(|p| matches!(p.direction, Direction::Out | Direction::InOut))
        {
            let value = dec.decode_slot(&param.ty, param.optional, &seen, &mut cur)?;
            outputs.push((param.name.clone(), value.clone()));
            seen.push((param.name.clone(), value));
        }

        let ret = match &command.ret {
            Some(ty) => Some(dec.decode_slot(ty, false, &seen, &mut cur)?),
            None => None,
        };

        if !cur.is_empty() {
            return Err(DecodeError::TrailingBytes(cur.remaining()));
        }

        for tag in dec.take_skipped() {
            tracing::warn!(record = index, tag, "record carried unknown extension tag");
            self.skipped_tags.push((index, tag));
        }

        Ok(CallRecord {
            command_id,
            command: command.name.clone(),
            thread_id,
            timestamp_ns,
            inputs,
            outputs,
            ret,
        })
    }
}
