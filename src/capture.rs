//! Encode-side call capture.
//!
//! [`TraceWriter`] owns the shared capture sink. Any thread may capture
//! calls concurrently; each call buffers its whole record privately in a
//! [`CallCapture`] and only [`CallCapture::finish`] takes the writer lock,
//! so the stream can never contain an interleaved or partially written
//! record. Nothing in the pre/post phases touches the sink.
//!
//! A capture runs through three phases:
//!
//! 1. pre-call: input-direction arguments, in declaration order
//! 2. post-call (entered by `invoked()`): output-direction arguments in
//!    declaration order, then the return value
//! 3. `finish()`: length-prefix + record written to the stream as one unit
//!
//! Dropping a [`CallCapture`] without calling `finish` writes nothing,
//! which is exactly what an interrupted call should leave behind.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::catalog::{ApiCatalog, CommandInfo, Direction, ParamInfo};
use crate::encode::Encoder;
use crate::error::EncodeError;
use crate::format::{current_thread_id, StreamHeader};
use crate::value::Value;

/// Shared, thread-safe writer for one capture session.
pub struct TraceWriter<W: Write> {
    header: StreamHeader,
    sink: Mutex<W>,
    start: Instant,
    records: AtomicU64,
}

impl<W: Write> TraceWriter<W> {
    /// Start a capture session on `sink`, writing the stream header
    /// immediately. The session id is random.
    pub fn new(mut sink: W) -> std::io::Result<Self> {
        let header = StreamHeader::new(rand::random());
        header.write_to(&mut sink)?;
        Ok(Self {
            header,
            sink: Mutex::new(sink),
            start: Instant::now(),
            records: AtomicU64::new(0),
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn session_id(&self) -> u64 {
        self.header.session_id
    }

    /// Nanoseconds since the session started.
    pub fn timestamp_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    pub fn records_written(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.sink.lock().unwrap().flush()
    }

    /// Flush and hand back the sink, ending the session.
    pub fn into_inner(self) -> std::io::Result<W> {
        let mut sink = self.sink.into_inner().unwrap();
        sink.flush()?;
        Ok(sink)
    }

    /// Write one complete, already-encoded record. The length prefix and
    /// the record body go out under a single lock acquisition.
    fn write_record(&self, record: &[u8]) -> std::io::Result<()> {
        let mut sink = self.sink.lock().unwrap();
        sink.write_all(&(record.len() as u32).to_le_bytes())?;
        sink.write_all(record)?;
        self.records.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Pre,
    Post,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Pre => "pre-call",
            Phase::Post => "post-call",
        }
    }
}

/// In-flight capture of a single call. Lives on the calling thread; the
/// shared stream is only touched by [`CallCapture::finish`].
pub struct CallCapture<'a, W: Write> {
    writer: &'a TraceWriter<W>,
    catalog: &'a ApiCatalog,
    command: &'a CommandInfo,
    phase: Phase,
    /// Record bytes after the length prefix.
    buf: Vec<u8>,
    /// Every argument captured so far, latest last, for cross-field
    /// array length resolution.
    seen: Vec<(String, Value)>,
    next_pre: usize,
    next_post: usize,
    ret_captured: bool,
}

impl<'a, W: Write> CallCapture<'a, W> {
    /// Begin capturing the named command. Stamps the calling thread's id
    /// and the session-relative timestamp into the record header.
    pub fn begin(
        catalog: &'a ApiCatalog,
        writer: &'a TraceWriter<W>,
        command: &str,
    ) -> Result<Self, EncodeError> {
        let command = catalog
            .command_by_name(command)
            .ok_or_else(|| EncodeError::UnknownCommand(command.to_string()))?;
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&command.id.to_le_bytes());
        buf.extend_from_slice(&current_thread_id().to_le_bytes());
        buf.extend_from_slice(&writer.timestamp_ns().to_le_bytes());
        Ok(Self {
            writer,
            catalog,
            command,
            phase: Phase::Pre,
            buf,
            seen: Vec::new(),
            next_pre: 0,
            next_post: 0,
            ret_captured: false,
        })
    }

    pub fn command(&self) -> &CommandInfo {
        self.command
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), EncodeError> {
        if self.phase != expected {
            return Err(EncodeError::Phase {
                expected: expected.name(),
                found: self.phase.name(),
            });
        }
        Ok(())
    }

    fn pre_params(&self) -> Vec<&'a ParamInfo> {
        self.command
            .params
            .iter()
            .filter(|p| matches!(p.direction, Direction::In | Direction::InOut))
            .collect()
    }

    fn post_params(&self) -> Vec<&'a ParamInfo> {
        self.command
            .params
            .iter()
            .filter(|p| matches!(p.direction, Direction::Out | Direction::InOut))
            .collect()
    }

    fn capture(&mut self, param: &ParamInfo, value: &Value) -> Result<(), EncodeError> {
        Encoder::new(self.catalog).encode_slot(
            &param.ty,
            param.optional,
            value,
            &self.seen,
            &mut self.buf,
        )?;
        self.seen.push((param.name.clone(), value.clone()));
        Ok(())
    }

    /// Capture the next input-direction argument (pre-call values of `In`
    /// and `InOut` parameters, in declaration order).
    pub fn argument(&mut self, value: &Value) -> Result<(), EncodeError> {
        self.expect_phase(Phase::Pre)?;
        let pre = self.pre_params();
        let param = pre.get(self.next_pre).copied().ok_or_else(|| {
            EncodeError::ArgumentCount {
                command: self.command.name.clone(),
                direction: "input",
                expected: pre.len(),
                got: pre.len() + 1,
            }
        })?;
        self.capture(param, value)?;
        self.next_pre += 1;
        Ok(())
    }

    /// Mark the underlying operation as executed, moving the capture from
    /// the pre-call to the post-call phase. All input arguments must have
    /// been captured.
    pub fn invoked(&mut self) -> Result<(), EncodeError> {
        self.expect_phase(Phase::Pre)?;
        let expected = self.pre_params().len();
        if self.next_pre != expected {
            return Err(EncodeError::ArgumentCount {
                command: self.command.name.clone(),
                direction: "input",
                expected,
                got: self.next_pre,
            });
        }
        self.phase = Phase::Post;
        Ok(())
    }

    /// Capture the next output-direction argument (post-call values of
    /// `Out` and `InOut` parameters, in declaration order).
    pub fn output(&mut self, value: &Value) -> Result<(), EncodeError> {
        self.expect_phase(Phase::Post)?;
        let post = self.post_params();
        let param = post.get(self.next_post).copied().ok_or_else(|| {
            EncodeError::ArgumentCount {
                command: self.command.name.clone(),
                direction: "output",
                expected: post.len(),
                got: post.len() + 1,
            }
        })?;
        self.capture(param, value)?;
        self.next_post += 1;
        Ok(())
    }

    /// Capture the return value. Must come after every output argument.
    pub fn returns(&mut self, value: &Value) -> Result<(), EncodeError> {
        self.expect_phase(Phase::Post)?;
        let Some(ret_ty) = &self.command.ret else {
            return Err(EncodeError::UnexpectedReturn(self.command.name.clone()));
        };
        if self.ret_captured {
            return Err(EncodeError::UnexpectedReturn(self.command.name.clone()));
        }
        self.check_outputs_complete()?;
        Encoder::new(self.catalog).encode_slot(
            ret_ty,
            false,
            value,
            &self.seen,
            &mut self.buf,
        )?;
        self.ret_captured = true;
        Ok(())
    }

    fn check_outputs_complete(&self) -> Result<(), EncodeError> {
        let expected = self.post_params().len();
        if self.next_post != expected {
            return Err(EncodeError::ArgumentCount {
                command: self.command.name.clone(),
                direction: "output",
                expected,
                got: self.next_post,
            });
        }
        Ok(())
    }

    /// Flush the complete record to the stream as one atomic unit. Nothing
    /// was written before this point; dropping the capture instead of
    /// finishing it discards the record entirely.
    pub fn finish(self) -> Result<(), EncodeError> {
        self.expect_phase(Phase::Post)?;
        self.check_outputs_complete()?;
        if self.command.ret.is_some() && !self.ret_captured {
            return Err(EncodeError::MissingReturn(self.command.name.clone()));
        }
        self.writer.write_record(&self.buf)?;
        Ok(())
    }
}
