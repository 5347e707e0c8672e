//! Wire format for vksnoop capture streams.
//!
//! A capture stream is a 16-byte stream header followed by a sequence of
//! self-delimiting call records. Every record starts with a `u32` length
//! prefix counting the bytes that follow it, which is what lets a scanner
//! skip records it cannot decode without losing synchronization.
//!
//! All multi-byte integers on the wire are little-endian. The remaining
//! framing constants (prefix widths, presence flags, chain node layout)
//! live in the encode/decode routines; the choices are documented in
//! DESIGN.md.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::DecodeError;

/// Stable discriminant identifying a structure variant in an extension
/// chain. Tag 0 is a legal value, so chains are count-prefixed rather
/// than sentinel-terminated.
pub type TypeTag = u32;

/// Stable numeric identifier for a command.
pub type CommandId = u32;

/// Capture-assigned identifier standing in for a driver handle value.
pub type HandleId = u64;

/// First four bytes of every capture stream.
pub const STREAM_MAGIC: [u8; 4] = *b"VKSN";

/// Current stream format version. Readers reject anything newer.
pub const FORMAT_VERSION: u16 = 1;

/// Bytes of fixed record header following the length prefix:
/// command id (4) + thread id (8) + timestamp (8).
pub const RECORD_HEADER_BYTES: usize = 20;

/// Fixed-size header written once at the start of a capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub version: u16,
    /// Reserved, always zero in version 1.
    pub flags: u16,
    /// Random identifier for the capture session that produced the stream.
    pub session_id: u64,
}

impl StreamHeader {
    pub fn new(session_id: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            flags: 0,
            session_id,
        }
    }

    /// Serialize the header: magic, version, flags, session id.
    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(&STREAM_MAGIC)?;
        w.write_all(&self.version.to_le_bytes())?;
        w.write_all(&self.flags.to_le_bytes())?;
        w.write_all(&self.session_id.to_le_bytes())?;
        Ok(())
    }

    /// Read and check a stream header from the start of `r`.
    pub fn read_from(r: &mut impl Read) -> Result<Self, DecodeError> {
        let mut buf = [0u8; 16];
        let got = try_read_exact(r, &mut buf)?;
        if got < buf.len() {
            return Err(DecodeError::UnexpectedEndOfStream {
                needed: buf.len(),
                available: got,
            });
        }
        if buf[0..4] != STREAM_MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let flags = u16::from_le_bytes([buf[6], buf[7]]);
        let session_id = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        Ok(Self {
            version,
            flags,
            session_id,
        })
    }
}

/// Read until `buf` is full or the source is exhausted, returning how many
/// bytes were actually read. Lets callers distinguish a clean end of stream
/// (0 bytes) from a truncated read.
pub(crate) fn try_read_exact(r: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Assigned on first use per thread. Relaxed ordering is sufficient,
    // only uniqueness matters.
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Process-local sequential id for the calling thread, recorded in each
/// call record so decoded traces can separate per-thread call sequences.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}
