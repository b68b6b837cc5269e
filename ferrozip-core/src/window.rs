//! Output sliding window for DEFLATE decompression.
//!
//! The decoder appends literals and back-reference copies to a contiguous
//! buffer. When the buffer grows past 1 MiB it drains to a sink, retaining
//! the last 32 KiB (rounded down to a multiple of 8) so later back-references
//! still resolve.

use crate::error::{FerrozipError, Result};
use std::io::Write;

/// DEFLATE history window size: back-references reach at most this far.
pub const WINDOW_SIZE: usize = 32768;

/// Buffer size that triggers a drain to the sink.
const DRAIN_LIMIT: usize = 1 << 20;

/// Contiguous output buffer with back-reference history.
#[derive(Debug)]
pub struct OutputWindow {
    buf: Vec<u8>,
    flushed: u64,
}

impl OutputWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(DRAIN_LIMIT / 4),
            flushed: 0,
        }
    }

    /// Total bytes produced, drained or not.
    pub fn total_out(&self) -> u64 {
        self.flushed + self.buf.len() as u64
    }

    /// Bytes of history currently addressable by a back-reference.
    pub fn history_len(&self) -> usize {
        self.buf.len()
    }

    /// Discard all state.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.flushed = 0;
    }

    /// Append one literal byte.
    #[inline]
    pub fn push_literal(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Append a run of raw bytes (stored-block payload).
    pub fn push_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Copy `length` bytes starting `distance` bytes back from the write
    /// position.
    ///
    /// `length > distance` is valid LZ77: the copy overlaps its own output
    /// and replicates the trailing `distance`-byte pattern.
    pub fn copy_match(&mut self, distance: usize, length: usize) -> Result<()> {
        let have = self.buf.len();
        if distance == 0 || distance > have {
            return Err(FerrozipError::invalid_distance(distance, have));
        }
        let mut src = have - distance;
        let mut remaining = length;
        while remaining > 0 {
            // Before the first iteration the longest non-overlapping chunk is
            // `distance` bytes; every appended chunk extends the valid source
            // range, so the copy converges for any length.
            let n = remaining.min(self.buf.len() - src);
            self.buf.extend_from_within(src..src + n);
            src += n;
            remaining -= n;
        }
        Ok(())
    }

    /// Drain to `sink` if the buffer has outgrown its limit, keeping the
    /// window tail for future back-references.
    pub fn drain_if_needed<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        if self.buf.len() <= DRAIN_LIMIT {
            return Ok(());
        }
        // Keep the last WINDOW_SIZE bytes; round the drained prefix down to a
        // multiple of 8.
        let drain = (self.buf.len() - WINDOW_SIZE) & !7;
        sink.write_all(&self.buf[..drain])?;
        self.buf.copy_within(drain.., 0);
        self.buf.truncate(self.buf.len() - drain);
        self.flushed += drain as u64;
        Ok(())
    }

    /// Write everything still buffered to `sink`.
    pub fn finish<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        sink.write_all(&self.buf)?;
        self.flushed += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }
}

impl Default for OutputWindow {
    fn default() -> Self {
        Self::new()
    }
}
