//! Resynchronizing byte cursor.
//!
//! Owns the unconsumed tail of a session's stream. Bytes leave the buffer only
//! once classified: taken as an accepted block, or skipped as noise.

use bytes::{Buf, Bytes, BytesMut};

/// Outcome of one scan step.
#[derive(Debug, PartialEq, Eq)]
pub enum Scan<'a> {
    /// Header-aligned block of exactly `packet_size` bytes, not yet consumed
    Candidate(&'a [u8]),
    /// Noise run reached the ceiling. The skipped bytes are reported and the
    /// run restarts; bytes not yet examined stay pending.
    Overrun { dropped_bytes: usize },
    /// Fewer than `packet_size` bytes pending
    NeedMore,
}

/// Resumable scanner over an arbitrarily chunked byte stream
#[derive(Debug)]
pub struct ByteCursor {
    pending: BytesMut,
    packet_size: usize,
    header: [u8; 2],
    ceiling: usize,
    /// bytes discarded since the last accepted block
    noise_run: usize,
}

impl ByteCursor {
    pub fn new(packet_size: usize, header: [u8; 2], ceiling: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(packet_size * 16),
            packet_size,
            header,
            ceiling,
            noise_run: 0,
        }
    }

    /// Append a chunk. Never blocks, never scans.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Align on the next header and expose the candidate block.
    ///
    /// Skipping jumps straight to the next header occurrence but never past
    /// the point where fewer than `packet_size` bytes would remain, which
    /// yields the same alignment as advancing one byte at a time.
    pub fn scan(&mut self) -> Scan<'_> {
        loop {
            if self.noise_run >= self.ceiling {
                let dropped_bytes = std::mem::take(&mut self.noise_run);
                return Scan::Overrun { dropped_bytes };
            }

            let len = self.pending.len();
            if len < self.packet_size {
                return Scan::NeedMore;
            }
            if self.pending[..2] == self.header {
                return Scan::Candidate(&self.pending[..self.packet_size]);
            }

            let limit = len - self.packet_size + 1;
            let skip = self
                .find_header_from(1)
                .map_or(limit, |pos| pos.min(limit))
                .min(self.ceiling - self.noise_run);
            self.pending.advance(skip);
            self.noise_run += skip;
        }
    }

    /// Consume the current candidate after it was accepted.
    pub fn take_block(&mut self) -> Bytes {
        self.noise_run = 0;
        self.pending.split_to(self.packet_size).freeze()
    }

    /// Drop the first byte of a rejected candidate and resync from the next one.
    pub fn reject(&mut self) {
        if !self.pending.is_empty() {
            self.pending.advance(1);
            self.noise_run += 1;
        }
    }

    /// Discard everything pending, returning how many bytes were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.noise_run = 0;
        dropped
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn noise_run(&self) -> usize {
        self.noise_run
    }

    fn find_header_from(&self, start: usize) -> Option<usize> {
        self.pending
            .get(start..)?
            .windows(2)
            .position(|w| w == self.header)
            .map(|pos| pos + start)
    }
}
