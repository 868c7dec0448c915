// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only raw byte log: the system of record for everything the child
//! wrote. Bounded by a circular buffer; offsets are global (total bytes ever
//! appended), so consumers track progress with plain `u64` cursors that stay
//! valid across wraps.

use bytes::Bytes;

/// Circular byte log with global offsets.
///
/// When the buffer wraps, the oldest data is silently discarded; a cursor
/// pointing into discarded territory is clamped forward on the next read.
#[derive(Debug)]
pub struct RawLog {
    buf: Vec<u8>,
    capacity: usize,
    write_pos: usize,
    total_written: u64,
}

impl RawLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(4096);
        Self { buf: vec![0u8; capacity], capacity, write_pos: 0, total_written: 0 }
    }

    /// Append bytes, overwriting the oldest data when full.
    pub fn append(&mut self, data: &[u8]) {
        for chunk in data.chunks(self.capacity) {
            let start = self.write_pos;
            let end = start + chunk.len();

            if end <= self.capacity {
                self.buf[start..end].copy_from_slice(chunk);
            } else {
                let first = self.capacity - start;
                self.buf[start..self.capacity].copy_from_slice(&chunk[..first]);
                self.buf[..chunk.len() - first].copy_from_slice(&chunk[first..]);
            }

            self.write_pos = end % self.capacity;
            self.total_written += chunk.len() as u64;
        }
    }

    /// Total bytes ever appended.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Oldest offset still resident in the buffer.
    pub fn oldest_offset(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity as u64)
    }

    /// Read from a global offset to the end of the log.
    ///
    /// Returns `None` when the offset is beyond the write position (too new);
    /// offsets older than the retained window are clamped to the oldest
    /// resident byte. The range may span the wrap point, hence two slices.
    pub fn read_from(&self, offset: u64) -> Option<(&[u8], &[u8])> {
        if offset > self.total_written {
            return None;
        }
        let offset = offset.max(self.oldest_offset());

        let available = (self.total_written - offset) as usize;
        if available == 0 {
            return Some((&[], &[]));
        }

        let start = if self.write_pos >= available {
            self.write_pos - available
        } else {
            self.capacity - (available - self.write_pos)
        };

        if start + available <= self.capacity {
            Some((&self.buf[start..start + available], &[]))
        } else {
            let first = self.capacity - start;
            Some((&self.buf[start..self.capacity], &self.buf[..available - first]))
        }
    }

    /// Read everything after `cursor` and advance it to the end of the log.
    ///
    /// Successive calls on the same cursor yield disjoint, contiguous ranges.
    /// A cursor that fell behind the retained window is clamped forward (the
    /// overwritten bytes are gone).
    pub fn read_since(&self, cursor: &mut u64) -> Bytes {
        if *cursor > self.total_written {
            // A cursor is only ever advanced by us; ahead-of-log means the
            // consumer kept a cursor across a log swap. Resynchronize.
            *cursor = self.total_written;
            return Bytes::new();
        }
        let data = match self.read_from(*cursor) {
            Some((a, b)) => {
                let mut out = Vec::with_capacity(a.len() + b.len());
                out.extend_from_slice(a);
                out.extend_from_slice(b);
                out
            }
            None => Vec::new(),
        };
        *cursor = self.total_written;
        Bytes::from(data)
    }

    /// Read everything after `cursor` up to `end` (exclusive global offset)
    /// and advance the cursor to `end`.
    ///
    /// Lets a consumer stop at a fence — e.g. the last byte the child wrote
    /// before the terminal status line — while other cursors read past it.
    pub fn read_span(&self, cursor: &mut u64, end: u64) -> Bytes {
        let end = end.min(self.total_written);
        if *cursor >= end {
            return Bytes::new();
        }
        let start = (*cursor).max(self.oldest_offset());
        let take = (end - start) as usize;
        let data = match self.read_from(start) {
            Some((a, b)) => {
                let mut out = Vec::with_capacity(take);
                out.extend_from_slice(a);
                out.extend_from_slice(b);
                out.truncate(take);
                out
            }
            None => Vec::new(),
        };
        *cursor = end;
        Bytes::from(data)
    }

    /// How many bytes are readable after the given offset.
    pub fn available_from(&self, offset: u64) -> u64 {
        if offset >= self.total_written {
            return 0;
        }
        self.total_written - offset.max(self.oldest_offset())
    }

    /// Copy the full resident contents (oldest to newest).
    pub fn contents(&self) -> Vec<u8> {
        match self.read_from(self.oldest_offset()) {
            Some((a, b)) => {
                let mut out = Vec::with_capacity(a.len() + b.len());
                out.extend_from_slice(a);
                out.extend_from_slice(b);
                out
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
#[path = "rawlog_tests.rs"]
mod tests;
