// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY transport: child spawning, non-blocking master I/O, and the
//! [`PtySession`] object that owns the raw log and screen projections.

pub mod fd;
pub mod session;
pub mod spawn;

pub use session::{PtySession, PtySessionOptions, RawStream};
pub use spawn::{ExitStatus, PtyProcess};

use bytes::Bytes;

/// Input delivered to the PTY I/O task. Writes and resizes share one FIFO
/// channel so a write can never reorder around the effect of a preceding
/// resize.
#[derive(Debug)]
pub enum PtyInput {
    Write(Bytes),
    Resize(u16, u16),
}
