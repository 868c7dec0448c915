// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session policy layer: lifecycle state machine, hands-free update
//! emission, budgets, and rate-limited reads on top of a [`PtySession`].
//!
//! [`PtySession`]: crate::pty::PtySession

pub mod controller;
pub mod emit;

pub use controller::{spawn_controller, ControllerHandle, ControllerOptions};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::handoff::HandoffPreview;

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    HandsFree,
    DetachDialog,
    Exited,
}

/// Why a session reached its terminal state. Tags handoff artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Exit,
    Detach,
    Kill,
    Timeout,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exit => "exit",
            Self::Detach => "detach",
            Self::Kill => "kill",
            Self::Timeout => "timeout",
        }
    }
}

/// Fields carried by every hands-free update.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateMeta {
    pub session_id: String,
    pub runtime_ms: u64,
    pub total_chars_sent: u64,
    pub budget_exhausted: bool,
}

/// Asynchronous notification stream consumed by the driver in hands-free
/// mode.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandsFreeUpdate {
    Running {
        #[serde(flatten)]
        meta: UpdateMeta,
        tail: Vec<String>,
        truncated: bool,
    },
    UserTakeover {
        #[serde(flatten)]
        meta: UpdateMeta,
    },
    Exited {
        #[serde(flatten)]
        meta: UpdateMeta,
        tail: Vec<String>,
        exit_code: Option<i32>,
        signal: Option<i32>,
    },
}

impl HandsFreeUpdate {
    pub fn meta(&self) -> &UpdateMeta {
        match self {
            Self::Running { meta, .. } | Self::UserTakeover { meta } | Self::Exited { meta, .. } => {
                meta
            }
        }
    }
}

/// Output portion of a query reply.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutputResult {
    pub output: String,
    pub truncated: bool,
    pub total_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
    pub rate_limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_seconds: Option<u32>,
}

/// Read options for a driver query. At most one of `offset`, `incremental`,
/// `drain` may be used per call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    pub lines: Option<usize>,
    pub max_chars: Option<usize>,
    pub offset: Option<u64>,
    pub incremental: bool,
    pub drain: bool,
}

impl QueryOptions {
    pub const DEFAULT_LINES: usize = 20;
    pub const MAX_LINES: usize = 200;
    pub const DEFAULT_MAX_CHARS: usize = 5 * 1024;
    pub const MAX_MAX_CHARS: usize = 50 * 1024;

    pub fn lines(&self) -> usize {
        self.lines.unwrap_or(Self::DEFAULT_LINES).min(Self::MAX_LINES)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars.unwrap_or(Self::DEFAULT_MAX_CHARS).min(Self::MAX_MAX_CHARS)
    }

    /// Reject combinations of read modes.
    pub fn validate(&self) -> Result<(), ErrorCode> {
        let modes =
            usize::from(self.offset.is_some()) + usize::from(self.incremental) + usize::from(self.drain);
        if modes > 1 {
            return Err(ErrorCode::InvalidArguments);
        }
        Ok(())
    }
}

/// Point-in-time controller status, returned with query replies.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub session_id: String,
    pub state: SessionState,
    pub runtime_ms: u64,
    pub exited: bool,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub total_chars_sent: u64,
    pub budget_exhausted: bool,
    /// Present while the detach dialog is open: the highlighted option.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialog_selected: Option<usize>,
}

/// Reply to a driver query: current status plus the requested output view.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReply {
    pub status: StatusSnapshot,
    pub output: OutputResult,
}

/// Final result of a supervised session, resolved exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct ShellResult {
    pub session_id: String,
    pub command: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub runtime_ms: u64,
    pub timed_out: bool,
    pub cancelled: bool,
    pub backgrounded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_id: Option<String>,
    pub minimized: bool,
    pub user_took_over: bool,
    pub total_chars_sent: u64,
    pub budget_exhausted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_preview: Option<HandoffPreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

/// Detach dialog options, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachChoice {
    Kill,
    Background,
    Minimize,
    Cancel,
}

impl DetachChoice {
    pub const ALL: [DetachChoice; 4] =
        [Self::Kill, Self::Background, Self::Minimize, Self::Cancel];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Kill => "Kill session",
            Self::Background => "Move to background",
            Self::Minimize => "Minimize",
            Self::Cancel => "Cancel",
        }
    }
}
