// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Driver-visible error vocabulary.
///
/// Internal fallible paths use `anyhow`; this enum is the stable set of
/// machine-readable codes that cross the driver boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SpawnFailed,
    SessionNotFound,
    WriteFailed,
    InvalidArguments,
    OverlayAlreadyOpen,
    /// Internal only: the facade resolves this by waiting, the driver
    /// never sees it.
    RateLimited,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpawnFailed => "spawn_failed",
            Self::SessionNotFound => "session_not_found",
            Self::WriteFailed => "write_failed",
            Self::InvalidArguments => "invalid_arguments",
            Self::OverlayAlreadyOpen => "overlay_already_open",
            Self::RateLimited => "rate_limited",
        }
    }

    /// Whether responses carrying this code set `isError` for the caller.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::RateLimited)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ErrorCode {}

/// Error envelope returned to the driver on failed requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    #[serde(rename = "isError")]
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorReply {
    pub fn new(code: ErrorCode) -> Self {
        Self { error: code.as_str().to_owned(), is_error: code.is_error(), message: None }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::new(code) }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
