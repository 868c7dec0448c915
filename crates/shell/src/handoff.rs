// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handoff artifacts produced when a session terminates: an in-memory tail
//! preview returned in the result, and an optional snapshot file on disk.
//!
//! Both read the raw byte log through strip-ANSI rather than the emulator:
//! TUI children on the alternate screen leave the emulator's history empty,
//! while the raw log always holds what was actually written.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ansi;
use crate::config::{snapshot_dir, HandoffConfig};
use crate::session::EndReason;

/// Tail preview carried inside the session result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffPreview {
    pub when: EndReason,
    pub lines: Vec<String>,
    pub truncated: bool,
}

/// Everything the snapshot header needs to identify the session.
#[derive(Debug, Clone)]
pub struct SnapshotMeta<'a> {
    pub when: EndReason,
    pub command: &'a str,
    pub cwd: &'a Path,
    pub pid: u32,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

/// Build the in-result preview from the raw byte log.
pub fn build_preview(raw: &[u8], config: &HandoffConfig, when: EndReason) -> HandoffPreview {
    let (lines, truncated) = tail_of_raw(raw, config.lines, config.max_chars);
    HandoffPreview { when, lines, truncated }
}

/// Write a snapshot file into the default cache directory. Returns the path,
/// or `None` when writing is impossible (no home directory, I/O failure);
/// snapshot failures are never fatal to the session.
pub fn write_snapshot(meta: &SnapshotMeta<'_>, raw: &[u8], config: &HandoffConfig) -> Option<PathBuf> {
    let Some(dir) = snapshot_dir() else {
        warn!("no home directory, skipping handoff snapshot");
        return None;
    };
    match write_snapshot_to(&dir, meta, raw, config) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(error = %e, "failed to write handoff snapshot");
            None
        }
    }
}

/// Write a snapshot file into `dir`, creating it as needed.
pub fn write_snapshot_to(
    dir: &Path,
    meta: &SnapshotMeta<'_>,
    raw: &[u8],
    config: &HandoffConfig,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir).context("create snapshot dir")?;

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let stamp = now.replace([':', '.'], "-");
    let path = dir.join(format!("snapshot-{stamp}-pid{}.log", meta.pid));

    let (lines, _truncated) = tail_of_raw(raw, config.lines, config.max_chars);

    let mut body = String::new();
    body.push_str(&format!("# interactive-shell snapshot ({})\n", meta.when.as_str()));
    body.push_str(&format!("time: {now}\n"));
    body.push_str(&format!("command: {}\n", meta.command));
    body.push_str(&format!("cwd: {}\n", meta.cwd.display()));
    body.push_str(&format!("pid: {}\n", meta.pid));
    body.push_str(&format!(
        "exitCode: {}\n",
        meta.exit_code.map(|c| c.to_string()).unwrap_or_default()
    ));
    body.push_str(&format!(
        "signal: {}\n",
        meta.signal.map(|s| s.to_string()).unwrap_or_default()
    ));
    body.push_str(&format!(
        "lines: {} (requested {}, maxChars {})\n",
        lines.len(),
        config.lines,
        config.max_chars
    ));
    body.push('\n');
    for line in &lines {
        body.push_str(line);
        body.push('\n');
    }

    std::fs::write(&path, body).context("write snapshot file")?;
    Ok(path)
}

/// Last `n` strip-ANSI lines of the raw log, bounded by `max_chars` keeping
/// the tail.
fn tail_of_raw(raw: &[u8], n: usize, max_chars: usize) -> (Vec<String>, bool) {
    let text = ansi::strip_ansi(raw);
    let mut all: Vec<&str> = text.split('\n').collect();
    while all.last().is_some_and(|l| l.is_empty()) {
        all.pop();
    }

    let start = all.len().saturating_sub(n);
    let mut truncated = start > 0;
    let mut picked: Vec<String> = Vec::new();
    let mut budget = max_chars;

    for line in all[start..].iter().rev() {
        let cost = line.chars().count();
        if cost <= budget {
            budget -= cost;
            picked.push((*line).to_owned());
        } else {
            if budget > 0 {
                let skip = cost - budget;
                picked.push(line.chars().skip(skip).collect());
            }
            truncated = true;
            break;
        }
    }

    picked.reverse();
    (picked, truncated)
}

#[cfg(test)]
#[path = "handoff_tests.rs"]
mod tests;
