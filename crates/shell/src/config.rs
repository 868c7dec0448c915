// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session configuration: JSON file discovery, per-field defaults, and range
//! clamping. The engine treats a loaded `Config` as immutable per session.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Project-relative config path, preferred over the global file.
const PROJECT_CONFIG: &str = ".pi/interactive-shell.json";
/// Global config path under the home directory.
const GLOBAL_CONFIG: &str = ".pi/agent/interactive-shell.json";

/// When hands-free updates are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum HandsFreeUpdateMode {
    /// Emit after a quiet window; the interval timer is only a fallback.
    #[default]
    OnQuiet,
    /// Emit on every interval tick, quiet timer unused.
    Interval,
}

/// Handoff artifact settings (in-result preview / on-disk snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HandoffConfig {
    pub enabled: bool,
    pub lines: usize,
    pub max_chars: usize,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self { enabled: true, lines: 40, max_chars: 4000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub overlay_width_percent: u8,
    pub overlay_height_percent: u8,
    pub scrollback_lines: usize,
    pub exit_auto_close_delay_seconds: u64,
    pub double_escape_threshold_ms: u64,
    pub ansi_reemit: bool,
    pub handoff_preview: HandoffConfig,
    pub handoff_snapshot: HandoffConfig,
    pub hands_free_update_mode: HandsFreeUpdateMode,
    pub hands_free_update_interval_ms: u64,
    pub quiet_threshold_ms: u64,
    pub update_max_chars: usize,
    pub max_total_chars: usize,
    pub min_query_interval_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            overlay_width_percent: 92,
            overlay_height_percent: 70,
            scrollback_lines: 2000,
            exit_auto_close_delay_seconds: 2,
            double_escape_threshold_ms: 350,
            ansi_reemit: true,
            handoff_preview: HandoffConfig::default(),
            handoff_snapshot: HandoffConfig { enabled: false, lines: 200, max_chars: 100_000 },
            hands_free_update_mode: HandsFreeUpdateMode::OnQuiet,
            hands_free_update_interval_ms: 30_000,
            quiet_threshold_ms: 3000,
            update_max_chars: 2000,
            max_total_chars: 60_000,
            min_query_interval_seconds: 20,
        }
    }
}

impl Config {
    /// Load configuration for a working directory: project file first, then
    /// the global file, then defaults. Parse failures warn and fall back.
    pub fn load(cwd: &Path) -> Self {
        let mut candidates = vec![cwd.join(PROJECT_CONFIG)];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(GLOBAL_CONFIG));
        }

        for path in candidates {
            match std::fs::read_to_string(&path) {
                Ok(text) => match serde_json::from_str::<Config>(&text) {
                    Ok(config) => return config.clamped(),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                        return Self::default();
                    }
                },
                Err(_) => continue,
            }
        }

        Self::default()
    }

    /// Parse a config from JSON text, clamping out-of-range values.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        Ok(config.clamped())
    }

    /// Clamp every numeric field to its documented range.
    pub fn clamped(mut self) -> Self {
        self.overlay_width_percent = self.overlay_width_percent.clamp(10, 100);
        self.overlay_height_percent = self.overlay_height_percent.clamp(20, 90);
        self.scrollback_lines = self.scrollback_lines.clamp(200, 50_000);
        self.exit_auto_close_delay_seconds = self.exit_auto_close_delay_seconds.min(300);
        self.double_escape_threshold_ms = self.double_escape_threshold_ms.clamp(100, 2000);
        self.hands_free_update_interval_ms =
            self.hands_free_update_interval_ms.clamp(5000, 300_000);
        self.quiet_threshold_ms = self.quiet_threshold_ms.clamp(1000, 30_000);
        self.update_max_chars = self.update_max_chars.clamp(200, 50_000);
        self.max_total_chars = self.max_total_chars.clamp(10_000, 1_000_000);
        self.min_query_interval_seconds = self.min_query_interval_seconds.clamp(5, 300);
        self.handoff_preview.lines = self.handoff_preview.lines.clamp(1, 1000);
        self.handoff_preview.max_chars = self.handoff_preview.max_chars.clamp(100, 1_000_000);
        self.handoff_snapshot.lines = self.handoff_snapshot.lines.clamp(1, 10_000);
        self.handoff_snapshot.max_chars = self.handoff_snapshot.max_chars.clamp(100, 10_000_000);
        self
    }

    // -- Duration accessors ---------------------------------------------------

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.hands_free_update_interval_ms)
    }

    pub fn quiet_threshold(&self) -> Duration {
        Duration::from_millis(self.quiet_threshold_ms)
    }

    pub fn double_escape_threshold(&self) -> Duration {
        Duration::from_millis(self.double_escape_threshold_ms)
    }

    pub fn exit_auto_close_delay(&self) -> Duration {
        Duration::from_secs(self.exit_auto_close_delay_seconds)
    }

    pub fn min_query_interval(&self) -> Duration {
        Duration::from_secs(self.min_query_interval_seconds)
    }

    /// Raw log capacity in bytes: the raw record must outlive the emulator's
    /// line budget, so it scales with scrollback.
    pub fn raw_log_capacity(&self) -> usize {
        (self.scrollback_lines * 256).max(256 * 1024)
    }
}

/// Location of the snapshot cache directory under the home directory.
pub fn snapshot_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pi/agent/cache/interactive-shell"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
