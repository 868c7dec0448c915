// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver API: the stateless request/response façade consumed by the
//! automated controller. Each call resolves against the registry; the only
//! suspension points are the interactive-start wait and the rate-limit wait
//! (which races session completion).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::Config;
use crate::error::ErrorCode;
use crate::keys::{self, InputSpec};
use crate::overlay::{self, OverlayHost};
use crate::registry::SessionRegistry;
use crate::session::{
    spawn_controller, ControllerHandle, ControllerOptions, HandsFreeUpdate, QueryOptions,
    QueryReply, ShellResult,
};

/// Name under which the host exposes this façade as a tool.
pub const TOOL_NAME: &str = "interactive_shell";

/// Default PTY dimensions when the host does not dictate a size.
const DEFAULT_COLS: u16 = 120;
const DEFAULT_ROWS: u16 = 32;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartRequest {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub name: Option<String>,
    pub reason: Option<String>,
    /// `"hands-free"` selects driver-primary supervision.
    pub mode: Option<String>,
    pub hands_free: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub auto_exit_on_quiet: bool,
    pub handoff_preview: Option<bool>,
    pub handoff_snapshot: Option<bool>,
    pub cols: Option<u16>,
    pub rows: Option<u16>,
}

impl StartRequest {
    fn is_hands_free(&self) -> bool {
        self.hands_free
            .unwrap_or_else(|| matches!(self.mode.as_deref(), Some("hands-free" | "hands_free")))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StartReply {
    /// Hands-free: the call returns immediately.
    Running { session_id: String, status: String },
    /// Interactive: the call blocked until the session finished.
    Finished(ShellResult),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsUpdate {
    pub update_interval: Option<u64>,
    pub quiet_threshold: Option<u64>,
}

impl SettingsUpdate {
    fn is_empty(&self) -> bool {
        self.update_interval.is_none() && self.quiet_threshold.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRequest {
    pub session_id: String,
    pub output_lines: Option<usize>,
    pub output_max_chars: Option<usize>,
    pub output_offset: Option<u64>,
    pub incremental: bool,
    pub drain: bool,
    pub input: Option<String>,
    pub input_keys: Vec<String>,
    pub input_hex: Vec<String>,
    pub input_paste: Option<String>,
    pub settings: Option<SettingsUpdate>,
    pub kill: bool,
}

impl QueryRequest {
    fn has_input(&self) -> bool {
        self.input.is_some()
            || !self.input_keys.is_empty()
            || !self.input_hex.is_empty()
            || self.input_paste.is_some()
    }

    fn has_output_request(&self) -> bool {
        self.output_lines.is_some()
            || self.output_max_chars.is_some()
            || self.output_offset.is_some()
            || self.incremental
            || self.drain
    }

    fn input_spec(&self) -> InputSpec {
        InputSpec {
            text: self.input.clone(),
            keys: self.input_keys.clone(),
            hex: self.input_hex.clone(),
            paste: self.input_paste.clone(),
        }
    }

    fn query_options(&self) -> QueryOptions {
        QueryOptions {
            lines: self.output_lines,
            max_chars: self.output_max_chars,
            offset: self.output_offset,
            incremental: self.incremental,
            drain: self.drain,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    /// The session reached its terminal state (kill, or completion observed
    /// during a rate-limit wait).
    Finished(ShellResult),
    Status(QueryReply),
    /// Settings-only request: no status is returned.
    SettingsApplied { applied: bool },
}

/// Stateless façade over the registry.
pub struct DriverApi {
    registry: Arc<SessionRegistry>,
    update_tx: mpsc::UnboundedSender<HandsFreeUpdate>,
    overlay_host: Option<Arc<dyn OverlayHost>>,
    /// Test/embedding override; when absent, config is discovered per cwd.
    config_override: Option<Config>,
}

impl DriverApi {
    pub fn new(
        registry: Arc<SessionRegistry>,
        update_tx: mpsc::UnboundedSender<HandsFreeUpdate>,
    ) -> Self {
        Self { registry, update_tx, overlay_host: None, config_override: None }
    }

    pub fn with_overlay_host(mut self, host: Arc<dyn OverlayHost>) -> Self {
        self.overlay_host = Some(host);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config_override = Some(config);
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    // -- start ----------------------------------------------------------------

    pub async fn start(&self, req: StartRequest) -> Result<StartReply, ErrorCode> {
        if req.command.trim().is_empty() {
            return Err(ErrorCode::InvalidArguments);
        }
        let hands_free = req.is_hands_free();
        if !hands_free && self.overlay_host.is_none() {
            // Interactive supervision needs a TUI surface.
            return Err(ErrorCode::InvalidArguments);
        }

        let overlay_claimed = if self.overlay_host.is_some() {
            let opened = self.registry.try_open_overlay();
            eprintln!("try_open_overlay -> {opened}");
            if !opened {
                return Err(ErrorCode::OverlayAlreadyOpen);
            }
            true
        } else {
            false
        };

        let result = self.start_inner(req, hands_free, overlay_claimed).await;
        if result.is_err() && overlay_claimed {
            self.registry.close_overlay();
        }
        result
    }

    async fn start_inner(
        &self,
        req: StartRequest,
        hands_free: bool,
        overlay_claimed: bool,
    ) -> Result<StartReply, ErrorCode> {
        let cwd = req
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .ok_or(ErrorCode::InvalidArguments)?;
        let config =
            self.config_override.clone().unwrap_or_else(|| Config::load(&cwd));

        let id = self.registry.generate_id();
        let options = ControllerOptions {
            id: id.clone(),
            command: req.command.clone(),
            cwd,
            name: req.name.clone(),
            reason: req.reason.clone(),
            hands_free,
            timeout: req.timeout_ms.map(Duration::from_millis),
            auto_exit_on_quiet: req.auto_exit_on_quiet,
            cols: req.cols.unwrap_or(DEFAULT_COLS),
            rows: req.rows.unwrap_or(DEFAULT_ROWS),
            config,
            handoff_preview: req.handoff_preview,
            handoff_snapshot: req.handoff_snapshot,
        };

        let handle = match spawn_controller(
            options,
            Arc::clone(&self.registry),
            self.update_tx.clone(),
            None,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("SPAWN FAILED: {e}");
                self.registry.release_id(&id);
                return Err(ErrorCode::SpawnFailed);
            }
        };
        self.registry.register_active(handle.clone());

        if overlay_claimed {
            if let Some(host) = &self.overlay_host {
                match host.open_surface() {
                    Ok(surface) => {
                        overlay::spawn_presenter(
                            surface,
                            handle.clone(),
                            Arc::clone(&self.registry),
                        );
                    }
                    Err(e) => {
                        debug!(error = %e, "overlay surface failed");
                        self.registry.close_overlay();
                        if !hands_free {
                            handle.kill().await;
                            return Err(ErrorCode::InvalidArguments);
                        }
                    }
                }
            }
        }

        if hands_free {
            return Ok(StartReply::Running { session_id: id, status: "running".to_owned() });
        }

        // Interactive supervision: block until the session finishes.
        let mut complete = handle.on_complete();
        let result = complete
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ErrorCode::SessionNotFound)?
            .clone()
            .ok_or(ErrorCode::SessionNotFound)?;
        Ok(StartReply::Finished(result))
    }

    // -- query ----------------------------------------------------------------

    /// One driver query: applies settings, sends input, honors `kill`
    /// precedence, then reads status and output (rate-limited for pure
    /// status checks, with the wait racing session completion).
    pub async fn query(&self, req: QueryRequest) -> Result<QueryResponse, ErrorCode> {
        let handle =
            self.registry.get_active(&req.session_id).ok_or(ErrorCode::SessionNotFound)?;

        if req.kill {
            return self.kill_session(&handle).await;
        }

        let mut touched = false;
        if let Some(settings) = &req.settings {
            if let Some(ms) = settings.update_interval {
                handle.set_update_interval(ms).await;
                touched = true;
            }
            if let Some(ms) = settings.quiet_threshold {
                handle.set_quiet_threshold(ms).await;
                touched = true;
            }
        }

        let sent_input = if req.has_input() {
            let bytes = keys::encode_input(&req.input_spec());
            handle.write(Bytes::from(bytes)).await?;
            true
        } else {
            false
        };

        // Settings-only request: acknowledge without a status read.
        if touched && !sent_input && !req.has_output_request() {
            return Ok(QueryResponse::SettingsApplied { applied: true });
        }

        // Pure status checks are rate limited; queries that carried input
        // or settings already did work and read back immediately.
        let skip_rate_limit = sent_input || touched;
        let opts = req.query_options();
        opts.validate()?;

        let reply = handle.query(opts.clone(), skip_rate_limit).await?;
        if !reply.output.rate_limited {
            return Ok(QueryResponse::Status(reply));
        }

        // Rate limited: suspend for the indicated wait, racing completion.
        let wait = Duration::from_secs(u64::from(reply.output.wait_seconds.unwrap_or(1)));
        let mut complete = handle.on_complete();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                let reply = handle.query(opts, true).await?;
                Ok(QueryResponse::Status(reply))
            }
            result = complete.wait_for(Option::is_some) => {
                match result {
                    Ok(result) => {
                        let result = result.clone().ok_or(ErrorCode::SessionNotFound)?;
                        Ok(QueryResponse::Finished(result))
                    }
                    Err(_) => Err(ErrorCode::SessionNotFound),
                }
            }
        }
    }

    async fn kill_session(&self, handle: &ControllerHandle) -> Result<QueryResponse, ErrorCode> {
        handle.kill().await;
        let mut complete = handle.on_complete();
        let result = match complete.wait_for(Option::is_some).await {
            Ok(result) => result.clone(),
            Err(_) => handle.result(),
        };
        result.map(QueryResponse::Finished).ok_or(ErrorCode::SessionNotFound)
    }

    // -- convenience wrappers -------------------------------------------------

    /// Send input without reading anything back.
    pub async fn send_input(&self, session_id: &str, spec: &InputSpec) -> Result<(), ErrorCode> {
        let handle = self.registry.get_active(session_id).ok_or(ErrorCode::SessionNotFound)?;
        let bytes = keys::encode_input(spec);
        handle.write(Bytes::from(bytes)).await
    }

    /// Apply per-session settings without reading anything back.
    pub async fn update_settings(
        &self,
        session_id: &str,
        settings: &SettingsUpdate,
    ) -> Result<(), ErrorCode> {
        if settings.is_empty() {
            return Err(ErrorCode::InvalidArguments);
        }
        let handle = self.registry.get_active(session_id).ok_or(ErrorCode::SessionNotFound)?;
        if let Some(ms) = settings.update_interval {
            handle.set_update_interval(ms).await;
        }
        if let Some(ms) = settings.quiet_threshold {
            handle.set_quiet_threshold(ms).await;
        }
        Ok(())
    }

    /// Terminate a session and return its final result.
    pub async fn kill(&self, session_id: &str) -> Result<ShellResult, ErrorCode> {
        let handle = self.registry.get_active(session_id).ok_or(ErrorCode::SessionNotFound)?;
        match self.kill_session(&handle).await? {
            QueryResponse::Finished(result) => Ok(result),
            _ => Err(ErrorCode::SessionNotFound),
        }
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
