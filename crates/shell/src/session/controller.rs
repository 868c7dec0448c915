// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session controller: a per-session actor enforcing the driver/user
//! protocol on top of a [`PtySession`].
//!
//! All policy runs on one `tokio::select!` loop; the timers (initial-delay,
//! interval, quiet, exit-countdown, timeout, and the held-escape flush) are
//! `Option<Instant>` slots so a cleared timer is simply `None`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{Config, HandoffConfig, HandsFreeUpdateMode};
use crate::error::ErrorCode;
use crate::handoff::{self, HandoffPreview, SnapshotMeta};
use crate::keys;
use crate::pty::{ExitStatus, PtySession, PtySessionOptions};
use crate::registry::SessionRegistry;

use super::emit::Emitter;
use super::{
    DetachChoice, EndReason, HandsFreeUpdate, OutputResult, QueryOptions, QueryReply, SessionState,
    ShellResult, StatusSnapshot, UpdateMeta,
};

/// Delay before the first hands-free update is considered.
const INITIAL_UPDATE_DELAY: Duration = Duration::from_secs(2);

/// Depth of the controller command queue.
const COMMAND_QUEUE: usize = 64;

/// Keystrokes that navigate scrollback instead of reaching the child.
const SCROLL_KEYS: &[&str] = &[
    "pageup", "pgup", "ppage", "pagedown", "pgdn", "npage", "shift+up", "shift+down",
    "shift+pageup", "shift+pagedown", "shift+home", "shift+end",
];

/// Construction parameters for one controller.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub id: String,
    pub command: String,
    pub cwd: PathBuf,
    pub name: Option<String>,
    pub reason: Option<String>,
    pub hands_free: bool,
    pub timeout: Option<Duration>,
    pub auto_exit_on_quiet: bool,
    pub cols: u16,
    pub rows: u16,
    pub config: Config,
    /// Per-start overrides of the config handoff toggles.
    pub handoff_preview: Option<bool>,
    pub handoff_snapshot: Option<bool>,
}

/// Messages accepted by the controller task.
enum ControllerMsg {
    /// Programmatic input from the driver; never counts as user input.
    DriverWrite(Bytes, oneshot::Sender<Result<(), ErrorCode>>),
    /// One user keystroke from the overlay, as a key token.
    UserKey(String),
    Query {
        opts: QueryOptions,
        skip_rate_limit: bool,
        reply: oneshot::Sender<Result<QueryReply, ErrorCode>>,
    },
    Status(oneshot::Sender<StatusSnapshot>),
    SetUpdateInterval(u64),
    SetQuietThreshold(u64),
    Kill(oneshot::Sender<()>),
}

/// Cheap cloneable handle to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    pub id: String,
    pub command: String,
    pub name: Option<String>,
    pub reason: Option<String>,
    /// Whether overlay renders carry re-emitted color codes.
    pub ansi_reemit: bool,
    started_at: std::time::Instant,
    session: PtySession,
    cmd_tx: mpsc::Sender<ControllerMsg>,
    result_rx: watch::Receiver<Option<ShellResult>>,
    ui_rx: watch::Receiver<u64>,
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle").field("id", &self.id).finish()
    }
}

impl ControllerHandle {
    /// Programmatic driver input.
    pub async fn write(&self, data: Bytes) -> Result<(), ErrorCode> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerMsg::DriverWrite(data, tx))
            .await
            .map_err(|_| ErrorCode::SessionNotFound)?;
        rx.await.map_err(|_| ErrorCode::SessionNotFound)?
    }

    /// One user keystroke (key token) from the overlay.
    pub async fn user_key(&self, key: impl Into<String>) {
        let _ = self.cmd_tx.send(ControllerMsg::UserKey(key.into())).await;
    }

    pub async fn query(
        &self,
        opts: QueryOptions,
        skip_rate_limit: bool,
    ) -> Result<QueryReply, ErrorCode> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerMsg::Query { opts, skip_rate_limit, reply: tx })
            .await
            .map_err(|_| ErrorCode::SessionNotFound)?;
        rx.await.map_err(|_| ErrorCode::SessionNotFound)?
    }

    pub async fn status(&self) -> Result<StatusSnapshot, ErrorCode> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerMsg::Status(tx))
            .await
            .map_err(|_| ErrorCode::SessionNotFound)?;
        rx.await.map_err(|_| ErrorCode::SessionNotFound)
    }

    /// Request termination. Resolves once the controller reached `Exited`.
    pub async fn kill(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(ControllerMsg::Kill(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn set_update_interval(&self, ms: u64) {
        let _ = self.cmd_tx.send(ControllerMsg::SetUpdateInterval(ms)).await;
    }

    pub async fn set_quiet_threshold(&self, ms: u64) {
        let _ = self.cmd_tx.send(ControllerMsg::SetQuietThreshold(ms)).await;
    }

    /// Completion watch: resolves to the final result exactly once.
    pub fn on_complete(&self) -> watch::Receiver<Option<ShellResult>> {
        self.result_rx.clone()
    }

    pub fn result(&self) -> Option<ShellResult> {
        self.result_rx.borrow().clone()
    }

    /// UI invalidation ticks for the overlay (state/dialog/scroll changes).
    pub fn subscribe_ui(&self) -> watch::Receiver<u64> {
        self.ui_rx.clone()
    }

    pub fn runtime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn session(&self) -> &PtySession {
        &self.session
    }
}

/// Spawn a controller, either over a fresh child or an existing (reattached)
/// PTY session. The caller registers the returned handle.
pub fn spawn_controller(
    options: ControllerOptions,
    registry: Arc<SessionRegistry>,
    update_tx: mpsc::UnboundedSender<HandsFreeUpdate>,
    existing: Option<PtySession>,
) -> anyhow::Result<ControllerHandle> {
    let session = match existing {
        Some(session) => session,
        None => PtySession::spawn(PtySessionOptions {
            command: options.command.clone(),
            cwd: options.cwd.clone(),
            cols: options.cols,
            rows: options.rows,
            scrollback_lines: options.config.scrollback_lines,
            raw_log_capacity: options.config.raw_log_capacity(),
        })?,
    };

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
    let (result_tx, result_rx) = watch::channel(None);
    let (ui_tx, ui_rx) = watch::channel(0u64);

    let handle = ControllerHandle {
        id: options.id.clone(),
        command: options.command.clone(),
        name: options.name.clone(),
        reason: options.reason.clone(),
        ansi_reemit: options.config.ansi_reemit,
        started_at: std::time::Instant::now(),
        session: session.clone(),
        cmd_tx,
        result_rx,
        ui_rx,
    };

    let now = Instant::now();
    let config = &options.config;
    let controller = Controller {
        id: options.id,
        command: options.command,
        cwd: options.cwd,
        name: options.name,
        reason: options.reason,
        state: if options.hands_free { SessionState::HandsFree } else { SessionState::Running },
        prev_state: SessionState::Running,
        hands_free_origin: options.hands_free,
        auto_exit_on_quiet: options.auto_exit_on_quiet,
        user_took_over: false,
        finished: false,
        shutdown: false,
        dispose_on_shutdown: true,
        started_at: std::time::Instant::now(),
        last_query_time: None,
        last_escape: None,
        update_mode: config.hands_free_update_mode,
        update_interval: config.update_interval(),
        quiet_threshold: config.quiet_threshold(),
        double_escape_threshold: config.double_escape_threshold(),
        exit_close_delay: config.exit_auto_close_delay(),
        min_query_interval: config.min_query_interval(),
        preview_config: config.handoff_preview.clone(),
        snapshot_config: config.handoff_snapshot.clone(),
        preview_enabled: options.handoff_preview.unwrap_or(config.handoff_preview.enabled),
        snapshot_enabled: options.handoff_snapshot.unwrap_or(config.handoff_snapshot.enabled),
        emitter: Emitter::new(config.update_max_chars, config.max_total_chars),
        emit_cursor: session.log_total_written(),
        incremental_line_cursor: 0,
        dialog_selected: 0,
        exit_status: None,
        kill_waiters: Vec::new(),
        pending_escape: false,
        initial_at: options.hands_free.then(|| now + INITIAL_UPDATE_DELAY),
        interval_at: options.hands_free.then(|| now + config.update_interval()),
        quiet_at: None,
        timeout_at: options.timeout.map(|t| now + t),
        countdown_at: None,
        escape_flush_at: None,
        session: session.clone(),
        registry,
        update_tx,
        result_tx,
        ui_tx,
    };

    tokio::spawn(controller.run(cmd_rx));
    Ok(handle)
}

struct Controller {
    id: String,
    command: String,
    cwd: PathBuf,
    name: Option<String>,
    reason: Option<String>,

    state: SessionState,
    /// State to restore when the detach dialog is cancelled.
    prev_state: SessionState,
    hands_free_origin: bool,
    auto_exit_on_quiet: bool,
    user_took_over: bool,
    /// One-way latch: set on entry to `Exited`, blocks re-entry.
    finished: bool,
    /// Leave the run loop (after any countdown).
    shutdown: bool,
    dispose_on_shutdown: bool,

    started_at: std::time::Instant,
    last_query_time: Option<std::time::Instant>,
    last_escape: Option<std::time::Instant>,

    update_mode: HandsFreeUpdateMode,
    update_interval: Duration,
    quiet_threshold: Duration,
    double_escape_threshold: Duration,
    exit_close_delay: Duration,
    min_query_interval: Duration,
    preview_config: HandoffConfig,
    snapshot_config: HandoffConfig,
    preview_enabled: bool,
    snapshot_enabled: bool,

    emitter: Emitter,
    /// Raw-log offset consumed by hands-free emissions.
    emit_cursor: u64,
    /// Raw-log line count consumed by `incremental` reads.
    incremental_line_cursor: u64,
    dialog_selected: usize,
    exit_status: Option<ExitStatus>,
    kill_waiters: Vec<oneshot::Sender<()>>,
    /// A hands-free escape held back while it may still be half of a
    /// detach gesture. Flushed, never dropped.
    pending_escape: bool,

    // Timer slots; None = disarmed.
    initial_at: Option<Instant>,
    interval_at: Option<Instant>,
    quiet_at: Option<Instant>,
    timeout_at: Option<Instant>,
    countdown_at: Option<Instant>,
    escape_flush_at: Option<Instant>,

    session: PtySession,
    registry: Arc<SessionRegistry>,
    update_tx: mpsc::UnboundedSender<HandsFreeUpdate>,
    result_tx: watch::Sender<Option<ShellResult>>,
    ui_tx: watch::Sender<u64>,
}

/// Sleep until an optional deadline; pending forever when disarmed.
async fn sleep_slot(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Wait for the child's exit status, returning an owned value instead of the
/// `watch::Ref` guard so the future stays `Send`.
async fn wait_for_exit(exit_rx: &mut watch::Receiver<Option<ExitStatus>>) -> ExitStatus {
    exit_rx
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|s| *s)
        .unwrap_or_default()
}

impl Controller {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<ControllerMsg>) {
        let mut data_rx = self.session.subscribe_data();
        let mut exit_rx = self.session.subscribe_exit();
        debug!(id = %self.id, state = ?self.state, "controller started");

        loop {
            let initial_at = self.initial_at;
            let interval_at = self.interval_at;
            let quiet_at = self.quiet_at;
            let timeout_at = self.timeout_at;
            let countdown_at = self.countdown_at;
            let escape_at = self.escape_flush_at;
            let exit_pending = !self.finished && self.exit_status.is_none();

            tokio::select! {
                msg = cmd_rx.recv() => match msg {
                    Some(msg) => self.handle_msg(msg).await,
                    None => {
                        // Every handle dropped: nobody can observe this
                        // session any more; terminate it.
                        if !self.finished {
                            self.finish_kill(EndReason::Kill, false, true);
                        }
                        self.shutdown = true;
                        self.countdown_at = None;
                    }
                },

                result = data_rx.changed(), if !self.finished => {
                    if result.is_ok() {
                        self.on_data();
                    }
                }

                status = wait_for_exit(&mut exit_rx), if exit_pending => {
                    self.on_child_exit(status);
                }

                _ = sleep_slot(quiet_at), if quiet_at.is_some() && !self.finished => {
                    self.on_quiet();
                }

                _ = sleep_slot(interval_at), if interval_at.is_some() && !self.finished => {
                    self.on_interval();
                }

                _ = sleep_slot(initial_at), if initial_at.is_some() && !self.finished => {
                    self.initial_at = None;
                    if self.state == SessionState::HandsFree && self.has_unsent() {
                        self.emit_running();
                    }
                }

                _ = sleep_slot(timeout_at), if timeout_at.is_some() && !self.finished => {
                    self.timeout_at = None;
                    warn!(id = %self.id, "session timeout reached");
                    self.finish_kill(EndReason::Timeout, true, false);
                }

                // Double-escape window elapsed without a second escape: the
                // held byte was real input after all.
                _ = sleep_slot(escape_at), if escape_at.is_some() && !self.finished => {
                    self.escape_flush_at = None;
                    self.flush_held_escape().await;
                }

                _ = sleep_slot(countdown_at), if countdown_at.is_some() => {
                    self.countdown_at = None;
                    self.shutdown = true;
                }
            }

            if self.shutdown && self.countdown_at.is_none() {
                break;
            }
        }

        if self.dispose_on_shutdown {
            self.session.dispose();
        }
        debug!(id = %self.id, "controller stopped");
    }

    // -- Message handling -----------------------------------------------------

    async fn handle_msg(&mut self, msg: ControllerMsg) {
        match msg {
            ControllerMsg::DriverWrite(data, reply) => {
                let result = if self.finished {
                    Err(ErrorCode::WriteFailed)
                } else {
                    self.session.write(data).await.map_err(|_| ErrorCode::WriteFailed)
                };
                let _ = reply.send(result);
            }
            ControllerMsg::UserKey(key) => self.handle_user_key(key).await,
            ControllerMsg::Query { opts, skip_rate_limit, reply } => {
                let _ = reply.send(self.handle_query(&opts, skip_rate_limit));
            }
            ControllerMsg::Status(reply) => {
                let _ = reply.send(self.status_snapshot());
            }
            ControllerMsg::SetUpdateInterval(ms) => {
                self.update_interval = Duration::from_millis(ms.clamp(5000, 300_000));
                if self.interval_at.is_some() {
                    self.interval_at = Some(Instant::now() + self.update_interval);
                }
            }
            ControllerMsg::SetQuietThreshold(ms) => {
                self.quiet_threshold = Duration::from_millis(ms.clamp(1000, 30_000));
            }
            ControllerMsg::Kill(done) => {
                self.kill_waiters.push(done);
                if !self.finished {
                    self.finish_kill(EndReason::Kill, false, false);
                } else {
                    self.notify_kill_waiters();
                }
            }
        }
    }

    // -- Data / timers --------------------------------------------------------

    fn on_data(&mut self) {
        if self.state == SessionState::HandsFree
            && (self.update_mode == HandsFreeUpdateMode::OnQuiet || self.auto_exit_on_quiet)
        {
            self.quiet_at = Some(Instant::now() + self.quiet_threshold);
        }
        self.bump_ui();
    }

    fn on_quiet(&mut self) {
        self.quiet_at = None;
        if self.auto_exit_on_quiet {
            debug!(id = %self.id, "quiet window elapsed, auto-exiting");
            self.finish_kill(EndReason::Kill, false, false);
            return;
        }
        if self.update_mode == HandsFreeUpdateMode::OnQuiet && self.has_unsent() {
            self.emit_running();
        }
    }

    fn on_interval(&mut self) {
        self.interval_at = Some(Instant::now() + self.update_interval);
        match self.update_mode {
            HandsFreeUpdateMode::OnQuiet => {
                // Fallback only: fire when data is pending but quiet never
                // elapsed (continuous output).
                if self.has_unsent() {
                    self.emit_running();
                }
            }
            HandsFreeUpdateMode::Interval => self.emit_running(),
        }
    }

    fn on_child_exit(&mut self, status: ExitStatus) {
        self.exit_status = Some(status);
        if self.finished {
            return;
        }
        debug!(id = %self.id, ?status, "child exited");
        self.enter_exited();
        self.emit_exited(status);
        self.registry.unregister_active(&self.id, true);
        let (preview, snapshot_path) = self.make_handoff(EndReason::Exit, Some(status));
        self.resolve_result(ShellResult {
            session_id: self.id.clone(),
            command: self.command.clone(),
            exit_code: status.code,
            signal: status.signal,
            runtime_ms: self.runtime_ms(),
            timed_out: false,
            cancelled: false,
            backgrounded: false,
            background_id: None,
            minimized: false,
            user_took_over: self.user_took_over,
            total_chars_sent: self.emitter.total_sent(),
            budget_exhausted: self.emitter.exhausted(),
            handoff_preview: preview,
            snapshot_path,
        });
        // Leave the overlay time to show the result, then shut down.
        self.countdown_at = Some(Instant::now() + self.exit_close_delay);
        self.shutdown = true;
        self.bump_ui();
    }

    // -- User input -----------------------------------------------------------

    async fn handle_user_key(&mut self, key: String) {
        match self.state {
            SessionState::DetachDialog => self.handle_dialog_key(&key),
            SessionState::Exited => {
                // Any key during the exit countdown closes the overlay early.
                if matches!(key.as_str(), "escape" | "esc" | "enter" | "return") {
                    self.countdown_at = None;
                    self.shutdown = true;
                }
            }
            SessionState::Running | SessionState::HandsFree => {
                if SCROLL_KEYS.contains(&key.as_str()) {
                    self.apply_scroll(&key);
                    return;
                }

                if matches!(key.as_str(), "escape" | "esc") {
                    let now = std::time::Instant::now();
                    let double = self
                        .last_escape
                        .is_some_and(|t| now.duration_since(t) <= self.double_escape_threshold);
                    if double {
                        // Both escapes are consumed by the detach gesture.
                        self.last_escape = None;
                        self.pending_escape = false;
                        self.escape_flush_at = None;
                        if self.state == SessionState::HandsFree {
                            self.trigger_takeover();
                        }
                        self.open_dialog();
                    } else {
                        self.last_escape = Some(now);
                        if self.state == SessionState::Running {
                            let _ = self.session.write(Bytes::from_static(b"\x1b")).await;
                        } else {
                            // Hold the byte: it may be half of a detach
                            // gesture. The flush timer delivers it if no
                            // second escape arrives in the window.
                            self.pending_escape = true;
                            self.escape_flush_at =
                                Some(Instant::now() + self.double_escape_threshold);
                        }
                    }
                    return;
                }

                self.last_escape = None;
                if self.state == SessionState::HandsFree {
                    self.trigger_takeover();
                }
                // A held escape turned out to be plain input; deliver it
                // first so bytes reach the child in typed order.
                self.flush_held_escape().await;
                let bytes = keys::encode_key(&key);
                if self.session.is_scrolled_up() {
                    self.session.scroll_to_bottom();
                }
                let _ = self.session.write(Bytes::from(bytes)).await;
            }
        }
    }

    /// Deliver a held hands-free escape to the child.
    async fn flush_held_escape(&mut self) {
        if !self.pending_escape {
            return;
        }
        self.pending_escape = false;
        self.escape_flush_at = None;
        let _ = self.session.write(Bytes::from_static(b"\x1b")).await;
    }

    fn apply_scroll(&mut self, key: &str) {
        let (_, rows) = self.session.dims();
        let page = rows.saturating_sub(1).max(1) as usize;
        match key {
            "pageup" | "pgup" | "ppage" | "shift+pageup" => self.session.scroll_up(page),
            "pagedown" | "pgdn" | "npage" | "shift+pagedown" => self.session.scroll_down(page),
            "shift+up" => self.session.scroll_up(1),
            "shift+down" => self.session.scroll_down(1),
            "shift+home" => self.session.scroll_to_top(),
            "shift+end" => self.session.scroll_to_bottom(),
            _ => {}
        }
        self.bump_ui();
    }

    /// Irreversible hands-free → user-controlled transition.
    fn trigger_takeover(&mut self) {
        if self.state != SessionState::HandsFree {
            return;
        }
        debug!(id = %self.id, "user takeover");
        self.flush_pending();
        self.send_update(HandsFreeUpdate::UserTakeover { meta: self.meta() });
        self.user_took_over = true;
        self.state = SessionState::Running;
        self.quiet_at = None;
        self.interval_at = None;
        self.initial_at = None;
        self.registry.unregister_active(&self.id, false);
        self.bump_ui();
    }

    fn open_dialog(&mut self) {
        self.prev_state = self.state;
        self.state = SessionState::DetachDialog;
        self.dialog_selected = 0;
        self.bump_ui();
    }

    fn handle_dialog_key(&mut self, key: &str) {
        match key {
            "up" | "shift+tab" | "btab" => {
                self.dialog_selected =
                    self.dialog_selected.checked_sub(1).unwrap_or(DetachChoice::ALL.len() - 1);
                self.bump_ui();
            }
            "down" | "tab" => {
                self.dialog_selected = (self.dialog_selected + 1) % DetachChoice::ALL.len();
                self.bump_ui();
            }
            "enter" | "return" => {
                let choice = DetachChoice::ALL[self.dialog_selected];
                self.apply_dialog_choice(choice);
            }
            "escape" | "esc" => self.apply_dialog_choice(DetachChoice::Cancel),
            "k" => self.apply_dialog_choice(DetachChoice::Kill),
            "b" => self.apply_dialog_choice(DetachChoice::Background),
            "m" => self.apply_dialog_choice(DetachChoice::Minimize),
            _ => {}
        }
    }

    fn apply_dialog_choice(&mut self, choice: DetachChoice) {
        match choice {
            DetachChoice::Cancel => {
                self.state = self.prev_state;
                self.bump_ui();
            }
            DetachChoice::Kill => self.finish_kill(EndReason::Kill, false, false),
            DetachChoice::Background | DetachChoice::Minimize => self.finish_detach(choice),
        }
    }

    // -- Query handling -------------------------------------------------------

    fn handle_query(
        &mut self,
        opts: &QueryOptions,
        skip_rate_limit: bool,
    ) -> Result<QueryReply, ErrorCode> {
        opts.validate()?;

        let now = std::time::Instant::now();
        let bypass = skip_rate_limit || self.finished || self.state == SessionState::Exited;
        if !bypass {
            if let Some(last) = self.last_query_time {
                let elapsed = now.duration_since(last);
                // Exactly-on-time queries pass: the boundary is `>=`.
                if elapsed < self.min_query_interval {
                    let remaining = self.min_query_interval - elapsed;
                    let wait = (remaining.as_secs_f64().ceil() as u32).max(1);
                    return Ok(QueryReply {
                        status: self.status_snapshot(),
                        output: OutputResult {
                            rate_limited: true,
                            wait_seconds: Some(wait),
                            total_bytes: self.session.log_total_written(),
                            ..OutputResult::default()
                        },
                    });
                }
            }
        }
        self.last_query_time = Some(now);

        let output = self.read_output(opts);
        Ok(QueryReply { status: self.status_snapshot(), output })
    }

    fn read_output(&mut self, opts: &QueryOptions) -> OutputResult {
        let lines_req = opts.lines();
        let max_chars = opts.max_chars();

        if opts.drain {
            let stream = self.session.raw_stream(true, true);
            let (output, truncated) = cap_tail_chars(&stream.text.unwrap_or_default(), max_chars);
            return OutputResult {
                output,
                truncated,
                total_bytes: stream.total_bytes,
                ..OutputResult::default()
            };
        }

        if opts.incremental || opts.offset.is_some() {
            let all = self.stripped_lines();
            let total = all.len() as u64;
            let start = match opts.offset {
                Some(offset) => offset.min(total) as usize,
                None => self.incremental_line_cursor.min(total) as usize,
            };
            let take = lines_req.min(all.len() - start);
            let (output, truncated) = cap_tail_chars(&all[start..start + take].join("\n"), max_chars);
            if opts.incremental {
                self.incremental_line_cursor = (start + take) as u64;
            }
            let more = ((start + take) as u64) < total;
            return OutputResult {
                output,
                truncated,
                total_bytes: self.session.log_total_written(),
                total_lines: Some(total),
                has_more: more.then_some(true),
                ..OutputResult::default()
            };
        }

        // Default: last N rendered lines from the emulator.
        let (tail, truncated) = self.session.tail_lines(lines_req, false, max_chars);
        OutputResult {
            output: tail.join("\n"),
            truncated,
            total_bytes: self.session.log_total_written(),
            ..OutputResult::default()
        }
    }

    /// Fully terminated strip-ANSI lines of the raw log. The segment after
    /// the last newline is still being written and stays unread.
    fn stripped_lines(&self) -> Vec<String> {
        let raw = self.session.raw_contents();
        let text = crate::ansi::strip_ansi(&raw);
        let mut lines: Vec<String> = text.split('\n').map(str::to_owned).collect();
        lines.pop();
        lines
    }

    // -- Emission -------------------------------------------------------------

    fn has_unsent(&self) -> bool {
        self.session.child_output_end() > self.emit_cursor
    }

    fn flush_pending(&mut self) {
        if self.state == SessionState::HandsFree && self.has_unsent() {
            self.emit_running();
        }
    }

    fn emit_running(&mut self) {
        let bytes = self.session.read_child_output_since(&mut self.emit_cursor);
        let (tail, truncated) = self.emitter.consume(&bytes);
        self.send_update(HandsFreeUpdate::Running { meta: self.meta(), tail, truncated });
    }

    fn emit_exited(&mut self, status: ExitStatus) {
        // Pending bytes were flushed by enter_exited; the terminal update
        // carries whatever raced in since (normally nothing).
        let bytes = self.session.read_child_output_since(&mut self.emit_cursor);
        let (tail, _) = self.emitter.consume(&bytes);
        self.send_update(HandsFreeUpdate::Exited {
            meta: self.meta(),
            tail,
            exit_code: status.code,
            signal: status.signal,
        });
    }

    fn send_update(&self, update: HandsFreeUpdate) {
        // After takeover the driver's session is over: UserTakeover was its
        // terminal notification.
        if self.hands_free_origin && !self.user_took_over {
            let _ = self.update_tx.send(update);
        }
    }

    fn meta(&self) -> UpdateMeta {
        UpdateMeta {
            session_id: self.id.clone(),
            runtime_ms: self.runtime_ms(),
            total_chars_sent: self.emitter.total_sent(),
            budget_exhausted: self.emitter.exhausted(),
        }
    }

    // -- Terminal transitions -------------------------------------------------

    /// Common entry into `Exited`: latch, clear timers, flush the pending
    /// hands-free update.
    fn enter_exited(&mut self) {
        self.finished = true;
        self.flush_pending();
        self.state = SessionState::Exited;
        self.initial_at = None;
        self.interval_at = None;
        self.quiet_at = None;
        self.timeout_at = None;
        self.escape_flush_at = None;
        self.pending_escape = false;
    }

    fn finish_kill(&mut self, reason: EndReason, timed_out: bool, cancelled: bool) {
        if self.finished {
            return;
        }
        self.enter_exited();
        self.session.kill();
        let status = self.session.exit_status().unwrap_or_default();
        self.emit_exited(status);
        self.registry.unregister_active(&self.id, true);
        let (preview, snapshot_path) = self.make_handoff(reason, Some(status));
        self.resolve_result(ShellResult {
            session_id: self.id.clone(),
            command: self.command.clone(),
            exit_code: status.code,
            signal: status.signal,
            runtime_ms: self.runtime_ms(),
            timed_out,
            cancelled,
            backgrounded: false,
            background_id: None,
            minimized: false,
            user_took_over: self.user_took_over,
            total_chars_sent: self.emitter.total_sent(),
            budget_exhausted: self.emitter.exhausted(),
            handoff_preview: preview,
            snapshot_path,
        });
        self.shutdown = true;
        self.countdown_at = None;
        self.bump_ui();
    }

    fn finish_detach(&mut self, choice: DetachChoice) {
        if self.finished {
            return;
        }
        self.enter_exited();
        self.registry.unregister_active(&self.id, false);

        let parked = crate::registry::ParkedSession {
            id: self.id.clone(),
            name: self.name.clone(),
            command: self.command.clone(),
            reason: self.reason.clone(),
            started_at: self.started_at,
            session: self.session.clone(),
        };
        let backgrounded = choice == DetachChoice::Background;
        if backgrounded {
            self.registry.park_background(parked);
        } else {
            self.registry.park_minimized(parked);
        }

        let (preview, snapshot_path) = self.make_handoff(EndReason::Detach, None);
        self.resolve_result(ShellResult {
            session_id: self.id.clone(),
            command: self.command.clone(),
            exit_code: None,
            signal: None,
            runtime_ms: self.runtime_ms(),
            timed_out: false,
            cancelled: false,
            backgrounded,
            background_id: backgrounded.then(|| self.id.clone()),
            minimized: !backgrounded,
            user_took_over: self.user_took_over,
            total_chars_sent: self.emitter.total_sent(),
            budget_exhausted: self.emitter.exhausted(),
            handoff_preview: preview,
            snapshot_path,
        });
        // The PTY lives on in the registry.
        self.dispose_on_shutdown = false;
        self.shutdown = true;
        self.countdown_at = None;
        self.bump_ui();
    }

    fn make_handoff(
        &self,
        when: EndReason,
        status: Option<ExitStatus>,
    ) -> (Option<HandoffPreview>, Option<PathBuf>) {
        let needs_raw = self.preview_enabled || self.snapshot_enabled;
        if !needs_raw {
            return (None, None);
        }
        let raw = self.session.raw_contents();

        let preview = self
            .preview_enabled
            .then(|| handoff::build_preview(&raw, &self.preview_config, when));

        let snapshot_path = if self.snapshot_enabled {
            let status = status.unwrap_or_default();
            let meta = SnapshotMeta {
                when,
                command: &self.command,
                cwd: &self.cwd,
                pid: self.session.pid(),
                exit_code: status.code,
                signal: status.signal,
            };
            handoff::write_snapshot(&meta, &raw, &self.snapshot_config)
        } else {
            None
        };

        (preview, snapshot_path)
    }

    fn resolve_result(&mut self, result: ShellResult) {
        let _ = self.result_tx.send(Some(result));
        self.notify_kill_waiters();
    }

    fn notify_kill_waiters(&mut self) {
        for waiter in self.kill_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    // -- Misc -----------------------------------------------------------------

    fn status_snapshot(&self) -> StatusSnapshot {
        let status = self.exit_status.or_else(|| self.session.exit_status());
        StatusSnapshot {
            session_id: self.id.clone(),
            state: self.state,
            runtime_ms: self.runtime_ms(),
            exited: self.session.exited() || self.finished,
            exit_code: status.and_then(|s| s.code),
            signal: status.and_then(|s| s.signal),
            total_chars_sent: self.emitter.total_sent(),
            budget_exhausted: self.emitter.exhausted(),
            dialog_selected: (self.state == SessionState::DetachDialog)
                .then_some(self.dialog_selected),
        }
    }

    fn runtime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    fn bump_ui(&self) {
        self.ui_tx.send_modify(|seq| *seq += 1);
    }
}

/// Cap text to `max_chars`, keeping the tail.
fn cap_tail_chars(text: &str, max_chars: usize) -> (String, bool) {
    let count = text.chars().count();
    if count <= max_chars {
        (text.to_owned(), false)
    } else {
        (text.chars().skip(count - max_chars).collect(), true)
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
