// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`PtySession`]: one child under a PTY, with the append-only raw log as
//! the system of record and the screen emulator as a derived view.
//!
//! The pump task enforces the ordering contract: raw-log append strictly
//! precedes the data notification; the exit status line is appended and the
//! write queue drained before the exit notification fires.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::ansi;
use crate::rawlog::RawLog;
use crate::screen::Screen;

use super::spawn::{signal_tree, ExitStatus, PtyProcess};
use super::PtyInput;

/// Grace period between SIGTERM and SIGKILL on `kill()`.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Depth of the write/resize queue.
const INPUT_QUEUE: usize = 256;

#[derive(Debug, Clone)]
pub struct PtySessionOptions {
    pub command: String,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub scrollback_lines: usize,
    pub raw_log_capacity: usize,
}

/// One chunk of the driver's raw-stream projection.
#[derive(Debug, Clone)]
pub struct RawStream {
    pub bytes: Bytes,
    /// Strip-ANSI text, present when requested.
    pub text: Option<String>,
    pub total_bytes: u64,
}

struct Inner {
    command: String,
    cwd: PathBuf,
    pid: u32,
    log: Mutex<RawLog>,
    screen: Mutex<Screen>,
    /// Driver raw-stream cursor (`since_last` reads).
    stream_cursor: Mutex<u64>,
    dims: Mutex<(u16, u16)>,
    exited: AtomicBool,
    kill_requested: AtomicBool,
    disposed: AtomicBool,
    /// Raw-log offset of the last byte the child itself wrote; everything
    /// past it is the terminal status line. `u64::MAX` until exit.
    child_output_end: AtomicU64,
    exit_status: Mutex<Option<ExitStatus>>,
    data_tx: watch::Sender<u64>,
    exit_tx: watch::Sender<Option<ExitStatus>>,
}

/// Cheap handle to one PTY-attached child. Clones share the same session.
#[derive(Clone)]
pub struct PtySession {
    inner: Arc<Inner>,
    input_tx: mpsc::Sender<PtyInput>,
}

impl std::fmt::Debug for PtySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtySession")
            .field("pid", &self.inner.pid)
            .field("command", &self.inner.command)
            .field("exited", &self.exited())
            .finish()
    }
}

impl PtySession {
    /// Spawn the child and start the I/O and pump tasks.
    pub fn spawn(options: PtySessionOptions) -> anyhow::Result<Self> {
        let process = PtyProcess::spawn(&options.command, &options.cwd, options.cols, options.rows)
            .context("spawn failed")?;
        let pid = process.pid();

        let (output_tx, output_rx) = mpsc::channel::<Bytes>(INPUT_QUEUE);
        let (input_tx, input_rx) = mpsc::channel::<PtyInput>(INPUT_QUEUE);
        let (data_tx, _) = watch::channel(0u64);
        let (exit_tx, _) = watch::channel(None);

        let inner = Arc::new(Inner {
            command: options.command,
            cwd: options.cwd,
            pid,
            log: Mutex::new(RawLog::new(options.raw_log_capacity)),
            screen: Mutex::new(Screen::new(options.cols, options.rows, options.scrollback_lines)),
            stream_cursor: Mutex::new(0),
            dims: Mutex::new((options.cols, options.rows)),
            exited: AtomicBool::new(false),
            kill_requested: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            child_output_end: AtomicU64::new(u64::MAX),
            exit_status: Mutex::new(None),
            data_tx,
            exit_tx,
        });

        let io_handle = tokio::spawn(process.run(output_tx, input_rx));
        tokio::spawn(pump(Arc::clone(&inner), output_rx, input_tx.clone(), io_handle));

        Ok(Self { inner, input_tx })
    }

    // -- Identity -------------------------------------------------------------

    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn command(&self) -> &str {
        &self.inner.command
    }

    pub fn cwd(&self) -> &std::path::Path {
        &self.inner.cwd
    }

    // -- Write side -----------------------------------------------------------

    /// Queue bytes for the child. Per-session FIFO; never reorders with a
    /// preceding resize.
    pub async fn write(&self, data: Bytes) -> anyhow::Result<()> {
        self.input_tx
            .send(PtyInput::Write(data))
            .await
            .map_err(|_| anyhow::anyhow!("pty write queue closed"))
    }

    /// Resize the PTY. Idempotent; a no-op when dimensions are unchanged.
    pub async fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        {
            let mut dims = self.inner.dims.lock();
            if *dims == (cols, rows) {
                return Ok(());
            }
            *dims = (cols, rows);
        }
        self.inner.screen.lock().resize(cols, rows);
        self.input_tx
            .send(PtyInput::Resize(cols, rows))
            .await
            .map_err(|_| anyhow::anyhow!("pty write queue closed"))
    }

    pub fn dims(&self) -> (u16, u16) {
        *self.inner.dims.lock()
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Terminate the child's process tree: SIGTERM now, SIGKILL after a
    /// short grace. Idempotent; the exit notification fires exactly once,
    /// through the normal reap path.
    pub fn kill(&self) {
        if self.inner.kill_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.inner.exited.load(Ordering::Acquire) {
            return;
        }
        debug!(pid = self.inner.pid, "killing session process tree");
        signal_tree(self.inner.pid, Signal::SIGTERM);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(KILL_GRACE).await;
            if !inner.exited.load(Ordering::Acquire) {
                warn!(pid = inner.pid, "grace expired, escalating to SIGKILL");
                signal_tree(inner.pid, Signal::SIGKILL);
            }
        });
    }

    /// Release the session after all consumers are done. Kills the child if
    /// it is still running.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.exited() {
            self.kill();
        }
        debug!(pid = self.inner.pid, "session disposed");
    }

    pub fn exited(&self) -> bool {
        self.inner.exited.load(Ordering::Acquire)
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.inner.exit_status.lock()
    }

    // -- Event hooks ----------------------------------------------------------

    /// Data notifications: the watched value is the raw-log size after the
    /// append that triggered the notification.
    pub fn subscribe_data(&self) -> watch::Receiver<u64> {
        self.inner.data_tx.subscribe()
    }

    /// Exit notification; the value is set exactly once.
    pub fn subscribe_exit(&self) -> watch::Receiver<Option<ExitStatus>> {
        self.inner.exit_tx.subscribe()
    }

    // -- Read projections -----------------------------------------------------

    /// Exactly `rows` screen lines at the current scroll position.
    pub fn viewport_lines(&self, ansi: bool) -> Vec<String> {
        self.inner.screen.lock().viewport_lines(ansi)
    }

    /// Last `lines` rendered lines, character-budget-bounded.
    pub fn tail_lines(&self, lines: usize, ansi: bool, max_chars: usize) -> (Vec<String>, bool) {
        self.inner.screen.lock().tail_lines(lines, ansi, max_chars)
    }

    /// Read the raw byte log. `since_last` advances the internal stream
    /// cursor so successive reads return disjoint contiguous ranges;
    /// `strip` adds the plain-text projection.
    pub fn raw_stream(&self, since_last: bool, strip: bool) -> RawStream {
        let log = self.inner.log.lock();
        let bytes = if since_last {
            let mut cursor = self.inner.stream_cursor.lock();
            log.read_since(&mut cursor)
        } else {
            Bytes::from(log.contents())
        };
        let text = strip.then(|| ansi::strip_ansi(&bytes));
        RawStream { bytes, text, total_bytes: log.total_written() }
    }

    /// Full resident raw-log contents (handoff artifacts).
    pub fn raw_contents(&self) -> Vec<u8> {
        self.inner.log.lock().contents()
    }

    pub fn log_total_written(&self) -> u64 {
        self.inner.log.lock().total_written()
    }

    /// Read bytes after `cursor`, advancing it (caller-owned cursor).
    pub fn read_log_since(&self, cursor: &mut u64) -> Bytes {
        self.inner.log.lock().read_since(cursor)
    }

    /// Read bytes after `cursor` up to the child-output fence, so the
    /// terminal status line never leaks into an update tail.
    pub fn read_child_output_since(&self, cursor: &mut u64) -> Bytes {
        let end = self.child_output_end();
        self.inner.log.lock().read_span(cursor, end)
    }

    /// Raw-log offset where child output ends: the full log size while the
    /// child is alive, the pre-status-line fence after exit.
    pub fn child_output_end(&self) -> u64 {
        let fence = self.inner.child_output_end.load(Ordering::Acquire);
        if fence == u64::MAX {
            self.log_total_written()
        } else {
            fence
        }
    }

    // -- Scrollback navigation ------------------------------------------------

    pub fn scroll_up(&self, n: usize) {
        self.inner.screen.lock().scroll_up(n);
    }

    pub fn scroll_down(&self, n: usize) {
        self.inner.screen.lock().scroll_down(n);
    }

    pub fn scroll_to_top(&self) {
        self.inner.screen.lock().scroll_to_top();
    }

    pub fn scroll_to_bottom(&self) {
        self.inner.screen.lock().scroll_to_bottom();
    }

    pub fn is_scrolled_up(&self) -> bool {
        self.inner.screen.lock().is_scrolled_up()
    }
}

/// Receive child output and maintain the projections, in contract order:
/// raw log first, then screen, then DSR replies, then the data signal.
async fn pump(
    inner: Arc<Inner>,
    mut output_rx: mpsc::Receiver<Bytes>,
    input_tx: mpsc::Sender<PtyInput>,
    io_handle: tokio::task::JoinHandle<anyhow::Result<ExitStatus>>,
) {
    while let Some(bytes) = output_rx.recv().await {
        let total = {
            let mut log = inner.log.lock();
            log.append(&bytes);
            log.total_written()
        };
        inner.screen.lock().feed(&bytes);

        // A child querying the cursor must not hang: answer ESC[6n with the
        // emulator's current position, without surfacing either side.
        let queries = ansi::count_dsr(&bytes);
        if queries > 0 {
            let (row, col) = inner.screen.lock().cursor();
            let reply = Bytes::from(ansi::dsr_reply(row, col));
            for _ in 0..queries {
                if input_tx.send(PtyInput::Write(reply.clone())).await.is_err() {
                    break;
                }
            }
        }

        let _ = inner.data_tx.send(total);
    }

    // Output channel closed: the I/O loop stopped reading and drained the
    // write queue. Reap result comes from its join handle.
    let status = match io_handle.await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            warn!(error = %e, "pty runtime error, synthesizing exit");
            ExitStatus::default()
        }
        Err(e) => {
            warn!(error = %e, "pty io task panicked, synthesizing exit");
            ExitStatus::default()
        }
    };

    let line = exit_status_line(status);
    let total = {
        let mut log = inner.log.lock();
        inner.child_output_end.store(log.total_written(), Ordering::Release);
        log.append(line.as_bytes());
        log.total_written()
    };
    inner.screen.lock().feed(line.as_bytes());

    *inner.exit_status.lock() = Some(status);
    inner.exited.store(true, Ordering::Release);
    let _ = inner.data_tx.send(total);
    let _ = inner.exit_tx.send(Some(status));
    debug!(pid = inner.pid, ?status, "session exit recorded");
}

/// Terminal status line appended to the raw log when the child ends.
fn exit_status_line(status: ExitStatus) -> String {
    match (status.code, status.signal) {
        (Some(code), _) => format!("\r\n[process exited with code {code}]\r\n"),
        (None, Some(sig)) => format!("\r\n[process killed by signal {sig}]\r\n"),
        (None, None) => "\r\n[process ended]\r\n".to_owned(),
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
