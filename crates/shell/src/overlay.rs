// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overlay presenter: the user-visible surface bound 1:1 to a live
//! controller. The host TUI supplies a [`RenderSurface`] and feeds
//! keystrokes; lifecycle truth stays with the controller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::registry::SessionRegistry;
use crate::session::{ControllerHandle, DetachChoice, SessionState, StatusSnapshot};

/// Rendering surface provided by the host TUI. `draw` receives fully
/// composed lines; the engine does no layout beyond its own chrome.
pub trait RenderSurface: Send {
    /// Current (cols, rows) available to the overlay.
    fn size(&self) -> (u16, u16);
    fn draw(&mut self, lines: &[String]) -> anyhow::Result<()>;
}

/// Host-side factory for overlay surfaces. Absent on headless hosts, in
/// which case interactive mode is unavailable.
pub trait OverlayHost: Send + Sync {
    fn open_surface(&self) -> anyhow::Result<Box<dyn RenderSurface>>;
}

/// Render debounce: at most one draw per tick while output streams.
const RENDER_DEBOUNCE: Duration = Duration::from_millis(50);

/// Handle through which the host delivers user keystrokes (UTF-8 key
/// tokens) to the overlay.
#[derive(Clone)]
pub struct OverlayInput {
    key_tx: mpsc::Sender<String>,
}

impl OverlayInput {
    pub async fn key(&self, token: impl Into<String>) {
        let _ = self.key_tx.send(token.into()).await;
    }
}

/// Spawn the presenter task for a controller. Closes the registry's overlay
/// slot when the controller ends or the surface is torn down.
pub fn spawn_presenter(
    surface: Box<dyn RenderSurface>,
    handle: ControllerHandle,
    registry: Arc<SessionRegistry>,
) -> OverlayInput {
    let (key_tx, key_rx) = mpsc::channel(64);
    tokio::spawn(run(surface, handle, registry, key_rx));
    OverlayInput { key_tx }
}

async fn run(
    mut surface: Box<dyn RenderSurface>,
    handle: ControllerHandle,
    registry: Arc<SessionRegistry>,
    mut key_rx: mpsc::Receiver<String>,
) {
    let session = handle.session().clone();
    let mut data_rx = session.subscribe_data();
    let mut ui_rx = handle.subscribe_ui();
    let mut debounce = tokio::time::interval(RENDER_DEBOUNCE);
    debounce.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut dirty = true;
    let mut controller_gone = false;

    // Adopt the host surface dimensions before first paint.
    let (cols, rows) = surface.size();
    let _ = session.resize(cols, rows.saturating_sub(chrome_rows())).await;

    loop {
        tokio::select! {
            key = key_rx.recv() => match key {
                Some(token) => handle.user_key(token).await,
                None => break,
            },

            result = data_rx.changed() => {
                if result.is_err() {
                    break;
                }
                dirty = true;
            }

            result = ui_rx.changed() => {
                if result.is_err() {
                    // Controller finished; paint the final frame, then close.
                    controller_gone = true;
                } else {
                    dirty = true;
                }
            }

            _ = debounce.tick() => {
                if dirty {
                    dirty = false;
                    render(&mut surface, &handle, &session).await;
                }
            }
        }

        if controller_gone {
            render(&mut surface, &handle, &session).await;
            break;
        }
    }

    registry.close_overlay();
    debug!(id = %handle.id, "overlay closed");
}

/// Rows consumed by header and footer chrome.
fn chrome_rows() -> u16 {
    3
}

async fn render(
    surface: &mut Box<dyn RenderSurface>,
    handle: &ControllerHandle,
    session: &crate::pty::PtySession,
) {
    let status = match handle.status().await {
        Ok(status) => status,
        Err(_) => return,
    };
    let viewport = session.viewport_lines(handle.ansi_reemit);
    let scrolled = session.is_scrolled_up();
    let (cols, _) = surface.size();
    let lines = compose_frame(&status, &handle.command, &viewport, scrolled, cols as usize);
    let _ = surface.draw(&lines);
}

/// Build the full overlay frame: header, viewport, footer, and (when open)
/// the detach dialog replacing the footer hint.
pub fn compose_frame(
    status: &StatusSnapshot,
    command: &str,
    viewport: &[String],
    scrolled_up: bool,
    width: usize,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(viewport.len() + 4);

    let state = match status.state {
        SessionState::Running => "running",
        SessionState::HandsFree => "hands-free",
        SessionState::DetachDialog => "detach?",
        SessionState::Exited => "exited",
    };
    let runtime = format_runtime(status.runtime_ms);
    lines.push(clip(&format!("{command} — {state} · {runtime}"), width));

    // Viewport lines are already emulator-bounded to the PTY width, and may
    // carry SGR escapes a char clip would split.
    lines.extend(viewport.iter().cloned());

    if status.state == SessionState::DetachDialog {
        let selected = status.dialog_selected.unwrap_or(0);
        let mut row = String::from("detach: ");
        for (i, choice) in DetachChoice::ALL.iter().enumerate() {
            let marker = if i == selected { "▸" } else { " " };
            row.push_str(&format!("{marker}{} ", choice.label()));
        }
        lines.push(clip(&row, width));
    } else if status.state == SessionState::Exited {
        let code = status
            .exit_code
            .map(|c| format!("exit {c}"))
            .or_else(|| status.signal.map(|s| format!("signal {s}")))
            .unwrap_or_else(|| "ended".to_owned());
        lines.push(clip(&format!("[{code}] closing — Esc to dismiss"), width));
    } else {
        let hint = if scrolled_up {
            "scrolled ↑ · Shift+End to follow · Esc Esc to detach"
        } else {
            "PgUp/PgDn scroll · Esc Esc to detach"
        };
        lines.push(clip(hint, width));
    }

    lines
}

fn format_runtime(ms: u64) -> String {
    let secs = ms / 1000;
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

fn clip(text: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    text.chars().take(width).collect()
}

#[cfg(test)]
#[path = "overlay_tests.rs"]
mod tests;
