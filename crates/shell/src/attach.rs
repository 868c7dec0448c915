// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `attach` command: reattach a background session to a fresh
//! controller and overlay. Without an argument the host renders a selector
//! over the background list; with an id the reattach is direct.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::overlay::{self, OverlayHost};
use crate::registry::{ParkedInfo, ParkedSession, SessionRegistry};
use crate::session::{spawn_controller, ControllerOptions, HandsFreeUpdate, ShellResult};

/// Registered command name.
pub const COMMAND_NAME: &str = "attach";

/// Outcome of an attach invocation.
#[derive(Debug)]
pub enum AttachOutcome {
    /// No-argument form: the host renders a selector over these entries and
    /// calls back with the chosen id.
    Select(Vec<ParkedInfo>),
    /// Background list is empty.
    NoSessions,
    /// Direct reattach missed.
    NotFound(String),
    /// Another overlay is rendering; the session stays parked.
    OverlayBusy,
    /// Reattached; the session ran to termination again.
    Finished(ShellResult),
}

impl AttachOutcome {
    /// User-facing message for the non-interactive outcomes.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::NoSessions => Some("No background sessions".to_owned()),
            Self::NotFound(id) => Some(format!("Session not found: {id}")),
            Self::OverlayBusy => Some("overlay_already_open".to_owned()),
            _ => None,
        }
    }
}

/// Dependencies for running the attach command.
pub struct AttachContext {
    pub registry: Arc<SessionRegistry>,
    pub overlay_host: Arc<dyn OverlayHost>,
    pub update_tx: mpsc::UnboundedSender<HandsFreeUpdate>,
    /// Test/embedding override; discovered from the session cwd otherwise.
    pub config_override: Option<Config>,
}

/// Entry point: no argument lists for the selector, an argument reattaches.
pub async fn run(ctx: &AttachContext, arg: Option<&str>) -> AttachOutcome {
    match arg {
        Some(id) => reattach(ctx, id).await,
        None => {
            let list = ctx.registry.list_background();
            if list.is_empty() {
                AttachOutcome::NoSessions
            } else {
                AttachOutcome::Select(list)
            }
        }
    }
}

/// Reattach a background session by id and supervise it to termination.
///
/// Cancels the pending cleanup watcher; an already-exited session still
/// attaches and shows the standard exit countdown.
pub async fn reattach(ctx: &AttachContext, id: &str) -> AttachOutcome {
    let Some(parked) = ctx.registry.remove_background(id) else {
        return AttachOutcome::NotFound(id.to_owned());
    };

    if !ctx.registry.try_open_overlay() {
        // Put it back exactly as it was; the watcher restarts.
        ctx.registry.park_background(parked);
        return AttachOutcome::OverlayBusy;
    }

    match reattach_inner(ctx, parked).await {
        Ok(result) => AttachOutcome::Finished(result),
        Err(outcome) => outcome,
    }
}

async fn reattach_inner(
    ctx: &AttachContext,
    parked: ParkedSession,
) -> Result<ShellResult, AttachOutcome> {
    let ParkedSession { id, name, command, reason, session, .. } = parked;
    info!(%id, "reattaching background session");

    let cwd = session.cwd().to_owned();
    let config = ctx.config_override.clone().unwrap_or_else(|| Config::load(&cwd));
    let (cols, rows) = session.dims();

    let options = ControllerOptions {
        id: id.clone(),
        command,
        cwd,
        name,
        reason,
        hands_free: false,
        timeout: None,
        auto_exit_on_quiet: false,
        cols,
        rows,
        config,
        handoff_preview: None,
        handoff_snapshot: None,
    };

    let handle = spawn_controller(
        options,
        Arc::clone(&ctx.registry),
        ctx.update_tx.clone(),
        Some(session),
    )
    .map_err(|_| {
        ctx.registry.close_overlay();
        AttachOutcome::NotFound(id.clone())
    })?;
    ctx.registry.register_active(handle.clone());

    match ctx.overlay_host.open_surface() {
        Ok(surface) => {
            overlay::spawn_presenter(surface, handle.clone(), Arc::clone(&ctx.registry));
        }
        Err(_) => {
            ctx.registry.close_overlay();
            handle.kill().await;
            return Err(AttachOutcome::OverlayBusy);
        }
    }

    let mut complete = handle.on_complete();
    let result = complete
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|r| r.clone());
    match result {
        Some(result) => Ok(result),
        None => Err(AttachOutcome::NotFound(handle.id.clone())),
    }
}

#[cfg(test)]
#[path = "attach_tests.rs"]
mod tests;
