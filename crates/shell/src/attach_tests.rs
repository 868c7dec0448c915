// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::config::Config;
use crate::overlay::RenderSurface;
use crate::pty::{PtySession, PtySessionOptions};

struct NullSurface;

impl RenderSurface for NullSurface {
    fn size(&self) -> (u16, u16) {
        (100, 30)
    }

    fn draw(&mut self, _lines: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
}

struct NullHost;

impl OverlayHost for NullHost {
    fn open_surface(&self) -> anyhow::Result<Box<dyn RenderSurface>> {
        Ok(Box::new(NullSurface))
    }
}

fn context() -> (AttachContext, mpsc::UnboundedReceiver<crate::session::HandsFreeUpdate>) {
    let registry = SessionRegistry::new();
    let (update_tx, updates) = mpsc::unbounded_channel();
    let ctx = AttachContext {
        registry,
        overlay_host: Arc::new(NullHost),
        update_tx,
        config_override: Some(Config {
            exit_auto_close_delay_seconds: 0,
            ..Config::default()
        }),
    };
    (ctx, updates)
}

fn spawn_session(command: &str) -> PtySession {
    PtySession::spawn(PtySessionOptions {
        command: command.to_owned(),
        cwd: PathBuf::from("/tmp"),
        cols: 80,
        rows: 24,
        scrollback_lines: 200,
        raw_log_capacity: 64 * 1024,
    })
    .expect("session spawns")
}

#[tokio::test]
async fn empty_background_list_message() {
    let (ctx, _updates) = context();
    let outcome = run(&ctx, None).await;
    assert!(matches!(outcome, AttachOutcome::NoSessions));
    assert_eq!(outcome.message().as_deref(), Some("No background sessions"));
}

#[tokio::test]
async fn unknown_id_message() {
    let (ctx, _updates) = context();
    let outcome = run(&ctx, Some("brisk-falcon")).await;
    assert!(matches!(outcome, AttachOutcome::NotFound(_)));
    assert_eq!(outcome.message().as_deref(), Some("Session not found: brisk-falcon"));
}

#[tokio::test]
async fn no_arg_lists_background_sessions() {
    let (ctx, _updates) = context();
    let session = spawn_session("sleep 60");
    let id = ctx.registry.add_background("sleep 60".to_owned(), session, None, None);

    match run(&ctx, None).await {
        AttachOutcome::Select(list) => {
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].id, id);
        }
        other => panic!("expected selector list, got {other:?}"),
    }

    let removed = ctx.registry.remove_background(&id).expect("parked");
    removed.session.dispose();
}

#[tokio::test]
async fn reattach_supervises_until_kill() -> anyhow::Result<()> {
    let (ctx, _updates) = context();
    let session = spawn_session("sleep 60");
    let id = ctx.registry.add_background("sleep 60".to_owned(), session, None, None);

    let registry = Arc::clone(&ctx.registry);
    let id_for_task = id.clone();
    let task = tokio::spawn(async move { run(&ctx, Some(&id_for_task)).await });

    // The session moves from background to active.
    let mut handle = None;
    for _ in 0..100 {
        if let Some(h) = registry.get_active(&id) {
            handle = Some(h);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let handle = handle.expect("reattached controller registered");
    assert!(registry.list_background().is_empty());

    handle.kill().await;
    let outcome = tokio::time::timeout(Duration::from_secs(10), task).await??;
    match outcome {
        AttachOutcome::Finished(result) => {
            assert_eq!(result.session_id, id);
            assert!(!result.backgrounded);
        }
        other => panic!("expected finished, got {other:?}"),
    }
    assert!(!registry.id_in_use(&id), "termination releases the id");
    Ok(())
}

#[tokio::test]
async fn reattach_of_exited_session_returns_exit_result() -> anyhow::Result<()> {
    let (ctx, _updates) = context();
    let session = spawn_session("exit 7");
    let mut exit_rx = session.subscribe_exit();
    exit_rx.wait_for(Option::is_some).await.expect("child exits");
    let id = ctx.registry.add_background("exit 7".to_owned(), session, None, None);

    // Reattach inside the cleanup window observes the recorded exit.
    let outcome = tokio::time::timeout(Duration::from_secs(10), run(&ctx, Some(&id))).await?;
    match outcome {
        AttachOutcome::Finished(result) => assert_eq!(result.exit_code, Some(7)),
        other => panic!("expected finished, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn busy_overlay_keeps_session_parked() {
    let (ctx, _updates) = context();
    let session = spawn_session("sleep 60");
    let id = ctx.registry.add_background("sleep 60".to_owned(), session, None, None);

    assert!(ctx.registry.try_open_overlay());
    let outcome = run(&ctx, Some(&id)).await;
    assert!(matches!(outcome, AttachOutcome::OverlayBusy));
    assert_eq!(outcome.message().as_deref(), Some("overlay_already_open"));

    // Still reachable for a later attach.
    assert_eq!(ctx.registry.list_background().len(), 1);
    let removed = ctx.registry.remove_background(&id).expect("parked");
    removed.session.dispose();
}
