// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::config::Config;
use crate::overlay::RenderSurface;
use crate::session::HandsFreeUpdate;

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

fn test_config() -> Config {
    Config {
        quiet_threshold_ms: 300,
        hands_free_update_interval_ms: 300_000,
        min_query_interval_seconds: 2,
        exit_auto_close_delay_seconds: 5,
        ..Config::default()
    }
}

struct Ctx {
    api: DriverApi,
    #[allow(dead_code)]
    updates: mpsc::UnboundedReceiver<HandsFreeUpdate>,
    registry: Arc<SessionRegistry>,
}

fn api() -> Ctx {
    let registry = SessionRegistry::new();
    let (update_tx, updates) = mpsc::unbounded_channel();
    let api = DriverApi::new(Arc::clone(&registry), update_tx).with_config(test_config());
    Ctx { api, updates, registry }
}

fn api_with_tui() -> Ctx {
    let registry = SessionRegistry::new();
    let (update_tx, updates) = mpsc::unbounded_channel();
    let api = DriverApi::new(Arc::clone(&registry), update_tx)
        .with_config(test_config())
        .with_overlay_host(Arc::new(NullHost));
    Ctx { api, updates, registry }
}

#[tokio::test]
async fn empty_command_is_invalid() {
    let ctx = api();
    let err = ctx
        .api
        .start(StartRequest { command: "  ".to_owned(), hands_free: Some(true), ..Default::default() })
        .await
        .expect_err("must fail");
    assert_eq!(err, ErrorCode::InvalidArguments);
}

#[tokio::test]
async fn interactive_requires_a_tui() {
    let ctx = api();
    let err = ctx
        .api
        .start(StartRequest { command: "echo hi".to_owned(), ..Default::default() })
        .await
        .expect_err("must fail");
    assert_eq!(err, ErrorCode::InvalidArguments);
}

#[tokio::test]
async fn hands_free_start_query_kill_cycle() -> anyhow::Result<()> {
    let ctx = api();
    let reply = ctx
        .api
        .start(StartRequest {
            command: "sleep 30".to_owned(),
            hands_free: Some(true),
            ..Default::default()
        })
        .await
        .expect("start ok");
    let StartReply::Running { session_id, status } = reply else {
        panic!("expected immediate id, got {reply:?}");
    };
    assert_eq!(status, "running");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = ctx
        .api
        .query(QueryRequest { session_id: session_id.clone(), ..Default::default() })
        .await
        .expect("query ok");
    match response {
        QueryResponse::Status(reply) => {
            assert!(!reply.status.exited);
            assert_eq!(reply.status.session_id, session_id);
        }
        other => panic!("expected status, got {other:?}"),
    }

    let response = ctx
        .api
        .query(QueryRequest { session_id: session_id.clone(), kill: true, ..Default::default() })
        .await
        .expect("kill ok");
    match response {
        QueryResponse::Finished(result) => assert_eq!(result.session_id, session_id),
        other => panic!("expected final result, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(ctx.registry.get_active(&session_id).is_none());
    assert!(!ctx.registry.id_in_use(&session_id));
    Ok(())
}

#[tokio::test]
async fn rate_limited_query_races_completion() -> anyhow::Result<()> {
    let ctx = api();
    let reply = ctx
        .api
        .start(StartRequest {
            command: "sleep 1".to_owned(),
            hands_free: Some(true),
            ..Default::default()
        })
        .await
        .expect("start ok");
    let StartReply::Running { session_id, .. } = reply else { panic!("expected running") };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // First status query passes, starting the limiter window.
    let _ = ctx
        .api
        .query(QueryRequest { session_id: session_id.clone(), ..Default::default() })
        .await
        .expect("first query ok");

    // Second query is limited; the wait must race completion and return the
    // final result when the child exits (~1s), not after the full window.
    let started = std::time::Instant::now();
    let response = ctx
        .api
        .query(QueryRequest { session_id: session_id.clone(), ..Default::default() })
        .await
        .expect("second query resolves");
    let elapsed = started.elapsed();

    match response {
        QueryResponse::Finished(result) => {
            assert_eq!(result.exit_code, Some(0));
            assert!(elapsed < Duration::from_secs(2), "returned too late: {elapsed:?}");
        }
        other => panic!("expected completion result, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn settings_only_query_returns_no_status() -> anyhow::Result<()> {
    let ctx = api();
    let StartReply::Running { session_id, .. } = ctx
        .api
        .start(StartRequest {
            command: "sleep 30".to_owned(),
            hands_free: Some(true),
            ..Default::default()
        })
        .await
        .expect("start ok")
    else {
        panic!("expected running")
    };

    let response = ctx
        .api
        .query(QueryRequest {
            session_id: session_id.clone(),
            settings: Some(SettingsUpdate {
                update_interval: Some(10_000),
                quiet_threshold: Some(2000),
            }),
            ..Default::default()
        })
        .await
        .expect("settings ok");
    assert!(matches!(response, QueryResponse::SettingsApplied { applied: true }));

    let _ = ctx.api.kill(&session_id).await;
    Ok(())
}

#[tokio::test]
async fn input_reaches_child() -> anyhow::Result<()> {
    let ctx = api();
    let StartReply::Running { session_id, .. } = ctx
        .api
        .start(StartRequest {
            command: "cat".to_owned(),
            hands_free: Some(true),
            ..Default::default()
        })
        .await
        .expect("start ok")
    else {
        panic!("expected running")
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = ctx
        .api
        .query(QueryRequest {
            session_id: session_id.clone(),
            input: Some("marker-text\n".to_owned()),
            ..Default::default()
        })
        .await
        .expect("input query ok");
    assert!(matches!(response, QueryResponse::Status(_)));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let handle = ctx.registry.get_active(&session_id).expect("active");
    let reply = handle
        .query(
            crate::session::QueryOptions { drain: true, ..Default::default() },
            true,
        )
        .await
        .expect("drain ok");
    assert!(reply.output.output.contains("marker-text"), "got {:?}", reply.output.output);

    let _ = ctx.api.kill(&session_id).await;
    Ok(())
}

#[tokio::test]
async fn unknown_session_is_reported() {
    let ctx = api();
    let err = ctx
        .api
        .query(QueryRequest { session_id: "missing-slug".to_owned(), ..Default::default() })
        .await
        .expect_err("must fail");
    assert_eq!(err, ErrorCode::SessionNotFound);

    let err = ctx.api.kill("missing-slug").await.expect_err("must fail");
    assert_eq!(err, ErrorCode::SessionNotFound);
}

#[tokio::test]
async fn interactive_start_blocks_until_exit() -> anyhow::Result<()> {
    let ctx = api_with_tui();
    let reply = ctx
        .api
        .start(StartRequest { command: "echo interactive-done".to_owned(), ..Default::default() })
        .await
        .expect("start ok");
    match reply {
        StartReply::Finished(result) => {
            assert_eq!(result.exit_code, Some(0));
            assert!(!result.backgrounded);
        }
        other => panic!("expected finished result, got {other:?}"),
    }
    // Overlay slot released after the run.
    for _ in 0..50 {
        if !ctx.registry.is_overlay_open() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("overlay slot never released");
}

#[tokio::test]
async fn second_overlay_start_is_refused() -> anyhow::Result<()> {
    let ctx = api_with_tui();
    let registry = Arc::clone(&ctx.registry);
    let api = Arc::new(ctx.api);

    let first = Arc::clone(&api);
    let first_task = tokio::spawn(async move {
        first
            .start(StartRequest { command: "sleep 30".to_owned(), ..Default::default() })
            .await
    });

    // Wait for the first start to claim the overlay.
    for _ in 0..50 {
        if registry.is_overlay_open() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(registry.is_overlay_open(), "first overlay never opened");

    let err = api
        .start(StartRequest { command: "echo second".to_owned(), ..Default::default() })
        .await
        .expect_err("second start must fail");
    assert_eq!(err, ErrorCode::OverlayAlreadyOpen);

    // Clean up the first session.
    let active = registry.list_active();
    assert_eq!(active.len(), 1);
    active[0].kill().await;
    let _ = first_task.await;
    Ok(())
}
