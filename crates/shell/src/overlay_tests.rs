// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::session::{SessionState, StatusSnapshot};

fn status(state: SessionState) -> StatusSnapshot {
    StatusSnapshot {
        session_id: "calm-river".to_owned(),
        state,
        runtime_ms: 72_000,
        exited: state == SessionState::Exited,
        exit_code: None,
        signal: None,
        total_chars_sent: 0,
        budget_exhausted: false,
        dialog_selected: (state == SessionState::DetachDialog).then_some(1),
    }
}

#[test]
fn running_frame_has_header_viewport_footer() {
    let viewport = vec!["line one".to_owned(), "line two".to_owned()];
    let frame = compose_frame(&status(SessionState::Running), "npm test", &viewport, false, 80);

    assert_eq!(frame.len(), 4);
    assert!(frame[0].contains("npm test"));
    assert!(frame[0].contains("running"));
    assert!(frame[0].contains("1m12s"));
    assert_eq!(frame[1], "line one");
    assert_eq!(frame[2], "line two");
    assert!(frame[3].contains("Esc Esc to detach"));
}

#[test]
fn scrolled_frame_hints_follow() {
    let frame = compose_frame(&status(SessionState::Running), "sh", &[], true, 80);
    assert!(frame.last().expect("footer").contains("follow"));
}

#[test]
fn dialog_frame_marks_selection() {
    let frame = compose_frame(&status(SessionState::DetachDialog), "sh", &[], false, 120);
    let footer = frame.last().expect("dialog row");
    assert!(footer.contains("▸Move to background"), "footer: {footer}");
    assert!(footer.contains("Kill session"));
    assert!(footer.contains("Minimize"));
    assert!(footer.contains("Cancel"));
}

#[test]
fn exited_frame_shows_code_and_dismiss_hint() {
    let mut st = status(SessionState::Exited);
    st.exit_code = Some(2);
    let frame = compose_frame(&st, "sh", &[], false, 80);
    let footer = frame.last().expect("footer");
    assert!(footer.contains("exit 2"), "footer: {footer}");
    assert!(footer.contains("Esc"));
}

#[test]
fn exited_frame_prefers_signal_when_no_code() {
    let mut st = status(SessionState::Exited);
    st.signal = Some(15);
    let frame = compose_frame(&st, "sh", &[], false, 80);
    assert!(frame.last().expect("footer").contains("signal 15"));
}

#[test]
fn chrome_clips_to_width_viewport_passes_through() {
    let long = "x".repeat(200);
    let frame = compose_frame(&status(SessionState::Running), &long, &[long.clone()], false, 20);
    // Header and footer are clipped; the emulator already bounds viewport
    // lines to the PTY width.
    assert!(frame.first().expect("header").chars().count() <= 20);
    assert!(frame.last().expect("footer").chars().count() <= 20);
    assert_eq!(frame[1], long);
}

#[test]
fn hands_free_state_is_labelled() {
    let frame = compose_frame(&status(SessionState::HandsFree), "sh", &[], false, 80);
    assert!(frame[0].contains("hands-free"));
}
