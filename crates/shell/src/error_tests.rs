// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn codes_round_trip_through_serde() {
    for code in [
        ErrorCode::SpawnFailed,
        ErrorCode::SessionNotFound,
        ErrorCode::WriteFailed,
        ErrorCode::InvalidArguments,
        ErrorCode::OverlayAlreadyOpen,
        ErrorCode::RateLimited,
    ] {
        let json = serde_json::to_string(&code).expect("serialize");
        assert_eq!(json, format!("\"{}\"", code.as_str()));
        let back: ErrorCode = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, code);
    }
}

#[test]
fn rate_limited_is_not_user_visible() {
    assert!(!ErrorCode::RateLimited.is_error());
    assert!(ErrorCode::SessionNotFound.is_error());
}

#[test]
fn reply_envelope_shape() {
    let reply = ErrorReply::with_message(ErrorCode::SessionNotFound, "no such id");
    let json = serde_json::to_value(&reply).expect("serialize");
    assert_eq!(json["error"], "session_not_found");
    assert_eq!(json["isError"], true);
    assert_eq!(json["message"], "no such id");
}
